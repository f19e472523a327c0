//! Access to the shared LDraw parts library.
//!
//! Models reference library files by logical name. This module turns those
//! names into URLs ([`resolver`]) and provides byte sources for them
//! ([`fetch`], [`archive`], [`bundle`]).

pub mod archive;
pub mod bundle;
pub mod fetch;
pub mod resolver;

pub use archive::ArchiveFetcher;
pub use bundle::PartsBundle;
pub use fetch::{FileFetcher, Fetcher, LayeredFetcher, MemoryFetcher};
pub use resolver::{classify, resolve, LibraryFolder, ResolveContext, PALETTE_FILE};

use std::fmt;

/// A logical file name as written in a type-1 line, e.g. `s\3001s01.dat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartReference(String);

impl PartReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name exactly as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with `/` separators and no surrounding whitespace.
    pub fn normalized(&self) -> String {
        self.0.trim().replace('\\', "/")
    }

    /// Final path segment, e.g. `3001s01.dat`.
    pub fn file_name(&self) -> String {
        let normalized = self.normalized();
        normalized
            .rsplit('/')
            .next()
            .unwrap_or(&normalized)
            .to_string()
    }
}

impl fmt::Display for PartReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartReference {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_normalization() {
        let r = PartReference::new(" 48\\4-4cyli.dat ");
        assert_eq!(r.normalized(), "48/4-4cyli.dat");
        assert_eq!(r.file_name(), "4-4cyli.dat");
        assert_eq!(r.as_str(), " 48\\4-4cyli.dat ");
    }
}

//! Error types for the brick stepper.

use std::fmt;
use thiserror::Error;

/// Result type alias using StepperError.
pub type Result<T> = std::result::Result<T, StepperError>;

/// The chain of references that led to a failing resource, root first.
///
/// Displayed as `model.ldr -> 3001.dat -> s/3001s01.dat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceChain(pub Vec<String>);

impl ReferenceChain {
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Return a new chain with `link` appended.
    pub fn with(&self, link: impl Into<String>) -> Self {
        let mut links = self.0.clone();
        links.push(link.into());
        Self(links)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The last (innermost) link, i.e. the resource that actually failed.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }
}

impl fmt::Display for ReferenceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" -> "))
    }
}

/// Failure of a single resource, independent of who referenced it.
///
/// Cloneable so that one failed fetch can be handed to every waiter of a
/// deduplicated request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The byte source could not produce the resource.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The resource was fetched but contains a malformed directive.
    #[error("{url}:{line}: {message}")]
    Parse {
        url: String,
        line: usize,
        message: String,
    },
}

/// Main error type for loading and presenting brick models.
#[derive(Error, Debug)]
pub enum StepperError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON data (themes, parts bundles).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse a TOML configuration file.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to encode or decode an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to read a ZIP archive.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Malformed URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A referenced resource could not be retrieved.
    #[error("failed to fetch {chain}: {reason}")]
    Fetch { chain: ReferenceChain, reason: String },

    /// A referenced resource contains a malformed directive.
    #[error("parse error in {chain} (line {line}): {message}")]
    Parse {
        chain: ReferenceChain,
        line: usize,
        message: String,
    },

    /// Reference nesting too deep (circular reference protection).
    #[error("reference nesting too deep (possible circular reference): {chain}")]
    ReferenceTooDeep { chain: ReferenceChain },

    /// The load was superseded by a newer one for the same viewer slot.
    #[error("load generation {generation} was superseded")]
    Superseded { generation: u64 },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StepperError {
    /// Attach a reference chain to a resource failure.
    pub fn from_resource(error: ResourceError, chain: ReferenceChain) -> Self {
        match error {
            ResourceError::Fetch { reason, .. } => StepperError::Fetch { chain, reason },
            ResourceError::Parse { line, message, .. } => StepperError::Parse {
                chain,
                line,
                message,
            },
        }
    }

    /// The reference chain of a fetch/parse failure, if any.
    pub fn chain(&self) -> Option<&ReferenceChain> {
        match self {
            StepperError::Fetch { chain, .. }
            | StepperError::Parse { chain, .. }
            | StepperError::ReferenceTooDeep { chain } => Some(chain),
            _ => None,
        }
    }

    /// Whether this error only signals a superseded load.
    pub fn is_superseded(&self) -> bool {
        matches!(self, StepperError::Superseded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_display() {
        let chain = ReferenceChain::new("car.ldr")
            .with("3001.dat")
            .with("s/3001s01.dat");
        assert_eq!(chain.to_string(), "car.ldr -> 3001.dat -> s/3001s01.dat");
        assert_eq!(chain.leaf(), Some("s/3001s01.dat"));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_from_resource_keeps_chain() {
        let chain = ReferenceChain::new("car.ldr").with("3001.dat");
        let err = StepperError::from_resource(
            ResourceError::Fetch {
                url: "file:///lib/parts/3001.dat".to_string(),
                reason: "not found".to_string(),
            },
            chain.clone(),
        );
        assert_eq!(err.chain(), Some(&chain));
        assert!(err.to_string().contains("car.ldr -> 3001.dat"));
        assert!(!err.is_superseded());
    }
}

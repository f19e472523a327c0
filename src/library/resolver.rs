//! Mapping part references to fetchable URLs.
//!
//! LDraw files name their dependencies by bare file name (`3001.dat`,
//! `s\3001s01.dat`, `48\4-4cyli.dat`). Which library folder holds the file is
//! not written down anywhere, so it is guessed from the name:
//!
//! | name                        | folder      |
//! |-----------------------------|-------------|
//! | `3001s01.dat` (subpart)     | `parts/s/`  |
//! | `4-4cyli.dat`, `stud.dat`   | `p/`        |
//! | `3001.dat` (digit first)    | `parts/`    |
//! | anything else               | `p/`        |
//!
//! Explicit folders are kept, except that a primitive written under
//! `parts/` moves to `p/` and a subpart written under `p/` moves to
//! `parts/s/`.
//!
//! Resolution is a pure function of its inputs and never fails: when the
//! heuristics are unsure the best guess is returned and a fetch failure, if
//! any, is reported by the loader.

use super::PartReference;
use tracing::debug;
use url::Url;

/// File name of the shared colour palette at the library root.
pub const PALETTE_FILE: &str = "LDConfig.ldr";

/// Name prefixes of files that live in the primitives folder.
const PRIMITIVE_PREFIXES: &[&str] = &[
    "stug", "rect", "box", "cyli", "disc", "edge", "ring", "ndis", "con", "rin", "tri", "stud",
    "empty",
];

/// Folder of the parts library a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryFolder {
    /// `parts/`
    Parts,
    /// `parts/s/`
    Subparts,
    /// `p/`
    Primitives,
}

impl LibraryFolder {
    pub fn prefix(&self) -> &'static str {
        match self {
            LibraryFolder::Parts => "parts/",
            LibraryFolder::Subparts => "parts/s/",
            LibraryFolder::Primitives => "p/",
        }
    }
}

/// Everything resolution depends on besides the reference itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveContext {
    /// Root of the parts library; must end with `/`.
    pub library_base: Url,
    /// URL of the model being loaded; relative model references resolve against it.
    pub main_model_url: Option<Url>,
    /// Substitute location for the main model (e.g. an edited in-memory copy).
    pub override_main_url: Option<Url>,
    /// When set, library URLs are rewritten through this endpoint.
    pub proxy_endpoint: Option<Url>,
}

impl ResolveContext {
    pub fn new(library_base: Url) -> Self {
        Self {
            library_base,
            main_model_url: None,
            override_main_url: None,
            proxy_endpoint: None,
        }
    }

    pub fn with_main_model(mut self, url: Url) -> Self {
        self.main_model_url = Some(url);
        self
    }

    pub fn with_override(mut self, url: Url) -> Self {
        self.override_main_url = Some(url);
        self
    }

    pub fn with_proxy(mut self, endpoint: Url) -> Self {
        self.proxy_endpoint = Some(endpoint);
        self
    }

    pub fn use_proxy(&self) -> bool {
        self.proxy_endpoint.is_some()
    }
}

/// Resolve a reference to the URL it should be fetched from.
pub fn resolve(reference: &PartReference, ctx: &ResolveContext) -> Url {
    let name = reference.normalized();

    if let Ok(absolute) = Url::parse(&name) {
        return finish(absolute, ctx);
    }

    let lower = name.to_ascii_lowercase();

    if lower == PALETTE_FILE.to_ascii_lowercase() {
        return finish(join_or_base(&ctx.library_base, PALETTE_FILE), ctx);
    }

    if is_model_file(&lower) {
        let base = ctx.main_model_url.as_ref().unwrap_or(&ctx.library_base);
        let url = join_or_base(base, &name);
        if let (Some(main), Some(replacement)) = (&ctx.main_model_url, &ctx.override_main_url) {
            if &url == main {
                return replacement.clone();
            }
        }
        return finish(url, ctx);
    }

    let path = library_path(&lower);
    finish(join_or_base(&ctx.library_base, &path), ctx)
}

/// Guess the library folder from a bare file name.
pub fn classify(filename: &str) -> LibraryFolder {
    let lower = filename.to_ascii_lowercase();
    if is_subpart(&lower) {
        LibraryFolder::Subparts
    } else if is_primitive(&lower) {
        LibraryFolder::Primitives
    } else if lower.starts_with(|c: char| c.is_ascii_digit()) {
        LibraryFolder::Parts
    } else {
        debug!("ambiguous library reference '{}', assuming primitive", filename);
        LibraryFolder::Primitives
    }
}

/// Whether the name refers to a model (as opposed to a library file).
pub fn is_model_file(lower: &str) -> bool {
    (lower.ends_with(".ldr") || lower.ends_with(".mpd"))
        && !lower.ends_with(&PALETTE_FILE.to_ascii_lowercase())
}

/// Library-relative path of a (lower-cased, `/`-separated) reference.
fn library_path(lower: &str) -> String {
    let mut path = lower.trim_start_matches("./").trim_start_matches('/').to_string();

    // Repair folder combinations produced by naive relative joins
    for (wrong, right) in [
        ("models/p/", "p/"),
        ("models/parts/", "parts/"),
        ("p/parts/s/", "parts/s/"),
        ("p/parts/", "parts/"),
        ("p/s/", "parts/s/"),
        ("parts/parts/", "parts/"),
        ("p/p/", "p/"),
    ] {
        if let Some(rest) = path.strip_prefix(wrong) {
            path = format!("{}{}", right, rest);
        }
    }

    // Files filed under the wrong folder for their kind
    let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
    if is_primitive(&filename) && !path.starts_with("parts/s/") {
        if let Some(rest) = path.strip_prefix("parts/") {
            path = format!("p/{}", rest);
        }
    }
    if is_subpart(&filename) && !path.starts_with("p/48/") && !path.starts_with("p/8/") {
        if let Some(rest) = path.strip_prefix("p/") {
            path = format!("parts/s/{}", rest);
        }
    }

    if path.starts_with("parts/") || path.starts_with("p/") {
        return path;
    }
    if path.starts_with("s/") {
        return format!("parts/{}", path);
    }
    if path.starts_with("48/") || path.starts_with("8/") {
        return format!("p/{}", path);
    }

    let filename = path.rsplit('/').next().unwrap_or(&path);
    format!("{}{}", classify(filename).prefix(), path)
}

/// `3001s01.dat`: digits, `s`, digits, `.dat`.
fn is_subpart(lower: &str) -> bool {
    let Some(stem) = lower.strip_suffix(".dat") else {
        return false;
    };
    match stem.split_once('s') {
        Some((part, sub)) => {
            !part.is_empty()
                && !sub.is_empty()
                && part.chars().all(|c| c.is_ascii_digit())
                && sub.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// `4-4cyli.dat`, `1-8edge.dat` or a known primitive prefix.
fn is_primitive(lower: &str) -> bool {
    let digits = lower.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let mut rest = lower[digits..].chars();
        if rest.next() == Some('-') && rest.next().is_some_and(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    PRIMITIVE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn join_or_base(base: &Url, path: &str) -> Url {
    base.join(path).unwrap_or_else(|e| {
        debug!("could not join '{}' onto {}: {}", path, base, e);
        base.clone()
    })
}

/// Apply proxy indirection to library URLs.
fn finish(url: Url, ctx: &ResolveContext) -> Url {
    match &ctx.proxy_endpoint {
        Some(endpoint) if url.as_str().starts_with(ctx.library_base.as_str()) => {
            proxied(endpoint, &url)
        }
        _ => url,
    }
}

/// `{endpoint}?url={target}`
pub fn proxied(endpoint: &Url, target: &Url) -> Url {
    let mut proxied = endpoint.clone();
    proxied.query_pairs_mut().append_pair("url", target.as_str());
    proxied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext::new(Url::parse("https://cdn.example.com/ldraw/").unwrap())
            .with_main_model(Url::parse("https://files.example.com/models/car.ldr").unwrap())
    }

    fn resolve_str(name: &str, ctx: &ResolveContext) -> String {
        resolve(&PartReference::new(name), ctx).to_string()
    }

    #[test]
    fn test_numeric_part_goes_to_parts() {
        assert_eq!(
            resolve_str("3001.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/3001.dat"
        );
    }

    #[test]
    fn test_letter_leading_goes_to_primitives() {
        assert_eq!(
            resolve_str("stud.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/stud.dat"
        );
        assert_eq!(
            resolve_str("Box5.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/box5.dat"
        );
    }

    #[test]
    fn test_fraction_primitives_and_subparts() {
        assert_eq!(
            resolve_str("4-4cyli.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/4-4cyli.dat"
        );
        assert_eq!(
            resolve_str("3001s01.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/s/3001s01.dat"
        );
        assert_eq!(
            resolve_str("s\\3001s01.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/s/3001s01.dat"
        );
        assert_eq!(
            resolve_str("48\\4-4cyli.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/48/4-4cyli.dat"
        );
    }

    #[test]
    fn test_path_repairs() {
        assert_eq!(
            resolve_str("p/s/3001s01.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/s/3001s01.dat"
        );
        assert_eq!(
            resolve_str("parts/parts/3001.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/3001.dat"
        );
        assert_eq!(
            resolve_str("models/p/stud.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/stud.dat"
        );
    }

    #[test]
    fn test_misfiled_primitive_moves_to_primitives() {
        assert_eq!(
            resolve_str("parts/stud.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/stud.dat"
        );
        assert_eq!(
            resolve_str("parts/4-4cyli.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/4-4cyli.dat"
        );
        assert_eq!(
            resolve_str("parts/3001.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/3001.dat"
        );
    }

    #[test]
    fn test_misfiled_subpart_moves_to_subparts() {
        assert_eq!(
            resolve_str("p/3001s01.dat", &ctx()),
            "https://cdn.example.com/ldraw/parts/s/3001s01.dat"
        );
        assert_eq!(
            resolve_str("p/48/3001s01.dat", &ctx()),
            "https://cdn.example.com/ldraw/p/48/3001s01.dat"
        );
    }

    #[test]
    fn test_palette_at_library_root() {
        assert_eq!(
            resolve_str("LDConfig.ldr", &ctx()),
            "https://cdn.example.com/ldraw/LDConfig.ldr"
        );
    }

    #[test]
    fn test_models_resolve_relative_to_main() {
        assert_eq!(
            resolve_str("wheel.ldr", &ctx()),
            "https://files.example.com/models/wheel.ldr"
        );
    }

    #[test]
    fn test_main_override() {
        let ctx = ctx().with_override(Url::parse("memory:edited/car.ldr").unwrap());
        assert_eq!(resolve_str("car.ldr", &ctx), "memory:edited/car.ldr");
        assert_eq!(
            resolve_str("wheel.ldr", &ctx),
            "https://files.example.com/models/wheel.ldr"
        );
    }

    #[test]
    fn test_proxy_only_for_library_urls() {
        let ctx = ctx().with_proxy(Url::parse("https://app.example.com/api/proxy/ldr").unwrap());
        let url = resolve(&PartReference::new("3001.dat"), &ctx);
        assert_eq!(url.path(), "/api/proxy/ldr");
        let target: Vec<_> = url.query_pairs().collect();
        assert_eq!(target[0].0, "url");
        assert_eq!(target[0].1, "https://cdn.example.com/ldraw/parts/3001.dat");

        assert_eq!(
            resolve_str("wheel.ldr", &ctx),
            "https://files.example.com/models/wheel.ldr"
        );
    }

    #[test]
    fn test_resolution_is_pure() {
        let ctx = ctx();
        let a = resolve(&PartReference::new("3023.dat"), &ctx);
        let b = resolve(&PartReference::new("3023.dat"), &ctx);
        assert_eq!(a, b);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("3001.dat"), LibraryFolder::Parts);
        assert_eq!(classify("3001s01.dat"), LibraryFolder::Subparts);
        assert_eq!(classify("1-4edge.dat"), LibraryFolder::Primitives);
        assert_eq!(classify("stug-2x2.dat"), LibraryFolder::Primitives);
        assert_eq!(classify("u9001.dat"), LibraryFolder::Primitives);
    }
}

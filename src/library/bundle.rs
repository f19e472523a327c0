//! Pre-packaged part bundles.
//!
//! A model can ship with a `parts-bundle.json` next to it holding every
//! library file it needs:
//!
//! ```json
//! { "version": 1, "ldconfig": "0 !COLOUR ...", "parts": { "parts/3001.dat": "..." } }
//! ```
//!
//! Seeding the cache from the bundle turns a few hundred library requests
//! into one.

use super::resolver::{proxied, ResolveContext, PALETTE_FILE};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// File name of the bundle, next to the model it belongs to.
pub const BUNDLE_FILE: &str = "parts-bundle.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartsBundle {
    #[serde(default)]
    pub version: u32,
    /// Palette text; empty when the bundle does not carry one.
    #[serde(default)]
    pub ldconfig: String,
    /// Library-relative path to file text.
    #[serde(default)]
    pub parts: BTreeMap<String, String>,
}

impl PartsBundle {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Every `(url, text)` pair the bundle provides.
    ///
    /// Each file is listed under its library URL and, when a proxy is
    /// configured, under the proxied URL as well, so lookups hit whichever
    /// form the resolver produced.
    pub fn entries<'a>(&'a self, ctx: &ResolveContext) -> Vec<(Url, &'a str)> {
        let mut entries: Vec<(Url, &'a str)> = Vec::new();
        let mut push = |relative: &str, text: &'a str| {
            let Ok(url) = ctx.library_base.join(relative) else {
                return;
            };
            if let Some(endpoint) = &ctx.proxy_endpoint {
                entries.push((proxied(endpoint, &url), text));
            }
            entries.push((url, text));
        };

        for (relative, text) in &self.parts {
            push(&relative.replace('\\', "/"), text);
        }
        if !self.ldconfig.is_empty() {
            push(PALETTE_FILE, &self.ldconfig);
        }
        entries
    }
}

/// Where the bundle for a model would live: the model's directory.
pub fn bundle_url_for(model_url: &Url) -> Option<Url> {
    model_url.join(BUNDLE_FILE).ok()
}

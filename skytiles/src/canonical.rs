//! Canonical tile keys across CDN subdomain rotation.
//!
//! Tile CDNs serve the same resource from rotating subdomains
//! (`a.tile.openstreetmap.org`, `b.tile...`, ...) so browsers can open more
//! parallel connections. For storage those hostnames are all the same
//! logical tile, so every known rotated host is mapped to its bare home
//! host before a URL is used as a cache key. The same provider table
//! drives the read-path fallback that probes legacy variant keys.

use std::sync::LazyLock;

use regex::Regex;

/// One CDN provider with subdomain rotation.
#[derive(Debug, Clone, Copy)]
pub struct CdnProvider {
    /// The bare host used as the storage identity.
    pub canonical_host: &'static str,
    /// Rotating subdomain prefixes the CDN serves from.
    pub prefixes: &'static [&'static str],
}

/// Providers the app ships map layers for.
pub static CDN_PROVIDERS: &[CdnProvider] = &[
    CdnProvider {
        canonical_host: "tile.openstreetmap.org",
        prefixes: &["a", "b", "c"],
    },
    CdnProvider {
        canonical_host: "tile.opentopomap.org",
        prefixes: &["a", "b", "c"],
    },
    CdnProvider {
        canonical_host: "basemaps.cartocdn.com",
        prefixes: &["a", "b", "c", "d"],
    },
];

/// Compiled rewrite rules, one per provider.
static REWRITES: LazyLock<Vec<(Regex, String)>> = LazyLock::new(|| {
    CDN_PROVIDERS
        .iter()
        .map(|provider| {
            let prefixes = provider.prefixes.join("|");
            let host = regex::escape(provider.canonical_host);
            let pattern = format!("^(https?)://(?:{prefixes})\\.{host}/");
            let regex = Regex::new(&pattern).expect("static CDN pattern must compile");
            let replacement = format!("${{1}}://{}/", provider.canonical_host);
            (regex, replacement)
        })
        .collect()
});

/// Map a tile URL to its canonical form.
///
/// Rotated-subdomain hosts of known providers are rewritten to the bare
/// host; every other URL is returned unchanged. Idempotent:
/// `canonicalize(canonicalize(u)) == canonicalize(u)`.
pub fn canonicalize(url: &str) -> String {
    for (regex, replacement) in REWRITES.iter() {
        if regex.is_match(url) {
            return regex.replace(url, replacement.as_str()).into_owned();
        }
    }
    url.to_string()
}

/// True if `url` is already in canonical form.
pub fn is_canonical(url: &str) -> bool {
    REWRITES.iter().all(|(regex, _)| !regex.is_match(url))
}

/// Rotated-subdomain variants of a canonical URL.
///
/// Returns the URLs the same tile may have been stored under before key
/// migration. Empty for URLs that do not belong to a known provider.
pub fn variants(canonical_url: &str) -> Vec<String> {
    for provider in CDN_PROVIDERS {
        for scheme in ["https", "http"] {
            let home = format!("{scheme}://{}/", provider.canonical_host);
            if let Some(rest) = canonical_url.strip_prefix(&home) {
                return provider
                    .prefixes
                    .iter()
                    .map(|prefix| {
                        format!("{scheme}://{prefix}.{}/{rest}", provider.canonical_host)
                    })
                    .collect();
            }
        }
    }
    Vec::new()
}

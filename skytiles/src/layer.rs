//! Tile layer descriptors.
//!
//! A `TileLayerDescriptor` is supplied by the map collaborator per caching
//! run and validated here at the boundary: the URL template must carry the
//! `{z}`/`{x}`/`{y}` placeholders, and a `{s}` placeholder requires a
//! subdomain list. The canonical template (subdomain placeholder removed)
//! is derived once at construction and used for storage keys.

use rand::Rng;
use thiserror::Error;

use crate::canonical;
use crate::coord::TileCoord;

/// Errors from layer validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayerError {
    /// The URL template is missing a required placeholder.
    #[error("layer '{name}' template is missing the {placeholder} placeholder")]
    MissingPlaceholder {
        /// Layer name for diagnostics.
        name: String,
        /// The absent placeholder, e.g. `{z}`.
        placeholder: &'static str,
    },

    /// The template rotates subdomains but no subdomain list was given.
    #[error("layer '{name}' uses {{s}} but has no subdomains")]
    MissingSubdomains {
        /// Layer name for diagnostics.
        name: String,
    },
}

/// One tile layer of the active basemap.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayerDescriptor {
    /// Display name, used in logs and warnings.
    pub name: String,
    /// URL template with `{z}`, `{x}`, `{y}` and optionally `{s}`.
    pub url_template: String,
    /// Rotating subdomains, present iff the template contains `{s}`.
    pub subdomains: Option<Vec<String>>,
    /// Template with the subdomain placeholder removed.
    pub canonical_template: String,
}

impl TileLayerDescriptor {
    /// Validate and construct a layer descriptor.
    ///
    /// # Errors
    ///
    /// Returns `LayerError` when a coordinate placeholder is missing or
    /// when the template rotates subdomains without a subdomain list.
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        subdomains: Option<Vec<String>>,
    ) -> Result<Self, LayerError> {
        let name = name.into();
        let url_template = url_template.into();

        for placeholder in ["{z}", "{x}", "{y}"] {
            if !url_template.contains(placeholder) {
                return Err(LayerError::MissingPlaceholder { name, placeholder });
            }
        }

        let rotates = url_template.contains("{s}");
        if rotates && subdomains.as_ref().is_none_or(|s| s.is_empty()) {
            return Err(LayerError::MissingSubdomains { name });
        }

        let canonical_template = url_template.replacen("{s}.", "", 1);

        Ok(Self {
            name,
            url_template,
            subdomains: if rotates { subdomains } else { None },
            canonical_template,
        })
    }

    /// Build the request URL for a tile, choosing a random subdomain when
    /// the layer rotates.
    pub fn request_url(&self, tile: &TileCoord) -> String {
        let url = substitute(&self.url_template, tile);
        match &self.subdomains {
            Some(subdomains) if !subdomains.is_empty() => {
                let index = rand::rng().random_range(0..subdomains.len());
                url.replacen("{s}", &subdomains[index], 1)
            }
            _ => url,
        }
    }

    /// Build the canonical storage key for a tile.
    ///
    /// Uses the canonical template and runs the result through the
    /// normalizer, so templates already written against a rotated host
    /// still produce canonical keys.
    pub fn canonical_url(&self, tile: &TileCoord) -> String {
        canonical::canonicalize(&substitute(&self.canonical_template, tile))
    }
}

fn substitute(template: &str, tile: &TileCoord) -> String {
    template
        .replacen("{z}", &tile.zoom.to_string(), 1)
        .replacen("{x}", &tile.x.to_string(), 1)
        .replacen("{y}", &tile.y.to_string(), 1)
}

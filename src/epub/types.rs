//! Package document entries

use serde::{Deserialize, Serialize};

/// One `<itemref>` of the spine, joined with its manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpineItem {
    /// Index in spine (position of the `<itemref>`)
    pub index: usize,
    /// Manifest id, also the spine step's id assertion
    pub idref: String,
    /// Content href, relative to the package root
    pub href: String,
    /// `linear="no"` items are skipped by location generation
    pub linear: bool,
    pub properties: Option<String>,
    /// Spine path of this item, e.g. `/6/4[chap01ref]`
    pub cfi_base: String,
}

/// `<item>` of the manifest, href resolved against the package directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

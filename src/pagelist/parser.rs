//! Page-list extraction from navigation documents
//!
//! Reduces an EPUB 3 `<nav epub:type="page-list">` or an EPUB 2 NCX
//! `<pageList>` to `{href, cfi?, page}` items.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::tree::parse_xhtml;

/// A publisher page marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageListItem {
    pub href: String,
    /// CFI carried in the href fragment (`chapter.xhtml#epubcfi(...)`)
    pub cfi: Option<String>,
    pub page: u32,
}

impl PageListItem {
    /// Item from a link target and its label; None for non-numeric labels
    pub fn from_link(href: &str, label: &str) -> Option<Self> {
        let label = label.trim();
        let Ok(page) = label.parse::<u32>() else {
            debug!("Skipping page '{}' ({}): not a page number", label, href);
            return None;
        };

        let cfi = href
            .split_once('#')
            .map(|(_, fragment)| fragment)
            .filter(|fragment| fragment.starts_with("epubcfi("))
            .map(str::to_string);

        Some(Self {
            href: href.to_string(),
            cfi,
            page,
        })
    }
}

/// Get text content from a node recursively
fn get_text_content(node: &roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Parse the page-list of an EPUB 3 Navigation Document
pub fn parse_nav_page_list(content: &str) -> Result<Vec<PageListItem>> {
    let doc = parse_xhtml(content)?;

    let nav = doc.descendants().find(|node| {
        node.tag_name().name() == "nav"
            && node.attributes().any(|a| {
                a.name() == "type" && a.value().split_whitespace().any(|t| t == "page-list")
            })
    });
    let Some(nav) = nav else {
        return Ok(Vec::new());
    };

    let items = nav
        .descendants()
        .filter(|node| node.tag_name().name() == "a")
        .filter_map(|a| {
            PageListItem::from_link(a.attribute("href").unwrap_or(""), &get_text_content(&a))
        })
        .collect();

    Ok(items)
}

/// Parse the `<pageList>` of an EPUB 2 NCX Document
pub fn parse_ncx_page_list(content: &str) -> Result<Vec<PageListItem>> {
    let doc = parse_xhtml(content)?;

    let Some(page_list) = doc
        .descendants()
        .find(|node| node.tag_name().name() == "pageList")
    else {
        return Ok(Vec::new());
    };

    let mut items = Vec::new();
    for target in page_list
        .children()
        .filter(|node| node.tag_name().name() == "pageTarget")
    {
        let href = target
            .children()
            .find(|node| node.tag_name().name() == "content")
            .and_then(|node| node.attribute("src"))
            .unwrap_or("");

        // `value` holds the number; the label is the fallback
        let label = match target.attribute("value") {
            Some(value) => value.to_string(),
            None => target
                .descendants()
                .find(|node| node.tag_name().name() == "text")
                .map(|node| get_text_content(&node))
                .unwrap_or_default(),
        };

        items.extend(PageListItem::from_link(href, &label));
    }

    Ok(items)
}

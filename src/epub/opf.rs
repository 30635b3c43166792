//! OPF (Open Packaging Format) parser
//!
//! Parses `META-INF/container.xml` and the package document into the
//! manifest and the spine used for CFI spine steps.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::types::{ManifestItem, SpineItem};
use crate::cfi::generate_chapter_component;
use crate::error::{Error, Result};

/// Find the path to the OPF file from container.xml
pub fn find_opf_path(container_xml: &str) -> Result<String> {
    let doc = roxmltree::Document::parse(container_xml)?;

    doc.descendants()
        .find(|node| node.tag_name().name() == "rootfile")
        .and_then(|node| node.attribute("full-path"))
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidPackage("Could not find OPF path in container.xml".to_string())
        })
}

/// Directory part of the OPF path (`OEBPS/content.opf` -> `OEBPS`)
pub fn opf_dir(opf_path: &str) -> &str {
    opf_path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Join a manifest href onto the package directory
pub fn resolve_href(opf_dir: &str, href: &str) -> String {
    let mut parts: Vec<&str> = opf_dir.split('/').filter(|p| !p.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Parsed package document
#[derive(Debug, Clone)]
pub struct Package {
    pub manifest: HashMap<String, ManifestItem>,
    pub spine: Spine,
    /// `toc` attribute of `<spine>` (EPUB 2 NCX id)
    pub toc_id: Option<String>,
}

impl Package {
    /// Parse an OPF file; hrefs are resolved against `opf_dir`
    pub fn parse(content: &str, opf_dir: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(content)?;
        let root = doc.root_element();
        if root.tag_name().name() != "package" {
            return Err(Error::InvalidPackage(format!(
                "Expected <package>, found <{}>",
                root.tag_name().name()
            )));
        }

        let manifest = parse_manifest(&doc, opf_dir);

        // Position of <spine> among the element children of <package>
        let spine_node = root
            .children()
            .filter(|n| n.is_element())
            .enumerate()
            .find(|(_, n)| n.tag_name().name() == "spine")
            .ok_or_else(|| Error::InvalidPackage("Missing <spine>".to_string()))?;
        let (spine_node_index, spine_el) = spine_node;

        let mut items = Vec::new();
        for (index, itemref) in spine_el
            .children()
            .filter(|n| n.tag_name().name() == "itemref")
            .enumerate()
        {
            let Some(idref) = itemref.attribute("idref") else {
                warn!("Spine itemref {} has no idref; skipping", index);
                continue;
            };
            let Some(item) = manifest.get(idref) else {
                warn!("Spine idref '{}' not found in manifest; skipping", idref);
                continue;
            };

            let linear = itemref.attribute("linear").map(|s| s != "no").unwrap_or(true);

            items.push(SpineItem {
                index,
                idref: idref.to_string(),
                href: item.href.clone(),
                linear,
                properties: itemref.attribute("properties").map(str::to_string),
                cfi_base: generate_chapter_component(spine_node_index, index, Some(idref))
                    .to_string(),
            });
        }

        debug!(
            "Parsed package: {} manifest items, {} spine items",
            manifest.len(),
            items.len()
        );

        Ok(Package {
            manifest,
            spine: Spine::new(items, spine_node_index),
            toc_id: spine_el.attribute("toc").map(str::to_string),
        })
    }

    /// EPUB 3 navigation document
    pub fn nav_href(&self) -> Option<&str> {
        self.manifest
            .values()
            .find(|item| {
                item.properties
                    .as_deref()
                    .is_some_and(|props| props.split_whitespace().any(|p| p == "nav"))
            })
            .map(|item| item.href.as_str())
    }

    /// EPUB 2 NCX document
    pub fn ncx_href(&self) -> Option<&str> {
        let by_toc = self
            .toc_id
            .as_deref()
            .and_then(|id| self.manifest.get(id));

        by_toc
            .or_else(|| {
                self.manifest
                    .values()
                    .find(|item| item.media_type == "application/x-dtbncx+xml")
            })
            .map(|item| item.href.as_str())
    }
}

fn parse_manifest(doc: &roxmltree::Document, opf_dir: &str) -> HashMap<String, ManifestItem> {
    let mut manifest = HashMap::new();

    for node in doc.descendants() {
        if node.tag_name().name() == "item" {
            if let (Some(id), Some(href), Some(media_type)) = (
                node.attribute("id"),
                node.attribute("href"),
                node.attribute("media-type"),
            ) {
                manifest.insert(
                    id.to_string(),
                    ManifestItem {
                        id: id.to_string(),
                        href: resolve_href(opf_dir, href),
                        media_type: media_type.to_string(),
                        properties: node.attribute("properties").map(str::to_string),
                    },
                );
            }
        }
    }

    manifest
}

/// Ordered reading order of the publication
#[derive(Debug, Clone, Default)]
pub struct Spine {
    items: Vec<SpineItem>,
    spine_node_index: usize,
}

impl Spine {
    pub fn new(items: Vec<SpineItem>, spine_node_index: usize) -> Self {
        Self {
            items,
            spine_node_index,
        }
    }

    /// Build a spine from bare hrefs (ids `item1`, `item2`, ...), with
    /// `<spine>` as the third package child
    pub fn from_hrefs<I, S>(hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = hrefs
            .into_iter()
            .enumerate()
            .map(|(index, href)| {
                let idref = format!("item{}", index + 1);
                SpineItem {
                    index,
                    cfi_base: generate_chapter_component(2, index, Some(&idref)).to_string(),
                    idref,
                    href: href.into(),
                    linear: true,
                    properties: None,
                }
            })
            .collect();
        Self::new(items, 2)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn spine_node_index(&self) -> usize {
        self.spine_node_index
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpineItem> {
        self.items.iter()
    }

    /// Items in reading order, skipping `linear="no"`
    pub fn linear(&self) -> impl Iterator<Item = &SpineItem> {
        self.items.iter().filter(|item| item.linear)
    }

    /// Item at a spine position (the `<itemref>` index)
    pub fn get(&self, index: usize) -> Option<&SpineItem> {
        self.items.iter().find(|item| item.index == index)
    }

    /// Item by href, ignoring any fragment
    pub fn by_href(&self, href: &str) -> Option<&SpineItem> {
        let path = href.split('#').next().unwrap_or(href);
        self.items.iter().find(|item| item.href == path)
    }

    /// The item following `index` in linear reading order
    pub fn next_linear(&self, index: usize) -> Option<&SpineItem> {
        self.linear().find(|item| item.index > index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
        <dc:title>Test Book</dc:title>
    </metadata>
    <manifest>
        <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
        <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
        <item id="chap01ref" href="text/chapter%201.xhtml" media-type="application/xhtml+xml"/>
    </manifest>
    <spine toc="ncx">
        <itemref idref="cover" linear="no"/>
        <itemref idref="chap01ref"/>
        <itemref idref="missing"/>
    </spine>
</package>"#;

    #[test]
    fn test_find_opf_path() {
        assert_eq!(find_opf_path(CONTAINER).unwrap(), "OEBPS/content.opf");
        assert!(matches!(
            find_opf_path("<container/>"),
            Err(Error::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(opf_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(opf_dir("content.opf"), "");
        assert_eq!(resolve_href("OEBPS", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/text", "../images/a.png"), "OEBPS/images/a.png");
        assert_eq!(resolve_href("", "./ch1.xhtml"), "ch1.xhtml");
    }

    #[test]
    fn test_parse_package_spine() {
        let package = Package::parse(OPF, "OEBPS").unwrap();
        let spine = &package.spine;

        assert_eq!(spine.len(), 2);
        assert_eq!(spine.spine_node_index(), 2);

        let cover = spine.get(0).unwrap();
        assert!(!cover.linear);
        assert_eq!(cover.cfi_base, "/6/2[cover]");

        let chapter = spine.get(1).unwrap();
        assert_eq!(chapter.href, "OEBPS/text/chapter%201.xhtml");
        assert_eq!(chapter.cfi_base, "/6/4[chap01ref]");
        assert_eq!(spine.linear().count(), 1);
        assert_eq!(spine.next_linear(0).map(|item| item.index), Some(1));
        assert_eq!(
            spine.by_href("OEBPS/text/chapter%201.xhtml#p3").map(|i| i.index),
            Some(1)
        );
    }

    #[test]
    fn test_navigation_documents() {
        let package = Package::parse(OPF, "OEBPS").unwrap();
        assert_eq!(package.nav_href(), Some("OEBPS/nav.xhtml"));
        assert_eq!(package.ncx_href(), Some("OEBPS/toc.ncx"));
    }

    #[test]
    fn test_rejects_non_package() {
        assert!(matches!(
            Package::parse("<html/>", ""),
            Err(Error::InvalidPackage(_))
        ));
        assert!(matches!(Package::parse("<package", ""), Err(Error::Xml(_))));
    }

    #[test]
    fn test_spine_from_hrefs() {
        let spine = Spine::from_hrefs(["a.xhtml", "b.xhtml"]);
        assert_eq!(spine.get(1).unwrap().cfi_base, "/6/4[item2]");
    }
}

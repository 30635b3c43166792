//! Book façade
//!
//! Ties a spine and a document loader to the CFI engine: find the section a
//! CFI points into, load it, resolve the CFI and extract the covered text.

use serde::Serialize;
use tracing::debug;

use super::loader::DocumentLoader;
use super::opf::Spine;
use super::types::SpineItem;
use crate::cfi::{Cfi, CfiEngine};
use crate::error::{Error, Result};
use crate::tree::{parse_xhtml, text_between};

/// Text covered by a CFI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeText {
    pub spine_index: usize,
    pub href: String,
    pub text: String,
    /// The CFI was a point rather than a range
    pub collapsed: bool,
}

pub struct Book<L> {
    spine: Spine,
    loader: L,
    engine: CfiEngine,
}

impl<L: DocumentLoader> Book<L> {
    pub fn new(spine: Spine, loader: L, engine: CfiEngine) -> Self {
        Self {
            spine,
            loader,
            engine,
        }
    }

    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn engine(&self) -> &CfiEngine {
        &self.engine
    }

    /// Spine item a CFI points into
    pub fn section_for(&self, cfi: &Cfi) -> Result<&SpineItem> {
        cfi.spine_index()
            .and_then(|index| self.spine.get(index))
            .ok_or_else(|| Error::SpineItemNotFound(cfi.to_string()))
    }

    /// Load the XHTML source of a spine item
    pub async fn load_section(&self, item: &SpineItem) -> Result<String> {
        self.loader
            .load(&item.href)
            .await
            .map_err(|e| Error::loader(&item.href, e))
    }

    /// Text covered by a CFI
    ///
    /// A range yields the text between its endpoints, an element CFI the
    /// element's text and a point CFI an empty string.
    pub async fn get_range(&self, cfi: &str) -> Result<RangeText> {
        let cfi = self.engine.parse(cfi)?;
        self.get_range_of(&cfi).await
    }

    pub async fn get_range_of(&self, cfi: &Cfi) -> Result<RangeText> {
        let item = self.section_for(cfi)?;
        let source = self.load_section(item).await?;
        let doc = parse_xhtml(&source)?;

        let resolved = self.engine.resolve(cfi, &doc)?;
        let text = text_between(&doc, &resolved.start(), &resolved.end());
        debug!("{} covers {} bytes of {}", cfi, text.len(), item.href);

        Ok(RangeText {
            spine_index: item.index,
            href: item.href.clone(),
            text,
            collapsed: !cfi.is_range(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::ResolveError;
    use crate::epub::loader::MemoryLoader;

    const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>One</title></head>
<body id="body01">
<p id="para01">It was a bright cold day in April.</p>
</body>
</html>"#;

    fn book() -> Book<MemoryLoader> {
        let loader = MemoryLoader::new()
            .with("cover.xhtml", "<html><body/></html>")
            .with("ch1.xhtml", CHAPTER);
        Book::new(
            Spine::from_hrefs(["cover.xhtml", "ch1.xhtml"]),
            loader,
            CfiEngine::default(),
        )
    }

    #[tokio::test]
    async fn test_get_range_text() {
        let book = book();
        let range = book
            .get_range("epubcfi(/6/4[item2]!/4[body01]/2[para01],/1:9,/1:20)")
            .await
            .unwrap();

        assert_eq!(range.spine_index, 1);
        assert_eq!(range.href, "ch1.xhtml");
        assert_eq!(range.text, "bright cold");
        assert!(!range.collapsed);
    }

    #[tokio::test]
    async fn test_get_range_element() {
        let book = book();
        let range = book.get_range("epubcfi(/6/4!/4/2)").await.unwrap();
        assert_eq!(range.text, "It was a bright cold day in April.");
        assert!(range.collapsed);
    }

    #[tokio::test]
    async fn test_get_range_errors() {
        let book = book();

        assert!(matches!(
            book.get_range("epubcfi(/6/40!/4/2)").await,
            Err(Error::SpineItemNotFound(_))
        ));
        assert!(matches!(
            book.get_range("epubcfi(/6/4!/4/12)").await,
            Err(Error::Resolve(ResolveError::NodeNotFound { .. }))
        ));
        assert!(matches!(
            book.get_range("epubcfi(/6/4!/4").await,
            Err(Error::MalformedCfi(_))
        ));
    }

    #[tokio::test]
    async fn test_loader_failure() {
        let book = Book::new(
            Spine::from_hrefs(["gone.xhtml"]),
            MemoryLoader::new(),
            CfiEngine::default(),
        );

        let err = book.get_range("epubcfi(/6/2!/4)").await.unwrap_err();
        assert!(matches!(err, Error::LoaderFailure { ref href, .. } if href == "gone.xhtml"));
    }
}

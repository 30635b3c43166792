//! Page list index
//!
//! Maps publisher page numbers to CFIs. Lookups by CFI use the same
//! comparator as the locations index; lookups by page are exact matches
//! since page numbers are not assumed to be sorted.

mod parser;

pub use parser::{parse_nav_page_list, parse_ncx_page_list, PageListItem};

use tracing::{debug, warn};

use crate::cfi::{compare, index_of_sorted, location_of, Cfi, CfiEngine, CfiInput, CfiParseError};
use crate::epub::{DocumentLoader, Package};
use crate::error::{Error, Result};

/// A page with a usable CFI
#[derive(Debug, Clone)]
struct Located {
    page: u32,
    raw: String,
    cfi: Cfi,
}

#[derive(Debug, Clone, Default)]
pub struct PageList {
    pages: Vec<u32>,
    located: Vec<Located>,
    first_page: u32,
    last_page: u32,
    total_pages: u32,
    engine: CfiEngine,
}

impl PageList {
    pub fn new(items: &[PageListItem]) -> Self {
        Self::with_engine(items, CfiEngine::default())
    }

    pub fn with_engine(items: &[PageListItem], engine: CfiEngine) -> Self {
        let mut list = Self {
            engine,
            ..Self::default()
        };
        list.process(items);
        list
    }

    /// Replace the index with `items`
    pub fn process(&mut self, items: &[PageListItem]) {
        self.pages = items.iter().map(|item| item.page).collect();
        self.located = items
            .iter()
            .filter_map(|item| {
                let raw = item.cfi.as_ref()?;
                match self.engine.parse(raw) {
                    Ok(cfi) => Some(Located {
                        page: item.page,
                        raw: raw.clone(),
                        cfi,
                    }),
                    Err(e) => {
                        warn!("Skipping page {} CFI '{}': {}", item.page, raw, e);
                        None
                    }
                }
            })
            .collect();
        // Page order need not follow reading order
        self.located.sort_by(|a, b| compare(&a.cfi, &b.cfi));

        self.first_page = self.pages.first().copied().unwrap_or(0);
        self.last_page = self.pages.last().copied().unwrap_or(0);
        self.total_pages = self.last_page.saturating_sub(self.first_page);
        debug!(
            "Page list: {} pages, {} with CFIs",
            self.pages.len(),
            self.located.len()
        );
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn first_page(&self) -> u32 {
        self.first_page
    }

    pub fn last_page(&self) -> u32 {
        self.last_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Page containing a CFI
    ///
    /// An exact match gives its page, otherwise the page of the entry before
    /// the insertion point (the first page when before all entries).
    pub fn page_from_cfi<'a>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<Option<u32>, CfiParseError> {
        if self.located.is_empty() {
            return Ok(None);
        }
        let cfi = self.engine.cfi(cfi)?;
        let cmp = |entry: &Located, cfi: &Cfi| compare(&entry.cfi, cfi);

        if let Some(index) = index_of_sorted(&*cfi, &self.located, cmp) {
            return Ok(Some(self.located[index].page));
        }

        let index = location_of(&*cfi, &self.located, cmp);
        let entry = match index.checked_sub(1) {
            Some(before) => &self.located[before],
            None => &self.located[0],
        };
        Ok(Some(entry.page))
    }

    /// CFI of a page (linear scan)
    pub fn cfi_from_page(&self, page: u32) -> Option<&str> {
        self.located
            .iter()
            .find(|entry| entry.page == page)
            .map(|entry| entry.raw.as_str())
    }

    pub fn page_from_percentage(&self, percentage: f64) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let offset = (self.total_pages as f64 * percentage.clamp(0.0, 1.0)).round() as u32;
        Some(self.first_page + offset)
    }

    /// Position of a page in the book, rounded to 3 decimals
    pub fn percentage_from_page(&self, page: u32) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        let percentage = (page as f64 - self.first_page as f64) / self.total_pages as f64;
        (percentage * 1000.0).round() / 1000.0
    }

    pub fn percentage_from_cfi<'a>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<Option<f64>, CfiParseError> {
        Ok(self
            .page_from_cfi(cfi)?
            .map(|page| self.percentage_from_page(page)))
    }
}

/// Read the page-list of a package: the nav document first, then the NCX
pub async fn read_page_list<L: DocumentLoader + ?Sized>(
    package: &Package,
    loader: &L,
) -> Result<Vec<PageListItem>> {
    if let Some(href) = package.nav_href() {
        let nav = loader.load(href).await.map_err(|e| Error::loader(href, e))?;
        let items = parse_nav_page_list(&nav)?;
        if !items.is_empty() {
            return Ok(items);
        }
    }

    if let Some(href) = package.ncx_href() {
        let ncx = loader.load(href).await.map_err(|e| Error::loader(href, e))?;
        return parse_ncx_page_list(&ncx);
    }

    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::MemoryLoader;

    const A: &str = "epubcfi(/6/4!/4/2/1:0)";
    const B: &str = "epubcfi(/6/4!/4/10/1:0)";

    fn item(page: u32, cfi: Option<&str>) -> PageListItem {
        PageListItem {
            href: format!("ch1.xhtml#p{}", page),
            cfi: cfi.map(str::to_string),
            page,
        }
    }

    #[test]
    fn test_page_lookup_scenario() {
        let list = PageList::new(&[item(1, Some(A)), item(2, Some(B))]);

        assert_eq!(list.page_from_cfi(A).unwrap(), Some(1));
        assert_eq!(list.page_from_cfi(B).unwrap(), Some(2));
        assert_eq!(list.page_from_cfi("epubcfi(/6/4!/4/6/1:3)").unwrap(), Some(1));

        // Before the first entry and after the last
        assert_eq!(list.page_from_cfi("epubcfi(/6/2!/4)").unwrap(), Some(1));
        assert_eq!(list.page_from_cfi("epubcfi(/6/8!/4)").unwrap(), Some(2));
    }

    #[test]
    fn test_page_from_cfi_unsorted_entries() {
        let c = "epubcfi(/6/4!/4/20/1:0)";
        let list = PageList::new(&[item(3, Some(c)), item(1, Some(A)), item(2, Some(B))]);

        assert_eq!(list.page_from_cfi("epubcfi(/6/4!/4/30/1:3)").unwrap(), Some(3));
        assert_eq!(list.page_from_cfi("epubcfi(/6/4!/4/12/1:0)").unwrap(), Some(2));
        assert_eq!(list.page_from_cfi(c).unwrap(), Some(3));
        assert_eq!(list.page_from_cfi(A).unwrap(), Some(1));
        // Input order is kept for the page bounds
        assert_eq!(list.first_page(), 3);
        assert_eq!(list.pages(), &[3, 1, 2]);
    }

    #[test]
    fn test_empty_page_list() {
        let list = PageList::new(&[]);
        assert_eq!(list.page_from_cfi(A).unwrap(), None);
        assert_eq!(list.cfi_from_page(1), None);
        assert_eq!(list.page_from_percentage(0.5), None);
        assert_eq!(list.percentage_from_page(1), 0.0);
        assert_eq!(list.percentage_from_cfi(A).unwrap(), None);
    }

    #[test]
    fn test_cfi_from_page_unsorted() {
        let list = PageList::new(&[item(3, Some(B)), item(1, Some(A)), item(2, None)]);
        assert_eq!(list.cfi_from_page(1), Some(A));
        assert_eq!(list.cfi_from_page(3), Some(B));
        assert_eq!(list.cfi_from_page(2), None);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_percentages() {
        let items: Vec<_> = (1..=4).map(|page| item(page, None)).collect();
        let list = PageList::new(&items);

        assert_eq!(list.total_pages(), 3);
        assert_eq!(list.percentage_from_page(2), 0.333);
        assert_eq!(list.percentage_from_page(4), 1.0);
        assert_eq!(list.page_from_percentage(0.0), Some(1));
        assert_eq!(list.page_from_percentage(0.5), Some(3));
        assert_eq!(list.page_from_percentage(1.0), Some(4));
    }

    #[test]
    fn test_bad_cfi_is_skipped() {
        let list = PageList::new(&[item(1, Some("epubcfi(/6/4!")), item(2, Some(B))]);
        assert_eq!(list.cfi_from_page(1), None);
        assert_eq!(list.page_from_cfi(A).unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_read_page_list_falls_back_to_ncx() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata/>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="ch1"/></spine>
</package>"#;
        let ncx = r#"<ncx><pageList>
  <pageTarget value="7"><content src="ch1.xhtml#epubcfi(/6/2!/4/2)"/></pageTarget>
</pageList></ncx>"#;

        let package = Package::parse(opf, "").unwrap();
        let loader = MemoryLoader::new().with("toc.ncx", ncx);

        let items = read_page_list(&package, &loader).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].page, 7);
        assert_eq!(items[0].cfi.as_deref(), Some("epubcfi(/6/2!/4/2)"));
    }
}

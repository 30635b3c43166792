//! Locations index
//!
//! Splits the spine into evenly sized locations, each recorded as a CFI, and
//! maps between CFIs, location numbers and reading percentages.
//!
//! Documents are fetched through the [`DocumentLoader`] one at a time in
//! spine order and released once measured. Lookups binary-search the list
//! with the CFI comparator.

mod chunker;
mod queue;

pub use chunker::{count_words, WordLocation};
pub use queue::{StopHandle, TaskQueue};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cfi::{
    compare, location_of, parse_path, Cfi, CfiEngine, CfiInput, CfiParseError, GenerateOptions,
    Resolved,
};
use crate::config::LocationsConfig;
use crate::epub::{DocumentLoader, Spine, SpineItem};
use crate::error::{Error, Result};
use crate::tree::parse_xhtml;
use chunker::{char_ranges, word_locations, WordCounter};

/// Persisted or in-memory location list handed to [`Locations::load`]
#[derive(Debug, Clone)]
pub enum LocationsData {
    /// JSON array of CFI strings, as produced by [`Locations::save`]
    Json(String),
    List(Vec<String>),
}

impl From<&str> for LocationsData {
    fn from(json: &str) -> Self {
        LocationsData::Json(json.to_string())
    }
}

impl From<Vec<String>> for LocationsData {
    fn from(list: Vec<String>) -> Self {
        LocationsData::List(list)
    }
}

/// Reported when the current location changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationChanged {
    pub cfi: String,
    pub location: Option<usize>,
    pub percentage: Option<f64>,
}

/// One location: the stored string and its parsed form
#[derive(Debug, Clone)]
struct Entry {
    raw: String,
    cfi: Cfi,
}

pub struct Locations {
    entries: Vec<Entry>,
    total: usize,
    current: Option<LocationChanged>,
    config: LocationsConfig,
    engine: CfiEngine,
    stop: StopHandle,
}

impl Default for Locations {
    fn default() -> Self {
        Self::new(LocationsConfig::default(), CfiEngine::default())
    }
}

impl Locations {
    pub fn new(config: LocationsConfig, engine: CfiEngine) -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
            current: None,
            config,
            engine,
            stop: StopHandle::new(),
        }
    }

    /// Handle for stopping a running generation from another task
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop a running generation
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Number of locations
    pub fn length(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the last location (0 when empty)
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn cfis(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.raw.as_str())
    }

    fn replace(&mut self, entries: Vec<Entry>) {
        self.total = entries.len().saturating_sub(1);
        self.entries = entries;
    }

    fn parse_entries(&self, raw: Vec<String>) -> Vec<Entry> {
        raw.into_iter()
            .filter_map(|raw| match self.engine.parse(&raw) {
                Ok(cfi) => Some(Entry { raw, cfi }),
                Err(e) => {
                    warn!("Skipping location '{}': {}", raw, e);
                    None
                }
            })
            .collect()
    }

    /// Queue the linear spine items, paused
    fn queue<'s>(&self, items: impl Iterator<Item = &'s SpineItem>) -> TaskQueue<&'s SpineItem> {
        self.stop.reset();
        let mut queue = TaskQueue::new(self.config.pause(), &self.stop);
        for item in items {
            queue.enqueue(item);
        }
        queue
    }

    /// Generate character locations for the whole spine
    ///
    /// `chunk_size` defaults to the configured size. A loader failure aborts
    /// the run and a stop returns [`Error::Cancelled`]; either way the
    /// current list is left untouched.
    pub async fn generate<L: DocumentLoader + ?Sized>(
        &mut self,
        spine: &Spine,
        loader: &L,
        chunk_size: Option<usize>,
    ) -> Result<Vec<String>> {
        let chunk_size = chunk_size.unwrap_or(self.config.chunk_size);
        if chunk_size == 0 {
            return Err(Error::InvalidConfig {
                key: "chunk_size".to_string(),
                value: chunk_size.to_string(),
            });
        }

        let options = GenerateOptions {
            side_bias: self.engine.config().side_bias,
        };
        let mut queue = self.queue(spine.linear());
        let mut found = Vec::new();
        queue.run();

        while let Some(item) = queue.next().await? {
            let source = queue
                .interruptible(loader.load(&item.href))
                .await?
                .map_err(|e| Error::loader(&item.href, e))?;

            let base = parse_path(&item.cfi_base)?;
            let doc = parse_xhtml(&source)?;
            let ranges = char_ranges(&doc, &base, chunk_size, options)?;
            debug!("{}: {} locations", item.href, ranges.len());
            found.extend(ranges);
        }

        info!("Generated {} locations", found.len());
        let entries = self.parse_entries(found);
        self.replace(entries);
        Ok(self.cfis().map(str::to_string).collect())
    }

    /// Generate a location every `words` words
    ///
    /// Starts at `start` when given (its spine item, then its node) and
    /// stops after `max` locations. The result also becomes the location
    /// list used for lookups.
    pub async fn generate_from_words<L: DocumentLoader + ?Sized>(
        &mut self,
        spine: &Spine,
        loader: &L,
        start: Option<&str>,
        words: usize,
        max: Option<usize>,
    ) -> Result<Vec<WordLocation>> {
        if words == 0 {
            return Err(Error::InvalidConfig {
                key: "words".to_string(),
                value: words.to_string(),
            });
        }

        let start = start.map(|cfi| self.engine.parse(cfi)).transpose()?;
        let first_index = start.as_ref().and_then(Cfi::spine_index).unwrap_or(0);

        let mut counter = WordCounter::new(words, max, self.config.word_threshold);
        let mut queue = self.queue(spine.linear().filter(|item| item.index >= first_index));
        let mut found = Vec::new();
        queue.run();

        while let Some(item) = queue.next().await? {
            if counter.is_full(found.len()) {
                break;
            }

            let source = queue
                .interruptible(loader.load(&item.href))
                .await?
                .map_err(|e| Error::loader(&item.href, e))?;

            let base = parse_path(&item.cfi_base)?;
            let doc = parse_xhtml(&source)?;

            let start_at = match start {
                Some(ref cfi) if cfi.spine_index() == Some(item.index) => {
                    match self.engine.resolve(cfi, &doc)? {
                        Resolved::Point(point) => Some(point.container),
                        Resolved::Range { start, .. } => Some(start.container),
                    }
                }
                _ => None,
            };

            let before = found.len();
            word_locations(&doc, &base, &mut counter, start_at, &mut found)?;
            debug!("{}: {} word locations", item.href, found.len() - before);
        }

        info!(
            "Generated {} word locations over {} words",
            found.len(),
            counter.total()
        );
        let entries = self.parse_entries(found.iter().map(|l| l.cfi.clone()).collect());
        self.replace(entries);
        Ok(found)
    }

    /// Location of a CFI: the entry at or before it, None when empty
    pub fn location_from_cfi<'a>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<Option<usize>, CfiParseError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let cfi = self.engine.cfi(cfi)?;

        let insert = location_of(&*cfi, &self.entries, |entry, cfi| compare(&entry.cfi, cfi));
        let exact = self
            .entries
            .get(insert)
            .is_some_and(|entry| compare(&entry.cfi, &cfi).is_eq());
        let location = if exact { insert } else { insert.saturating_sub(1) };

        Ok(Some(location.min(self.total)))
    }

    /// Fraction of the book before `location`
    pub fn percentage_from_location(&self, location: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        location as f64 / self.total as f64
    }

    pub fn percentage_from_cfi<'a>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<Option<f64>, CfiParseError> {
        Ok(self
            .location_from_cfi(cfi)?
            .map(|location| self.percentage_from_location(location)))
    }

    pub fn cfi_from_location(&self, location: usize) -> Option<&str> {
        self.entries.get(location).map(|entry| entry.raw.as_str())
    }

    /// CFI at a reading fraction
    ///
    /// `1.0` and above give the end point of the last location.
    pub fn cfi_from_percentage(&self, percentage: f64) -> Option<String> {
        let last = self.entries.last()?;
        if percentage > 1.0 {
            warn!("Normalize cfi_from_percentage value to between 0 - 1");
        }
        if percentage >= 1.0 {
            return Some(last.cfi.collapse(false).to_string());
        }

        let location = (self.total as f64 * percentage.max(0.0)).ceil() as usize;
        self.cfi_from_location(location).map(str::to_string)
    }

    /// Replace the list with saved or externally generated locations
    ///
    /// Entries that fail to parse are skipped. Returns the number kept.
    pub fn load(&mut self, data: impl Into<LocationsData>) -> Result<usize> {
        let raw = match data.into() {
            LocationsData::Json(json) => serde_json::from_str::<Vec<String>>(&json)?,
            LocationsData::List(list) => list,
        };
        let entries = self.parse_entries(raw);
        self.replace(entries);
        Ok(self.entries.len())
    }

    /// JSON array of the location CFIs
    pub fn save(&self) -> Result<String> {
        let cfis: Vec<&str> = self.cfis().collect();
        Ok(serde_json::to_string(&cfis)?)
    }

    /// Set the current position by CFI
    pub fn set_current<'a>(
        &mut self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<LocationChanged, CfiParseError> {
        let cfi = self.engine.cfi(cfi)?;
        let location = self.location_from_cfi(&*cfi)?;
        let changed = LocationChanged {
            cfi: cfi.to_string(),
            location,
            percentage: location.map(|l| self.percentage_from_location(l)),
        };
        self.current = Some(changed.clone());
        Ok(changed)
    }

    /// Set the current position by location number
    pub fn set_current_location(&mut self, location: usize) -> Option<LocationChanged> {
        let cfi = self.cfi_from_location(location)?.to_string();
        self.set_current(&cfi).ok()
    }

    pub fn current(&self) -> Option<&LocationChanged> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfi::parse;
    use crate::epub::MemoryLoader;
    use std::time::Duration;

    fn chapter(paragraphs: &[&str]) -> String {
        let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>\n", p)).collect();
        format!(
            "<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>T</title></head>\n\
             <body>\n{}</body></html>",
            body
        )
    }

    fn fixture() -> (Spine, MemoryLoader) {
        let spine = Spine::from_hrefs(["ch1.xhtml", "ch2.xhtml"]);
        let loader = MemoryLoader::new()
            .with(
                "ch1.xhtml",
                chapter(&["abcdefghijklmnopqrstuvwxyz", "ABCDEFGHIJKLMNOPQRSTUVWXYZ"]),
            )
            .with("ch2.xhtml", chapter(&["0123456789", "0123456789"]));
        (spine, loader)
    }

    fn quick() -> Locations {
        Locations::new(
            LocationsConfig {
                pause_ms: 0,
                ..LocationsConfig::default()
            },
            CfiEngine::default(),
        )
    }

    #[tokio::test]
    async fn test_generate_is_ordered() {
        let (spine, loader) = fixture();
        let mut locations = quick();

        let cfis = locations.generate(&spine, &loader, Some(10)).await.unwrap();

        // 52 characters -> 6 chunks, 20 characters -> 2 chunks
        assert_eq!(cfis.len(), 8);
        assert_eq!(locations.length(), 8);
        assert_eq!(locations.total(), 7);
        assert_eq!(cfis[0], "epubcfi(/6/2[item1]!/4/2,/1:0,/1:10)");
        assert_eq!(cfis[6], "epubcfi(/6/4[item2]!/4/2,/1:0,/1:10)");

        let parsed: Vec<Cfi> = cfis.iter().map(|c| parse(c).unwrap()).collect();
        for pair in parsed.windows(2) {
            assert!(compare(&pair[0], &pair[1]).is_lt(), "{} !< {}", pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_location_from_cfi_lookup() {
        let (spine, loader) = fixture();
        let mut locations = quick();
        let cfis = locations.generate(&spine, &loader, Some(10)).await.unwrap();

        for (i, cfi) in cfis.iter().enumerate() {
            assert_eq!(locations.location_from_cfi(cfi).unwrap(), Some(i));
        }

        // Strictly inside the second chunk of the first paragraph
        let inside = parse("epubcfi(/6/2[item1]!/4/2/1:13)").unwrap();
        assert_eq!(locations.location_from_cfi(&inside).unwrap(), Some(1));

        // Before everything and after everything
        assert_eq!(locations.location_from_cfi("epubcfi(/6/2!/2)").unwrap(), Some(0));
        assert_eq!(locations.location_from_cfi("epubcfi(/6/40!/4)").unwrap(), Some(7));

        assert!(locations.location_from_cfi("garbage").is_err());
    }

    #[tokio::test]
    async fn test_percentage_inverse() {
        let (spine, loader) = fixture();
        let mut locations = quick();
        locations.generate(&spine, &loader, Some(10)).await.unwrap();
        let step = 1.0 / locations.total() as f64;

        for p in [0.0, 0.25, 0.5, 0.99, 1.0] {
            let cfi = locations.cfi_from_percentage(p).unwrap();
            let back = locations.percentage_from_cfi(&cfi).unwrap().unwrap();
            assert!((back - p).abs() <= step, "{} -> {} -> {}", p, cfi, back);
        }

        assert_eq!(
            locations.cfi_from_percentage(1.0).unwrap(),
            "epubcfi(/6/4[item2]!/4/4/1:10)"
        );
        assert_eq!(locations.percentage_from_location(7), 1.0);
    }

    #[tokio::test]
    async fn test_empty_index_guards() {
        let locations = quick();

        assert_eq!(locations.location_from_cfi("epubcfi(/6/4!/4/2)").unwrap(), None);
        assert_eq!(locations.percentage_from_cfi("epubcfi(/6/4!/4/2)").unwrap(), None);
        assert_eq!(locations.cfi_from_location(0), None);
        assert_eq!(locations.cfi_from_percentage(0.5), None);
        assert_eq!(locations.percentage_from_location(3), 0.0);
        assert_eq!(locations.total(), 0);
        assert_eq!(locations.save().unwrap(), "[]");
    }

    #[test]
    fn test_load_save_round_trip() {
        let mut locations = quick();
        let kept = locations
            .load(vec![
                "epubcfi(/6/2!/4/2,/1:0,/1:10)".to_string(),
                "not a cfi".to_string(),
                "epubcfi(/6/2!/4/2,/1:10,/1:20)".to_string(),
            ])
            .unwrap();
        assert_eq!(kept, 2);
        assert_eq!(locations.total(), 1);

        let saved = locations.save().unwrap();
        let mut restored = quick();
        assert_eq!(restored.load(saved.as_str()).unwrap(), 2);
        assert_eq!(restored.cfi_from_location(1), Some("epubcfi(/6/2!/4/2,/1:10,/1:20)"));

        assert!(matches!(restored.load("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_set_current() {
        let mut locations = quick();
        locations
            .load(vec![
                "epubcfi(/6/2!/4/2,/1:0,/1:10)".to_string(),
                "epubcfi(/6/2!/4/2,/1:10,/1:20)".to_string(),
                "epubcfi(/6/4!/4/2,/1:0,/1:10)".to_string(),
            ])
            .unwrap();

        let changed = locations.set_current("epubcfi(/6/2!/4/2/1:15)").unwrap();
        assert_eq!(changed.location, Some(1));
        assert_eq!(changed.percentage, Some(0.5));
        assert_eq!(locations.current(), Some(&changed));

        let changed = locations.set_current_location(2).unwrap();
        assert_eq!(changed.percentage, Some(1.0));
        assert!(locations.set_current_location(9).is_none());
    }

    #[tokio::test]
    async fn test_loader_failure_aborts() {
        let spine = Spine::from_hrefs(["ch1.xhtml", "missing.xhtml"]);
        let loader = MemoryLoader::new().with("ch1.xhtml", chapter(&["text"]));
        let mut locations = quick();
        locations.load(vec!["epubcfi(/6/2!/4)".to_string()]).unwrap();

        let err = locations.generate(&spine, &loader, None).await.unwrap_err();
        assert!(matches!(err, Error::LoaderFailure { ref href, .. } if href == "missing.xhtml"));
        // Previous list untouched
        assert_eq!(locations.length(), 1);
    }

    struct PendingLoader;

    #[async_trait::async_trait]
    impl DocumentLoader for PendingLoader {
        async fn load(&self, _href: &str) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stop_cancels_generation() {
        let spine = Spine::from_hrefs(["ch1.xhtml"]);
        let mut locations = quick();
        let stop = locations.stop_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stop.stop();
        });

        let result = locations.generate(&spine, &PendingLoader, None).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(locations.is_empty());
    }

    #[tokio::test]
    async fn test_generate_from_words() {
        let spine = Spine::from_hrefs(["ch1.xhtml", "ch2.xhtml"]);
        let loader = MemoryLoader::new()
            .with("ch1.xhtml", chapter(&["one two three", "four five six"]))
            .with("ch2.xhtml", chapter(&["seven eight", "nine ten eleven twelve"]));
        let mut locations = quick();

        let words = locations
            .generate_from_words(&spine, &loader, None, 5, None)
            .await
            .unwrap();
        let cfis: Vec<&str> = words.iter().map(|w| w.cfi.as_str()).collect();
        assert_eq!(
            cfis,
            vec!["epubcfi(/6/2[item1]!/4/2/1)", "epubcfi(/6/4[item2]!/4/2/1)"]
        );
        // The count carries over from the first document
        assert_eq!(words[1].word_count, 6);
        assert_eq!(locations.length(), 2);

        let capped = locations
            .generate_from_words(&spine, &loader, Some("epubcfi(/6/4!/4/2)"), 1, Some(2))
            .await
            .unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].cfi, "epubcfi(/6/4[item2]!/4/2/1)");
        assert_eq!(capped[0].word_count, 0);
    }
}

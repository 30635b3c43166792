//! Content document loaders
//!
//! Location generation and the book façade never fetch resources themselves;
//! they ask an injected [`DocumentLoader`] for the XHTML source of an href.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tracing::trace;

/// Source of content documents, keyed by spine href
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the XHTML source of `href`
    async fn load(&self, href: &str) -> anyhow::Result<String>;
}

/// Normalize an href for lookup
///
/// - Drop any fragment or query
/// - URL-decode percent-encoded characters
/// - Remove leading "./" or "/"
fn normalize_href(href: &str) -> anyhow::Result<String> {
    let path = href.split(['#', '?']).next().unwrap_or(href);
    let decoded = urlencoding::decode(path).with_context(|| format!("invalid href '{}'", href))?;
    Ok(decoded
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string())
}

/// Reads content documents from an unpacked EPUB directory
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for an href, refusing to leave the root
    fn path_for(&self, href: &str) -> anyhow::Result<PathBuf> {
        let relative = normalize_href(href)?;
        let relative = Path::new(&relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("href '{}' escapes the book directory", href);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    async fn load(&self, href: &str) -> anyhow::Result<String> {
        let path = self.path_for(href)?;
        trace!("Loading {}", path.display());
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

/// In-memory documents, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, href: impl Into<String>, source: impl Into<String>) {
        self.documents.insert(href.into(), source.into());
    }

    pub fn with(mut self, href: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(href, source);
        self
    }
}

#[async_trait]
impl DocumentLoader for MemoryLoader {
    async fn load(&self, href: &str) -> anyhow::Result<String> {
        let key = normalize_href(href)?;
        self.documents
            .get(&key)
            .or_else(|| self.documents.get(href))
            .cloned()
            .ok_or_else(|| anyhow!("no document at '{}'", href))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("OEBPS/chapter%201.xhtml#p3").unwrap(), "OEBPS/chapter 1.xhtml");
        assert_eq!(normalize_href("./a.xhtml?x=1").unwrap(), "a.xhtml");
    }

    #[tokio::test]
    async fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("OEBPS")).unwrap();
        std::fs::write(dir.path().join("OEBPS/chapter 1.xhtml"), "<html/>").unwrap();

        let loader = DirectoryLoader::new(dir.path());
        assert_eq!(loader.load("OEBPS/chapter%201.xhtml").await.unwrap(), "<html/>");
        assert!(loader.load("OEBPS/missing.xhtml").await.is_err());
        assert!(loader.load("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new().with("ch1.xhtml", "<html/>");
        assert_eq!(loader.load("ch1.xhtml#frag").await.unwrap(), "<html/>");
        assert!(loader.load("ch2.xhtml").await.is_err());
    }
}

//! Per-document location boundaries
//!
//! Character mode cuts the `<body>` text into fixed-size chunks and records
//! one range CFI per chunk. Word mode records a node CFI each time the
//! running word count passes the configured step.

use serde::{Deserialize, Serialize};

use crate::cfi::{from_point, from_range, CfiPath, GenerateOptions, ResolveError};
use crate::tree::{body, descendants, text_nodes, utf16_len, DocumentTree, DomPoint, NodeKind};

/// A word-mode location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordLocation {
    pub cfi: String,
    /// Words preceding this location
    pub word_count: usize,
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Range CFIs covering the body text in `chunk_size` UTF-16 units each
///
/// Whitespace-only text nodes are skipped. The count runs across text nodes
/// and the last chunk is closed at the end of the last node.
pub fn char_ranges<T: DocumentTree + ?Sized>(
    tree: &T,
    base: &CfiPath,
    chunk_size: usize,
    options: GenerateOptions,
) -> Result<Vec<String>, ResolveError> {
    let mut ranges = Vec::new();
    let mut start: Option<DomPoint<T::Node>> = None;
    let mut last: Option<(T::Node, usize)> = None;
    // Units already in the open chunk
    let mut dist = 0;

    for node in text_nodes(tree, body(tree)) {
        let Some(text) = tree.text(node) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        let len = utf16_len(text);
        let mut pos = 0;
        if start.is_none() {
            start = Some(DomPoint::text(node, 0));
        }

        while len - pos >= chunk_size - dist {
            pos += chunk_size - dist;
            if let Some(from) = start.take() {
                let cfi = from_range(tree, &from, &DomPoint::text(node, pos), base, options)?;
                ranges.push(cfi.to_string());
            }
            dist = 0;
            if pos < len {
                start = Some(DomPoint::text(node, pos));
            }
        }

        dist += len - pos;
        last = Some((node, len));
    }

    if let (Some(from), Some((node, len))) = (start, last) {
        let cfi = from_range(tree, &from, &DomPoint::text(node, len), base, options)?;
        ranges.push(cfi.to_string());
    }

    Ok(ranges)
}

/// Running word count shared across the documents of one generation
#[derive(Debug, Clone)]
pub struct WordCounter {
    words_per_location: usize,
    max: Option<usize>,
    threshold: usize,
    since_last: usize,
    total: usize,
}

impl WordCounter {
    pub fn new(words_per_location: usize, max: Option<usize>, threshold: usize) -> Self {
        Self {
            words_per_location,
            max,
            threshold,
            // The first counted node opens a location
            since_last: words_per_location,
            total: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_full(&self, emitted: usize) -> bool {
        self.max.is_some_and(|max| emitted >= max)
    }
}

/// Word-mode locations for one document, appended to `out`
///
/// With `start_at`, nodes before it in document order are ignored.
pub fn word_locations<T: DocumentTree + ?Sized>(
    tree: &T,
    base: &CfiPath,
    counter: &mut WordCounter,
    start_at: Option<T::Node>,
    out: &mut Vec<WordLocation>,
) -> Result<(), ResolveError> {
    let root = body(tree);
    // A start node outside <body> does not restrict anything
    let mut skipping = start_at.is_some_and(|node| descendants(tree, root).contains(&node));

    for node in descendants(tree, root) {
        if skipping {
            if Some(node) != start_at {
                continue;
            }
            skipping = false;
        }
        if tree.kind(node) != NodeKind::Text {
            continue;
        }
        let Some(text) = tree.text(node) else {
            continue;
        };
        let blank = text.trim().is_empty();
        if blank && utf16_len(text) < counter.threshold {
            continue;
        }

        // A long whitespace run still counts as one word
        let words = if blank { 1 } else { count_words(text) };

        if counter.since_last >= counter.words_per_location {
            if counter.is_full(out.len()) {
                return Ok(());
            }
            let cfi = from_point(tree, &DomPoint::node(node), base, GenerateOptions::default())?;
            out.push(WordLocation {
                cfi: cfi.to_string(),
                word_count: counter.total,
            });
            counter.since_last = 0;
        }

        counter.since_last += words;
        counter.total += words;
    }

    Ok(())
}

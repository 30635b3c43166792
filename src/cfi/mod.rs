//! CFI (Canonical Fragment Identifier) module for EPUB
//!
//! This module provides parsing, generation, comparison and resolution of
//! EPUB CFI strings.
//!
//! # Overview
//!
//! EPUB CFI is a standardized way to reference specific locations within EPUB publications.
//! It uses a path-based syntax similar to XPath but designed specifically for EPUBs.
//!
//! # Example CFI
//!
//! ```text
//! epubcfi(/6/4[chap01ref]!/4[body01]/10[para05]/3:10[;s=a])
//!         │  │           │ │        │          │ │  └── side bias: after
//!         │  │           │ │        │          │ └───── character offset (UTF-16 units)
//!         │  │           │ │        │          └─────── text run (odd = text)
//!         │  │           │ │        └────────────────── fifth element, id asserted
//!         │  │           │ └─────────────────────────── body
//!         │  │           └───────────────────────────── indirection (into content doc)
//!         │  └───────────────────────────────────────── spine item with idref
//!         └──────────────────────────────────────────── spine element
//! ```
//!
//! # Usage
//!
//! ```
//! use los_libros_cfi::cfi::{is_before, parse, CfiBuilder};
//!
//! // Parse a CFI string
//! let cfi = parse("epubcfi(/6/4!/4/2/1:42)").unwrap();
//! assert_eq!(cfi.spine_index(), Some(1));
//!
//! // Build a CFI programmatically
//! let built = CfiBuilder::new()
//!     .package_step(2)
//!     .spine_item(1, None)
//!     .indirection()
//!     .element(1)
//!     .element(0)
//!     .text_node(0)
//!     .character_offset(42)
//!     .build();
//! assert_eq!(built, cfi);
//!
//! // Compare CFIs
//! let a = parse("epubcfi(/6/4!/4/2/1:10)").unwrap();
//! let b = parse("epubcfi(/6/4!/4/2/1:20)").unwrap();
//! assert!(is_before(&a, &b));
//! ```

mod comparator;
mod engine;
mod generator;
mod parser;
mod resolver;
mod search;
mod types;

// Re-export main types
pub use types::{
    CharacterOffset, Cfi, CfiInput, CfiPath, CfiRange, CfiStep, SideBias, SpatialOffset,
    StepType, TemporalOffset, TextAssertion,
};

// Re-export parser functions
pub use parser::{parse, parse_path, parse_with, try_parse, CfiParseError, ParseOptions};

// Re-export generator
pub use generator::{
    from_node, from_point, from_range, generate_chapter_component, CfiBuilder, GenerateOptions,
};

// Re-export comparator functions
pub use comparator::{
    compare, compare_cfi_strings, compare_paths, compare_steps, is_after, is_before, is_in_range,
};

pub use engine::CfiEngine;
pub use resolver::{resolve, ResolveError, ResolveOptions, Resolved};
pub use search::{index_of_sorted, location_of};

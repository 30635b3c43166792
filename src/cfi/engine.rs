//! CFI engine façade
//!
//! Bundles parsing, comparison, resolution and generation behind one value
//! carrying the CFI settings from [`CfiConfig`].

use std::borrow::Cow;
use std::cmp::Ordering;

use super::comparator::compare;
use super::generator::{self, GenerateOptions};
use super::parser::{parse_path, parse_with, CfiParseError, ParseOptions};
use super::resolver::{self, ResolveOptions, Resolved};
use super::types::{Cfi, CfiInput, CfiPath};
use crate::config::CfiConfig;
use crate::error::Result;
use crate::tree::{DocumentTree, DomPoint};

#[derive(Debug, Clone, Default)]
pub struct CfiEngine {
    config: CfiConfig,
}

impl CfiEngine {
    pub fn new(config: CfiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CfiConfig {
        &self.config
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict: self.config.strict,
        }
    }

    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            strict_assertions: self.config.strict_assertions,
        }
    }

    fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            side_bias: self.config.side_bias,
        }
    }

    /// Parse a CFI string
    pub fn parse(&self, input: &str) -> std::result::Result<Cfi, CfiParseError> {
        parse_with(input, self.parse_options())
    }

    /// Accept either a string or an already parsed CFI
    pub fn cfi<'a>(
        &self,
        input: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<Cow<'a, Cfi>, CfiParseError> {
        match input.into() {
            CfiInput::Str(s) => self.parse(s).map(Cow::Owned),
            CfiInput::Parsed(cfi) => Ok(Cow::Borrowed(cfi)),
        }
    }

    /// Compare two CFIs in reading order
    pub fn compare<'a, 'b>(
        &self,
        a: impl Into<CfiInput<'a>>,
        b: impl Into<CfiInput<'b>>,
    ) -> std::result::Result<Ordering, CfiParseError> {
        let a = self.cfi(a)?;
        let b = self.cfi(b)?;
        Ok(compare(&a, &b))
    }

    /// Resolve a CFI to a point or range in `tree`
    pub fn resolve<'a, T: DocumentTree + ?Sized>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
        tree: &T,
    ) -> Result<Resolved<T::Node>> {
        let cfi = self.cfi(cfi)?;
        Ok(resolver::resolve(&cfi, tree, self.resolve_options())?)
    }

    /// Generate a CFI for a point; `base` is the spine path (e.g. `/6/4[chap01ref]`)
    pub fn from_point<T: DocumentTree + ?Sized>(
        &self,
        tree: &T,
        point: &DomPoint<T::Node>,
        base: &str,
    ) -> Result<Cfi> {
        let base = parse_base(base)?;
        Ok(generator::from_point(tree, point, &base, self.generate_options())?)
    }

    /// Generate a CFI for a node
    pub fn from_node<T: DocumentTree + ?Sized>(
        &self,
        tree: &T,
        node: T::Node,
        base: &str,
    ) -> Result<Cfi> {
        self.from_point(tree, &DomPoint::node(node), base)
    }

    /// Generate a range CFI
    pub fn from_range<T: DocumentTree + ?Sized>(
        &self,
        tree: &T,
        start: &DomPoint<T::Node>,
        end: &DomPoint<T::Node>,
        base: &str,
    ) -> Result<Cfi> {
        let base = parse_base(base)?;
        Ok(generator::from_range(
            tree,
            start,
            end,
            &base,
            self.generate_options(),
        )?)
    }

    /// Canonical string form
    pub fn to_string<'a>(
        &self,
        cfi: impl Into<CfiInput<'a>>,
    ) -> std::result::Result<String, CfiParseError> {
        Ok(self.cfi(cfi)?.to_string())
    }
}

/// Spine paths are accepted bare or wrapped, empty for standalone documents
fn parse_base(base: &str) -> std::result::Result<CfiPath, CfiParseError> {
    if base.trim().is_empty() {
        return Ok(CfiPath::new());
    }
    parse_path(base)
}

//! CFI data model
//!
//! `epubcfi(/6/4[chap01ref]!/4/2/22/3:268)`: package steps, `!`, then steps
//! through the content document down to a character offset.
//!
//! Every `/N` step carries a *virtual index*: even values address element
//! children (`/2` is the first element), odd values address the run of text
//! between two elements (`/1` is the text before the first element).
//!
//! Reference: <https://idpf.org/epub/linking/cfi/epub-cfi.html>

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use super::parser::{parse, CfiParseError};

/// Characters that must be escaped with `^` inside assertions
const SPECIAL_CHARS: &[char] = &['^', '[', ']', '(', ')', ',', ';', '='];

/// A complete EPUB CFI
///
/// The path is kept flat: the package (spine) steps, an indirection step
/// (`!`), then the steps inside the content document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cfi {
    /// Shared path; the whole CFI for a point
    pub path: CfiPath,
    /// Optional range tails (for selections)
    pub range: Option<CfiRange>,
}

/// Steps plus at most one terminal of each kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiPath {
    pub steps: Vec<CfiStep>,
    /// `:N`
    pub character_offset: Option<CharacterOffset>,
    /// `~s`
    pub temporal_offset: Option<TemporalOffset>,
    /// `@x:y`
    pub spatial_offset: Option<SpatialOffset>,
}

/// `,start,end` tails of a range CFI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiRange {
    /// Relative to `Cfi::path`
    pub start: CfiPath,
    pub end: CfiPath,
}

/// One `/N[id;params]` hop, or a `!`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfiStep {
    pub step_type: StepType,
    /// `[id]` the target element is expected to carry
    pub id_assertion: Option<String>,
    /// Assertion parameters in source order (`;s=a` and friends)
    pub parameters: Vec<(String, String)>,
}

/// Step kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Child step with its virtual index (even = element, odd = text gap)
    Child(u32),
    /// `!`: continue in the referenced document
    Indirection,
}

/// Which side of a node boundary a position belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideBias {
    /// `;s=b`
    Before,
    /// `;s=a`
    After,
}

/// `[prefix,suffix]` text around a terminal offset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAssertion {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    /// `;key=value` pairs after the text
    pub parameters: Vec<(String, String)>,
}

/// `:N` terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterOffset {
    /// The offset in UTF-16 code units (0-based)
    pub offset: u32,
    /// Checked against the text around the offset, never enforced
    pub assertion: Option<TextAssertion>,
}

/// `~seconds` terminal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalOffset {
    pub seconds: f64,
}

impl Eq for TemporalOffset {}

/// `@x:y` terminal, in percent of the image box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialOffset {
    pub x: f64,
    pub y: f64,
}

impl Eq for SpatialOffset {}

impl SideBias {
    /// Parameter value used on the wire
    pub fn as_param(self) -> &'static str {
        match self {
            SideBias::Before => "b",
            SideBias::After => "a",
        }
    }

    pub(crate) fn from_param(value: &str) -> Option<Self> {
        match value {
            "b" => Some(SideBias::Before),
            "a" => Some(SideBias::After),
            _ => None,
        }
    }

    /// Ordering rank: before < no bias < after
    pub(crate) fn rank(bias: Option<SideBias>) -> i8 {
        match bias {
            Some(SideBias::Before) => -1,
            None => 0,
            Some(SideBias::After) => 1,
        }
    }
}

fn side_bias_param(parameters: &[(String, String)]) -> Option<SideBias> {
    parameters
        .iter()
        .rev()
        .find(|(key, _)| key == "s")
        .and_then(|(_, value)| SideBias::from_param(value))
}

impl Cfi {
    /// Point CFI
    pub fn new(path: CfiPath) -> Self {
        Self { path, range: None }
    }

    pub fn with_range(path: CfiPath, range: CfiRange) -> Self {
        Self {
            path,
            range: Some(range),
        }
    }

    /// Check if a string looks like a CFI (has the `epubcfi(` wrapper)
    pub fn is_cfi_string(s: &str) -> bool {
        let s = s.trim();
        s.starts_with("epubcfi(") && s.ends_with(')')
    }

    pub fn is_range(&self) -> bool {
        self.range.is_some()
    }

    /// Spine position addressed by the package steps
    ///
    /// The second package step is `/N` with N = 2 * (spine_index + 1).
    pub fn spine_index(&self) -> Option<usize> {
        let base = self.base_steps();
        if base.len() >= 2 {
            if let StepType::Child(n) = base[1].step_type {
                if n >= 2 && n % 2 == 0 {
                    return Some((n / 2 - 1) as usize);
                }
            }
        }
        None
    }

    /// Whether the path crosses from the package document into a content document
    pub fn has_indirection(&self) -> bool {
        self.path.steps.iter().any(CfiStep::is_indirection)
    }

    /// Steps addressing the spine item in the package document
    pub fn base_steps(&self) -> &[CfiStep] {
        match self.indirection_position() {
            Some(pos) => &self.path.steps[..pos],
            None => &self.path.steps,
        }
    }

    /// Steps inside the content document
    ///
    /// Without an indirection the whole path is treated as a content path.
    pub fn content_steps(&self) -> &[CfiStep] {
        match self.indirection_position() {
            Some(pos) => &self.path.steps[pos + 1..],
            None => &self.path.steps,
        }
    }

    /// The spine path as a standalone CfiPath (e.g. `/6/4[chap01ref]`)
    pub fn base(&self) -> CfiPath {
        CfiPath::with_steps(self.base_steps().to_vec())
    }

    fn indirection_position(&self) -> Option<usize> {
        self.path.steps.iter().position(CfiStep::is_indirection)
    }

    /// Full path to the start of this CFI (the path itself for points)
    pub fn start_path(&self) -> Cow<'_, CfiPath> {
        match self.range {
            Some(ref range) => Cow::Owned(self.path.join(&range.start)),
            None => Cow::Borrowed(&self.path),
        }
    }

    /// Full path to the end of this CFI (the path itself for points)
    pub fn end_path(&self) -> Cow<'_, CfiPath> {
        match self.range {
            Some(ref range) => Cow::Owned(self.path.join(&range.end)),
            None => Cow::Borrowed(&self.path),
        }
    }

    /// Collapse a range to one of its endpoints
    pub fn collapse(&self, to_start: bool) -> Cfi {
        let path = if to_start {
            self.start_path()
        } else {
            self.end_path()
        };
        Cfi::new(path.into_owned())
    }
}

impl CfiPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<CfiStep>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn push(&mut self, step: CfiStep) {
        self.steps.push(step);
    }

    /// Check if the path has neither steps nor terminal data
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self.character_offset.is_none()
            && self.temporal_offset.is_none()
            && self.spatial_offset.is_none()
    }

    pub fn set_character_offset(&mut self, offset: u32) {
        self.character_offset = Some(CharacterOffset {
            offset,
            assertion: None,
        });
    }

    /// Append a relative tail: its steps and its terminal data
    pub fn join(&self, tail: &CfiPath) -> CfiPath {
        let mut steps = self.steps.clone();
        steps.extend(tail.steps.iter().cloned());
        CfiPath {
            steps,
            character_offset: tail.character_offset.clone(),
            temporal_offset: tail.temporal_offset.clone(),
            spatial_offset: tail.spatial_offset.clone(),
        }
    }

    /// Side bias of the terminal offset, if any
    pub fn terminal_side_bias(&self) -> Option<SideBias> {
        self.character_offset
            .as_ref()
            .and_then(|offset| offset.assertion.as_ref())
            .and_then(TextAssertion::side_bias)
    }
}

impl CfiStep {
    /// Create a child step from a raw virtual index
    pub fn child(index: u32) -> Self {
        Self {
            step_type: StepType::Child(index),
            id_assertion: None,
            parameters: Vec::new(),
        }
    }

    /// Create a step addressing the `position`-th element child (0-based)
    pub fn element(position: usize) -> Self {
        Self::child(((position + 1) * 2) as u32)
    }

    /// Create an element step with ID assertion
    pub fn element_with_id(position: usize, id: impl Into<String>) -> Self {
        Self {
            id_assertion: Some(id.into()),
            ..Self::element(position)
        }
    }

    /// Create a step addressing the text gap after `elements_before` elements
    pub fn text_gap(elements_before: usize) -> Self {
        Self::child((elements_before * 2 + 1) as u32)
    }

    /// Create an indirection step
    pub fn indirection() -> Self {
        Self {
            step_type: StepType::Indirection,
            id_assertion: None,
            parameters: Vec::new(),
        }
    }

    /// Check if this is an indirection step
    pub fn is_indirection(&self) -> bool {
        matches!(self.step_type, StepType::Indirection)
    }

    /// Get the virtual index if this is a child step
    pub fn index(&self) -> Option<u32> {
        match self.step_type {
            StepType::Child(n) => Some(n),
            StepType::Indirection => None,
        }
    }

    /// Odd indices address text between elements
    pub fn is_text_gap(&self) -> bool {
        matches!(self.step_type, StepType::Child(n) if n % 2 == 1)
    }

    /// Side bias carried in the step assertion
    pub fn side_bias(&self) -> Option<SideBias> {
        side_bias_param(&self.parameters)
    }

    /// Attach a side bias to this step
    pub fn with_side_bias(mut self, bias: SideBias) -> Self {
        self.parameters.retain(|(key, _)| key != "s");
        self.parameters
            .push(("s".to_string(), bias.as_param().to_string()));
        self
    }
}

impl TextAssertion {
    /// An assertion carrying only a side bias (`[;s=a]`)
    pub fn side_bias_only(bias: SideBias) -> Self {
        Self {
            prefix: None,
            suffix: None,
            parameters: vec![("s".to_string(), bias.as_param().to_string())],
        }
    }

    /// Side bias parameter, if present
    pub fn side_bias(&self) -> Option<SideBias> {
        side_bias_param(&self.parameters)
    }
}

impl std::str::FromStr for Cfi {
    type Err = CfiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// A CFI handed to the engine either as a string or already parsed
#[derive(Debug, Clone, Copy)]
pub enum CfiInput<'a> {
    Str(&'a str),
    Parsed(&'a Cfi),
}

impl<'a> From<&'a str> for CfiInput<'a> {
    fn from(s: &'a str) -> Self {
        CfiInput::Str(s)
    }
}

impl<'a> From<&'a String> for CfiInput<'a> {
    fn from(s: &'a String) -> Self {
        CfiInput::Str(s.as_str())
    }
}

impl<'a> From<&'a Cfi> for CfiInput<'a> {
    fn from(cfi: &'a Cfi) -> Self {
        CfiInput::Parsed(cfi)
    }
}

// Display implementations for serialization

/// Escape assertion text with `^`
fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for ch in text.chars() {
        if SPECIAL_CHARS.contains(&ch) {
            write!(f, "^")?;
        }
        write!(f, "{}", ch)?;
    }
    Ok(())
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &[(String, String)]) -> fmt::Result {
    for (key, value) in parameters {
        write!(f, ";")?;
        write_escaped(f, key)?;
        write!(f, "=")?;
        write_escaped(f, value)?;
    }
    Ok(())
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epubcfi({}", self.path)?;
        if let Some(ref range) = self.range {
            write!(f, ",{},{}", range.start, range.end)?;
        }
        write!(f, ")")?;
        Ok(())
    }
}

impl fmt::Display for CfiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(ref offset) = self.character_offset {
            write!(f, ":{}", offset.offset)?;
            if let Some(ref assertion) = offset.assertion {
                write!(f, "{}", assertion)?;
            }
        }
        if let Some(ref temporal) = self.temporal_offset {
            write!(f, "~{}", temporal.seconds)?;
        }
        if let Some(ref spatial) = self.spatial_offset {
            write!(f, "@{}:{}", spatial.x, spatial.y)?;
        }
        Ok(())
    }
}

impl fmt::Display for CfiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_type {
            StepType::Child(n) => write!(f, "/{}", n)?,
            StepType::Indirection => write!(f, "!")?,
        }
        if self.id_assertion.is_some() || !self.parameters.is_empty() {
            write!(f, "[")?;
            if let Some(ref id) = self.id_assertion {
                write_escaped(f, id)?;
            }
            write_parameters(f, &self.parameters)?;
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Display for TextAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if let Some(ref prefix) = self.prefix {
            write_escaped(f, prefix)?;
        }
        if let Some(ref suffix) = self.suffix {
            write!(f, ",")?;
            write_escaped(f, suffix)?;
        }
        write_parameters(f, &self.parameters)?;
        write!(f, "]")?;
        Ok(())
    }
}

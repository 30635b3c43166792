//! CFI Parser
//!
//! Turns `epubcfi(...)` strings into [`Cfi`] values. Errors carry the byte
//! position where parsing stopped.
//!
//! Grammar:
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step* [offset]
//! step      = "/" integer [assertion] | "!" [assertion]
//! assertion = "[" value (";" key "=" value)* "]"
//! offset    = ":" integer [assertion] | "~" number | "@" number ":" number
//! integer   = "0" | [1-9][0-9]*
//! ```
//!
//! Inside assertions `^` escapes the next character.

use super::types::*;
use thiserror::Error;

/// How much of an error's input is echoed back
const FRAGMENT_LEN: usize = 16;

/// CFI parsing errors
///
/// Every variant that points into the input carries the byte position and
/// the fragment of input starting there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfiParseError {
    #[error("Empty CFI string")]
    Empty,

    #[error("CFI must start with 'epubcfi(' (found '{fragment}')")]
    MissingPrefix { fragment: String },

    #[error("CFI must end with ')' (position {position})")]
    MissingClosingParen { position: usize },

    #[error("Expected '/' or '!' at position {position} near '{fragment}'")]
    ExpectedStep { position: usize, fragment: String },

    #[error("Malformed integer at position {position} near '{fragment}'")]
    MalformedNumber { position: usize, fragment: String },

    #[error("Unclosed bracket at position {position} near '{fragment}'")]
    UnclosedBracket { position: usize, fragment: String },

    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("Invalid range at position {position}: expected exactly two tails")]
    InvalidRange { position: usize },
}

impl CfiParseError {
    /// Byte position of the error in the input, if it points at one
    pub fn position(&self) -> Option<usize> {
        match self {
            CfiParseError::Empty | CfiParseError::MissingPrefix { .. } => None,
            CfiParseError::MissingClosingParen { position }
            | CfiParseError::ExpectedStep { position, .. }
            | CfiParseError::MalformedNumber { position, .. }
            | CfiParseError::UnclosedBracket { position, .. }
            | CfiParseError::UnexpectedChar { position, .. }
            | CfiParseError::InvalidRange { position } => Some(*position),
        }
    }
}

/// Parsing options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Require the `epubcfi(...)` wrapper
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Parser state
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CfiParseError> {
        if self.skip_if(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> CfiParseError {
        CfiParseError::UnexpectedChar {
            found: self.peek().unwrap_or('\0'),
            position: self.pos,
        }
    }

    fn skip_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn fragment(&self, position: usize) -> String {
        self.input[position..].chars().take(FRAGMENT_LEN).collect()
    }

    /// Parse a non-negative integer without leading zeros
    fn parse_number(&mut self) -> Result<u32, CfiParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let digits = &self.input[start..self.pos];
        let malformed = || CfiParseError::MalformedNumber {
            position: start,
            fragment: self.fragment(start),
        };

        if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
            return Err(malformed());
        }

        digits.parse().map_err(|_| malformed())
    }

    /// Parse a floating point number
    fn parse_float(&mut self) -> Result<f64, CfiParseError> {
        let start = self.pos;

        self.skip_if('-');

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiParseError::MalformedNumber {
                position: start,
                fragment: self.fragment(start),
            })
    }

    /// Raw text inside brackets; escapes are kept so delimiters can be split later
    fn parse_bracket_content(&mut self) -> Result<&'a str, CfiParseError> {
        let input = self.input;
        let start = self.pos;
        let mut escaped = false;

        while let Some(ch) = self.peek() {
            if escaped {
                escaped = false;
            } else if ch == '^' {
                escaped = true;
            } else if ch == ']' {
                return Ok(&input[start..self.pos]);
            } else if ch == '[' {
                return Err(self.unexpected());
            }
            self.advance();
        }

        Err(CfiParseError::UnclosedBracket {
            position: start.saturating_sub(1),
            fragment: self.fragment(start.saturating_sub(1)),
        })
    }

    /// Bracketed assertion following a step, or None
    fn parse_bracket(&mut self) -> Result<Option<&'a str>, CfiParseError> {
        if !self.skip_if('[') {
            return Ok(None);
        }
        let content = self.parse_bracket_content()?;
        self.expect(']')?;
        Ok(Some(content))
    }

    /// Parse a single step (/ or !)
    fn parse_step(&mut self) -> Result<CfiStep, CfiParseError> {
        let step_type = if self.skip_if('/') {
            StepType::Child(self.parse_number()?)
        } else if self.skip_if('!') {
            StepType::Indirection
        } else {
            return Err(CfiParseError::ExpectedStep {
                position: self.pos,
                fragment: self.fragment(self.pos),
            });
        };

        let (id_assertion, parameters) = match self.parse_bracket()? {
            Some(raw) => split_assertion(raw),
            None => (None, Vec::new()),
        };

        Ok(CfiStep {
            step_type,
            id_assertion,
            parameters,
        })
    }

    /// Parse a path (sequence of steps with optional offset)
    fn parse_path(&mut self) -> Result<CfiPath, CfiParseError> {
        let mut steps = Vec::new();

        while matches!(self.peek(), Some('/') | Some('!')) {
            steps.push(self.parse_step()?);
        }

        let mut path = CfiPath::with_steps(steps);

        if self.skip_if(':') {
            let offset = self.parse_number()?;
            let assertion = self.parse_bracket()?.map(parse_text_assertion);
            path.character_offset = Some(CharacterOffset { offset, assertion });
        }

        if self.skip_if('~') {
            let seconds = self.parse_float()?;
            path.temporal_offset = Some(TemporalOffset { seconds });
        }

        if self.skip_if('@') {
            let x = self.parse_float()?;
            self.expect(':')?;
            let y = self.parse_float()?;
            path.spatial_offset = Some(SpatialOffset { x, y });
        }

        Ok(path)
    }

    /// Parse a complete CFI
    fn parse_cfi(&mut self, options: ParseOptions) -> Result<Cfi, CfiParseError> {
        let wrapped = self.skip_str("epubcfi(");
        if !wrapped && options.strict {
            return Err(CfiParseError::MissingPrefix {
                fragment: self.fragment(0),
            });
        }

        let path = self.parse_path()?;

        let range = if self.skip_if(',') {
            let start = self.parse_path()?;
            if !self.skip_if(',') {
                return Err(CfiParseError::InvalidRange { position: self.pos });
            }
            let end = self.parse_path()?;
            if self.peek() == Some(',') {
                return Err(CfiParseError::InvalidRange { position: self.pos });
            }
            Some(CfiRange { start, end })
        } else {
            None
        };

        if wrapped && !self.skip_if(')') {
            if self.at_end() {
                return Err(CfiParseError::MissingClosingParen { position: self.pos });
            }
            return Err(self.unexpected());
        }

        Ok(Cfi { path, range })
    }
}

/// Split raw (escaped) text at unescaped occurrences of `sep`
fn split_unescaped(raw: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '^' {
            escaped = true;
        } else if ch == sep {
            parts.push(&raw[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Split at the first unescaped `sep`
fn split_once_unescaped(raw: &str, sep: char) -> Option<(&str, &str)> {
    let mut parts = split_unescaped(raw, sep);
    if parts.len() < 2 {
        return None;
    }
    let head = parts.remove(0);
    Some((head, &raw[head.len() + sep.len_utf8()..]))
}

/// Remove `^` escapes
fn unescape(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut escaped = false;
    for ch in raw.chars() {
        if !escaped && ch == '^' {
            escaped = true;
            continue;
        }
        escaped = false;
        result.push(ch);
    }
    result
}

/// Parse parameters from raw segments like `s=a`
fn parse_parameters(segments: &[&str]) -> Vec<(String, String)> {
    segments
        .iter()
        .filter_map(|segment| {
            let (key, value) = split_once_unescaped(segment, '=')?;
            let key = unescape(key.trim());
            if key.is_empty() {
                None
            } else {
                Some((key, unescape(value.trim())))
            }
        })
        .collect()
}

/// Step assertion: `[id;key=value...]`
fn split_assertion(raw: &str) -> (Option<String>, Vec<(String, String)>) {
    let segments = split_unescaped(raw, ';');
    let id = Some(unescape(segments[0])).filter(|id| !id.is_empty());
    (id, parse_parameters(&segments[1..]))
}

/// Terminal assertion: `[prefix,suffix;key=value...]`
fn parse_text_assertion(raw: &str) -> TextAssertion {
    let segments = split_unescaped(raw, ';');
    let head = segments[0];

    let (prefix, suffix) = match split_once_unescaped(head, ',') {
        Some((prefix, suffix)) => (prefix, Some(unescape(suffix))),
        None => (head, None),
    };

    TextAssertion {
        prefix: Some(unescape(prefix)).filter(|p| !p.is_empty()),
        suffix,
        parameters: parse_parameters(&segments[1..]),
    }
}

/// Parse a CFI string into a Cfi struct (the `epubcfi(...)` wrapper is required)
pub fn parse(input: &str) -> Result<Cfi, CfiParseError> {
    parse_with(input, ParseOptions::default())
}

/// Parse a CFI string with explicit options
pub fn parse_with(input: &str, options: ParseOptions) -> Result<Cfi, CfiParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CfiParseError::Empty);
    }

    let mut parser = Parser::new(input);
    let cfi = parser.parse_cfi(options)?;

    // Ensure we consumed all input
    if !parser.at_end() {
        return Err(parser.unexpected());
    }

    Ok(cfi)
}

/// Parse a bare path such as a spine item's CFI base (`/6/4[chap01ref]`)
pub fn parse_path(input: &str) -> Result<CfiPath, CfiParseError> {
    let cfi = parse_with(input, ParseOptions { strict: false })?;
    if cfi.range.is_some() {
        return Err(CfiParseError::InvalidRange { position: 0 });
    }
    Ok(cfi.path)
}

/// Parse a CFI string, returning None on failure
pub fn try_parse(input: &str) -> Option<Cfi> {
    parse(input).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_cfi() {
        let cfi = parse("epubcfi(/6/4!/4/2)").unwrap();
        // Steps: /6, /4, !, /4, /2 = 5 steps
        assert_eq!(cfi.path.steps.len(), 5);
        assert_eq!(cfi.path.steps[0].step_type, StepType::Child(6));
        assert_eq!(cfi.path.steps[1].step_type, StepType::Child(4));
        assert_eq!(cfi.path.steps[2].step_type, StepType::Indirection);
        assert_eq!(cfi.path.steps[3].step_type, StepType::Child(4));
        assert_eq!(cfi.path.steps[4].step_type, StepType::Child(2));
        assert!(!cfi.is_range());
    }

    #[test]
    fn test_parse_reference_example() {
        let original = "epubcfi(/6/4[chap01ref]!/4[body01]/10[para05]/2/1:3)";
        let cfi = parse(original).unwrap();

        assert_eq!(cfi.spine_index(), Some(1));
        assert_eq!(cfi.base().to_string(), "/6/4[chap01ref]");
        assert_eq!(cfi.content_steps()[0].id_assertion.as_deref(), Some("body01"));
        assert_eq!(cfi.path.character_offset.as_ref().unwrap().offset, 3);
        assert_eq!(cfi.to_string(), original);
    }

    #[test]
    fn test_parse_cfi_with_text_assertion() {
        let cfi = parse("epubcfi(/6/4!/4/2/1:42[hello,world])").unwrap();
        let offset = cfi.path.character_offset.as_ref().unwrap();
        let assertion = offset.assertion.as_ref().unwrap();
        assert_eq!(assertion.prefix, Some("hello".to_string()));
        assert_eq!(assertion.suffix, Some("world".to_string()));
    }

    #[test]
    fn test_parse_side_bias() {
        let cfi = parse("epubcfi(/6/4!/4/2[para;s=b]/1:0[;s=a])").unwrap();
        let para = &cfi.path.steps[4];
        assert_eq!(para.id_assertion.as_deref(), Some("para"));
        assert_eq!(para.side_bias(), Some(SideBias::Before));
        assert_eq!(cfi.path.terminal_side_bias(), Some(SideBias::After));
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2[para;s=b]/1:0[;s=a])");
    }

    #[test]
    fn test_parse_cfi_range() {
        let original = "epubcfi(/6/4!/4/2,/1:0,/1:10)";
        let cfi = parse(original).unwrap();
        assert!(cfi.is_range());
        let range = cfi.range.as_ref().unwrap();
        assert_eq!(range.start.character_offset.as_ref().unwrap().offset, 0);
        assert_eq!(range.end.character_offset.as_ref().unwrap().offset, 10);
        assert_eq!(cfi.to_string(), original);
    }

    #[test]
    fn test_parse_cfi_temporal_and_spatial_offset() {
        let cfi = parse("epubcfi(/6/4!/4~12.5)").unwrap();
        assert_eq!(cfi.path.temporal_offset.as_ref().unwrap().seconds, 12.5);

        let cfi = parse("epubcfi(/6/4!/4@50.5:25.5)").unwrap();
        let spatial = cfi.path.spatial_offset.as_ref().unwrap();
        assert_eq!(spatial.x, 50.5);
        assert_eq!(spatial.y, 25.5);
    }

    #[test]
    fn test_escaped_assertions() {
        let original = "epubcfi(/6/4[test^]value]!/4/1:2[a^,b,c])";
        let cfi = parse(original).unwrap();
        assert_eq!(cfi.path.steps[1].id_assertion, Some("test]value".to_string()));

        let assertion = cfi.path.character_offset.unwrap().assertion.unwrap();
        assert_eq!(assertion.prefix.as_deref(), Some("a,b"));
        assert_eq!(assertion.suffix.as_deref(), Some("c"));
    }

    #[test]
    fn test_lenient_mode_accepts_bare_path() {
        assert!(matches!(
            parse("/6/4!/4/2"),
            Err(CfiParseError::MissingPrefix { .. })
        ));

        let cfi = parse_with("/6/4!/4/2", ParseOptions { strict: false }).unwrap();
        assert_eq!(cfi.to_string(), "epubcfi(/6/4!/4/2)");

        let base = parse_path("/6/8[chap03]").unwrap();
        assert_eq!(base.steps[1].id_assertion.as_deref(), Some("chap03"));
    }

    #[test]
    fn test_error_empty() {
        assert!(matches!(parse(""), Err(CfiParseError::Empty)));
    }

    #[test]
    fn test_error_missing_paren() {
        assert!(matches!(
            parse("epubcfi(/6/4"),
            Err(CfiParseError::MissingClosingParen { .. })
        ));
    }

    #[test]
    fn test_error_malformed_number() {
        let err = parse("epubcfi(/6/x!/4)").unwrap_err();
        assert_eq!(err.position(), Some(11));
        assert!(matches!(
            err,
            CfiParseError::MalformedNumber { ref fragment, .. } if fragment.starts_with("x!")
        ));

        assert!(matches!(
            parse("epubcfi(/6/04)"),
            Err(CfiParseError::MalformedNumber { .. })
        ));
        assert!(matches!(
            parse("epubcfi(/6/99999999999)"),
            Err(CfiParseError::MalformedNumber { .. })
        ));
    }

    #[test]
    fn test_error_unclosed_bracket() {
        let err = parse("epubcfi(/6/4[chap01ref!/4)").unwrap_err();
        assert!(matches!(err, CfiParseError::UnclosedBracket { position: 12, .. }));
    }

    #[test]
    fn test_error_invalid_range() {
        assert!(matches!(
            parse("epubcfi(/6/4!/4,/2)"),
            Err(CfiParseError::InvalidRange { .. })
        ));
        assert!(matches!(
            parse("epubcfi(/6/4!/4,/2,/4,/6)"),
            Err(CfiParseError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_error_trailing_input() {
        assert!(matches!(
            parse("epubcfi(/6/4)x"),
            Err(CfiParseError::UnexpectedChar { found: 'x', .. })
        ));
    }
}

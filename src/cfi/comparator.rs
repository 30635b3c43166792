//! Reading-order comparison of CFIs
//!
//! Implements the document-order comparison used to sort annotations,
//! binary-search location lists and key maps by position.
//!
//! Order of tie-breakers:
//! 1. steps, one by one: virtual index, then side bias (`before` < none < `after`)
//! 2. a path that is a strict prefix of the other sorts first
//! 3. terminal character offset (absent counts as 0), then terminal side bias
//! 4. temporal, then spatial offsets
//!
//! Range CFIs are ordered by their start (`path` + `start` tail).

use std::cmp::Ordering;

use super::parser::parse;
use super::types::*;

/// Compare two CFIs in reading order
pub fn compare(a: &Cfi, b: &Cfi) -> Ordering {
    compare_paths(&a.start_path(), &b.start_path())
}

/// Compare two full paths in reading order
pub fn compare_paths(a: &CfiPath, b: &CfiPath) -> Ordering {
    compare_steps(&a.steps, &b.steps).then_with(|| compare_terminals(a, b))
}

/// Compare two sequences of CFI steps
pub fn compare_steps(a: &[CfiStep], b: &[CfiStep]) -> Ordering {
    for (step_a, step_b) in a.iter().zip(b.iter()) {
        let cmp = compare_step(step_a, step_b);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    // If all compared steps are equal, the less specific path comes first
    a.len().cmp(&b.len())
}

/// Compare two single steps; assertions other than side bias are ignored
pub fn compare_step(a: &CfiStep, b: &CfiStep) -> Ordering {
    let by_type = match (a.step_type, b.step_type) {
        (StepType::Indirection, StepType::Indirection) => Ordering::Equal,
        (StepType::Child(x), StepType::Child(y)) => x.cmp(&y),
        // Indirection comes before child steps at the same level
        (StepType::Indirection, StepType::Child(_)) => Ordering::Less,
        (StepType::Child(_), StepType::Indirection) => Ordering::Greater,
    };

    by_type.then_with(|| SideBias::rank(a.side_bias()).cmp(&SideBias::rank(b.side_bias())))
}

fn compare_terminals(a: &CfiPath, b: &CfiPath) -> Ordering {
    let offset = |path: &CfiPath| path.character_offset.as_ref().map_or(0, |o| o.offset);
    let temporal = |path: &CfiPath| path.temporal_offset.as_ref().map_or(0.0, |t| t.seconds);

    offset(a)
        .cmp(&offset(b))
        .then_with(|| {
            SideBias::rank(a.terminal_side_bias()).cmp(&SideBias::rank(b.terminal_side_bias()))
        })
        .then_with(|| temporal(a).total_cmp(&temporal(b)))
        .then_with(|| match (&a.spatial_offset, &b.spatial_offset) {
            (Some(x), Some(y)) => x.y.total_cmp(&y.y).then_with(|| x.x.total_cmp(&y.x)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        })
}

impl Ord for Cfi {
    /// Reading order; CFIs at the same position are tie-broken by their
    /// string form so the ordering stays consistent with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other).then_with(|| {
            if self == other {
                Ordering::Equal
            } else {
                self.to_string().cmp(&other.to_string())
            }
        })
    }
}

impl PartialOrd for Cfi {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Determine if CFI `a` comes before CFI `b` in reading order
pub fn is_before(a: &Cfi, b: &Cfi) -> bool {
    compare(a, b) == Ordering::Less
}

/// Determine if CFI `a` comes after CFI `b` in reading order
pub fn is_after(a: &Cfi, b: &Cfi) -> bool {
    compare(a, b) == Ordering::Greater
}

/// Check if a CFI falls within `[start, end]`
pub fn is_in_range(cfi: &Cfi, start: &Cfi, end: &Cfi) -> bool {
    compare(cfi, start) != Ordering::Less && compare(cfi, end) != Ordering::Greater
}

/// Compare two CFI strings, returning their ordering
/// Returns None if either CFI is invalid
pub fn compare_cfi_strings(a: &str, b: &str) -> Option<Ordering> {
    let cfi_a = parse(a).ok()?;
    let cfi_b = parse(b).ok()?;
    Some(compare(&cfi_a, &cfi_b))
}

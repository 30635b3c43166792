//! CFI Resolution
//!
//! Walks the content steps of a CFI down a [`DocumentTree`] and produces DOM
//! boundary points. Even steps select element children, odd steps select the
//! run of text between two elements; terminal offsets are spread across the
//! text nodes of that run.

use thiserror::Error;
use tracing::{debug, warn};

use super::types::*;
use crate::tree::{utf16_len, DocumentTree, DomPoint, NodeKind};

/// Errors raised while mapping between CFIs and document positions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No node for step {step} (index {index}); parent has {elements} element children")]
    NodeNotFound {
        step: usize,
        index: u32,
        elements: usize,
    },

    #[error("Assertion [{expected}] does not match node id {found:?}")]
    AmbiguousAssertion {
        expected: String,
        found: Option<String>,
    },

    #[error("Indirection inside a content document is not supported")]
    UnsupportedIndirection,

    #[error("Node is not attached below the document element")]
    DetachedNode,
}

/// Resolution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Fail on id assertion mismatches instead of recovering
    pub strict_assertions: bool,
}

/// Outcome of resolving a CFI against a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<N> {
    Point(DomPoint<N>),
    Range { start: DomPoint<N>, end: DomPoint<N> },
}

impl<N: Copy> Resolved<N> {
    /// Start point (the point itself for non-ranges)
    pub fn start(&self) -> DomPoint<N> {
        match *self {
            Resolved::Point(point) => point,
            Resolved::Range { start, .. } => start,
        }
    }

    /// End point (the point itself for non-ranges)
    pub fn end(&self) -> DomPoint<N> {
        match *self {
            Resolved::Point(point) => point,
            Resolved::Range { end, .. } => end,
        }
    }
}

/// Where a step sequence ends up
#[derive(Debug, Clone, Copy)]
enum Target<N> {
    Element(N),
    /// Text run after `gap` element children of `parent`
    Gap { parent: N, gap: usize },
}

/// Resolve a CFI against a content document
///
/// Only the steps after the indirection are used; the caller picks the
/// document matching the spine steps.
pub fn resolve<T: DocumentTree + ?Sized>(
    cfi: &Cfi,
    tree: &T,
    options: ResolveOptions,
) -> Result<Resolved<T::Node>, ResolveError> {
    let steps = cfi.content_steps();
    if steps.iter().any(CfiStep::is_indirection) {
        return Err(ResolveError::UnsupportedIndirection);
    }

    let root = tree.document_element();
    match cfi.range {
        None => {
            let target = walk(tree, root, steps, 0, options)?;
            Ok(Resolved::Point(finish(tree, target, &cfi.path)))
        }
        Some(ref range) => {
            let anchor = match walk(tree, root, steps, 0, options)? {
                Target::Element(node) => node,
                // A range cannot share a text run as its parent
                Target::Gap { .. } => {
                    return Err(ResolveError::NodeNotFound {
                        step: steps.len(),
                        index: range.start.steps.first().and_then(CfiStep::index).unwrap_or(0),
                        elements: 0,
                    })
                }
            };

            let start = resolve_tail(tree, anchor, &range.start, steps.len(), options)?;
            let end = resolve_tail(tree, anchor, &range.end, steps.len(), options)?;
            Ok(Resolved::Range { start, end })
        }
    }
}

fn resolve_tail<T: DocumentTree + ?Sized>(
    tree: &T,
    anchor: T::Node,
    tail: &CfiPath,
    depth: usize,
    options: ResolveOptions,
) -> Result<DomPoint<T::Node>, ResolveError> {
    if tail.steps.iter().any(CfiStep::is_indirection) {
        return Err(ResolveError::UnsupportedIndirection);
    }
    let target = walk(tree, anchor, &tail.steps, depth, options)?;
    Ok(finish(tree, target, tail))
}

fn element_children<T: DocumentTree + ?Sized>(tree: &T, node: T::Node) -> Vec<T::Node> {
    tree.children(node)
        .into_iter()
        .filter(|&child| tree.kind(child) == NodeKind::Element)
        .collect()
}

fn walk<T: DocumentTree + ?Sized>(
    tree: &T,
    from: T::Node,
    steps: &[CfiStep],
    depth_offset: usize,
    options: ResolveOptions,
) -> Result<Target<T::Node>, ResolveError> {
    let mut current = Target::Element(from);

    for (i, step) in steps.iter().enumerate() {
        let depth = depth_offset + i;
        let index = step.index().unwrap_or(0);

        let node = match current {
            Target::Element(node) => node,
            // Text runs have no children to step into
            Target::Gap { .. } => {
                return Err(ResolveError::NodeNotFound {
                    step: depth,
                    index,
                    elements: 0,
                })
            }
        };

        current = child_target(tree, node, step, depth, options)?;
    }

    Ok(current)
}

fn child_target<T: DocumentTree + ?Sized>(
    tree: &T,
    node: T::Node,
    step: &CfiStep,
    depth: usize,
    options: ResolveOptions,
) -> Result<Target<T::Node>, ResolveError> {
    let index = step.index().unwrap_or(0);
    let elements = element_children(tree, node);
    let missing = ResolveError::NodeNotFound {
        step: depth,
        index,
        elements: elements.len(),
    };

    if index % 2 == 1 {
        let gap = (index as usize - 1) / 2;
        if gap > elements.len() {
            return Err(missing);
        }
        return Ok(Target::Gap { parent: node, gap });
    }

    let positional = (index >= 2)
        .then(|| elements.get(index as usize / 2 - 1).copied())
        .flatten();

    let Some(ref expected) = step.id_assertion else {
        return positional.map(Target::Element).ok_or(missing);
    };

    let found = positional.and_then(|el| tree.attribute(el, "id"));
    if found == Some(expected.as_str()) {
        return positional.map(Target::Element).ok_or(missing);
    }

    if options.strict_assertions {
        return match positional {
            Some(_) => Err(ResolveError::AmbiguousAssertion {
                expected: expected.clone(),
                found: found.map(str::to_string),
            }),
            None => Err(missing),
        };
    }

    if let Some(by_id) = tree.element_by_id(expected) {
        warn!(
            "Step {} (/{}) asserts [{}] but found {:?}; using the element with that id",
            depth, index, expected, found
        );
        return Ok(Target::Element(by_id));
    }

    match positional {
        Some(el) => {
            warn!(
                "Step {} (/{}) asserts [{}] which is not in the document; keeping positional match",
                depth, index, expected
            );
            Ok(Target::Element(el))
        }
        None => Err(missing),
    }
}

/// Text nodes of a gap and the child index where the gap begins
fn gap_nodes<T: DocumentTree + ?Sized>(
    tree: &T,
    parent: T::Node,
    gap: usize,
) -> (Vec<T::Node>, usize) {
    let children = tree.children(parent);
    let mut elements = 0;
    let mut start = None;
    let mut texts = Vec::new();

    for (i, &child) in children.iter().enumerate() {
        if elements == gap && start.is_none() {
            start = Some(i);
        }
        match tree.kind(child) {
            NodeKind::Element if elements == gap => break,
            NodeKind::Element => elements += 1,
            NodeKind::Text if elements == gap => texts.push(child),
            _ => {}
        }
    }

    (texts, start.unwrap_or(children.len()))
}

/// Turn a step target and terminal data into a boundary point
fn finish<T: DocumentTree + ?Sized>(
    tree: &T,
    target: Target<T::Node>,
    path: &CfiPath,
) -> DomPoint<T::Node> {
    let offset = path.character_offset.as_ref().map(|o| o.offset as usize);

    match target {
        Target::Element(el) => match offset {
            None => DomPoint::node(el),
            Some(offset) => {
                let children = tree.children(el).len();
                DomPoint::new(el, Some(offset.min(children)))
            }
        },
        Target::Gap { parent, gap } => {
            let (texts, dom_start) = gap_nodes(tree, parent, gap);

            let Some(offset) = offset else {
                return match texts.first() {
                    Some(&text) => DomPoint::node(text),
                    None => DomPoint::new(parent, Some(dom_start)),
                };
            };

            if texts.is_empty() {
                if offset > 0 {
                    debug!("Offset {} into an empty text run; using the run position", offset);
                }
                return DomPoint::new(parent, Some(dom_start));
            }

            let prefer_previous = path.terminal_side_bias() == Some(SideBias::Before);
            let mut consumed = 0;
            for (i, &text) in texts.iter().enumerate() {
                let len = tree.text(text).map_or(0, utf16_len);
                let is_last = i + 1 == texts.len();
                if offset < consumed + len
                    || (offset == consumed + len && (is_last || prefer_previous))
                {
                    return DomPoint::text(text, offset - consumed);
                }
                consumed += len;
            }

            warn!(
                "Offset {} is past the end of the text run ({} units); clamping",
                offset, consumed
            );
            let last = texts[texts.len() - 1];
            DomPoint::text(last, tree.text(last).map_or(0, utf16_len))
        }
    }
}

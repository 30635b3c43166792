//! CFI Generator
//!
//! Generates CFIs from positions in a document tree and text selections.

use tracing::trace;

use super::resolver::ResolveError;
use super::types::*;
use crate::tree::{utf16_len, DocumentTree, DomPoint, NodeKind};

/// Builder for constructing CFIs programmatically
#[derive(Debug, Clone, Default)]
pub struct CfiBuilder {
    path: CfiPath,
}

impl CfiBuilder {
    /// Create a new CFI builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the step to the `<spine>` element of the package document
    /// (`spine_node_index` is its position among `<package>` children, usually 2 -> /6)
    pub fn package_step(mut self, spine_node_index: usize) -> Self {
        self.path.push(CfiStep::element(spine_node_index));
        self
    }

    /// Add a spine item step (converts 0-based index to CFI format)
    /// CFI uses 1-based even numbering: index 0 -> /2, index 1 -> /4, etc.
    pub fn spine_item(mut self, index: usize, idref: Option<&str>) -> Self {
        let step = match idref {
            Some(id) => CfiStep::element_with_id(index, id),
            None => CfiStep::element(index),
        };
        self.path.push(step);
        self
    }

    /// Add an indirection step (entering a content document)
    pub fn indirection(mut self) -> Self {
        self.path.push(CfiStep::indirection());
        self
    }

    /// Add an element step within the content document
    /// Uses 1-based even numbering: index 0 -> /2, index 1 -> /4, etc.
    pub fn element(mut self, index: usize) -> Self {
        self.path.push(CfiStep::element(index));
        self
    }

    /// Add a text step: the text following `elements_before` element siblings
    pub fn text_node(mut self, elements_before: usize) -> Self {
        self.path.push(CfiStep::text_gap(elements_before));
        self
    }

    /// Set the character offset within a text node
    pub fn character_offset(mut self, offset: u32) -> Self {
        self.path.set_character_offset(offset);
        self
    }

    /// Build the final CFI
    pub fn build(self) -> Cfi {
        Cfi::new(self.path)
    }

    /// Get the current path
    pub fn path(&self) -> &CfiPath {
        &self.path
    }
}

/// Generate the spine path for a spine item, e.g. `/6/4[chap01ref]`
pub fn generate_chapter_component(
    spine_node_index: usize,
    spine_pos: usize,
    idref: Option<&str>,
) -> CfiPath {
    CfiBuilder::new()
        .package_step(spine_node_index)
        .spine_item(spine_pos, idref)
        .path
}

/// Generation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Mark positions sitting on a text node boundary with `;s=a` / `;s=b`
    pub side_bias: bool,
}

/// One endpoint ascended to the document element
struct Endpoint {
    path: CfiPath,
    /// Offset into the text node itself and that node's length
    node_offset: Option<(usize, usize)>,
}

/// Step for `node` within `parent`, plus the gap text preceding `node`
fn step_in_parent<T: DocumentTree + ?Sized>(
    tree: &T,
    parent: T::Node,
    node: T::Node,
) -> Option<(CfiStep, usize)> {
    let mut elements = 0;
    let mut gap_text = 0;

    for child in tree.children(parent) {
        if child == node {
            let step = match tree.kind(node) {
                NodeKind::Element => match tree.attribute(node, "id") {
                    Some(id) => CfiStep::element_with_id(elements, id),
                    None => CfiStep::element(elements),
                },
                _ => CfiStep::text_gap(elements),
            };
            return Some((step, gap_text));
        }
        match tree.kind(child) {
            NodeKind::Element => {
                elements += 1;
                gap_text = 0;
            }
            NodeKind::Text => gap_text += tree.text(child).map_or(0, utf16_len),
            NodeKind::Other => {}
        }
    }

    None
}

/// Steps from the document element down to `node`, and the gap text before it
fn steps_to<T: DocumentTree + ?Sized>(
    tree: &T,
    node: T::Node,
) -> Result<(Vec<CfiStep>, usize), ResolveError> {
    let root = tree.document_element();
    let mut steps = Vec::new();
    let mut leading_text = 0;
    let mut current = node;

    while current != root {
        let parent = tree.parent(current).ok_or(ResolveError::DetachedNode)?;
        let (step, gap_text) =
            step_in_parent(tree, parent, current).ok_or(ResolveError::DetachedNode)?;
        if steps.is_empty() {
            leading_text = gap_text;
        }
        steps.push(step);
        current = parent;
    }

    steps.reverse();
    Ok((steps, leading_text))
}

fn endpoint<T: DocumentTree + ?Sized>(
    tree: &T,
    point: &DomPoint<T::Node>,
) -> Result<Endpoint, ResolveError> {
    match (tree.kind(point.container), point.offset) {
        (NodeKind::Text, Some(offset)) => {
            let (steps, leading_text) = steps_to(tree, point.container)?;
            let len = tree.text(point.container).map_or(0, utf16_len);
            let mut path = CfiPath::with_steps(steps);
            path.set_character_offset((leading_text + offset) as u32);
            Ok(Endpoint {
                path,
                node_offset: Some((offset, len)),
            })
        }
        (NodeKind::Element, Some(child_index)) => {
            // Position before child `child_index`: a point in the gap holding it
            let (mut steps, _) = steps_to(tree, point.container)?;
            let mut elements = 0;
            let mut gap_text = 0;
            for child in tree.children(point.container).into_iter().take(child_index) {
                match tree.kind(child) {
                    NodeKind::Element => {
                        elements += 1;
                        gap_text = 0;
                    }
                    NodeKind::Text => gap_text += tree.text(child).map_or(0, utf16_len),
                    NodeKind::Other => {}
                }
            }
            steps.push(CfiStep::text_gap(elements));
            let mut path = CfiPath::with_steps(steps);
            path.set_character_offset(gap_text as u32);
            Ok(Endpoint {
                path,
                node_offset: None,
            })
        }
        _ => {
            let (steps, _) = steps_to(tree, point.container)?;
            Ok(Endpoint {
                path: CfiPath::with_steps(steps),
                node_offset: None,
            })
        }
    }
}

fn set_bias(path: &mut CfiPath, bias: SideBias) {
    if let Some(ref mut offset) = path.character_offset {
        offset.assertion = Some(TextAssertion::side_bias_only(bias));
    }
}

/// Prefix the spine path and an indirection step
fn with_base(base: &CfiPath, steps: Vec<CfiStep>) -> Vec<CfiStep> {
    if base.steps.is_empty() {
        return steps;
    }
    let mut full = base.steps.clone();
    full.push(CfiStep::indirection());
    full.extend(steps);
    full
}

/// Generate a CFI for a single point (or a whole node when `offset` is None)
pub fn from_point<T: DocumentTree + ?Sized>(
    tree: &T,
    point: &DomPoint<T::Node>,
    base: &CfiPath,
    options: GenerateOptions,
) -> Result<Cfi, ResolveError> {
    let mut endpoint = endpoint(tree, point)?;

    if options.side_bias {
        match endpoint.node_offset {
            Some((0, _)) => set_bias(&mut endpoint.path, SideBias::After),
            Some((offset, len)) if offset == len => set_bias(&mut endpoint.path, SideBias::Before),
            _ => {}
        }
    }

    let mut path = endpoint.path;
    path.steps = with_base(base, path.steps);
    Ok(Cfi::new(path))
}

/// Generate a CFI addressing a node
pub fn from_node<T: DocumentTree + ?Sized>(
    tree: &T,
    node: T::Node,
    base: &CfiPath,
) -> Result<Cfi, ResolveError> {
    from_point(tree, &DomPoint::node(node), base, GenerateOptions::default())
}

/// Generate a range CFI
///
/// The longest common step prefix becomes the shared path and the remaining
/// suffixes the two tails. Identical endpoints collapse to a point.
pub fn from_range<T: DocumentTree + ?Sized>(
    tree: &T,
    start: &DomPoint<T::Node>,
    end: &DomPoint<T::Node>,
    base: &CfiPath,
    options: GenerateOptions,
) -> Result<Cfi, ResolveError> {
    let mut start = endpoint(tree, start)?;
    let mut end = endpoint(tree, end)?;

    if start.path == end.path {
        trace!("Collapsed range at {}", start.path);
        let mut path = start.path;
        path.steps = with_base(base, path.steps);
        return Ok(Cfi::new(path));
    }

    if options.side_bias {
        if let Some((0, _)) = start.node_offset {
            set_bias(&mut start.path, SideBias::After);
        }
        if let Some((offset, len)) = end.node_offset {
            if offset == len {
                set_bias(&mut end.path, SideBias::Before);
            }
        }
    }

    // Each tail keeps at least one step
    let max_common = start.path.steps.len().min(end.path.steps.len()).saturating_sub(1);
    let common = start
        .path
        .steps
        .iter()
        .zip(end.path.steps.iter())
        .take(max_common)
        .take_while(|(a, b)| a == b)
        .count();

    let shared = start.path.steps[..common].to_vec();
    start.path.steps.drain(..common);
    end.path.steps.drain(..common);

    Ok(Cfi::with_range(
        CfiPath::with_steps(with_base(base, shared)),
        CfiRange {
            start: start.path,
            end: end.path,
        },
    ))
}

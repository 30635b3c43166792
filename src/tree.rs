//! Read-only document tree access
//!
//! The CFI engine never touches a concrete DOM. It walks any tree exposing
//! children, parents, text and attributes through [`DocumentTree`]. An
//! implementation for `roxmltree::Document` is provided; content documents
//! are parsed with [`parse_xhtml`].
//!
//! All text offsets are UTF-16 code units, matching DOM string offsets.

use std::fmt;

/// Kind of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    /// Comments, processing instructions, the document root
    Other,
}

/// Tree access needed to resolve and generate CFIs
pub trait DocumentTree {
    /// Lightweight node handle
    type Node: Copy + Eq + fmt::Debug;

    /// The document element (`<html>`); CFI content paths start below it
    fn document_element(&self) -> Self::Node;

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    fn kind(&self, node: Self::Node) -> NodeKind;

    /// Content of a text node
    fn text(&self, node: Self::Node) -> Option<&str>;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str>;

    /// Local tag name of an element
    fn local_name(&self, node: Self::Node) -> Option<&str>;

    /// Find the element carrying `id`
    fn element_by_id(&self, id: &str) -> Option<Self::Node> {
        descendants(self, self.document_element())
            .into_iter()
            .find(|&node| {
                self.kind(node) == NodeKind::Element && self.attribute(node, "id") == Some(id)
            })
    }
}

impl<'input> DocumentTree for roxmltree::Document<'input> {
    type Node = roxmltree::NodeId;

    fn document_element(&self) -> Self::Node {
        self.root_element().id()
    }

    fn parent(&self, node: Self::Node) -> Option<Self::Node> {
        self.get_node(node)?.parent().map(|parent| parent.id())
    }

    fn children(&self, node: Self::Node) -> Vec<Self::Node> {
        self.get_node(node)
            .map(|n| n.children().map(|child| child.id()).collect())
            .unwrap_or_default()
    }

    fn kind(&self, node: Self::Node) -> NodeKind {
        match self.get_node(node) {
            Some(n) if n.is_element() => NodeKind::Element,
            Some(n) if n.is_text() => NodeKind::Text,
            _ => NodeKind::Other,
        }
    }

    fn text(&self, node: Self::Node) -> Option<&str> {
        let n = self.get_node(node)?;
        if n.is_text() {
            n.text()
        } else {
            None
        }
    }

    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str> {
        self.get_node(node)?.attribute(name)
    }

    fn local_name(&self, node: Self::Node) -> Option<&str> {
        let n = self.get_node(node)?;
        if n.is_element() {
            Some(n.tag_name().name())
        } else {
            None
        }
    }
}

/// Parse an XHTML content document (DOCTYPE declarations allowed)
pub fn parse_xhtml(source: &str) -> Result<roxmltree::Document<'_>, roxmltree::Error> {
    roxmltree::Document::parse_with_options(
        source,
        roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        },
    )
}

/// Length of a string in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Slice a string by UTF-16 offsets (clamped, never splits a character)
pub fn utf16_slice(text: &str, from: usize, to: usize) -> &str {
    let mut start = text.len();
    let mut end = text.len();
    let mut units = 0;

    for (byte, ch) in text.char_indices() {
        if units >= from && start == text.len() {
            start = byte;
        }
        if units >= to {
            end = byte;
            break;
        }
        units += ch.len_utf16();
    }

    if start > end {
        return "";
    }
    &text[start..end]
}

/// All nodes below `root` (inclusive) in document order
pub fn descendants<T: DocumentTree + ?Sized>(tree: &T, root: T::Node) -> Vec<T::Node> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        order.push(node);
        let children = tree.children(node);
        stack.extend(children.into_iter().rev());
    }
    order
}

/// Text nodes below `root` in document order
pub fn text_nodes<T: DocumentTree + ?Sized>(tree: &T, root: T::Node) -> Vec<T::Node> {
    descendants(tree, root)
        .into_iter()
        .filter(|&node| tree.kind(node) == NodeKind::Text)
        .collect()
}

/// Concatenated text below `root`
pub fn text_content<T: DocumentTree + ?Sized>(tree: &T, root: T::Node) -> String {
    text_nodes(tree, root)
        .into_iter()
        .filter_map(|node| tree.text(node))
        .collect()
}

/// The `<body>` element, falling back to the document element
pub fn body<T: DocumentTree + ?Sized>(tree: &T) -> T::Node {
    let root = tree.document_element();
    descendants(tree, root)
        .into_iter()
        .find(|&node| tree.local_name(node) == Some("body"))
        .unwrap_or(root)
}

/// A DOM-style boundary point
///
/// For a text container `offset` counts UTF-16 units into its text. For an
/// element container `Some(i)` is the position before child `i` and `None`
/// addresses the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomPoint<N> {
    pub container: N,
    pub offset: Option<usize>,
}

impl<N> DomPoint<N> {
    pub fn new(container: N, offset: Option<usize>) -> Self {
        Self { container, offset }
    }

    /// A point inside a text node
    pub fn text(container: N, offset: usize) -> Self {
        Self {
            container,
            offset: Some(offset),
        }
    }

    /// A node without an offset
    pub fn node(container: N) -> Self {
        Self {
            container,
            offset: None,
        }
    }
}

/// Text covered by `[start, end)` in document order
pub fn text_between<T: DocumentTree + ?Sized>(
    tree: &T,
    start: &DomPoint<T::Node>,
    end: &DomPoint<T::Node>,
) -> String {
    let order = descendants(tree, tree.document_element());
    let (Some(from), Some(to)) = (
        boundary_position(tree, &order, start, true),
        boundary_position(tree, &order, end, false),
    ) else {
        return String::new();
    };

    let mut text = String::new();
    for (position, &node) in order.iter().enumerate() {
        if tree.kind(node) != NodeKind::Text {
            continue;
        }
        let Some(content) = tree.text(node) else {
            continue;
        };

        let lo = match position.cmp(&from.0) {
            std::cmp::Ordering::Less => continue,
            std::cmp::Ordering::Equal => from.1,
            std::cmp::Ordering::Greater => 0,
        };
        let hi = match position.cmp(&to.0) {
            std::cmp::Ordering::Less => utf16_len(content),
            std::cmp::Ordering::Equal => to.1,
            std::cmp::Ordering::Greater => continue,
        };
        if lo < hi {
            text.push_str(utf16_slice(content, lo, hi));
        }
    }
    text
}

/// Map a boundary point onto (document-order index, text offset)
///
/// Element boundaries map to offset 0 of the next node in document order.
fn boundary_position<T: DocumentTree + ?Sized>(
    tree: &T,
    order: &[T::Node],
    point: &DomPoint<T::Node>,
    is_start: bool,
) -> Option<(usize, usize)> {
    let index_of = |node: T::Node| order.iter().position(|&n| n == node);
    let after_subtree = |node: T::Node| {
        let last = descendants(tree, node).last().copied().unwrap_or(node);
        index_of(last).map(|index| index + 1)
    };

    match (tree.kind(point.container), point.offset) {
        (NodeKind::Text, Some(offset)) => Some((index_of(point.container)?, offset)),
        (_, Some(child)) => {
            let children = tree.children(point.container);
            match children.get(child) {
                Some(&node) => Some((index_of(node)?, 0)),
                None => Some((after_subtree(point.container)?, 0)),
            }
        }
        (_, None) => {
            if is_start {
                Some((index_of(point.container)?, 0))
            } else {
                Some((after_subtree(point.container)?, 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        "<!DOCTYPE html>\n",
        r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>T</title></head>"#,
        r#"<body><p id="a">Hello <b>bold</b> world</p><p>Second</p></body></html>"#,
    );

    #[test]
    fn test_roxmltree_access() {
        let doc = parse_xhtml(DOC).unwrap();
        let root = doc.document_element();
        assert_eq!(doc.local_name(root), Some("html"));

        let body = body(&doc);
        assert_eq!(doc.local_name(body), Some("body"));

        let para = doc.element_by_id("a").unwrap();
        assert_eq!(doc.parent(para), Some(body));
        assert_eq!(text_content(&doc, para), "Hello bold world");
        assert_eq!(doc.children(para).len(), 3);
        assert_eq!(doc.kind(doc.children(para)[0]), NodeKind::Text);
    }

    #[test]
    fn test_utf16_helpers() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("a😀b"), 4);
        assert_eq!(utf16_slice("a😀b", 1, 3), "😀");
        assert_eq!(utf16_slice("hello", 1, 3), "el");
        assert_eq!(utf16_slice("hello", 3, 99), "lo");
        assert_eq!(utf16_slice("hello", 4, 2), "");
    }

    #[test]
    fn test_text_between_points() {
        let doc = parse_xhtml(DOC).unwrap();
        let para = doc.element_by_id("a").unwrap();
        let children = doc.children(para);

        let start = DomPoint::text(children[0], 2);
        let end = DomPoint::text(children[2], 3);
        assert_eq!(text_between(&doc, &start, &end), "llo bold wo");

        let whole = text_between(&doc, &DomPoint::node(para), &DomPoint::node(para));
        assert_eq!(whole, "Hello bold world");
    }
}

//! HTML parsing and serialisation on top of html5ever's `RcDom`.
//!
//! The tree is only ever read. Components that need a changed document (the
//! rewriter swapping an `<img>` source, the Markdown converter passing tables
//! through) serialise the original nodes into a new string instead of
//! editing nodes in place.
//!
//! Every walk here uses an explicit stack, so arbitrarily deep input cannot
//! exhaust the thread's stack.

use crate::error::LayoutError;
use html5ever::serialize::{
    AttrRef, HtmlSerializer, Serialize, SerializeOpts, Serializer, TraversalScope,
};
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{parse_document, LocalName, Namespace, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::fmt;
use std::io::{self, Write};
use tracing::warn;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Elements whose first newline is swallowed by the parser.
const LEADING_NEWLINE_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

/// Parse a complete HTML document (or a bare fragment, which html5ever
/// places inside `<body>`).
pub(crate) fn parse_html(html: &str) -> Result<RcDom, std::io::Error> {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };
    parse_document(RcDom::default(), opts)
        .from_utf8()
        .read_from(&mut html.as_bytes())
}

/// Local tag name of an element node.
pub(crate) fn tag_name(node: &Node) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

pub(crate) fn is_element(node: &Node, tag: &str) -> bool {
    tag_name(node) == Some(tag)
}

/// Value of the attribute `name` on an element, if present.
pub(crate) fn attr(node: &Node, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Direct children that are elements, in document order.
pub(crate) fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|c| matches!(c.data, NodeData::Element { .. }))
        .cloned()
        .collect()
}

/// Descendants of `node` in document order, excluding `node` itself.
fn descendants(node: &Handle) -> impl Iterator<Item = Handle> {
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();
    std::iter::from_fn(move || {
        let next = stack.pop()?;
        stack.extend(next.children.borrow().iter().rev().cloned());
        Some(next)
    })
}

/// First descendant (depth-first, document order) with the given tag.
pub(crate) fn find_descendant(node: &Handle, tag: &str) -> Option<Handle> {
    descendants(node).find(|d| is_element(d, tag))
}

/// Every descendant with the given tag, in document order.
pub(crate) fn find_all_descendants(node: &Handle, tag: &str) -> Vec<Handle> {
    descendants(node).filter(|d| is_element(d, tag)).collect()
}

/// Concatenated text of all descendant text nodes.
pub(crate) fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for d in descendants(node) {
        if let NodeData::Text { contents } = &d.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}

/// The `<body>` element of a parsed document.
///
/// The returned handle only has children while `dom` is alive: dropping an
/// `RcDom` detaches every node in it.
pub(crate) fn body(dom: &RcDom) -> Option<Handle> {
    find_descendant(&dom.document, "body")
}

/// Number of element levels below `node`.
pub(crate) fn max_depth(node: &Handle) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(node.clone(), 0usize)];
    while let Some((n, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        for child in n.children.borrow().iter() {
            if matches!(child.data, NodeData::Element { .. }) {
                stack.push((child.clone(), depth + 1));
            }
        }
    }
    deepest
}

/// Serialised children of `node`.
pub(crate) fn inner_html(node: &Handle) -> String {
    serialize(node, children_scope(node), None).0
}

/// Serialised `node` including its own tags.
pub(crate) fn outer_html(node: &Handle) -> String {
    match node.data {
        NodeData::Document => inner_html(node),
        _ => serialize(node, TraversalScope::IncludeNode, None).0,
    }
}

/// Serialised children of `node` with the first `<img>` pointed at `src`.
///
/// Returns the HTML and whether some `<img>` received the new source.
pub(crate) fn inner_html_with_img_src(node: &Handle, src: &str) -> (String, bool) {
    serialize(node, children_scope(node), Some(src))
}

/// A single HTML element with the given attributes and text content,
/// escaped by html5ever's serializer. Void elements ignore `text`.
pub(crate) fn element_html(tag: &str, attrs: &[(&str, &str)], text: &str) -> String {
    let mut out = Vec::new();
    let mut serializer = HtmlSerializer::new(&mut out, SerializeOpts::default());
    let name = html_name(tag);
    let attrs: Vec<(QualName, &str)> = attrs.iter().map(|&(n, v)| (attr_name(n), v)).collect();

    let written = serializer
        .start_elem(name.clone(), attrs.iter().map(|(n, v)| (n, *v)))
        .and_then(|()| serializer.write_text(text))
        .and_then(|()| serializer.end_elem(name));
    drop(serializer);
    if let Err(e) = written {
        warn!("Failed to serialise <{}>: {}", tag, e);
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn html_name(tag: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag))
}

fn attr_name(name: &str) -> QualName {
    QualName::new(None, Namespace::from(""), LocalName::from(name))
}

fn children_scope(node: &Handle) -> TraversalScope {
    match &node.data {
        NodeData::Element { name, .. } => TraversalScope::ChildrenOnly(Some(name.clone())),
        _ => TraversalScope::ChildrenOnly(None),
    }
}

fn serialize(node: &Handle, scope: TraversalScope, img_src: Option<&str>) -> (String, bool) {
    let mut out = Vec::new();
    let mut serializer = BlockSerializer {
        inner: HtmlSerializer::new(&mut out, SerializeOpts {
            traversal_scope: scope.clone(),
            ..Default::default()
        }),
        img_src,
        src_attr: attr_name("src"),
        after_newline_element: false,
    };
    if let Err(e) = SerializableHandle::from(node.clone()).serialize(&mut serializer, scope) {
        warn!("HTML serialisation failed: {}", e);
    }
    let replaced = img_src.is_some() && serializer.img_src.is_none();
    drop(serializer);
    (String::from_utf8_lossy(&out).into_owned(), replaced)
}

/// html5ever's serializer plus two adjustments: the first `<img>` can be given
/// a new `src`, and a leading newline inside `pre`/`textarea`/`listing` is
/// doubled so reparsing keeps it.
struct BlockSerializer<'s, W: Write> {
    inner: HtmlSerializer<W>,
    img_src: Option<&'s str>,
    src_attr: QualName,
    after_newline_element: bool,
}

impl<W: Write> Serializer for BlockSerializer<'_, W> {
    fn start_elem<'a, AttrIter>(&mut self, name: QualName, attrs: AttrIter) -> io::Result<()>
    where
        AttrIter: Iterator<Item = AttrRef<'a>>,
    {
        self.after_newline_element = LEADING_NEWLINE_ELEMENTS.contains(&&*name.local);

        let src = match self.img_src {
            Some(src) if &*name.local == "img" => src,
            _ => return self.inner.start_elem(name, attrs),
        };
        self.img_src = None;

        let mut replaced = false;
        let mut rewritten: Vec<(&QualName, &str)> = Vec::new();
        for (attr, value) in attrs {
            if &*attr.local == "src" {
                replaced = true;
                rewritten.push((attr, src));
            } else {
                rewritten.push((attr, value));
            }
        }
        if !replaced {
            rewritten.push((&self.src_attr, src));
        }
        self.inner.start_elem(name, rewritten.into_iter())
    }

    fn end_elem(&mut self, name: QualName) -> io::Result<()> {
        self.after_newline_element = false;
        self.inner.end_elem(name)
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        if std::mem::take(&mut self.after_newline_element) && text.starts_with('\n') {
            self.inner.write_text("\n")?;
        }
        self.inner.write_text(text)
    }

    fn write_comment(&mut self, text: &str) -> io::Result<()> {
        self.after_newline_element = false;
        self.inner.write_comment(text)
    }

    fn write_doctype(&mut self, name: &str) -> io::Result<()> {
        self.inner.write_doctype(name)
    }

    fn write_processing_instruction(&mut self, target: &str, data: &str) -> io::Result<()> {
        self.inner.write_processing_instruction(target, data)
    }
}

/// A parsed layout-annotated HTML page.
///
/// Keeps the original text next to the tree: image names are derived from a
/// hash of the exact input.
pub struct AnnotatedDocument {
    source: String,
    dom: RcDom,
}

impl AnnotatedDocument {
    /// Parse annotated HTML as emitted by the document model.
    ///
    /// # Errors
    /// [`LayoutError::HtmlParse`] if the input cannot be read as a document.
    pub fn parse(html: impl Into<String>) -> Result<Self, LayoutError> {
        let source = html.into();
        let dom = parse_html(&source).map_err(|e| LayoutError::HtmlParse(e.to_string()))?;
        if body(&dom).is_none() {
            return Err(LayoutError::HtmlParse("document has no <body>".into()));
        }
        Ok(Self { source, dom })
    }

    /// The HTML exactly as supplied.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Element children of `<body>`, in document order. Position `i` here is
    /// block index `i + 1` everywhere else.
    pub(crate) fn top_level_elements(&self) -> Vec<Handle> {
        body(&self.dom)
            .map(|b| element_children(&b))
            .unwrap_or_default()
    }
}

impl fmt::Debug for AnnotatedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotatedDocument")
            .field("source_len", &self.source.len())
            .field("blocks", &self.top_level_elements().len())
            .finish()
    }
}

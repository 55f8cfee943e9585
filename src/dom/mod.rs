mod blitz;

pub use blitz::BlitzDom;

use thiserror::Error;

/// Arena handle of a node. Two handles are the same node iff they are equal.
pub type NodeId = usize;

pub type DomResult<T> = Result<T, DomError>;

/// Failures raised by the native tree operations themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("missing node {0}")]
    MissingNode(NodeId),
    #[error("node {node} is not a child of parent {parent}")]
    NotAChild { node: NodeId, parent: NodeId },
    #[error("inserting node {node} into {parent} would create a cycle")]
    HierarchyRequest { node: NodeId, parent: NodeId },
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
}

/// The unpatched node operations of a document.
///
/// Everything the sandbox does eventually lands on one of these calls. Implementations follow
/// native DOM semantics: inserting a node that already has a parent moves it, and the structural
/// methods return the same node the DOM method would (`append_child` and `insert_before` return the
/// inserted node, `replace_child` returns the removed child, `clone_node` returns the clone).
pub trait NativeDom {
    /// The document node itself (the parent of the document element).
    fn document_node(&self) -> NodeId;

    /// `document.documentElement`.
    fn document_element(&self) -> Option<NodeId>;

    /// `document.head` of the real top-level document.
    fn head(&self) -> Option<NodeId>;

    /// `document.body` of the real top-level document.
    fn body(&self) -> Option<NodeId>;

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId>;

    fn create_text_node(&mut self, data: &str) -> DomResult<NodeId>;

    fn append_child(&mut self, parent: NodeId, node: NodeId) -> DomResult<NodeId>;

    /// A `None` reference appends at the end.
    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<NodeId>;

    fn replace_child(&mut self, parent: NodeId, node: NodeId, child: NodeId)
        -> DomResult<NodeId>;

    fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId>;

    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>>;

    fn child_nodes(&self, node: NodeId) -> DomResult<Vec<NodeId>>;

    /// Upper-cased tag name, `None` for non-element nodes.
    fn tag_name(&self, node: NodeId) -> DomResult<Option<String>>;

    fn get_attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()>;

    fn text_content(&self, node: NodeId) -> DomResult<String>;

    /// `Node.contains`: inclusive descendant check. Unknown nodes are never contained.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent_node(current).ok().flatten();
        }
        false
    }

    /// `Node.getRootNode()` without shadow roots: the topmost ancestor.
    fn root_node(&self, node: NodeId) -> DomResult<NodeId> {
        let mut current = node;
        while let Some(parent) = self.parent_node(current)? {
            current = parent;
        }
        Ok(current)
    }
}

/// True when `tag_name` names `expected` (case-insensitive, as HTML tag names are).
pub fn is_tag(tag_name: Option<&str>, expected: &str) -> bool {
    tag_name.is_some_and(|tag| tag.eq_ignore_ascii_case(expected))
}

//! Arena DOM used by the unit tests, with a log of the native calls it served.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use url::Url;

use super::{AppInstance, AppInstanceMap, AppRegistry, ElementSandbox, GlobalId, SandboxContext};
use crate::dom::{DomError, DomResult, NativeDom, NodeId};

#[derive(Debug, Clone, Default)]
struct FakeNode {
    tag: Option<String>,
    is_text: bool,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCall {
    pub method: &'static str,
    pub receiver: NodeId,
}

#[derive(Debug, Default)]
pub struct FakeDom {
    nodes: Vec<FakeNode>,
    calls: Rc<RefCell<Vec<NativeCall>>>,
}

impl FakeDom {
    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.borrow().clone()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[node].children.clone()
    }

    fn alloc(&mut self, node: FakeNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn alloc_element(&mut self, tag: &str, parent: Option<NodeId>) -> NodeId {
        let id = self.alloc(FakeNode {
            tag: Some(tag.to_ascii_uppercase()),
            ..FakeNode::default()
        });
        if let Some(parent) = parent {
            self.nodes[id].parent = Some(parent);
            self.nodes[parent].children.push(id);
        }
        id
    }

    fn record(&self, method: &'static str, receiver: NodeId) {
        self.calls.borrow_mut().push(NativeCall { method, receiver });
    }

    fn check(&self, node: NodeId) -> DomResult<&FakeNode> {
        self.nodes.get(node).ok_or(DomError::MissingNode(node))
    }

    fn ensure_insertable(&self, parent: NodeId, node: NodeId) -> DomResult<()> {
        let parent_is_text = self.check(parent)?.is_text;
        self.check(node)?;
        if parent_is_text || self.contains(node, parent) {
            return Err(DomError::HierarchyRequest { node, parent });
        }
        Ok(())
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node].parent.take() {
            self.nodes[parent].children.retain(|child| *child != node);
        }
    }

    fn clone_subtree(&mut self, node: NodeId, deep: bool) -> NodeId {
        let source = self.nodes[node].clone();
        let clone = self.alloc(FakeNode {
            parent: None,
            children: Vec::new(),
            ..source.clone()
        });
        if deep {
            for child in source.children {
                let child_clone = self.clone_subtree(child, true);
                self.nodes[child_clone].parent = Some(clone);
                self.nodes[clone].children.push(child_clone);
            }
        }
        clone
    }
}

impl NativeDom for FakeDom {
    fn document_node(&self) -> NodeId {
        0
    }

    fn document_element(&self) -> Option<NodeId> {
        self.nodes[0].children.first().copied()
    }

    fn head(&self) -> Option<NodeId> {
        Some(Page::HEAD)
    }

    fn body(&self) -> Option<NodeId> {
        Some(Page::BODY)
    }

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId> {
        Ok(self.alloc_element(tag, None))
    }

    fn create_text_node(&mut self, data: &str) -> DomResult<NodeId> {
        Ok(self.alloc(FakeNode {
            is_text: true,
            text: data.to_string(),
            ..FakeNode::default()
        }))
    }

    fn append_child(&mut self, parent: NodeId, node: NodeId) -> DomResult<NodeId> {
        self.record("appendChild", parent);
        self.ensure_insertable(parent, node)?;
        self.detach(node);
        self.nodes[node].parent = Some(parent);
        self.nodes[parent].children.push(node);
        Ok(node)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<NodeId> {
        self.record("insertBefore", parent);
        let Some(reference) = reference else {
            self.ensure_insertable(parent, node)?;
            self.detach(node);
            self.nodes[node].parent = Some(parent);
            self.nodes[parent].children.push(node);
            return Ok(node);
        };
        self.ensure_insertable(parent, node)?;
        if self.check(reference)?.parent != Some(parent) {
            return Err(DomError::NotAChild {
                node: reference,
                parent,
            });
        }
        if reference == node {
            return Ok(node);
        }
        self.detach(node);
        let index = self.nodes[parent]
            .children
            .iter()
            .position(|child| *child == reference)
            .ok_or(DomError::NotAChild {
                node: reference,
                parent,
            })?;
        self.nodes[node].parent = Some(parent);
        self.nodes[parent].children.insert(index, node);
        Ok(node)
    }

    fn replace_child(
        &mut self,
        parent: NodeId,
        node: NodeId,
        child: NodeId,
    ) -> DomResult<NodeId> {
        self.record("replaceChild", parent);
        self.ensure_insertable(parent, node)?;
        if self.check(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild {
                node: child,
                parent,
            });
        }
        if child == node {
            return Ok(child);
        }
        self.detach(node);
        let index = self.nodes[parent]
            .children
            .iter()
            .position(|existing| *existing == child)
            .ok_or(DomError::NotAChild {
                node: child,
                parent,
            })?;
        self.nodes[parent].children[index] = node;
        self.nodes[node].parent = Some(parent);
        self.nodes[child].parent = None;
        Ok(child)
    }

    fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        self.record("cloneNode", node);
        self.check(node)?;
        Ok(self.clone_subtree(node, deep))
    }

    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        Ok(self.check(node)?.parent)
    }

    fn child_nodes(&self, node: NodeId) -> DomResult<Vec<NodeId>> {
        Ok(self.check(node)?.children.clone())
    }

    fn tag_name(&self, node: NodeId) -> DomResult<Option<String>> {
        Ok(self.check(node)?.tag.clone())
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        Ok(self
            .check(node)?
            .attrs
            .get(&name.to_ascii_lowercase())
            .cloned())
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        if self.check(node)?.tag.is_none() {
            return Err(DomError::NotAnElement(node));
        }
        self.nodes[node]
            .attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> DomResult<String> {
        let current = self.check(node)?;
        let mut text = current.text.clone();
        for child in &current.children {
            text.push_str(&self.text_content(*child)?);
        }
        Ok(text)
    }
}

/// Node ids of the page every fixture starts from:
///
/// ```text
/// #document
/// └── html
///     ├── head
///     └── body
///         └── micro-app name="child"
///             ├── micro-app-head
///             └── micro-app-body
/// ```
/// plus a detached node standing in for the isolated document.
pub struct Page;

impl Page {
    pub const DOCUMENT: NodeId = 0;
    pub const HTML: NodeId = 1;
    pub const HEAD: NodeId = 2;
    pub const BODY: NodeId = 3;
    pub const CONTAINER: NodeId = 4;
    pub const VIRTUAL_HEAD: NodeId = 5;
    pub const VIRTUAL_BODY: NodeId = 6;
    pub const ISOLATED_DOCUMENT: NodeId = 7;
}

pub const APP_NAME: &str = "child";
pub const APP_GLOBAL: GlobalId = GlobalId(9);

pub fn page() -> FakeDom {
    let mut dom = FakeDom::default();
    let document = dom.alloc(FakeNode::default());
    let html = dom.alloc_element("html", Some(document));
    dom.alloc_element("head", Some(html));
    let body = dom.alloc_element("body", Some(html));
    let container = dom.alloc_element("micro-app", Some(body));
    dom.alloc_element("micro-app-head", Some(container));
    dom.alloc_element("micro-app-body", Some(container));
    dom.alloc(FakeNode::default());
    dom
}

pub fn sandbox(mounted: bool) -> (ElementSandbox<FakeDom>, Rc<AppInstanceMap>) {
    let registry = Rc::new(AppInstanceMap::new());
    registry.insert(
        APP_NAME,
        AppInstance {
            container: mounted.then_some(Page::CONTAINER),
            global: APP_GLOBAL,
            document: Page::ISOLATED_DOCUMENT,
        },
    );
    let context = SandboxContext::new(
        APP_NAME,
        APP_GLOBAL,
        Page::ISOLATED_DOCUMENT,
        Page::VIRTUAL_HEAD,
        Page::VIRTUAL_BODY,
        &Url::parse("https://host/app/").expect("valid app url"),
    );
    let sandbox = ElementSandbox::new(page(), context, Rc::clone(&registry) as Rc<dyn AppRegistry>)
        .expect("fake page has head and body");
    (sandbox, registry)
}

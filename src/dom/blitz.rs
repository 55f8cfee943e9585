use blitz_dom::node::{Node, NodeData};
use blitz_dom::{ns, BaseDocument, DocumentConfig, DocumentMutator, LocalName, QualName};
use blitz_html::HtmlDocument;
use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{DomError, DomResult, NativeDom, NodeId};

/// [`NativeDom`] over a parsed Blitz document.
///
/// Mutations go through `DocumentMutator`, so the document stays consistent with what the
/// renderer expects (style invalidation, layout children).
pub struct BlitzDom {
    document: HtmlDocument,
}

impl BlitzDom {
    pub fn new(document: HtmlDocument) -> Self {
        Self { document }
    }

    pub fn from_html(html: &str) -> Self {
        Self::new(HtmlDocument::from_html(html, DocumentConfig::default()))
    }

    pub fn document(&self) -> &BaseDocument {
        &self.document
    }

    pub fn into_inner(self) -> HtmlDocument {
        self.document
    }

    fn base(&self) -> &BaseDocument {
        &self.document
    }

    fn base_mut(&mut self) -> &mut BaseDocument {
        &mut self.document
    }

    fn node(&self, node_id: NodeId) -> DomResult<&Node> {
        self.base()
            .get_node(node_id)
            .ok_or(DomError::MissingNode(node_id))
    }

    fn element_name(node: &Node) -> Option<&str> {
        match &node.data {
            NodeData::Element(data) => Some(data.name.local.as_ref()),
            _ => None,
        }
    }

    fn html_name(name: &str) -> QualName {
        QualName::new(None, ns!(html), LocalName::from(name))
    }

    fn find_child_element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let parent = self.base().get_node(parent)?;
        parent.children.iter().copied().find(|child| {
            self.base()
                .get_node(*child)
                .and_then(Self::element_name)
                .is_some_and(|local| local.eq_ignore_ascii_case(name))
        })
    }

    /// Rejects parents that cannot hold children and inserting `node` into itself or one of
    /// its descendants.
    fn ensure_insertable(&self, parent: NodeId, node: NodeId) -> DomResult<()> {
        let can_have_children = matches!(
            self.node(parent)?.data,
            NodeData::Element(_) | NodeData::Document
        );
        self.node(node)?;
        if !can_have_children || self.contains(node, parent) {
            return Err(DomError::HierarchyRequest { node, parent });
        }
        Ok(())
    }

    fn ensure_child_of(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if self.node(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild {
                node: child,
                parent,
            });
        }
        Ok(())
    }

    fn detach(mutator: &mut DocumentMutator<'_>, node: NodeId, parent: Option<NodeId>) {
        if parent.is_some() {
            mutator.remove_node(node);
        }
    }

    pub fn serialize_document(&self) -> DomResult<String> {
        let mut output = String::new();
        output.push_str("<!DOCTYPE html>");
        self.serialize_children(self.document_node(), &mut output)?;
        Ok(output)
    }

    pub fn outer_html(&self, node_id: NodeId) -> DomResult<String> {
        let mut output = String::new();
        self.serialize_node(node_id, &mut output)?;
        Ok(output)
    }

    fn serialize_children(&self, node_id: NodeId, output: &mut String) -> DomResult<()> {
        for child in &self.node(node_id)?.children {
            self.serialize_node(*child, output)?;
        }
        Ok(())
    }

    fn serialize_node(&self, node_id: NodeId, output: &mut String) -> DomResult<()> {
        let node = self.node(node_id)?;
        match &node.data {
            NodeData::Document | NodeData::AnonymousBlock(_) => {
                self.serialize_children(node_id, output)?;
            }
            NodeData::Element(data) => {
                output.push('<');
                output.push_str(data.name.local.as_ref());
                for attr in data.attrs.iter() {
                    output.push(' ');
                    output.push_str(attr.name.local.as_ref());
                    output.push_str("=\"");
                    output.push_str(&encode_double_quoted_attribute(&attr.value));
                    output.push('"');
                }
                output.push('>');
                self.serialize_children(node_id, output)?;
                output.push_str("</");
                output.push_str(data.name.local.as_ref());
                output.push('>');
            }
            NodeData::Text(text) => {
                output.push_str(&encode_text(&text.content));
            }
            NodeData::Comment => output.push_str("<!---->"),
        }
        Ok(())
    }
}

impl NativeDom for BlitzDom {
    fn document_node(&self) -> NodeId {
        self.base().root_node().id
    }

    fn document_element(&self) -> Option<NodeId> {
        let root = self.base().root_node();
        root.children.iter().copied().find(|child| {
            self.base()
                .get_node(*child)
                .and_then(Self::element_name)
                .is_some()
        })
    }

    fn head(&self) -> Option<NodeId> {
        self.find_child_element(self.document_element()?, "head")
    }

    fn body(&self) -> Option<NodeId> {
        self.find_child_element(self.document_element()?, "body")
    }

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId> {
        let name = Self::html_name(&tag.to_ascii_lowercase());
        let mut mutator = DocumentMutator::new(self.base_mut());
        Ok(mutator.create_element(name, Vec::new()))
    }

    fn create_text_node(&mut self, data: &str) -> DomResult<NodeId> {
        let mut mutator = DocumentMutator::new(self.base_mut());
        Ok(mutator.create_text_node(data))
    }

    fn append_child(&mut self, parent: NodeId, node: NodeId) -> DomResult<NodeId> {
        self.ensure_insertable(parent, node)?;
        let previous_parent = self.node(node)?.parent;
        let mut mutator = DocumentMutator::new(self.base_mut());
        Self::detach(&mut mutator, node, previous_parent);
        mutator.append_children(parent, &[node]);
        Ok(node)
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<NodeId> {
        let Some(reference) = reference else {
            return self.append_child(parent, node);
        };
        self.ensure_insertable(parent, node)?;
        self.ensure_child_of(parent, reference)?;
        if reference == node {
            return Ok(node);
        }

        let previous_parent = self.node(node)?.parent;
        let mut mutator = DocumentMutator::new(self.base_mut());
        Self::detach(&mut mutator, node, previous_parent);
        mutator.insert_nodes_before(reference, &[node]);
        Ok(node)
    }

    fn replace_child(
        &mut self,
        parent: NodeId,
        node: NodeId,
        child: NodeId,
    ) -> DomResult<NodeId> {
        self.ensure_insertable(parent, node)?;
        self.ensure_child_of(parent, child)?;
        if child == node {
            return Ok(child);
        }

        let previous_parent = self.node(node)?.parent;
        let mut mutator = DocumentMutator::new(self.base_mut());
        Self::detach(&mut mutator, node, previous_parent);
        mutator.replace_node_with(child, &[node]);
        Ok(child)
    }

    fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        self.node(node)?;
        let mut mutator = DocumentMutator::new(self.base_mut());
        let cloned = mutator.deep_clone_node(node);
        if !deep {
            mutator.remove_and_drop_all_children(cloned);
        }
        Ok(cloned)
    }

    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    fn child_nodes(&self, node: NodeId) -> DomResult<Vec<NodeId>> {
        Ok(self.node(node)?.children.clone())
    }

    fn tag_name(&self, node: NodeId) -> DomResult<Option<String>> {
        Ok(Self::element_name(self.node(node)?).map(|name| name.to_ascii_uppercase()))
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        let attr_name = LocalName::from(name.to_ascii_lowercase().as_str());
        Ok(self.node(node)?.attr(attr_name).map(|value| value.to_string()))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        if Self::element_name(self.node(node)?).is_none() {
            return Err(DomError::NotAnElement(node));
        }
        let name = Self::html_name(&name.to_ascii_lowercase());
        let mut mutator = DocumentMutator::new(self.base_mut());
        mutator.set_attribute(node, name, value);
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> DomResult<String> {
        Ok(self.node(node)?.text_content())
    }
}

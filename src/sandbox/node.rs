use super::ElementSandbox;
use crate::dom::{is_tag, DomResult, NativeDom, NodeId};

impl<D: NativeDom> ElementSandbox<D> {
    /// `Node.prototype.appendChild`.
    pub fn append_child(&mut self, receiver: NodeId, node: NodeId) -> DomResult<NodeId> {
        self.tag(node);
        if self.is_pure_node(node)? {
            return self.dom.append_child(receiver, node);
        }

        if let Some(target) = self.redirect(receiver) {
            tracing::debug!(
                target: "sandbox",
                app = %self.context.name(),
                receiver,
                resolved = target,
                node,
                "appendChild redirected"
            );
            return self.dom.append_child(target, node);
        }
        self.dom.append_child(receiver, node)
    }

    /// `Node.prototype.insertBefore`.
    ///
    /// When redirected and `child` is not inside the real target (it usually still sits in the
    /// placeholder), the node is appended to the real target instead.
    pub fn insert_before(
        &mut self,
        receiver: NodeId,
        node: NodeId,
        child: Option<NodeId>,
    ) -> DomResult<NodeId> {
        self.tag(node);
        if self.is_pure_node(node)? {
            return self.dom.insert_before(receiver, node, child);
        }

        if let Some(target) = self.redirect(receiver) {
            return match child {
                Some(child) if self.dom.contains(target, child) => {
                    tracing::debug!(
                        target: "sandbox",
                        app = %self.context.name(),
                        receiver,
                        resolved = target,
                        node,
                        "insertBefore redirected"
                    );
                    self.dom.insert_before(target, node, Some(child))
                }
                _ => {
                    tracing::debug!(
                        target: "sandbox",
                        app = %self.context.name(),
                        receiver,
                        resolved = target,
                        node,
                        ?child,
                        "insertBefore fell back to appendChild"
                    );
                    self.dom.append_child(target, node)
                }
            };
        }
        self.dom.insert_before(receiver, node, child)
    }

    /// `Node.prototype.replaceChild`.
    ///
    /// When redirected and `child` is not inside the real target, `node` is appended to the real
    /// target and `child` is returned without being removed from wherever it lives. Callers get a
    /// non-throwing but weaker result than the native replace.
    pub fn replace_child(
        &mut self,
        receiver: NodeId,
        node: NodeId,
        child: NodeId,
    ) -> DomResult<NodeId> {
        self.tag(node);
        if self.is_pure_node(node)? {
            return self.dom.replace_child(receiver, node, child);
        }

        if let Some(target) = self.redirect(receiver) {
            if !self.dom.contains(target, child) {
                tracing::debug!(
                    target: "sandbox",
                    app = %self.context.name(),
                    receiver,
                    resolved = target,
                    node,
                    child,
                    "replaceChild fell back to appendChild"
                );
                self.dom.append_child(target, node)?;
                return Ok(child);
            }
            tracing::debug!(
                target: "sandbox",
                app = %self.context.name(),
                receiver,
                resolved = target,
                node,
                "replaceChild redirected"
            );
            return self.dom.replace_child(target, node, child);
        }
        self.dom.replace_child(receiver, node, child)
    }

    /// `Node.prototype.cloneNode`. The clone carries the same owner as the source.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        let cloned = self.dom.clone_node(node, deep)?;
        Ok(self.tag(cloned))
    }

    /// `Node.prototype.parentNode` getter.
    ///
    /// A parent that is a body placeholder reads as the real body while the app is mounted, so
    /// `node.parentNode === document.body` holds for nodes the app rendered into its body.
    pub fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        self.request_parent_pointer_correction();

        if let Some(parent) = self.parent_pointer.parent_override(node) {
            return Ok(Some(parent));
        }

        let Some(parent) = self.dom.parent_node(node)? else {
            return Ok(None);
        };
        let is_body_placeholder = self
            .dom
            .tag_name(parent)?
            .is_some_and(|tag| tag == self.body_placeholder_tag);
        if is_body_placeholder && self.is_mounted() {
            return Ok(Some(self.resolver.real_body()));
        }
        Ok(Some(parent))
    }

    /// `Node.prototype.getRootNode`. A tree rooted at the app's container reads as rooted at the
    /// isolated document.
    pub fn get_root_node(&self, node: NodeId) -> DomResult<NodeId> {
        let root = self.dom.root_node(node)?;
        if Some(root) == self.active_container() {
            return Ok(self.context.isolated_document());
        }
        Ok(root)
    }

    fn is_pure_node(&self, node: NodeId) -> DomResult<bool> {
        let tag = self.dom.tag_name(node)?;
        let pure = (is_tag(tag.as_deref(), "script") || is_tag(tag.as_deref(), "base"))
            && self.pure_nodes.is_pure(node);
        if pure {
            tracing::trace!(
                target: "sandbox",
                app = %self.context.name(),
                node,
                "pure node bypasses redirection"
            );
        }
        Ok(pure)
    }

    /// The real node a call on `receiver` should land on, if it differs from `receiver`.
    fn redirect(&self, receiver: NodeId) -> Option<NodeId> {
        let target = self.resolver.resolve(receiver);
        if target == receiver || !self.is_mounted() {
            return None;
        }
        Some(target)
    }

    /// Makes the page's document element report the isolated document as its parent, deferred
    /// to the end of the burst. Never fails.
    fn request_parent_pointer_correction(&self) {
        let Some(root_element) = self.dom.document_element() else {
            return;
        };
        if self.parent_pointer.parent_override(root_element).is_some() {
            return;
        }
        let native_parent = self.dom.parent_node(root_element).ok().flatten();
        if native_parent != Some(self.dom.document_node()) {
            return;
        }
        self.parent_pointer
            .schedule_correction(root_element, self.context.isolated_document());
    }
}

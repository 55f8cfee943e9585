use crate::dom::NodeId;

/// Maps the virtual head/body placeholders onto the real document's head/body.
#[derive(Debug, Clone, Copy)]
pub struct TargetResolver {
    virtual_head: NodeId,
    virtual_body: NodeId,
    real_head: NodeId,
    real_body: NodeId,
}

impl TargetResolver {
    pub fn new(
        virtual_head: NodeId,
        virtual_body: NodeId,
        real_head: NodeId,
        real_body: NodeId,
    ) -> Self {
        Self {
            virtual_head,
            virtual_body,
            real_head,
            real_body,
        }
    }

    /// Only ever applied to the receiver of a call, never to the node being inserted.
    pub fn resolve(&self, node: NodeId) -> NodeId {
        if node == self.virtual_head {
            self.real_head
        } else if node == self.virtual_body {
            self.real_body
        } else {
            node
        }
    }

    pub fn real_head(&self) -> NodeId {
        self.real_head
    }

    pub fn real_body(&self) -> NodeId {
        self.real_body
    }
}

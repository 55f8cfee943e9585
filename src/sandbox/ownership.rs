use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::context::GlobalId;
use crate::dom::NodeId;

/// Which sub-application a node belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub app_name: String,
    pub global: GlobalId,
}

/// Stamps nodes with the app that introduced them. Tagging returns the same node.
pub trait OwnershipTagger {
    fn tag(&self, node: NodeId, global: GlobalId, app_name: &str) -> NodeId;

    fn owner(&self, node: NodeId) -> Option<Ownership>;
}

/// Flags script/base elements that sandbox-internal code already placed.
pub trait PureNodeMarker {
    fn is_pure(&self, node: NodeId) -> bool;
}

/// Side table holding per-node sandbox metadata.
#[derive(Debug, Default)]
pub struct ElementInfo {
    owners: RefCell<HashMap<NodeId, Ownership>>,
    pure: RefCell<HashSet<NodeId>>,
}

impl ElementInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_pure(&self, node: NodeId) {
        self.pure.borrow_mut().insert(node);
    }

    pub fn clear_pure(&self, node: NodeId) {
        self.pure.borrow_mut().remove(&node);
    }

    /// Drops every record belonging to `app_name`, e.g. once the app is destroyed.
    pub fn forget_app(&self, app_name: &str) {
        let mut owners = self.owners.borrow_mut();
        let dropped: Vec<NodeId> = owners
            .iter()
            .filter(|(_, owner)| owner.app_name == app_name)
            .map(|(node, _)| *node)
            .collect();
        let mut pure = self.pure.borrow_mut();
        for node in dropped {
            owners.remove(&node);
            pure.remove(&node);
        }
    }
}

impl OwnershipTagger for ElementInfo {
    fn tag(&self, node: NodeId, global: GlobalId, app_name: &str) -> NodeId {
        self.owners.borrow_mut().insert(
            node,
            Ownership {
                app_name: app_name.to_string(),
                global,
            },
        );
        node
    }

    fn owner(&self, node: NodeId) -> Option<Ownership> {
        self.owners.borrow().get(&node).cloned()
    }
}

impl PureNodeMarker for ElementInfo {
    fn is_pure(&self, node: NodeId) -> bool {
        self.pure.borrow().contains(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retagging_moves_ownership() {
        let info = ElementInfo::new();
        assert_eq!(info.tag(5, GlobalId(1), "first"), 5);
        info.tag(5, GlobalId(2), "second");
        assert_eq!(
            info.owner(5),
            Some(Ownership {
                app_name: "second".into(),
                global: GlobalId(2),
            })
        );
    }

    #[test]
    fn forget_app_only_drops_its_nodes() {
        let info = ElementInfo::new();
        info.tag(1, GlobalId(1), "a");
        info.tag(2, GlobalId(2), "b");
        info.mark_pure(1);

        info.forget_app("a");
        assert!(info.owner(1).is_none());
        assert!(!info.is_pure(1));
        assert!(info.owner(2).is_some());
    }
}

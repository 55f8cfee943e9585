//! Structural sandbox for sub-applications.
//!
//! An [`ElementSandbox`] wraps the native node operations of a page for one sub-application. The
//! app manipulates what it believes is its own document; calls whose receiver is one of its
//! virtual `<micro-app-head>`/`<micro-app-body>` placeholders are redirected to the real
//! head/body while the app is mounted, resource URLs are completed against the app's base URL and
//! every node the app introduces is tagged with its owner.

mod attribute;
mod context;
mod image;
mod node;
mod ownership;
mod resolver;
mod scheduler;
#[cfg(test)]
mod testing;
pub mod url;

pub use attribute::UrlProperty;
pub use context::{AppInstance, AppInstanceMap, AppRegistry, GlobalId, SandboxContext};
pub use ownership::{ElementInfo, Ownership, OwnershipTagger, PureNodeMarker};
pub use resolver::TargetResolver;
pub use scheduler::{MicrotaskQueue, ParentPointerScheduler};

use std::rc::Rc;

use thiserror::Error;

use crate::dom::{DomError, NativeDom, NodeId};

pub const DEFAULT_BODY_PLACEHOLDER_TAG: &str = "micro-app-body";
pub const DEFAULT_HEAD_PLACEHOLDER_TAG: &str = "micro-app-head";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("document has no <{0}> element")]
    MissingDocumentElement(&'static str),
    #[error("<{tag}> has no `{property}` URL property")]
    UnsupportedProperty { tag: String, property: String },
}

/// The patched node surface of one sub-application.
pub struct ElementSandbox<D> {
    dom: D,
    context: SandboxContext,
    registry: Rc<dyn AppRegistry>,
    tagger: Rc<dyn OwnershipTagger>,
    pure_nodes: Rc<dyn PureNodeMarker>,
    resolver: TargetResolver,
    queue: Rc<MicrotaskQueue>,
    parent_pointer: ParentPointerScheduler,
    body_placeholder_tag: String,
}

impl<D: NativeDom> ElementSandbox<D> {
    /// Fails when the real document has no head or body to redirect to.
    pub fn new(
        dom: D,
        context: SandboxContext,
        registry: Rc<dyn AppRegistry>,
    ) -> Result<Self, SandboxError> {
        let real_head = dom
            .head()
            .ok_or(SandboxError::MissingDocumentElement("head"))?;
        let real_body = dom
            .body()
            .ok_or(SandboxError::MissingDocumentElement("body"))?;
        let resolver = TargetResolver::new(
            context.virtual_head(),
            context.virtual_body(),
            real_head,
            real_body,
        );

        let element_info = Rc::new(ElementInfo::new());
        let queue = Rc::new(MicrotaskQueue::new());
        Ok(Self {
            dom,
            context,
            registry,
            tagger: Rc::clone(&element_info) as Rc<dyn OwnershipTagger>,
            pure_nodes: element_info as Rc<dyn PureNodeMarker>,
            resolver,
            parent_pointer: ParentPointerScheduler::new(Rc::clone(&queue)),
            queue,
            body_placeholder_tag: DEFAULT_BODY_PLACEHOLDER_TAG.to_ascii_uppercase(),
        })
    }

    /// Shares one metadata table between several sandboxes (or with the host).
    pub fn with_element_info(mut self, element_info: Rc<ElementInfo>) -> Self {
        self.tagger = Rc::clone(&element_info) as Rc<dyn OwnershipTagger>;
        self.pure_nodes = element_info as Rc<dyn PureNodeMarker>;
        self
    }

    pub fn with_tagger(mut self, tagger: Rc<dyn OwnershipTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_pure_marker(mut self, pure_nodes: Rc<dyn PureNodeMarker>) -> Self {
        self.pure_nodes = pure_nodes;
        self
    }

    /// Uses an externally driven microtask queue instead of the sandbox's own.
    pub fn with_queue(mut self, queue: Rc<MicrotaskQueue>) -> Self {
        self.parent_pointer = ParentPointerScheduler::new(Rc::clone(&queue));
        self.queue = queue;
        self
    }

    pub fn with_body_placeholder_tag(mut self, tag: &str) -> Self {
        self.body_placeholder_tag = tag.to_ascii_uppercase();
        self
    }

    pub fn context(&self) -> &SandboxContext {
        &self.context
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn into_dom(self) -> D {
        self.dom
    }

    pub fn owner(&self, node: NodeId) -> Option<Ownership> {
        self.tagger.owner(node)
    }

    pub fn parent_pointer(&self) -> &ParentPointerScheduler {
        &self.parent_pointer
    }

    /// Where the app is mounted right now, if anywhere.
    pub fn active_container(&self) -> Option<NodeId> {
        self.registry
            .lookup(self.context.name())
            .and_then(|instance| instance.container)
    }

    pub fn is_mounted(&self) -> bool {
        self.active_container().is_some()
    }

    /// `document.head` as the app sees it: the real head while mounted, the placeholder otherwise.
    pub fn document_head(&self) -> NodeId {
        if self.is_mounted() {
            self.resolver.real_head()
        } else {
            self.context.virtual_head()
        }
    }

    /// `document.body` as the app sees it: the real body while mounted, the placeholder otherwise.
    pub fn document_body(&self) -> NodeId {
        if self.is_mounted() {
            self.resolver.real_body()
        } else {
            self.context.virtual_body()
        }
    }

    /// Marks the end of a synchronous execution burst and runs everything deferred to it.
    pub fn end_burst(&self) -> usize {
        self.queue.run_until_idle()
    }

    fn tag(&self, node: NodeId) -> NodeId {
        self.tagger
            .tag(node, self.context.global(), self.context.name())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::testing::{sandbox, Page, APP_GLOBAL, APP_NAME};
    use super::*;

    #[derive(Default)]
    struct RecordingTagger {
        tagged: RefCell<Vec<(NodeId, GlobalId, String)>>,
    }

    impl OwnershipTagger for RecordingTagger {
        fn tag(&self, node: NodeId, global: GlobalId, app_name: &str) -> NodeId {
            self.tagged
                .borrow_mut()
                .push((node, global, app_name.to_string()));
            node
        }

        fn owner(&self, node: NodeId) -> Option<Ownership> {
            self.tagged
                .borrow()
                .iter()
                .rev()
                .find(|(tagged, _, _)| *tagged == node)
                .map(|(_, global, app_name)| Ownership {
                    app_name: app_name.clone(),
                    global: *global,
                })
        }
    }

    struct AllPure;

    impl PureNodeMarker for AllPure {
        fn is_pure(&self, _node: NodeId) -> bool {
            true
        }
    }

    #[test]
    fn injected_tagger_sees_every_inserted_node() {
        let tagger = Rc::new(RecordingTagger::default());
        let (sandbox, _) = sandbox(true);
        let mut sandbox = sandbox.with_tagger(Rc::clone(&tagger) as Rc<dyn OwnershipTagger>);
        let div = sandbox.dom_mut().create_element("div").unwrap();

        sandbox.append_child(Page::VIRTUAL_BODY, div).unwrap();
        let clone = sandbox.clone_node(div, false).unwrap();

        assert_eq!(
            *tagger.tagged.borrow(),
            vec![
                (div, APP_GLOBAL, APP_NAME.to_string()),
                (clone, APP_GLOBAL, APP_NAME.to_string()),
            ]
        );
        assert_eq!(sandbox.owner(clone).unwrap().app_name, APP_NAME);
    }

    #[test]
    fn injected_pure_marker_only_applies_to_script_and_base() {
        let (sandbox, _) = sandbox(true);
        let mut sandbox = sandbox.with_pure_marker(Rc::new(AllPure));
        let script = sandbox.dom_mut().create_element("script").unwrap();
        let style = sandbox.dom_mut().create_element("style").unwrap();

        sandbox.append_child(Page::VIRTUAL_HEAD, script).unwrap();
        sandbox.append_child(Page::VIRTUAL_HEAD, style).unwrap();

        assert_eq!(sandbox.dom().children(Page::VIRTUAL_HEAD), vec![script]);
        assert_eq!(sandbox.dom().children(Page::HEAD), vec![style]);
    }

    #[test]
    fn shared_queue_is_drained_by_its_owner() {
        let queue = Rc::new(MicrotaskQueue::new());
        let (sandbox, _) = sandbox(true);
        let sandbox = sandbox.with_queue(Rc::clone(&queue));

        sandbox.parent_node(Page::HTML).unwrap();
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(
            sandbox.parent_node(Page::HTML),
            Ok(Some(Page::ISOLATED_DOCUMENT))
        );
        assert_eq!(sandbox.end_burst(), 0);
    }

    #[test]
    fn document_head_and_body_follow_mount_state() {
        let (sandbox, registry) = sandbox(false);
        assert_eq!(sandbox.document_head(), Page::VIRTUAL_HEAD);
        assert_eq!(sandbox.document_body(), Page::VIRTUAL_BODY);

        registry.mount(APP_NAME, Page::CONTAINER);
        assert_eq!(sandbox.document_head(), Page::HEAD);
        assert_eq!(sandbox.document_body(), Page::BODY);
    }
}

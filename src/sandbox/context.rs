use std::cell::RefCell;
use std::collections::HashMap;

use url::Url;

use super::url::effective_base;
use crate::dom::NodeId;

/// Handle of a sub-application's isolated global object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u64);

/// Live mount state of one sub-application, as the registry reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstance {
    /// Where the app is currently rendered in the real page; `None` while unmounted.
    pub container: Option<NodeId>,
    pub global: GlobalId,
    pub document: NodeId,
}

impl AppInstance {
    pub fn is_mounted(&self) -> bool {
        self.container.is_some()
    }
}

/// Read-only view of the app registry. The sandbox never writes through it.
pub trait AppRegistry {
    fn lookup(&self, app_name: &str) -> Option<AppInstance>;
}

/// In-memory registry keyed by app name.
#[derive(Debug, Default)]
pub struct AppInstanceMap {
    apps: RefCell<HashMap<String, AppInstance>>,
}

impl AppInstanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, app_name: impl Into<String>, instance: AppInstance) {
        self.apps.borrow_mut().insert(app_name.into(), instance);
    }

    /// Records `container` as the app's mount point. Returns false for unknown apps.
    pub fn mount(&self, app_name: &str, container: NodeId) -> bool {
        match self.apps.borrow_mut().get_mut(app_name) {
            Some(instance) => {
                instance.container = Some(container);
                true
            }
            None => false,
        }
    }

    pub fn unmount(&self, app_name: &str) -> bool {
        match self.apps.borrow_mut().get_mut(app_name) {
            Some(instance) => {
                instance.container = None;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, app_name: &str) -> Option<AppInstance> {
        self.apps.borrow_mut().remove(app_name)
    }
}

impl AppRegistry for AppInstanceMap {
    fn lookup(&self, app_name: &str) -> Option<AppInstance> {
        self.apps.borrow().get(app_name).cloned()
    }
}

/// Identity of one sandboxed sub-application instance.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    name: String,
    global: GlobalId,
    isolated_document: NodeId,
    virtual_head: NodeId,
    virtual_body: NodeId,
    base_url: Url,
}

impl SandboxContext {
    /// `app_url` is where the app was loaded from; relative resource URLs resolve against it.
    pub fn new(
        name: impl Into<String>,
        global: GlobalId,
        isolated_document: NodeId,
        virtual_head: NodeId,
        virtual_body: NodeId,
        app_url: &Url,
    ) -> Self {
        Self {
            name: name.into(),
            global,
            isolated_document,
            virtual_head,
            virtual_body,
            base_url: effective_base(app_url),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global(&self) -> GlobalId {
        self.global
    }

    pub fn isolated_document(&self) -> NodeId {
        self.isolated_document
    }

    pub fn virtual_head(&self) -> NodeId {
        self.virtual_head
    }

    pub fn virtual_body(&self) -> NodeId {
        self.virtual_body
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> AppInstance {
        AppInstance {
            container: None,
            global: GlobalId(7),
            document: 42,
        }
    }

    #[test]
    fn mount_and_unmount_track_container() {
        let registry = AppInstanceMap::new();
        registry.insert("child", instance());
        assert!(!registry.lookup("child").unwrap().is_mounted());

        assert!(registry.mount("child", 3));
        assert_eq!(registry.lookup("child").unwrap().container, Some(3));

        assert!(registry.unmount("child"));
        assert_eq!(registry.lookup("child").unwrap().container, None);
    }

    #[test]
    fn unknown_apps_are_not_mounted() {
        let registry = AppInstanceMap::new();
        assert!(!registry.mount("ghost", 1));
        assert!(registry.lookup("ghost").is_none());
    }

    #[test]
    fn context_normalises_base_url() {
        let url = Url::parse("https://host/app?x=1#top").unwrap();
        let context = SandboxContext::new("child", GlobalId(1), 10, 11, 12, &url);
        assert_eq!(context.base_url().as_str(), "https://host/app/");
        assert_eq!(context.name(), "child");
    }
}

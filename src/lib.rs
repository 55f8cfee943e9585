// Library exports for the host binary and integration tests

pub mod config;
pub mod dom;
pub mod js;
pub mod sandbox;

pub use config::{ConfigError, SandboxConfig};
pub use dom::{BlitzDom, DomError, NativeDom, NodeId};
pub use js::SandboxEnvironment;
pub use sandbox::{AppInstance, AppInstanceMap, ElementSandbox, SandboxContext, SandboxError};

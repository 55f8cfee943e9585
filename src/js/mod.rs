//! QuickJS surface for a sandboxed sub-application.

mod environment;
mod runtime;

pub use environment::SandboxEnvironment;
pub use runtime::QuickJsEngine;

//! Extension runtime host core.
//!
//! Tracks loaded modules, the permissions granted to them, and the hosted
//! extension's lifecycle; checks for updates; and dispatches every state
//! change to registered listeners in commit order.

pub mod lifecycle;
pub mod manifest;
pub mod permissions;
pub mod registry;
pub mod runtime;
pub mod transport;
pub mod update;

pub use lifecycle::{ExtensionLifecycle, ExtensionPhase};
pub use manifest::ExtensionManifest;
pub use permissions::PermissionLedger;
pub use registry::{ModuleRecord, ModuleRegistry, ModuleStatus};
pub use runtime::{EventHandler, ExtensionRuntime, RuntimeBuilder};
pub use transport::{ChannelReloadHandler, ChannelTransport, ReloadRequest};
pub use update::{HttpUpdateSource, StaticUpdateSource, UpdateChecker, is_newer};

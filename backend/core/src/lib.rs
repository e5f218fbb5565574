pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use error::{RuntimeError, RuntimeResult};
pub use event::{EventKind, ExtensionMessage, RuntimeEvent};
pub use traits::{MessageTransport, ReloadHandler, UpdateSource};
pub use types::{Arch, ExtensionUpdate, ModuleState, Os, PlatformInfo, UpdateCheck, UpdateStatus};

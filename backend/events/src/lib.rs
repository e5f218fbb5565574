pub mod dispatcher;
pub mod listener;

pub use dispatcher::{DEFAULT_LISTENER_TIMEOUT, Delivery, DispatchReport, EventDispatcher, in_dispatch};
pub use listener::{EventRecorder, FnListener, Listener, ListenerRef, listener_fn, same_listener};

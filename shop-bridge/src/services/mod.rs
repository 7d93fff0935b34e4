pub mod delivery_log;
pub mod install;
pub mod platform_client;
pub mod session_store;
pub mod topic_handlers;
pub mod webhook_dispatcher;
pub mod webhook_registry;

pub use install::*;
pub use platform_client::*;
pub use session_store::*;
pub use webhook_dispatcher::*;
pub use webhook_registry::*;

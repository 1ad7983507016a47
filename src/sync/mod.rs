//! Everything that decides *when* the outbox gets drained.
//!
//! Two execution contexts share the store but nothing else:
//! - the foreground (HTTP surface + [`NetworkTrigger`]) owns the session token
//! - the background delegate ([`BackgroundSync`]) runs on its own task and
//!   obtains the token through the [`TokenBridge`]

pub mod background;
pub mod bridge;
pub mod connectivity;
pub mod messages;
pub mod trigger;

pub use background::{BackgroundHandle, BackgroundSync, RegistrationError, SyncRegistrar, SyncState};
pub use bridge::{PageConnection, TokenBridge};
pub use connectivity::Connectivity;
pub use messages::{ClientMessage, TokenReply, WorkerMessage};
pub use trigger::NetworkTrigger;

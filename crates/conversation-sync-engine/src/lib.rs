//! Synchronization and relay engine between Hostex conversations and
//! Matrix rooms.
//!
//! The engine keeps a 1:1 mapping between remote conversations and rooms:
//! a polling loop fetches the conversation list, lazily creates one room
//! per conversation ([`Portal`]), and backfills remote messages past the
//! stored timestamp cursor; a chat sync loop relays room messages back to
//! the remote service and feeds management commands typed into the control
//! room to the [`CommandDispatcher`]. All chat and remote traffic goes
//! through the [`ChatChannel`] and [`RemoteChannel`] traits so the whole
//! engine runs against scripted channels in tests.

mod adapters;
mod bridge;
mod channels;
mod commands;
mod context;
mod error;
mod portal;
#[cfg(test)]
mod test_support;

pub use adapters::{HostexRemoteChannel, MatrixChatChannel};
pub use bridge::{Bridge, EngineState};
pub use channels::{ChatChannel, RemoteChannel};
pub use commands::{Command, CommandDispatcher, HELP_TEXT, UNKNOWN_COMMAND_TEXT};
pub use context::{BridgeContext, BridgeSettings};
pub use error::{EngineError, EngineResult};
pub use portal::Portal;

//! relay-server - a WebSocket publish/subscribe relay.
//!
//! This is the library interface, exposing the concurrency core
//! (hub, channel, subscriber list, session) so integration tests can drive
//! a real listener without going through the CLI.

pub mod channel;
pub mod cli;
pub mod error;
pub mod hub;
pub mod message;
pub mod server;
pub mod session;
pub mod subscriber_list;

pub use cli::Cli;
pub use error::Error;
pub use hub::ChannelHub;

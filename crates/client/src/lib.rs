//! Payment-channel client orchestrator.
//!
//! Drives an external channel protocol engine through the open / pay /
//! settle lifecycle for a single participant, keeps a consistent view of the
//! account balance and the channel state, and fans every change out to
//! registered observers.
//!
//! # Components
//!
//! - [`BalanceStore`]: last-known on-chain balance
//! - [`ObserverRegistry`]: ordered observers plus state and balance broadcast
//! - [`PaymentChannel`]: wrapper around the engine's channel handle
//! - [`ChannelMailbox`]: single-slot handoff of accepted inbound channels
//! - [`BalancePoller`]: background chain balance polling
//! - [`spawn_watcher`]: background dispute watching
//! - [`ClientHandler`]: proposal and update policy invoked by the engine
//! - [`PaymentClient`]: the orchestrator itself

pub mod balance_poller;
pub mod balance_store;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod handler;
pub mod mailbox;
pub mod metrics;
pub mod observer;
pub mod watcher;

#[cfg(test)]
mod test_utils;

pub use balance_poller::BalancePoller;
pub use balance_store::BalanceStore;
pub use channel::PaymentChannel;
pub use client::PaymentClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use format::{render_balance, render_state, render_state_json};
pub use handler::ClientHandler;
pub use mailbox::ChannelMailbox;
pub use observer::{Observer, ObserverId, ObserverRegistry};
pub use watcher::{spawn_watcher, WatchReporter};

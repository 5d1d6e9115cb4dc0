#![doc = include_str!("../docs/rustdoc.md")]

/// Reconnecting live data channel.
pub mod channel;
/// Connection state and lifetime counters.
pub mod channel_state;
/// Command-line argument definitions.
pub mod cli;
/// Runtime configuration model.
pub mod config;
/// Error types used across the crate.
pub mod error;
/// Lifecycle events for presentation consumers.
pub mod events;
/// Terminal output formatters.
pub mod formatter;
/// Domain accumulators over the message stream.
pub mod market_feed;
/// Feed message model and wire codec.
pub mod message;
/// Metrics and health status structures.
pub mod monitoring;
/// Random message synthesis for the simulated feed.
pub mod simulator;
/// Subscriber registry and subscription handles.
pub mod subscribers;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Transport abstraction and its adapters.
pub mod transport;
/// UI controller and presentation loop.
pub mod ui;

/// Primary crate error type.
pub use error::ChannelError;
pub use channel::LiveChannel;
pub use message::ChannelMessage;

//! Part of [sparkbus](https://github.com/sparkbus/sparkbus), an entity state
//! and message routing layer for Sparkplug-style publish/subscribe telemetry.
//!
//! This library defines the traits and types used to implement sparkbus
//! transport clients. The connection itself (reconnects, TLS, the background
//! I/O loop) lives behind these traits.
//!
//! # Feature Flags
//!
//! - `channel-transport`: Enables the channel based [EventLoop] and
//!   [Transport] implementation. Disabled by default.

mod traits;
mod types;

pub use traits::{DynEventLoop, DynTransport, EventLoop, Transport};
pub use types::*;

/// A basic [EventLoop] and [Transport] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real
/// broker setup
#[cfg(any(feature = "channel-transport", doc))]
pub mod channel;

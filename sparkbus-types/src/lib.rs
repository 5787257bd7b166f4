//! Part of [sparkbus](https://github.com/sparkbus/sparkbus), an entity state
//! and message routing layer for Sparkplug-style publish/subscribe telemetry.
//!
//! This crate holds the leaf types shared by the rest of the workspace: the
//! topic namespace grammar, scalar metric values, the payload model and the
//! [PayloadCodec](payload::PayloadCodec) boundary trait.

pub mod constants;

pub mod payload;

pub mod topic;

pub mod utils;

mod value;

pub use value::*;

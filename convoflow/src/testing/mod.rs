//! Testing utilities for convoflow applications.
//!
//! This module provides:
//! - Sample conversation and value types with a ready registry
//! - A sample checkout action and sample handlers
//! - A recording bot client and a slow, write-logging record store

mod fixtures;
mod mocks;

pub use fixtures::{
    checkout_dispatcher, fixture_registry, Address, CancelButtonHandler, CheckoutContext,
    PingHandler,
};
pub use mocks::{RecordingBot, SentReply, SlowRecordStore};

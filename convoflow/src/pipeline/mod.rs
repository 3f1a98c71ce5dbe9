//! Event pipeline: inbound events, handlers and the ordered handler chain.
//!
//! This module provides:
//! - Normalized platform events (`Message`, `KeyboardResponse`)
//! - The `Handler` trait with declared capabilities
//! - `HandlerChain` with first-claim short-circuit
//! - Built-in handlers for active actions and command routing

mod bot;
mod chain;
mod context;
mod event;
mod handler;
mod handlers;
mod services;

pub use bot::BotClient;
#[cfg(test)]
pub use bot::MockBotClient;
pub use chain::{DispatchOutcome, HandlerChain, HandlerChainBuilder};
pub use context::PipelineContext;
pub use event::{InboundEvent, KeyboardResponse, Message};
pub use handler::{Capabilities, Handler, HandlerFlow};
pub use handlers::{ActiveStepHandler, CommandRouteHandler, CommandRoutes};
pub use services::ServiceScope;

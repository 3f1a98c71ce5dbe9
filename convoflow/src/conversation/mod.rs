//! Conversation state and step dispatch.
//!
//! A conversation is a base [`ConversationContext`] (id, cursor, data bag)
//! embedded in an application type. Its cursor names the action that owns
//! the dialogue and the step to run for the next event.

mod context;
mod dispatch;

pub use context::{ContextKind, ConversationContext, ConversationId, ConversationState};
pub use dispatch::{ActionDefinition, FnStep, Step, StepContext, StepDispatcher, StepOutcome};

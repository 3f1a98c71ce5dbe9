//! # Convoflow
//!
//! A conversation state engine for chat bots that talk to users across
//! several platforms.
//!
//! Convoflow keeps per-dialogue state between inbound events with support
//! for:
//!
//! - **Type-preserving state**: conversation objects and their data-bag
//!   values are stored with explicit type tags and come back as the same
//!   concrete types
//! - **Step dispatch**: actions are ordered lists of steps, driven by a cursor
//!   stored with the conversation
//! - **Handler chains**: ordered handlers with declared capabilities and
//!   first-claim short-circuit
//! - **Serialized persistence**: every load, save and delete of a conversation
//!   runs under that conversation's lock, with bounded waits for loads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convoflow::prelude::*;
//!
//! let dispatcher = StepDispatcher::new().with_action(
//!     ActionDefinition::new("Signup")
//!         .step_fn("ask_name", |cx| Ok(StepOutcome::Advance))
//!         .step_fn("done", |cx| Ok(StepOutcome::Terminate)),
//! );
//! let chain = HandlerChain::builder()
//!     .register::<ActiveStepHandler>()
//!     .register::<CommandRouteHandler>()
//!     .build()?;
//! let store = ConversationStore::new(Arc::new(InMemoryRecordStore::new()), Arc::new(TypeRegistry::new()));
//! let engine = ConversationEngine::new(store, chain, dispatcher, bot)
//!     .with_services(ServiceScope::new().with(CommandRoutes::new().route("signup", "Signup")));
//!
//! engine.handle_message(conversation_id, Message::new("42", "/signup")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod conversation;
pub mod data;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{CorruptRowPolicy, EngineConfig};
    pub use crate::conversation::{
        ActionDefinition, ContextKind, ConversationContext, ConversationId,
        ConversationState, FnStep, Step, StepContext, StepDispatcher, StepOutcome,
    };
    pub use crate::data::{ContextData, ContextDataSet, Tagged, TypeRegistry};
    pub use crate::engine::{
        ConversationEngine, ConversationFactory, Disposition, TurnOutcome, TurnReport,
    };
    pub use crate::errors::{
        ContentionError, ConvoflowError, DispatchError, FormatError, NotFoundError,
        StepExecutionError, TypeResolutionError,
    };
    pub use crate::pipeline::{
        ActiveStepHandler, BotClient, Capabilities, CommandRouteHandler, CommandRoutes,
        DispatchOutcome, Handler, HandlerChain, HandlerFlow, InboundEvent, KeyboardResponse,
        Message, PipelineContext, ServiceScope,
    };
    pub use crate::store::{
        ContextPacker, ConversationStore, FetchOutcome, InMemoryRecordStore,
        PackedConversation, RecordStore,
    };
}

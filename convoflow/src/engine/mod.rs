//! Turn orchestration: lock, load, dispatch, persist.

#[cfg(test)]
mod integration_tests;

use crate::config::EngineConfig;
use crate::conversation::{
    ConversationContext, ConversationId, ConversationState, StepDispatcher, StepOutcome,
};
use crate::errors::{ContentionError, Result};
use crate::pipeline::{
    BotClient, DispatchOutcome, HandlerChain, InboundEvent, KeyboardResponse, Message,
    PipelineContext, ServiceScope,
};
use crate::store::{ConversationLease, ConversationStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

type FactoryFn = dyn Fn(ConversationId) -> Box<dyn ConversationState> + Send + Sync;

/// Creates the state for a conversation seen for the first time.
#[derive(Clone)]
pub struct ConversationFactory(Arc<FactoryFn>);

impl ConversationFactory {
    /// Wraps a constructor.
    pub fn new<F>(create: F) -> Self
    where
        F: Fn(ConversationId) -> Box<dyn ConversationState> + Send + Sync + 'static,
    {
        Self(Arc::new(create))
    }

    /// Creates a plain [`ConversationContext`].
    #[must_use]
    pub fn base() -> Self {
        Self::new(|id| Box::new(ConversationContext::new(id)))
    }

    /// Creates the state for `conversation_id`.
    #[must_use]
    pub fn create(&self, conversation_id: ConversationId) -> Box<dyn ConversationState> {
        (self.0)(conversation_id)
    }
}

impl Default for ConversationFactory {
    fn default() -> Self {
        Self::base()
    }
}

impl fmt::Debug for ConversationFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConversationFactory")
    }
}

/// What happened to the stored row at the end of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The conversation was written back.
    Saved,
    /// The conversation ended and its row is gone.
    Deleted,
    /// A brand-new conversation nobody claimed; nothing was written.
    Discarded,
}

/// Summary of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// The conversation.
    pub conversation_id: ConversationId,
    /// Whether a handler claimed the event.
    pub dispatch: DispatchOutcome,
    /// Handler types that saw the event, in order.
    pub processed: Vec<&'static str>,
    /// The last step outcome applied, if a step ran.
    pub step_outcome: Option<StepOutcome>,
    /// What happened to the stored row.
    pub disposition: Disposition,
    /// True if the conversation was created by this turn.
    pub created: bool,
}

/// Result of offering one event to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The event was processed.
    Completed(TurnReport),
    /// Another turn held the conversation for longer than the turn timeout.
    Contended(ContentionError),
}

impl TurnOutcome {
    /// The report, if the turn completed.
    #[must_use]
    pub fn report(&self) -> Option<&TurnReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Contended(_) => None,
        }
    }

    /// Returns true for `Contended`.
    #[must_use]
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended(_))
    }
}

/// Runs inbound events through the handler chain with the conversation
/// locked for the whole turn.
#[derive(Clone)]
pub struct ConversationEngine {
    store: ConversationStore,
    chain: Arc<HandlerChain>,
    dispatcher: Arc<StepDispatcher>,
    bot: Arc<dyn BotClient>,
    services: ServiceScope,
    factory: ConversationFactory,
    turn_timeout: Duration,
    default_action: Option<String>,
}

impl ConversationEngine {
    /// Creates an engine with default turn settings.
    #[must_use]
    pub fn new(
        store: ConversationStore,
        chain: HandlerChain,
        dispatcher: StepDispatcher,
        bot: Arc<dyn BotClient>,
    ) -> Self {
        let defaults = EngineConfig::default();
        Self {
            store,
            chain: Arc::new(chain),
            dispatcher: Arc::new(dispatcher),
            bot,
            services: ServiceScope::new(),
            factory: ConversationFactory::default(),
            turn_timeout: defaults.turn_timeout(),
            default_action: defaults.default_action,
        }
    }

    /// Applies the turn settings of `config`.
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.turn_timeout = config.turn_timeout();
        self.default_action.clone_from(&config.default_action);
        self
    }

    /// Sets the services handed to handlers.
    #[must_use]
    pub fn with_services(mut self, services: ServiceScope) -> Self {
        self.services = services;
        self
    }

    /// Sets the constructor for new conversations.
    #[must_use]
    pub fn with_factory(mut self, factory: ConversationFactory) -> Self {
        self.factory = factory;
        self
    }

    /// The store.
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// The step dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &StepDispatcher {
        &self.dispatcher
    }

    /// Processes a chat message.
    pub async fn handle_message(
        &self,
        conversation_id: ConversationId,
        message: Message,
    ) -> Result<TurnOutcome> {
        self.handle_event(conversation_id, message.into()).await
    }

    /// Processes a keyboard response.
    pub async fn handle_keyboard(
        &self,
        conversation_id: ConversationId,
        response: KeyboardResponse,
    ) -> Result<TurnOutcome> {
        self.handle_event(conversation_id, response.into()).await
    }

    /// Processes any inbound event.
    ///
    /// # Errors
    ///
    /// Step, handler, dispatch, unpack and store failures. Nothing from the
    /// turn is persisted when an error is returned.
    #[instrument(
        name = "conversation_turn",
        skip_all,
        fields(conversation_id = %conversation_id, event = event.kind())
    )]
    pub async fn handle_event(
        &self,
        conversation_id: ConversationId,
        event: InboundEvent,
    ) -> Result<TurnOutcome> {
        let lease = match self.store.lease(conversation_id, Some(self.turn_timeout)).await {
            Ok(lease) => lease,
            Err(contended) => return Ok(TurnOutcome::Contended(contended)),
        };

        let (mut state, created) = match self.store.fetch_locked(&lease).await? {
            Some(state) => (state, false),
            None => (self.new_conversation(conversation_id), true),
        };

        let (dispatch, processed, step_outcome) = {
            let mut cx = PipelineContext::new(
                state.as_mut(),
                &self.dispatcher,
                self.bot.as_ref(),
                &self.services,
                &event,
            );
            let dispatch = self.chain.dispatch(&mut cx).await?;
            (dispatch, cx.processed().to_vec(), cx.last_outcome().cloned())
        };

        let disposition = self
            .persist(&lease, state.as_ref(), dispatch, step_outcome.as_ref(), created)
            .await?;

        debug!(?dispatch, ?disposition, created, "Turn completed");

        Ok(TurnOutcome::Completed(TurnReport {
            conversation_id,
            dispatch,
            processed,
            step_outcome,
            disposition,
            created,
        }))
    }

    fn new_conversation(&self, conversation_id: ConversationId) -> Box<dyn ConversationState> {
        let mut state = self.factory.create(conversation_id);
        if let Some(action) = &self.default_action {
            state.context_mut().transfer(action.as_str(), 0);
        }
        debug!(type_tag = state.type_tag(), "New conversation");
        state
    }

    async fn persist(
        &self,
        lease: &ConversationLease,
        state: &dyn ConversationState,
        dispatch: DispatchOutcome,
        step_outcome: Option<&StepOutcome>,
        created: bool,
    ) -> Result<Disposition> {
        if step_outcome.is_some_and(StepOutcome::is_terminal) {
            self.store.delete_locked(lease).await?;
            return Ok(Disposition::Deleted);
        }
        if dispatch.is_handled() || !created {
            self.store.save_locked(lease, state).await?;
            return Ok(Disposition::Saved);
        }
        Ok(Disposition::Discarded)
    }
}

impl fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("store", &self.store)
            .field("chain", &self.chain)
            .field("actions", &self.dispatcher.action_names())
            .field("platform", &self.bot.platform())
            .field("turn_timeout", &self.turn_timeout)
            .field("default_action", &self.default_action)
            .finish_non_exhaustive()
    }
}

//! Per-event pipeline context.

use super::{BotClient, InboundEvent, ServiceScope};
use crate::conversation::{
    ActionDefinition, ConversationState, StepContext, StepDispatcher, StepOutcome,
};
use crate::errors::{DispatchError, Result};
use std::any::TypeId;
use std::fmt;
use tracing::debug;

/// Everything a handler sees while processing one event.
///
/// Lives for a single event. Handlers run sequentially against it, so later
/// handlers observe what earlier ones did to the conversation.
pub struct PipelineContext<'a> {
    state: &'a mut dyn ConversationState,
    dispatcher: &'a StepDispatcher,
    bot: &'a dyn BotClient,
    services: &'a ServiceScope,
    event: &'a InboundEvent,
    processed: Vec<&'static str>,
    processed_ids: Vec<TypeId>,
    last_outcome: Option<StepOutcome>,
}

impl<'a> PipelineContext<'a> {
    /// Creates a context for one event.
    #[must_use]
    pub fn new(
        state: &'a mut dyn ConversationState,
        dispatcher: &'a StepDispatcher,
        bot: &'a dyn BotClient,
        services: &'a ServiceScope,
        event: &'a InboundEvent,
    ) -> Self {
        Self {
            state,
            dispatcher,
            bot,
            services,
            event,
            processed: Vec::new(),
            processed_ids: Vec::new(),
            last_outcome: None,
        }
    }

    /// The conversation.
    #[must_use]
    pub fn state(&self) -> &dyn ConversationState {
        &*self.state
    }

    /// The conversation, mutably.
    pub fn state_mut(&mut self) -> &mut dyn ConversationState {
        &mut *self.state
    }

    /// The conversation as its concrete type.
    #[must_use]
    pub fn state_as<T: ConversationState>(&self) -> Option<&T> {
        self.state().downcast_ref::<T>()
    }

    /// The conversation as its concrete type, mutably.
    pub fn state_as_mut<T: ConversationState>(&mut self) -> Option<&mut T> {
        self.state_mut().downcast_mut::<T>()
    }

    /// The step dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &'a StepDispatcher {
        self.dispatcher
    }

    /// The bot-client handle.
    #[must_use]
    pub fn bot(&self) -> &'a dyn BotClient {
        self.bot
    }

    /// The service scope.
    #[must_use]
    pub fn services(&self) -> &'a ServiceScope {
        self.services
    }

    /// The event being processed.
    #[must_use]
    pub fn event(&self) -> &'a InboundEvent {
        self.event
    }

    /// Handler types that have seen this event, in order.
    #[must_use]
    pub fn processed(&self) -> &[&'static str] {
        &self.processed
    }

    /// The last step outcome applied during this event.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&StepOutcome> {
        self.last_outcome.as_ref()
    }

    /// True once a step terminated the conversation.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.last_outcome.as_ref().is_some_and(StepOutcome::is_terminal)
    }

    /// The definition of the conversation's active action.
    #[must_use]
    pub fn active_action(&self) -> Option<&'a ActionDefinition> {
        let name = self.state.context().active_action()?;
        self.dispatcher.action(name)
    }

    /// Runs the current step of the active action.
    ///
    /// # Errors
    ///
    /// Dispatch and step failures, see [`StepDispatcher::dispatch`].
    pub async fn dispatch_step(&mut self) -> Result<StepOutcome> {
        let mut cx = StepContext::new(&mut *self.state, self.bot, self.services, self.event);
        let outcome = self.dispatcher.dispatch(&mut cx).await?;
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Hands the conversation to `action` at step 0 and runs that step.
    ///
    /// # Errors
    ///
    /// `DispatchError::UnknownAction` if the action is not registered; the
    /// cursor is left untouched in that case.
    pub async fn begin_action(&mut self, action: &str) -> Result<StepOutcome> {
        if !self.dispatcher.contains(action) {
            return Err(DispatchError::UnknownAction {
                action: action.to_string(),
            }
            .into());
        }
        debug!(
            conversation_id = %self.state.context().conversation_id(),
            action,
            "Starting action"
        );
        self.state.context_mut().transfer(action, 0);
        self.dispatch_step().await
    }

    /// Ends the conversation without running a step.
    pub fn terminate(&mut self) {
        self.last_outcome = Some(StepOutcome::Terminate);
    }

    pub(crate) fn has_processed(&self, type_id: TypeId) -> bool {
        self.processed_ids.contains(&type_id)
    }

    pub(crate) fn mark_processed(&mut self, type_id: TypeId, name: &'static str) {
        self.processed_ids.push(type_id);
        self.processed.push(name);
    }
}

impl fmt::Debug for PipelineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("conversation_id", &self.state.context().conversation_id())
            .field("event", &self.event)
            .field("processed", &self.processed)
            .field("last_outcome", &self.last_outcome)
            .finish()
    }
}

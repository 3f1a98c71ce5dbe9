//! Actions as ordered step lists, and the dispatcher that runs them.
//!
//! An action is a named, ordered list of steps. When a conversation is owned
//! by an action, its cursor selects the step to run for the next event: step
//! `N` of the action runs when `step == N`. The step reports a
//! [`StepOutcome`] and the dispatcher moves the cursor accordingly.

use super::{ConversationContext, ConversationId, ConversationState};
use crate::data::{ContextDataSet, Tagged};
use crate::errors::{DispatchError, FormatError, Result, StepExecutionError};
use crate::pipeline::{BotClient, InboundEvent, ServiceScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::debug;

/// What a step asks the dispatcher to do with the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Move to the next step of the same action.
    Advance,
    /// Stay on this step and wait for the next event.
    Repeat,
    /// End the conversation; its row is deleted.
    Terminate,
    /// Hand the conversation to another action at `step`.
    Transfer {
        /// The action taking over.
        action: String,
        /// The step to resume at.
        step: u32,
    },
}

impl StepOutcome {
    /// Transfers to `action`, starting from its first step.
    #[must_use]
    pub fn transfer(action: impl Into<String>) -> Self {
        Self::Transfer {
            action: action.into(),
            step: 0,
        }
    }

    /// Transfers to `action` at an explicit step.
    #[must_use]
    pub fn transfer_at(action: impl Into<String>, step: u32) -> Self {
        Self::Transfer {
            action: action.into(),
            step,
        }
    }

    /// Returns true if the conversation ends with this outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => write!(f, "advance"),
            Self::Repeat => write!(f, "repeat"),
            Self::Terminate => write!(f, "terminate"),
            Self::Transfer { action, step } => write!(f, "transfer({action}@{step})"),
        }
    }
}

/// Everything a step may touch while it runs.
pub struct StepContext<'a> {
    state: &'a mut dyn ConversationState,
    bot: &'a dyn BotClient,
    services: &'a ServiceScope,
    event: &'a InboundEvent,
}

impl<'a> StepContext<'a> {
    /// Creates a step context.
    #[must_use]
    pub fn new(
        state: &'a mut dyn ConversationState,
        bot: &'a dyn BotClient,
        services: &'a ServiceScope,
        event: &'a InboundEvent,
    ) -> Self {
        Self {
            state,
            bot,
            services,
            event,
        }
    }

    /// The conversation state.
    #[must_use]
    pub fn conversation(&self) -> &dyn ConversationState {
        &*self.state
    }

    /// The conversation state, mutably.
    pub fn conversation_mut(&mut self) -> &mut dyn ConversationState {
        &mut *self.state
    }

    /// The conversation state as its concrete type.
    #[must_use]
    pub fn state<T: ConversationState>(&self) -> Option<&T> {
        self.conversation().downcast_ref::<T>()
    }

    /// The conversation state as its concrete type, mutably.
    pub fn state_mut<T: ConversationState>(&mut self) -> Option<&mut T> {
        self.conversation_mut().downcast_mut::<T>()
    }

    /// The base context.
    #[must_use]
    pub fn context(&self) -> &ConversationContext {
        self.state.context()
    }

    /// The conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.context().conversation_id()
    }

    /// The data bag.
    #[must_use]
    pub fn data(&self) -> &ContextDataSet {
        self.state.context().data()
    }

    /// The data bag, mutably.
    pub fn data_mut(&mut self) -> &mut ContextDataSet {
        self.state.context_mut().data_mut()
    }

    /// Shortcut for `data().get()`.
    pub fn get<T: Tagged>(&self, key: &str) -> Result<Option<T>, FormatError> {
        self.data().get(key)
    }

    /// Shortcut for `data_mut().set()`.
    pub fn set<T: Tagged>(&mut self, key: impl Into<String>, value: T) -> Result<(), FormatError> {
        self.data_mut().set(key, value)
    }

    /// The bot-client handle.
    #[must_use]
    pub fn bot(&self) -> &dyn BotClient {
        self.bot
    }

    /// The service scope.
    #[must_use]
    pub fn services(&self) -> &ServiceScope {
        self.services
    }

    /// The event being processed.
    #[must_use]
    pub fn event(&self) -> &InboundEvent {
        self.event
    }

    /// Replies to the current event with text.
    pub async fn reply(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.bot
            .send_text(
                self.conversation_id(),
                Some(self.event.id().to_string()),
                text.into(),
            )
            .await
    }
}

impl Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("conversation_id", &self.conversation_id())
            .field("event", &self.event)
            .finish()
    }
}

/// One step of an action.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Runs the step for the current event.
    ///
    /// An error is propagated to the caller untouched and nothing from the
    /// turn is persisted.
    async fn run(&self, cx: &mut StepContext<'_>) -> anyhow::Result<StepOutcome>;
}

/// A step backed by a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepOutcome> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepOutcome> + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepOutcome> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepOutcome> + Send + Sync,
{
    async fn run(&self, cx: &mut StepContext<'_>) -> anyhow::Result<StepOutcome> {
        (self.func)(cx)
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct ActionDefinition {
    name: String,
    steps: Vec<Arc<dyn Step>>,
}

impl ActionDefinition {
    /// Creates an action with no steps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends a closure step.
    #[must_use]
    pub fn step_fn<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepOutcome> + Send + Sync + 'static,
    {
        self.step(FnStep::new(name, func))
    }

    /// The action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&Arc<dyn Step>> {
        self.steps.get(index as usize)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the action has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Resolves and runs the current step of a conversation's active action.
#[derive(Debug, Clone, Default)]
pub struct StepDispatcher {
    actions: HashMap<String, Arc<ActionDefinition>>,
}

impl StepDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action, replacing any action with the same name.
    #[must_use]
    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.register(action);
        self
    }

    /// Adds an action, replacing any action with the same name.
    pub fn register(&mut self, action: ActionDefinition) {
        self.actions
            .insert(action.name().to_string(), Arc::new(action));
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(name).map(AsRef::as_ref)
    }

    /// Checks if an action is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Returns all action names, sorted.
    #[must_use]
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if no action is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs the step under the cursor and applies its outcome.
    ///
    /// Returns the outcome actually applied: advancing past the final step
    /// completes the action and is reported as [`StepOutcome::Terminate`].
    ///
    /// # Errors
    ///
    /// `DispatchError` when there is nothing to run, `StepExecutionError` when
    /// the step fails. On a step failure the cursor is left untouched.
    pub async fn dispatch(&self, cx: &mut StepContext<'_>) -> Result<StepOutcome> {
        let conversation_id = cx.conversation_id();
        let step = cx.context().step();
        let action_name = cx
            .context()
            .active_action()
            .map(str::to_owned)
            .ok_or(DispatchError::NoActiveAction { conversation_id })?;
        let action = self.resolve(&action_name)?;
        let current = action.get(step).ok_or_else(|| DispatchError::StepOutOfRange {
            action: action_name.clone(),
            step,
            len: action.len(),
        })?;

        debug!(
            conversation_id = %conversation_id,
            action = %action_name,
            step,
            "Dispatching step"
        );

        let outcome = current
            .run(cx)
            .await
            .map_err(|source| StepExecutionError::new(&action_name, step, source))?;

        let applied = self.apply(cx.conversation_mut().context_mut(), action, outcome)?;

        debug!(
            conversation_id = %conversation_id,
            action = %action_name,
            step,
            outcome = %applied,
            "Step completed"
        );

        Ok(applied)
    }

    fn resolve(&self, name: &str) -> Result<Arc<ActionDefinition>, DispatchError> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAction {
                action: name.to_string(),
            })
    }

    fn apply(
        &self,
        context: &mut ConversationContext,
        action: Arc<ActionDefinition>,
        outcome: StepOutcome,
    ) -> Result<StepOutcome, DispatchError> {
        match outcome {
            StepOutcome::Advance => {
                if context.step() as usize + 1 >= action.len() {
                    return Ok(StepOutcome::Terminate);
                }
                context.advance();
                Ok(StepOutcome::Advance)
            }
            StepOutcome::Transfer { action: target, step } => {
                let target_def = self.resolve(&target)?;
                if step as usize >= target_def.len() {
                    return Err(DispatchError::StepOutOfRange {
                        action: target,
                        step,
                        len: target_def.len(),
                    });
                }
                context.transfer(target.clone(), step);
                Ok(StepOutcome::Transfer { action: target, step })
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationContext;
    use crate::errors::ConvoflowError;
    use crate::pipeline::Message;
    use crate::testing::RecordingBot;

    fn checkout_dispatcher() -> StepDispatcher {
        StepDispatcher::new()
            .with_action(
                ActionDefinition::new("Checkout")
                    .step_fn("ask_address", |cx| {
                        cx.set("asked", true)?;
                        Ok(StepOutcome::Advance)
                    })
                    .step_fn("confirm", |cx| {
                        let text = cx
                            .event()
                            .as_message()
                            .map(|m| m.content.clone())
                            .unwrap_or_default();
                        if text == "yes" {
                            Ok(StepOutcome::Advance)
                        } else if text == "help" {
                            Ok(StepOutcome::transfer("Support"))
                        } else {
                            Ok(StepOutcome::Repeat)
                        }
                    })
                    .step_fn("pay", |_| anyhow::bail!("card declined")),
            )
            .with_action(
                ActionDefinition::new("Support").step_fn("ticket", |_| Ok(StepOutcome::Terminate)),
            )
    }

    async fn run(
        dispatcher: &StepDispatcher,
        state: &mut ConversationContext,
        text: &str,
    ) -> crate::errors::Result<StepOutcome> {
        let bot = RecordingBot::new();
        let services = ServiceScope::new();
        let event = InboundEvent::from(Message::new("m", text));
        let mut cx = StepContext::new(state, &bot, &services, &event);
        dispatcher.dispatch(&mut cx).await
    }

    #[tokio::test]
    async fn test_advance_and_repeat() {
        let dispatcher = checkout_dispatcher();
        let mut state = ConversationContext::with_action(ConversationId::new(), "Checkout");

        assert_eq!(run(&dispatcher, &mut state, "hi").await.unwrap(), StepOutcome::Advance);
        assert_eq!(state.step(), 1);
        assert_eq!(state.data().get::<bool>("asked").unwrap(), Some(true));

        assert_eq!(run(&dispatcher, &mut state, "maybe").await.unwrap(), StepOutcome::Repeat);
        assert_eq!(state.step(), 1);
    }

    #[tokio::test]
    async fn test_transfer_resets_step() {
        let dispatcher = checkout_dispatcher();
        let mut state = ConversationContext::with_action(ConversationId::new(), "Checkout");
        state.set_state(1, Some("Checkout".to_string()));

        let outcome = run(&dispatcher, &mut state, "help").await.unwrap();
        assert_eq!(outcome, StepOutcome::transfer("Support"));
        assert_eq!(state.active_action(), Some("Support"));
        assert_eq!(state.step(), 0);
    }

    #[tokio::test]
    async fn test_step_failure_propagates_and_keeps_cursor() {
        let dispatcher = checkout_dispatcher();
        let mut state = ConversationContext::new(ConversationId::new());
        state.set_state(2, Some("Checkout".to_string()));

        let err = run(&dispatcher, &mut state, "pay").await.unwrap_err();
        match err {
            ConvoflowError::StepExecution(e) => {
                assert_eq!(e.action, "Checkout");
                assert_eq!(e.step, 2);
                assert_eq!(e.source.to_string(), "card declined");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(state.step(), 2);
    }

    #[tokio::test]
    async fn test_advance_past_last_step_terminates() {
        let dispatcher = StepDispatcher::new().with_action(
            ActionDefinition::new("Once").step_fn("only", |_| Ok(StepOutcome::Advance)),
        );
        let mut state = ConversationContext::with_action(ConversationId::new(), "Once");

        let outcome = run(&dispatcher, &mut state, "x").await.unwrap();
        assert!(outcome.is_terminal());
        assert_eq!(state.step(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let dispatcher = checkout_dispatcher();

        let mut idle = ConversationContext::new(ConversationId::new());
        let err = run(&dispatcher, &mut idle, "x").await.unwrap_err();
        assert!(matches!(err, ConvoflowError::Dispatch(DispatchError::NoActiveAction { .. })));

        let mut unknown = ConversationContext::with_action(ConversationId::new(), "Refund");
        let err = run(&dispatcher, &mut unknown, "x").await.unwrap_err();
        assert!(matches!(err, ConvoflowError::Dispatch(DispatchError::UnknownAction { .. })));

        let mut past_end = ConversationContext::new(ConversationId::new());
        past_end.set_state(9, Some("Checkout".to_string()));
        let err = run(&dispatcher, &mut past_end, "x").await.unwrap_err();
        assert!(matches!(err, ConvoflowError::Dispatch(DispatchError::StepOutOfRange { step: 9, .. })));
    }

    #[tokio::test]
    async fn test_transfer_to_unknown_action_fails() {
        let dispatcher = StepDispatcher::new().with_action(
            ActionDefinition::new("Lost").step_fn("jump", |_| Ok(StepOutcome::transfer("Nowhere"))),
        );
        let mut state = ConversationContext::with_action(ConversationId::new(), "Lost");

        let err = run(&dispatcher, &mut state, "x").await.unwrap_err();
        assert!(matches!(err, ConvoflowError::Dispatch(DispatchError::UnknownAction { .. })));
        assert_eq!(state.active_action(), Some("Lost"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(StepOutcome::Advance.to_string(), "advance");
        assert_eq!(StepOutcome::transfer_at("Support", 2).to_string(), "transfer(Support@2)");
    }
}

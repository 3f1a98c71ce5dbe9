//! Sample conversation types, values, actions and handlers.

use crate::conversation::{
    ActionDefinition, ContextKind, ConversationContext, ConversationId, StepDispatcher,
    StepOutcome,
};
use crate::data::{Tagged, TypeRegistry};
use crate::errors::{ConvoflowError, Result};
use crate::pipeline::{
    Capabilities, Handler, HandlerFlow, KeyboardResponse, Message, PipelineContext, ServiceScope,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A shipping address, used as a structured data-bag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// City name.
    pub city: String,
    /// Postal code.
    pub postcode: String,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub fn new(city: impl Into<String>, postcode: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            postcode: postcode.into(),
        }
    }
}

impl Tagged for Address {
    const TYPE_TAG: &'static str = "Address";
}

/// A conversation type carrying a shopping cart next to the base context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutContext {
    /// The base context.
    pub base: ConversationContext,
    /// Items in the cart.
    #[serde(default)]
    pub cart: Vec<String>,
}

impl CheckoutContext {
    /// Creates an idle checkout conversation.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            base: ConversationContext::new(conversation_id),
            cart: Vec::new(),
        }
    }

    /// Creates a checkout conversation owned by `action` at step 0.
    #[must_use]
    pub fn with_action(conversation_id: ConversationId, action: impl Into<String>) -> Self {
        Self {
            base: ConversationContext::with_action(conversation_id, action),
            cart: Vec::new(),
        }
    }
}

impl Tagged for CheckoutContext {
    const TYPE_TAG: &'static str = "CheckoutContext";
}

impl ContextKind for CheckoutContext {
    fn base(&self) -> &ConversationContext {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConversationContext {
        &mut self.base
    }
}

/// A registry holding the built-ins plus [`Address`] and [`CheckoutContext`].
pub fn fixture_registry() -> Result<Arc<TypeRegistry>> {
    let registry = TypeRegistry::new();
    registry.register_value::<Address>()?;
    registry.register_context::<CheckoutContext>()?;
    Ok(Arc::new(registry))
}

/// A four-step checkout action plus a one-step support action.
///
/// Checkout: step 0 adds the message text to the cart and advances; step 1
/// repeats until the text is `done`; step 2 stores a shipping address;
/// step 3 terminates on `confirm` and transfers to `Support` on `help`.
#[must_use]
pub fn checkout_dispatcher() -> StepDispatcher {
    StepDispatcher::new()
        .with_action(
            ActionDefinition::new("Checkout")
                .step_fn("add_item", |cx| {
                    let item = message_text(cx.event());
                    if let Some(state) = cx.state_mut::<CheckoutContext>() {
                        state.cart.push(item);
                    }
                    Ok(StepOutcome::Advance)
                })
                .step_fn("more_items", |cx| {
                    let text = message_text(cx.event());
                    if text == "done" {
                        return Ok(StepOutcome::Advance);
                    }
                    if let Some(state) = cx.state_mut::<CheckoutContext>() {
                        state.cart.push(text);
                    }
                    Ok(StepOutcome::Repeat)
                })
                .step_fn("address", |cx| {
                    let city = message_text(cx.event());
                    cx.set("ship_to", Address::new(city, "0000"))?;
                    Ok(StepOutcome::Advance)
                })
                .step_fn("confirm", |cx| match message_text(cx.event()).as_str() {
                    "confirm" => Ok(StepOutcome::Terminate),
                    "help" => Ok(StepOutcome::transfer("Support")),
                    "fail" => anyhow::bail!("payment gateway unavailable"),
                    _ => Ok(StepOutcome::Repeat),
                }),
        )
        .with_action(
            ActionDefinition::new("Support").step_fn("ticket", |cx| {
                cx.set("ticket", true)?;
                Ok(StepOutcome::Repeat)
            }),
        )
}

fn message_text(event: &crate::pipeline::InboundEvent) -> String {
    event
        .as_message()
        .map(|m| m.content.clone())
        .or_else(|| event.as_keyboard().map(|k| k.custom_id.clone()))
        .unwrap_or_default()
}

/// Claims every message containing the word `ping`, without touching state.
#[derive(Debug, Default)]
pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    const CAPABILITIES: Capabilities = Capabilities::MESSAGES;

    fn create(_scope: &ServiceScope) -> Self {
        Self
    }

    async fn handle_message(
        &mut self,
        cx: &mut PipelineContext<'_>,
        message: &Message,
    ) -> Result<HandlerFlow> {
        if !message.content.split_whitespace().any(|w| w == "ping") {
            return Ok(HandlerFlow::Continue);
        }
        let conversation_id = cx.state().context().conversation_id();
        cx.bot()
            .send_text(conversation_id, Some(message.id.clone()), "pong".to_string())
            .await
            .map_err(|e| ConvoflowError::handler(Self::name(), e))?;
        Ok(HandlerFlow::Handled)
    }
}

/// Ends the conversation on a `cancel` button.
#[derive(Debug, Default)]
pub struct CancelButtonHandler;

#[async_trait]
impl Handler for CancelButtonHandler {
    const CAPABILITIES: Capabilities = Capabilities::KEYBOARD;

    fn create(_scope: &ServiceScope) -> Self {
        Self
    }

    async fn handle_keyboard(
        &mut self,
        cx: &mut PipelineContext<'_>,
        response: &KeyboardResponse,
    ) -> Result<HandlerFlow> {
        if response.custom_id != "cancel" {
            return Ok(HandlerFlow::Continue);
        }
        cx.terminate();
        Ok(HandlerFlow::Handled)
    }
}

//! Ordered handler dispatch with short-circuit.

use super::handler::HandlerEntry;
use super::{Handler, HandlerFlow, InboundEvent, KeyboardResponse, Message, PipelineContext};
use crate::errors::{HandlerRegistrationError, Result};
use tracing::debug;

/// Result of running an event through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler claimed the event.
    Handled,
    /// Every eligible handler passed.
    Unhandled,
}

impl DispatchOutcome {
    /// Returns true for `Handled`.
    #[must_use]
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// Collects handler types in registration order.
#[derive(Debug, Default)]
pub struct HandlerChainBuilder {
    entries: Vec<HandlerEntry>,
}

impl HandlerChainBuilder {
    /// Appends a handler type. Registering a type twice keeps the first slot.
    #[must_use]
    pub fn register<H: Handler>(mut self) -> Self {
        let entry = HandlerEntry::of::<H>();
        if !self.entries.iter().any(|e| e.type_id == entry.type_id) {
            self.entries.push(entry);
        }
        self
    }

    /// Classifies the registered types into the message and keyboard lists.
    ///
    /// # Errors
    ///
    /// `HandlerRegistrationError` for the first type declaring neither
    /// capability.
    pub fn build(self) -> Result<HandlerChain> {
        if let Some(bad) = self.entries.iter().find(|e| e.capabilities.is_empty()) {
            return Err(HandlerRegistrationError { handler: bad.name }.into());
        }

        let message_handlers = self
            .entries
            .iter()
            .filter(|e| e.capabilities.messages)
            .copied()
            .collect();
        let keyboard_handlers = self
            .entries
            .iter()
            .filter(|e| e.capabilities.keyboard)
            .copied()
            .collect();

        Ok(HandlerChain {
            message_handlers,
            keyboard_handlers,
        })
    }
}

/// The two ordered handler lists.
#[derive(Debug, Clone, Default)]
pub struct HandlerChain {
    message_handlers: Vec<HandlerEntry>,
    keyboard_handlers: Vec<HandlerEntry>,
}

impl HandlerChain {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> HandlerChainBuilder {
        HandlerChainBuilder::default()
    }

    /// Names of the message handlers, in order.
    #[must_use]
    pub fn message_handlers(&self) -> Vec<&'static str> {
        self.message_handlers.iter().map(|e| e.name).collect()
    }

    /// Names of the keyboard handlers, in order.
    #[must_use]
    pub fn keyboard_handlers(&self) -> Vec<&'static str> {
        self.keyboard_handlers.iter().map(|e| e.name).collect()
    }

    /// Dispatches whichever event the context carries.
    ///
    /// # Errors
    ///
    /// The first handler error; later handlers do not run.
    pub async fn dispatch(&self, cx: &mut PipelineContext<'_>) -> Result<DispatchOutcome> {
        match cx.event() {
            InboundEvent::Message(message) => self.dispatch_message(cx, message).await,
            InboundEvent::Keyboard(response) => self.dispatch_keyboard(cx, response).await,
        }
    }

    /// Runs the message handlers until one claims the message.
    ///
    /// # Errors
    ///
    /// The first handler error; later handlers do not run.
    pub async fn dispatch_message(
        &self,
        cx: &mut PipelineContext<'_>,
        message: &Message,
    ) -> Result<DispatchOutcome> {
        for entry in &self.message_handlers {
            if cx.has_processed(entry.type_id) {
                continue;
            }
            let mut handler = (entry.create)(cx.services());
            cx.mark_processed(entry.type_id, entry.name);
            debug!(handler = entry.name, message_id = %message.id, "Invoking message handler");

            if handler.on_message(cx, message).await?.is_handled() {
                debug!(handler = entry.name, "Message handled");
                return Ok(DispatchOutcome::Handled);
            }
        }
        Ok(DispatchOutcome::Unhandled)
    }

    /// Runs the keyboard handlers until one claims the response.
    ///
    /// # Errors
    ///
    /// The first handler error; later handlers do not run.
    pub async fn dispatch_keyboard(
        &self,
        cx: &mut PipelineContext<'_>,
        response: &KeyboardResponse,
    ) -> Result<DispatchOutcome> {
        for entry in &self.keyboard_handlers {
            if cx.has_processed(entry.type_id) {
                continue;
            }
            let mut handler = (entry.create)(cx.services());
            cx.mark_processed(entry.type_id, entry.name);
            debug!(handler = entry.name, custom_id = %response.custom_id, "Invoking keyboard handler");

            if handler.on_keyboard(cx, response).await? == HandlerFlow::Handled {
                debug!(handler = entry.name, "Keyboard response handled");
                return Ok(DispatchOutcome::Handled);
            }
        }
        Ok(DispatchOutcome::Unhandled)
    }
}

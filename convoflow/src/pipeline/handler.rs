//! The handler trait and its type-erased form.

use super::{KeyboardResponse, Message, PipelineContext, ServiceScope};
use crate::errors::Result;
use async_trait::async_trait;
use std::any::TypeId;
use std::fmt;

/// Which event kinds a handler type processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    /// Receives chat messages.
    pub messages: bool,
    /// Receives keyboard responses.
    pub keyboard: bool,
}

impl Capabilities {
    /// Handles nothing. Registering such a type fails.
    pub const NONE: Self = Self {
        messages: false,
        keyboard: false,
    };
    /// Messages only.
    pub const MESSAGES: Self = Self {
        messages: true,
        keyboard: false,
    };
    /// Keyboard responses only.
    pub const KEYBOARD: Self = Self {
        messages: false,
        keyboard: true,
    };
    /// Both event kinds.
    pub const BOTH: Self = Self {
        messages: true,
        keyboard: true,
    };

    /// Returns true if neither capability is declared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.messages && !self.keyboard
    }
}

/// Whether a handler claimed the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerFlow {
    /// Let the next handler see the event.
    Continue,
    /// The event is claimed; stop the chain.
    Handled,
}

impl HandlerFlow {
    /// Returns true for `Handled`.
    #[must_use]
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// A handler in the dispatch chain.
///
/// A fresh instance is created from the [`ServiceScope`] for every event it
/// sees, so handlers may keep per-event state in `self`.
#[async_trait]
pub trait Handler: Send + Sync + Sized + 'static {
    /// The event kinds this type handles.
    const CAPABILITIES: Capabilities;

    /// Resolves an instance for one event.
    fn create(scope: &ServiceScope) -> Self;

    /// Name recorded in the processed list.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Processes a chat message.
    async fn handle_message(
        &mut self,
        _cx: &mut PipelineContext<'_>,
        _message: &Message,
    ) -> Result<HandlerFlow> {
        Ok(HandlerFlow::Continue)
    }

    /// Processes a keyboard response.
    async fn handle_keyboard(
        &mut self,
        _cx: &mut PipelineContext<'_>,
        _response: &KeyboardResponse,
    ) -> Result<HandlerFlow> {
        Ok(HandlerFlow::Continue)
    }
}

#[async_trait]
pub(crate) trait DynHandler: Send + Sync {
    async fn on_message(
        &mut self,
        cx: &mut PipelineContext<'_>,
        message: &Message,
    ) -> Result<HandlerFlow>;

    async fn on_keyboard(
        &mut self,
        cx: &mut PipelineContext<'_>,
        response: &KeyboardResponse,
    ) -> Result<HandlerFlow>;
}

#[async_trait]
impl<H: Handler> DynHandler for H {
    async fn on_message(
        &mut self,
        cx: &mut PipelineContext<'_>,
        message: &Message,
    ) -> Result<HandlerFlow> {
        self.handle_message(cx, message).await
    }

    async fn on_keyboard(
        &mut self,
        cx: &mut PipelineContext<'_>,
        response: &KeyboardResponse,
    ) -> Result<HandlerFlow> {
        self.handle_keyboard(cx, response).await
    }
}

fn create_erased<H: Handler>(scope: &ServiceScope) -> Box<dyn DynHandler> {
    Box::new(H::create(scope))
}

/// A registered handler type.
#[derive(Clone, Copy)]
pub(crate) struct HandlerEntry {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) capabilities: Capabilities,
    pub(crate) create: fn(&ServiceScope) -> Box<dyn DynHandler>,
}

impl HandlerEntry {
    pub(crate) fn of<H: Handler>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: H::name(),
            capabilities: H::CAPABILITIES,
            create: create_erased::<H>,
        }
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

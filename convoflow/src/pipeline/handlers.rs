//! Built-in handlers.

use super::{
    Capabilities, Handler, HandlerFlow, KeyboardResponse, Message, PipelineContext, ServiceScope,
};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes events to the conversation's active action.
///
/// Claims every event that arrives while an action owns the conversation and
/// runs the step under the cursor. Passes when the conversation is idle.
#[derive(Debug, Default)]
pub struct ActiveStepHandler;

impl ActiveStepHandler {
    async fn run_active(cx: &mut PipelineContext<'_>) -> Result<HandlerFlow> {
        if cx.state().context().active_action().is_none() {
            return Ok(HandlerFlow::Continue);
        }
        cx.dispatch_step().await?;
        Ok(HandlerFlow::Handled)
    }
}

#[async_trait]
impl Handler for ActiveStepHandler {
    const CAPABILITIES: Capabilities = Capabilities::BOTH;

    fn create(_scope: &ServiceScope) -> Self {
        Self
    }

    async fn handle_message(
        &mut self,
        cx: &mut PipelineContext<'_>,
        _message: &Message,
    ) -> Result<HandlerFlow> {
        Self::run_active(cx).await
    }

    async fn handle_keyboard(
        &mut self,
        cx: &mut PipelineContext<'_>,
        _response: &KeyboardResponse,
    ) -> Result<HandlerFlow> {
        Self::run_active(cx).await
    }
}

/// Maps command words (without the leading `/`) to action names.
#[derive(Debug, Clone, Default)]
pub struct CommandRoutes {
    routes: HashMap<String, String>,
}

impl CommandRoutes {
    /// Creates an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `/command` to `action`.
    #[must_use]
    pub fn route(mut self, command: impl Into<String>, action: impl Into<String>) -> Self {
        self.routes.insert(command.into(), action.into());
        self
    }

    /// The action mapped to `command`.
    #[must_use]
    pub fn resolve(&self, command: &str) -> Option<&str> {
        self.routes.get(command).map(String::as_str)
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no route is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Starts the action mapped to a leading `/command`.
///
/// Reads its table from the [`CommandRoutes`] service; without one it passes
/// on every message.
#[derive(Debug)]
pub struct CommandRouteHandler {
    routes: Option<Arc<CommandRoutes>>,
}

#[async_trait]
impl Handler for CommandRouteHandler {
    const CAPABILITIES: Capabilities = Capabilities::MESSAGES;

    fn create(scope: &ServiceScope) -> Self {
        Self {
            routes: scope.get::<CommandRoutes>(),
        }
    }

    async fn handle_message(
        &mut self,
        cx: &mut PipelineContext<'_>,
        message: &Message,
    ) -> Result<HandlerFlow> {
        let Some(routes) = self.routes.as_deref() else {
            return Ok(HandlerFlow::Continue);
        };
        let Some(action) = message.command().and_then(|cmd| routes.resolve(cmd)) else {
            return Ok(HandlerFlow::Continue);
        };
        cx.begin_action(action).await?;
        Ok(HandlerFlow::Handled)
    }
}

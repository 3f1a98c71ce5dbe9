//! Per-dialogue state and the polymorphic state trait.

use crate::data::{ContextDataSet, Tagged};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of one ongoing dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConversationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The base state every conversation carries.
///
/// Application conversation types embed one of these and expose it through
/// [`ContextKind`]. The cursor (`step`, `active_action`) only moves through
/// step dispatch, or through [`set_state`](Self::set_state) when a row is
/// unpacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    conversation_id: ConversationId,
    #[serde(default)]
    step: u32,
    #[serde(default)]
    active_action: Option<String>,
    #[serde(default)]
    data: ContextDataSet,
}

impl ConversationContext {
    /// Creates an idle context for a conversation.
    #[must_use]
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            step: 0,
            active_action: None,
            data: ContextDataSet::new(),
        }
    }

    /// Creates a context already owned by an action at step 0.
    #[must_use]
    pub fn with_action(conversation_id: ConversationId, action: impl Into<String>) -> Self {
        Self {
            active_action: Some(action.into()),
            ..Self::new(conversation_id)
        }
    }

    /// Returns the conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Returns the step cursor.
    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Returns the active action tag.
    #[must_use]
    pub fn active_action(&self) -> Option<&str> {
        self.active_action.as_deref()
    }

    /// Returns the data bag.
    #[must_use]
    pub fn data(&self) -> &ContextDataSet {
        &self.data
    }

    /// Returns the data bag for mutation.
    pub fn data_mut(&mut self) -> &mut ContextDataSet {
        &mut self.data
    }

    /// Installs the cursor carried at row level. Only the unpack path calls this.
    pub(crate) fn set_state(&mut self, step: u32, active_action: Option<String>) {
        self.step = step;
        self.active_action = active_action;
    }

    pub(crate) fn advance(&mut self) {
        self.step = self.step.saturating_add(1);
    }

    pub(crate) fn transfer(&mut self, action: impl Into<String>, step: u32) {
        self.active_action = Some(action.into());
        self.step = step;
    }
}

impl Tagged for ConversationContext {
    const TYPE_TAG: &'static str = "ConversationContext";
}

impl ContextKind for ConversationContext {
    fn base(&self) -> &ConversationContext {
        self
    }

    fn base_mut(&mut self) -> &mut ConversationContext {
        self
    }
}

/// Implemented by every concrete conversation type.
///
/// Implementing this (plus [`Tagged`]) is all an application type needs;
/// [`ConversationState`] follows from a blanket impl.
pub trait ContextKind: Tagged + fmt::Debug {
    /// The embedded base context.
    fn base(&self) -> &ConversationContext;

    /// The embedded base context, mutably.
    fn base_mut(&mut self) -> &mut ConversationContext;
}

/// Object-safe view of a conversation of any concrete type.
pub trait ConversationState: Send + Sync + fmt::Debug + 'static {
    /// The embedded base context.
    fn context(&self) -> &ConversationContext;

    /// The embedded base context, mutably.
    fn context_mut(&mut self) -> &mut ConversationContext;

    /// Discriminator of the concrete type.
    fn type_tag(&self) -> &'static str;

    /// Serializes the full object under its concrete type.
    fn to_payload(&self) -> Result<String, serde_json::Error>;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for mutable downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: ContextKind> ConversationState for T {
    fn context(&self) -> &ConversationContext {
        self.base()
    }

    fn context_mut(&mut self) -> &mut ConversationContext {
        self.base_mut()
    }

    fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }

    fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn ConversationState {
    /// Returns true if the concrete type is `T`.
    #[must_use]
    pub fn is<T: ConversationState>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrows the concrete `T`, if that is what this is.
    #[must_use]
    pub fn downcast_ref<T: ConversationState>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably borrows the concrete `T`, if that is what this is.
    pub fn downcast_mut<T: ConversationState>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Shortcut for the conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.context().conversation_id()
    }
}

//! Conversion between live conversations and packed rows.

use super::{PackedConversation, PAYLOAD_ENCODING};
use crate::conversation::ConversationState;
use crate::data::TypeRegistry;
use crate::errors::{ConvoflowError, FormatError, Result, TypeResolutionError};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Packs conversations into rows and back, resolving types through a shared
/// [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct ContextPacker {
    registry: Arc<TypeRegistry>,
}

impl ContextPacker {
    /// Creates a packer over `registry`.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// The registry used for type resolution.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Packs a conversation into a fresh, not yet persisted row.
    ///
    /// # Errors
    ///
    /// `TypeResolutionError` if the concrete type is not registered as a
    /// conversation type (the row could never be read back), `FormatError` if
    /// serialization fails.
    pub fn pack(&self, state: &dyn ConversationState) -> Result<PackedConversation> {
        self.ensure_registered(state)?;
        let context = state.context();
        let now = Utc::now();
        Ok(PackedConversation {
            id: 0,
            conversation_id: context.conversation_id(),
            step: context.step(),
            active_action: context.active_action().map(str::to_owned),
            encoding: PAYLOAD_ENCODING.to_string(),
            type_tag: state.type_tag().to_string(),
            payload: state.to_payload().map_err(FormatError::from)?,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rewrites an existing row from `state`, keeping its key and creation
    /// time.
    ///
    /// # Errors
    ///
    /// Same as [`pack`](Self::pack).
    pub fn repack(&self, row: &mut PackedConversation, state: &dyn ConversationState) -> Result<()> {
        self.ensure_registered(state)?;
        let context = state.context();
        row.payload = state.to_payload().map_err(FormatError::from)?;
        row.step = context.step();
        row.active_action = context.active_action().map(str::to_owned);
        row.encoding = PAYLOAD_ENCODING.to_string();
        row.type_tag = state.type_tag().to_string();
        row.updated_at = Utc::now();
        Ok(())
    }

    /// Rebuilds the concrete conversation stored in `row`.
    ///
    /// The row-level cursor is installed last and wins over the one inside the
    /// payload.
    ///
    /// # Errors
    ///
    /// `TypeResolutionError` for an unknown type tag (of the row or of any
    /// data-bag entry), `FormatError` for an unknown encoding, a malformed
    /// payload or a payload belonging to another conversation.
    pub fn unpack(&self, row: &PackedConversation) -> Result<Box<dyn ConversationState>> {
        if row.encoding != PAYLOAD_ENCODING {
            return Err(FormatError::new(format!(
                "Unsupported payload encoding '{}' for conversation {}",
                row.encoding, row.conversation_id
            ))
            .into());
        }

        let mut state = self.registry.decode_context(&row.type_tag, &row.payload)?;

        if state.context().conversation_id() != row.conversation_id {
            return Err(FormatError::new(format!(
                "Payload belongs to conversation {}, row is {}",
                state.context().conversation_id(),
                row.conversation_id
            ))
            .into());
        }

        state.context().data().validate(&self.registry)?;
        state
            .context_mut()
            .set_state(row.step, row.active_action.clone());
        Ok(state)
    }

    /// Like [`unpack`](Self::unpack), but treats corrupt rows as absent.
    ///
    /// Type-resolution and format failures are logged and mapped to `None`;
    /// any other error still surfaces.
    ///
    /// # Errors
    ///
    /// Errors that do not indicate corruption.
    pub fn unpack_lenient(&self, row: &PackedConversation) -> Result<Option<Box<dyn ConversationState>>> {
        match self.unpack(row) {
            Ok(state) => Ok(Some(state)),
            Err(err) if err.is_corruption() => {
                warn!(
                    conversation_id = %row.conversation_id,
                    type_tag = %row.type_tag,
                    error = %err,
                    "Treating unreadable conversation row as missing"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn ensure_registered(&self, state: &dyn ConversationState) -> Result<()> {
        let tag = state.type_tag();
        if self.registry.is_context(tag) {
            Ok(())
        } else {
            Err(ConvoflowError::from(TypeResolutionError::new(
                tag,
                "conversation type is not registered",
            )))
        }
    }
}

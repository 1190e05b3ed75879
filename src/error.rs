use crate::api::ApiError;
use crate::models::EntityKind;
use thiserror::Error;

/// Failures surfaced by the draft store.
///
/// Edits against an entity that no longer exists are not errors; mutators report them
/// by returning `false` / `None`.
#[derive(Error, Debug, Clone)]
pub enum EditorError {
    /// The draft snapshot could not be loaded; the store holds no usable data.
    #[error("failed to load draft for page {page_id}: {source}")]
    Fetch {
        page_id: i64,
        #[source]
        source: ApiError,
    },

    /// The server refused the save with its own message. Pending edits are kept.
    #[error("{message}")]
    SaveRejected { message: String },

    /// The save never got an answer. Pending edits are kept.
    #[error("Network error")]
    Network {
        #[source]
        source: ApiError,
    },

    #[error("invalid {field} for {entity} {id}: {reason}")]
    InvalidField {
        entity: EntityKind,
        id: i64,
        field: &'static str,
        reason: &'static str,
    },
}

impl EditorError {
    /// Map a failed save call into the taxonomy.
    pub(crate) fn from_save(e: ApiError) -> Self {
        if e.is_transport() {
            return Self::Network { source: e };
        }
        Self::SaveRejected {
            message: crate::state::failure_message(&e, crate::state::SAVE_FAILED),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidField { .. })
    }
}

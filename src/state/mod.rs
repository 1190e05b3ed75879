mod editor_sync;
mod save_sync;

pub use editor_sync::{provide_editor_sync, use_editor_sync, EditorSyncController};
pub use save_sync::{SaveCoordinator, SaveOutcome, SaveStatus, SyncState};

use crate::api::{ApiError, ApiErrorKind};

pub const NETWORK_ERROR: &str = "Network error";
pub const SAVE_FAILED: &str = "Save failed";
pub const PUBLISH_FAILED: &str = "Publish failed";

/// User-facing text for a failed call: the server's own message when it sent one.
pub(crate) fn failure_message(e: &ApiError, fallback: &str) -> String {
    if e.is_transport() {
        return NETWORK_ERROR.to_string();
    }
    match e.kind {
        ApiErrorKind::Unauthorized => e.message.clone(),
        _ => e
            .server_message
            .clone()
            .unwrap_or_else(|| fallback.to_string()),
    }
}

use crate::api::{ApiResult, PageApi, SaveRequest, SaveResponse};
use crate::state::{failure_message, PUBLISH_FAILED, SAVE_FAILED};
use crate::util::now_iso;
use leptos::logging::{log, warn};
use std::cell::RefCell;
use std::rc::Rc;
use strum::{AsRefStr, Display};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
    Publishing,
}

impl SaveStatus {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Saving | Self::Publishing)
    }
}

/// What the editor chrome shows about persistence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncState {
    pub dirty: bool,
    pub status: SaveStatus,
    pub last_saved_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// This request was the latest one and succeeded.
    Applied,
    /// This request was the latest one and failed; the message is in `SyncState::last_error`.
    Failed,
    /// A newer request was issued while this one was in flight; its result was dropped.
    Superseded,
    /// `retry_save` had nothing to replay.
    NothingPending,
}

impl SaveOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// Identifies one request; stale once a newer request (or a reset) bumps the generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestToken(u64);

#[derive(Default)]
struct Inner {
    state: SyncState,
    generation: u64,
    /// Last `(page_id, body)` handed to `save_draft`, replayed by `retry_save`.
    pending: Option<(i64, SaveRequest)>,
}

/// Serializes save/publish outcomes into one status, newest request wins.
///
/// In-flight calls are never aborted. Each call captures a [`RequestToken`] and its
/// completion is committed only if no newer request was issued in the meantime, so a
/// slow response can never overwrite what a later one reported.
pub struct SaveCoordinator<A> {
    api: Rc<A>,
    inner: Rc<RefCell<Inner>>,
}

impl<A> Clone for SaveCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<A: PageApi> SaveCoordinator<A> {
    pub fn new(api: Rc<A>) -> Self {
        Self {
            api,
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    pub fn api(&self) -> Rc<A> {
        self.api.clone()
    }

    pub fn state(&self) -> SyncState {
        self.inner.borrow().state.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    pub fn has_pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    /// Content changed locally. Clears a stale error so the next attempt starts clean.
    pub fn mark_dirty(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.state.dirty = true;
        if inner.state.status == SaveStatus::Saved {
            inner.state.status = SaveStatus::Idle;
        }
        inner.state.last_error = None;
    }

    /// Back to a pristine state. Anything still in flight becomes stale.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.generation += 1;
        inner.state = SyncState::default();
        inner.pending = None;
    }

    fn begin(&self, status: SaveStatus) -> RequestToken {
        let mut inner = self.inner.borrow_mut();
        inner.generation += 1;
        inner.state.status = status;
        inner.state.last_error = None;
        RequestToken(inner.generation)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.inner.borrow().generation == token.0
    }

    /// Commit a completion if `token` is still the latest request.
    fn finish(
        &self,
        token: RequestToken,
        result: ApiResult<SaveResponse>,
        fallback: &str,
        stamp: impl FnOnce(SaveResponse) -> String,
    ) -> SaveOutcome {
        let mut inner = self.inner.borrow_mut();
        if inner.generation != token.0 {
            log!(
                "[save] dropping result of request {} (current is {})",
                token.0,
                inner.generation
            );
            return SaveOutcome::Superseded;
        }

        match result {
            Ok(resp) => {
                inner.state.dirty = false;
                inner.state.status = SaveStatus::Saved;
                inner.state.last_saved_at = Some(stamp(resp));
                inner.state.last_error = None;
                SaveOutcome::Applied
            }
            Err(e) => {
                warn!("[save] request {} failed: {e}", token.0);
                inner.state.status = SaveStatus::Error;
                inner.state.last_error = Some(failure_message(&e, fallback));
                SaveOutcome::Failed
            }
        }
    }

    /// Submit `req` for `page_id`. The body is kept for `retry_save` until a save succeeds.
    pub async fn save_draft(&self, page_id: i64, req: SaveRequest) -> SaveOutcome {
        let token = self.begin(SaveStatus::Saving);
        self.inner.borrow_mut().pending = Some((page_id, req.clone()));

        let result = self.api.save_draft(page_id, &req).await;
        let outcome = self.finish(token, result, SAVE_FAILED, |resp| {
            resp.updated_at.unwrap_or_else(now_iso)
        });
        if outcome.is_applied() {
            self.inner.borrow_mut().pending = None;
        }
        outcome
    }

    /// Save `req`, then publish. A failed save skips the publish call.
    pub async fn publish(&self, page_id: i64, req: SaveRequest) -> SaveOutcome {
        let token = self.begin(SaveStatus::Publishing);

        if let Err(e) = self.api.save_draft(page_id, &req).await {
            return self.finish(token, Err(e), SAVE_FAILED, |_| now_iso());
        }
        if !self.is_current(token) {
            log!("[save] publish {} superseded before publishing", token.0);
            return SaveOutcome::Superseded;
        }

        let result = self.api.publish(page_id).await;
        self.finish(token, result, PUBLISH_FAILED, |_| now_iso())
    }

    /// Replay the last body given to `save_draft`, if it has not gone through yet.
    pub async fn retry_save(&self) -> SaveOutcome {
        let Some((page_id, req)) = self.inner.borrow().pending.clone() else {
            return SaveOutcome::NothingPending;
        };
        self.save_draft(page_id, req).await
    }
}

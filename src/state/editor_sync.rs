use crate::api::{ApiClient, ApiError, PageApi, SaveRequest};
use crate::cache::CanonicalSnapshot;
use crate::drafts::DraftStore;
use crate::error::EditorError;
use crate::models::{Block, Link, LinkGroup, Page};
use crate::state::{SaveCoordinator, SaveOutcome, SaveStatus};
use leptos::logging::{log, warn};
use leptos::prelude::*;
use leptos::task::spawn_local;
use std::future::Future;
use std::rc::Rc;

/// Reactive front of one editing session.
///
/// Owns the page's `DraftStore` and `SaveCoordinator` and mirrors their state into signals
/// for the editor chrome. Edits are refused while a save or publish is in flight, so the
/// store never changes under a request that is still being answered.
pub struct EditorSyncController<A: PageApi + 'static = ApiClient> {
    store: StoredValue<DraftStore>,
    coordinator: StoredValue<SaveCoordinator<A>, LocalStorage>,

    page_id: RwSignal<Option<i64>>,
    status: RwSignal<SaveStatus>,
    dirty: RwSignal<bool>,
    last_saved_at: RwSignal<Option<String>>,
    last_error: RwSignal<Option<String>>,

    loading: RwSignal<bool>,
    load_error: RwSignal<Option<String>>,
    /// Load guard: responses for an older load are ignored.
    load_request_id: RwSignal<u64>,

    /// Bumped whenever the materialized views may have changed.
    revision: RwSignal<u64>,
    /// Store revision the last dispatched save body was compiled from.
    sent_revision: RwSignal<Option<u64>>,
}

/// What a dispatched request sends.
enum Dispatch {
    Save(SaveRequest),
    Replay,
    Publish(SaveRequest),
}

impl<A: PageApi + 'static> Clone for EditorSyncController<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: PageApi + 'static> Copy for EditorSyncController<A> {}

impl<A: PageApi + 'static> EditorSyncController<A> {
    pub fn new(api: A) -> Self {
        Self {
            store: StoredValue::new(DraftStore::new()),
            coordinator: StoredValue::new_local(SaveCoordinator::new(Rc::new(api))),
            page_id: RwSignal::new(None),
            status: RwSignal::new(SaveStatus::Idle),
            dirty: RwSignal::new(false),
            last_saved_at: RwSignal::new(None),
            last_error: RwSignal::new(None),
            loading: RwSignal::new(false),
            load_error: RwSignal::new(None),
            load_request_id: RwSignal::new(0),
            revision: RwSignal::new(0),
            sent_revision: RwSignal::new(None),
        }
    }

    pub fn status(&self) -> ReadSignal<SaveStatus> {
        self.status.read_only()
    }

    pub fn dirty(&self) -> ReadSignal<bool> {
        self.dirty.read_only()
    }

    pub fn last_saved_at(&self) -> ReadSignal<Option<String>> {
        self.last_saved_at.read_only()
    }

    pub fn last_error(&self) -> ReadSignal<Option<String>> {
        self.last_error.read_only()
    }

    pub fn loading(&self) -> ReadSignal<bool> {
        self.loading.read_only()
    }

    pub fn load_error(&self) -> ReadSignal<Option<String>> {
        self.load_error.read_only()
    }

    pub fn revision(&self) -> ReadSignal<u64> {
        self.revision.read_only()
    }

    pub fn page_id(&self) -> ReadSignal<Option<i64>> {
        self.page_id.read_only()
    }

    /// Copy coordinator and store state into the signals.
    fn pull(&self) {
        let st = self.coordinator.with_value(|c| c.state());
        let (dirty, revision) = self.store.with_value(|s| (s.is_dirty(), s.revision()));

        self.status.set(st.status);
        self.last_saved_at.set(st.last_saved_at);
        self.last_error.set(st.last_error);
        self.dirty.set(dirty);
        self.revision.set(revision);
    }

    fn install(&self, page_id: i64, snapshot: CanonicalSnapshot) {
        self.store.update_value(|s| s.install_snapshot(snapshot));
        self.page_id.set(Some(page_id));
        self.load_error.set(None);
    }

    fn fail_load(&self, page_id: i64, source: ApiError) {
        let e = EditorError::Fetch { page_id, source };
        warn!("[editor] {e}");
        self.store.update_value(|s| s.invalidate());
        self.page_id.set(None);
        self.load_error.set(Some(e.to_string()));
    }

    /// Open `page_id`, dropping whatever session was open before.
    pub fn load(&self, page_id: i64) {
        spawn_local(self.begin_load(page_id));
    }

    fn begin_load(&self, page_id: i64) -> impl Future<Output = ()> + 'static {
        let req_id = self.load_request_id.get_untracked().saturating_add(1);
        self.load_request_id.set(req_id);

        self.loading.set(true);
        self.load_error.set(None);
        self.sent_revision.set(None);
        self.coordinator.with_value(|c| c.reset());

        let api = self.coordinator.with_value(|c| c.api());
        let this = *self;
        async move {
            let result = api.fetch_draft(page_id).await;

            if this.load_request_id.get_untracked() != req_id {
                log!("[editor] ignoring stale load of page {page_id}");
                return;
            }

            match result {
                Ok(snapshot) => this.install(page_id, snapshot),
                Err(e) => this.fail_load(page_id, e),
            }
            this.loading.set(false);
            this.pull();
        }
    }

    /// Run one mutation against the store. `None` when edits are currently refused.
    pub fn edit<R>(&self, f: impl FnOnce(&mut DraftStore) -> R) -> Option<R> {
        let status = self.status.get_untracked();
        if status.is_busy() {
            warn!("[editor] edit refused while {status}");
            return None;
        }

        let before = self.store.with_value(|s| s.revision());
        let (out, after) = self.store.try_update_value(|s| {
            let out = f(s);
            (out, s.revision())
        })?;
        if after != before {
            self.coordinator.with_value(|c| c.mark_dirty());
            self.pull();
        }
        Some(out)
    }

    pub fn page(&self) -> Option<Page> {
        self.revision.track();
        self.store.with_value(|s| s.page())
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.revision.track();
        self.store.with_value(|s| s.blocks())
    }

    pub fn link_groups(&self) -> Vec<LinkGroup> {
        self.revision.track();
        self.store.with_value(|s| s.link_groups())
    }

    pub fn links_of(&self, group_id: i64) -> Vec<Link> {
        self.revision.track();
        self.store.with_value(|s| s.links_of(group_id))
    }

    /// Drop all pending edits.
    pub fn discard(&self) {
        if self.status.get_untracked().is_busy() {
            return;
        }
        self.store.update_value(|s| s.discard());
        self.pull();
    }

    /// After an applied save, re-fetch so local entities pick up their server ids.
    async fn reload_after(this: Self, api: Rc<A>, page_id: i64, outcome: SaveOutcome) {
        if outcome.is_applied() {
            let req_id = this.load_request_id.get_untracked();
            let result = api.fetch_draft(page_id).await;
            if this.load_request_id.get_untracked() != req_id {
                return;
            }
            match result {
                Ok(snapshot) => this.install(page_id, snapshot),
                Err(e) => this.fail_load(page_id, e),
            }
        }
        this.pull();
    }

    fn dispatch(
        &self,
        page_id: i64,
        job: Dispatch,
    ) -> impl Future<Output = SaveOutcome> + 'static {
        let coordinator = self.coordinator.get_value();
        let revision = self.store.with_value(|s| s.revision());
        self.sent_revision.set(Some(revision));
        self.status.set(match job {
            Dispatch::Publish(_) => SaveStatus::Publishing,
            Dispatch::Save(_) | Dispatch::Replay => SaveStatus::Saving,
        });

        let this = *self;
        async move {
            let outcome = match job {
                Dispatch::Save(req) => coordinator.save_draft(page_id, req).await,
                Dispatch::Replay => coordinator.retry_save().await,
                Dispatch::Publish(req) => coordinator.publish(page_id, req).await,
            };
            Self::reload_after(this, coordinator.api(), page_id, outcome).await;
            outcome
        }
    }

    /// Submit pending edits. Nothing is sent when the edits cancel out.
    pub fn save(&self) {
        if let Some(task) = self.begin_save() {
            spawn_local(async move {
                task.await;
            });
        }
    }

    fn begin_save(&self) -> Option<impl Future<Output = SaveOutcome> + 'static> {
        if self.status.get_untracked().is_busy() {
            return None;
        }
        let Some((page_id, req)) = self.store.try_update_value(|s| s.prepare_save()).flatten()
        else {
            self.pull();
            return None;
        };
        Some(self.dispatch(page_id, Dispatch::Save(req)))
    }

    /// Try the failed save again.
    ///
    /// The stored body is replayed only while the store is exactly as it was when that
    /// body was compiled. Any edit made since then (allowed in the error state) means the
    /// body is rebuilt from the store, so those edits go out too.
    pub fn retry(&self) {
        if let Some(task) = self.begin_retry() {
            spawn_local(async move {
                task.await;
            });
        }
    }

    fn begin_retry(&self) -> Option<impl Future<Output = SaveOutcome> + 'static> {
        if self.status.get_untracked().is_busy() {
            return None;
        }
        let page_id = self.store.with_value(|s| s.page_id())?;
        if !self.coordinator.with_value(|c| c.has_pending()) {
            return None;
        }

        let revision = self.store.with_value(|s| s.revision());
        if self.sent_revision.get_untracked() == Some(revision) {
            return Some(self.dispatch(page_id, Dispatch::Replay));
        }
        log!("[editor] page {page_id} changed since the failed save, rebuilding body");
        let Some((page_id, req)) = self.store.try_update_value(|s| s.prepare_save()).flatten()
        else {
            self.pull();
            return None;
        };
        Some(self.dispatch(page_id, Dispatch::Save(req)))
    }

    /// Save whatever is pending, then publish the page.
    pub fn publish(&self) {
        if let Some(task) = self.begin_publish() {
            spawn_local(async move {
                task.await;
            });
        }
    }

    fn begin_publish(&self) -> Option<impl Future<Output = SaveOutcome> + 'static> {
        if self.status.get_untracked().is_busy() {
            return None;
        }
        let (page_id, req) = self
            .store
            .with_value(|s| s.page_id().map(|id| (id, s.compile_save_diff())))?;
        Some(self.dispatch(page_id, Dispatch::Publish(req)))
    }
}

/// Create a controller and make it available to the component tree.
pub fn provide_editor_sync(api: ApiClient) -> EditorSyncController {
    let ctrl = EditorSyncController::new(api);
    provide_context(ctrl);
    ctrl
}

pub fn use_editor_sync() -> Option<EditorSyncController> {
    use_context::<EditorSyncController>()
}

//! In-memory `PageApi` fakes and fixture builders for unit tests.

use crate::api::{ApiError, ApiResult, PageApi, SaveRequest, SaveResponse};
use crate::cache::CanonicalSnapshot;
use crate::models::{Block, BlockKind, LayoutType, Link, LinkGroup, Page};
use crate::order_key::OrderKey;
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

pub(crate) fn page(id: i64) -> Page {
    serde_json::from_value(serde_json::json!({ "id": id })).expect("page fixture")
}

pub(crate) fn block(id: i64, key: &str) -> Block {
    Block {
        id,
        page_id: 1,
        kind: BlockKind::Text,
        sort_key: OrderKey::parse(key).expect("valid key"),
        ref_id: None,
        content: serde_json::json!({}),
        is_visible: true,
    }
}

pub(crate) fn group(id: i64) -> LinkGroup {
    LinkGroup {
        id,
        page_id: 1,
        title: None,
        layout_type: LayoutType::List,
        layout_config: serde_json::json!({}),
        style_override: None,
    }
}

pub(crate) fn link(id: i64, group_id: i64, key: &str) -> Link {
    Link {
        id,
        group_id,
        title: format!("link {id}"),
        url: format!("https://example.com/{id}"),
        icon_asset_id: None,
        sort_key: OrderKey::parse(key).expect("valid key"),
        is_active: true,
        created_at: None,
        updated_at: None,
    }
}

/// Snapshot of page 1; every group gets a (possibly empty) links entry.
pub(crate) fn snapshot(
    blocks: Vec<Block>,
    link_groups: Vec<LinkGroup>,
    links: Vec<Link>,
) -> CanonicalSnapshot {
    let mut by_group: BTreeMap<i64, Vec<Link>> =
        link_groups.iter().map(|g| (g.id, vec![])).collect();
    for l in links {
        by_group.entry(l.group_id).or_default().push(l);
    }
    CanonicalSnapshot {
        page: page(1),
        blocks,
        link_groups,
        links: by_group,
    }
}

/// Answers immediately from canned data and records every save body.
pub(crate) struct CannedApi {
    draft: RefCell<CanonicalSnapshot>,
    fetch_error: RefCell<Option<ApiError>>,
    save_error: RefCell<Option<ApiError>>,
    publish_error: RefCell<Option<ApiError>>,
    saves: RefCell<Vec<(i64, SaveRequest)>>,
    publishes: Cell<usize>,
}

impl CannedApi {
    pub fn new(draft: CanonicalSnapshot) -> Self {
        Self {
            draft: RefCell::new(draft),
            fetch_error: RefCell::new(None),
            save_error: RefCell::new(None),
            publish_error: RefCell::new(None),
            saves: RefCell::new(vec![]),
            publishes: Cell::new(0),
        }
    }

    pub fn set_draft(&self, draft: CanonicalSnapshot) {
        *self.draft.borrow_mut() = draft;
    }

    pub fn fail_fetch(&self, e: ApiError) {
        *self.fetch_error.borrow_mut() = Some(e);
    }

    pub fn fail_save(&self, e: ApiError) {
        *self.save_error.borrow_mut() = Some(e);
    }

    pub fn fail_publish(&self, e: ApiError) {
        *self.publish_error.borrow_mut() = Some(e);
    }

    pub fn clear_failures(&self) {
        self.fetch_error.borrow_mut().take();
        self.save_error.borrow_mut().take();
        self.publish_error.borrow_mut().take();
    }

    pub fn saved(&self) -> Vec<(i64, SaveRequest)> {
        self.saves.borrow().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.get()
    }
}

impl PageApi for CannedApi {
    async fn fetch_draft(&self, _page_id: i64) -> ApiResult<CanonicalSnapshot> {
        if let Some(e) = self.fetch_error.borrow().clone() {
            return Err(e);
        }
        Ok(self.draft.borrow().clone())
    }

    async fn save_draft(&self, page_id: i64, req: &SaveRequest) -> ApiResult<SaveResponse> {
        self.saves.borrow_mut().push((page_id, req.clone()));
        if let Some(e) = self.save_error.borrow().clone() {
            return Err(e);
        }
        Ok(SaveResponse {
            updated_at: Some(format!("2026-01-01T00:00:0{}Z", self.saves.borrow().len())),
        })
    }

    async fn publish(&self, _page_id: i64) -> ApiResult<SaveResponse> {
        self.publishes.set(self.publishes.get() + 1);
        if let Some(e) = self.publish_error.borrow().clone() {
            return Err(e);
        }
        Ok(SaveResponse::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Fetch,
    Save,
    Publish,
}

type Gate = oneshot::Sender<ApiResult<serde_json::Value>>;

/// Every call parks until the test resolves it, so completion order is scripted.
#[derive(Default)]
pub(crate) struct GatedApi {
    calls: RefCell<Vec<(Call, Option<Gate>)>>,
}

impl GatedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().iter().map(|(c, _)| *c).collect()
    }

    /// Complete call `index` (in issue order) with a JSON body or an error.
    pub fn resolve(&self, index: usize, result: ApiResult<serde_json::Value>) {
        let gate = self
            .calls
            .borrow_mut()
            .get_mut(index)
            .and_then(|(_, g)| g.take())
            .expect("call pending");
        gate.send(result).expect("caller still waiting");
    }

    pub fn succeed_save(&self, index: usize, updated_at: &str) {
        self.resolve(index, Ok(serde_json::json!({ "updated_at": updated_at })));
    }

    async fn park<T: serde::de::DeserializeOwned>(&self, call: Call) -> ApiResult<T> {
        let (tx, rx) = oneshot::channel();
        self.calls.borrow_mut().push((call, Some(tx)));
        let body = rx.await.expect("gate dropped")?;
        Ok(serde_json::from_value(body).expect("fixture body"))
    }
}

impl PageApi for GatedApi {
    async fn fetch_draft(&self, _page_id: i64) -> ApiResult<CanonicalSnapshot> {
        self.park(Call::Fetch).await
    }

    async fn save_draft(&self, _page_id: i64, _req: &SaveRequest) -> ApiResult<SaveResponse> {
        self.park(Call::Save).await
    }

    async fn publish(&self, _page_id: i64) -> ApiResult<SaveResponse> {
        self.park(Call::Publish).await
    }
}

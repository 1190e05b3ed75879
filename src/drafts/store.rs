use crate::api::{PageApi, SaveRequest};
use crate::cache::CanonicalSnapshot;
use crate::drafts::overlay::{Layer, PendingOverlay};
use crate::error::EditorError;
use crate::models::{
    Block, BlockField, BlockKind, Entity, EntityKind, GroupField, LayoutType, Link, LinkField,
    LinkGroup, Page, PageField,
};
use crate::order_key::OrderKey;
use crate::util::now_iso;
use leptos::logging::{log, warn};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Optimistic editing session for one page.
///
/// Holds the last canonical snapshot plus the overlay of pending edits. Views are pure
/// projections; every mutator leaves snapshot, overlay and tombstones consistent before
/// returning.
///
/// Entities created locally get a negative id from a counter that starts at -1 and only
/// ever decreases, so it can never collide with a server id.
#[derive(Clone, Debug)]
pub struct DraftStore {
    snapshot: Option<CanonicalSnapshot>,
    overlay: PendingOverlay,
    dirty: bool,
    next_temp_id: i64,
    revision: u64,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge typed field updates onto `current`. All-or-nothing.
fn merged<T: Entity>(
    current: &T,
    fields: impl IntoIterator<Item = T::Field>,
) -> Result<T, EditorError> {
    let mut next = current.clone();
    for f in fields {
        next.apply(f).map_err(|e| EditorError::InvalidField {
            entity: T::KIND,
            id: current.id(),
            field: e.field,
            reason: e.reason,
        })?;
    }
    Ok(next)
}

/// Key that puts `moving` at `index` of `siblings` once it is taken out of them.
fn reorder_key<T: Entity>(siblings: &[T], moving: i64, index: usize) -> OrderKey {
    let rest: Vec<&T> = siblings.iter().filter(|e| e.id() != moving).collect();
    let idx = index.min(rest.len());
    let prev = idx
        .checked_sub(1)
        .and_then(|i| rest.get(i))
        .and_then(|e| e.sort_key());
    let next = rest.get(idx).and_then(|e| e.sort_key());
    OrderKey::generate(prev, next)
}

/// Server ids first in ascending order, then local ones in creation order.
fn creation_order(a: i64, b: i64) -> Ordering {
    (a < 0, a.abs()).cmp(&(b < 0, b.abs()))
}

impl DraftStore {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            overlay: PendingOverlay::default(),
            dirty: false,
            next_temp_id: -1,
            revision: 0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every change to the materialized state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn page_id(&self) -> Option<i64> {
        self.snapshot.as_ref().map(|s| s.page.id)
    }

    pub fn overlay(&self) -> &PendingOverlay {
        &self.overlay
    }

    pub fn snapshot(&self) -> Option<&CanonicalSnapshot> {
        self.snapshot.as_ref()
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    fn mint_id(&mut self) -> i64 {
        let id = self.next_temp_id;
        self.next_temp_id -= 1;
        id
    }

    /// Fetch the page's draft and replace all local state with it.
    pub async fn load<A: PageApi>(&mut self, api: &A, page_id: i64) -> Result<(), EditorError> {
        match api.fetch_draft(page_id).await {
            Ok(snapshot) => {
                self.install_snapshot(snapshot);
                Ok(())
            }
            Err(source) => {
                warn!("[drafts] load page {page_id} failed: {source}");
                self.invalidate();
                Err(EditorError::Fetch { page_id, source })
            }
        }
    }

    /// Replace the canonical snapshot and drop every pending edit.
    pub fn install_snapshot(&mut self, snapshot: CanonicalSnapshot) {
        log!(
            "[drafts] loaded page {} ({} blocks, {} groups)",
            snapshot.page.id,
            snapshot.blocks.len(),
            snapshot.link_groups.len()
        );
        self.snapshot = Some(snapshot);
        self.overlay.clear();
        self.dirty = false;
        self.revision += 1;
    }

    /// Forget the snapshot after a failed load; nothing is editable until the next load.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.overlay.clear();
        self.dirty = false;
        self.revision += 1;
    }

    /// Drop pending edits and locally created entities, keeping the canonical snapshot.
    pub fn discard(&mut self) {
        if let Some(snap) = self.snapshot.as_mut() {
            snap.remove_temporary();
        }
        self.overlay.clear();
        self.dirty = false;
        self.revision += 1;
    }

    // ---- views ----

    pub fn page(&self) -> Option<Page> {
        let snap = self.snapshot.as_ref()?;
        Some(self.overlay.page.clone().unwrap_or_else(|| snap.page.clone()))
    }

    pub fn blocks(&self) -> Vec<Block> {
        let Some(snap) = &self.snapshot else {
            return vec![];
        };
        self.overlay.blocks.materialize(&snap.blocks)
    }

    /// Groups ordered by the `link_group` block that references them; unreferenced groups
    /// follow in creation order.
    pub fn link_groups(&self) -> Vec<LinkGroup> {
        let Some(snap) = &self.snapshot else {
            return vec![];
        };

        let blocks = self.blocks();
        let mut rank: HashMap<i64, &OrderKey> = HashMap::new();
        for b in blocks.iter().filter(|b| b.kind == BlockKind::LinkGroup) {
            if let Some(group_id) = b.ref_id {
                rank.entry(group_id).or_insert(&b.sort_key);
            }
        }

        let mut groups = self.overlay.groups.materialize(&snap.link_groups);
        groups.sort_by(|a, b| match (rank.get(&a.id), rank.get(&b.id)) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => creation_order(a.id, b.id),
        });
        groups
    }

    fn group_visible(&self, group_id: i64) -> bool {
        self.snapshot
            .as_ref()
            .and_then(|s| s.find_group(group_id))
            .is_some_and(|g| !self.overlay.groups.is_deleted(g.id))
    }

    /// Links of one group, empty when the group is gone.
    pub fn links_of(&self, group_id: i64) -> Vec<Link> {
        let Some(snap) = &self.snapshot else {
            return vec![];
        };
        if !self.group_visible(group_id) {
            return vec![];
        }
        match snap.links.get(&group_id) {
            Some(links) => self.overlay.links.materialize(links),
            None => vec![],
        }
    }

    fn current_block(&self, id: i64) -> Option<&Block> {
        let base = self.snapshot.as_ref()?.find_block(id)?;
        self.overlay.blocks.resolve(base)
    }

    fn current_group(&self, id: i64) -> Option<&LinkGroup> {
        let base = self.snapshot.as_ref()?.find_group(id)?;
        self.overlay.groups.resolve(base)
    }

    fn current_link(&self, id: i64) -> Option<&Link> {
        let base = self.snapshot.as_ref()?.find_link(id)?;
        if !self.group_visible(base.group_id) {
            return None;
        }
        self.overlay.links.resolve(base)
    }

    // ---- page ----

    pub fn update_page(
        &mut self,
        fields: impl IntoIterator<Item = PageField>,
    ) -> Result<bool, EditorError> {
        let Some(current) = self.page() else {
            return Ok(false);
        };
        let mut next = current.clone();
        for f in fields {
            next.apply(f).map_err(|e| EditorError::InvalidField {
                entity: EntityKind::Page,
                id: current.id,
                field: e.field,
                reason: e.reason,
            })?;
        }
        if next != current {
            self.overlay.page = Some(next);
            self.touch();
        }
        Ok(true)
    }

    // ---- blocks ----

    /// Append a new block after `after` (or at the end). Returns its temporary id.
    pub fn add_block(&mut self, kind: BlockKind, after: Option<i64>) -> Option<i64> {
        let page_id = self.page_id()?;
        let blocks = self.blocks();
        let last = || OrderKey::generate(blocks.last().map(|b| &b.sort_key), None);
        let sort_key = match after {
            Some(after_id) => match blocks.iter().position(|b| b.id == after_id) {
                Some(i) => OrderKey::generate(
                    Some(&blocks[i].sort_key),
                    blocks.get(i + 1).map(|b| &b.sort_key),
                ),
                None => {
                    warn!("[drafts] add_block: block {after_id} is gone, appending");
                    last()
                }
            },
            None => last(),
        };

        let id = self.mint_id();
        let block = Block {
            id,
            page_id,
            kind,
            sort_key,
            ref_id: None,
            content: serde_json::json!({}),
            is_visible: true,
        };
        self.snapshot.as_mut()?.blocks.push(block);
        self.touch();
        Some(id)
    }

    /// Returns `Ok(false)` when the block no longer exists.
    pub fn update_block(
        &mut self,
        id: i64,
        fields: impl IntoIterator<Item = BlockField>,
    ) -> Result<bool, EditorError> {
        let Some(current) = self.current_block(id) else {
            return Ok(false);
        };
        let next = merged(current, fields)?;
        if &next != current {
            self.overlay.blocks.updated.insert(id, next);
            self.touch();
        }
        Ok(true)
    }

    pub fn delete_block(&mut self, id: i64) {
        self.overlay.blocks.tombstones.insert(id);
        self.touch();
    }

    /// Move a block so it lands at `new_index` of the materialized order.
    pub fn reorder_block(&mut self, id: i64, new_index: usize) -> Result<bool, EditorError> {
        let blocks = self.blocks();
        let Some(pos) = blocks.iter().position(|b| b.id == id) else {
            return Ok(false);
        };
        if pos == new_index.min(blocks.len() - 1) {
            return Ok(true);
        }
        let key = reorder_key(&blocks, id, new_index);
        self.update_block(id, [BlockField::SortKey(key)])
    }

    // ---- link groups ----

    pub fn add_link_group(&mut self, title: Option<String>) -> Option<i64> {
        let page_id = self.page_id()?;
        let id = self.mint_id();
        let snap = self.snapshot.as_mut()?;
        snap.link_groups.push(LinkGroup {
            id,
            page_id,
            title,
            layout_type: LayoutType::List,
            layout_config: serde_json::json!({}),
            style_override: None,
        });
        snap.links.insert(id, vec![]);
        self.touch();
        Some(id)
    }

    pub fn update_link_group(
        &mut self,
        id: i64,
        fields: impl IntoIterator<Item = GroupField>,
    ) -> Result<bool, EditorError> {
        let Some(current) = self.current_group(id) else {
            return Ok(false);
        };
        let next = merged(current, fields)?;
        if &next != current {
            self.overlay.groups.updated.insert(id, next);
            self.touch();
        }
        Ok(true)
    }

    /// Tombstone a group; its links go with it.
    pub fn delete_link_group(&mut self, id: i64) {
        self.overlay.groups.tombstones.insert(id);
        self.touch();
    }

    // ---- links ----

    /// Append a link at the end of `group_id`. `Ok(None)` when the group is gone.
    pub fn add_link(
        &mut self,
        group_id: i64,
        title: &str,
        url: &str,
    ) -> Result<Option<i64>, EditorError> {
        if !self.group_visible(group_id) {
            return Ok(None);
        }
        let links = self.links_of(group_id);
        let sort_key = OrderKey::generate(links.last().map(|l| &l.sort_key), None);

        let now = now_iso();
        let mut link = Link {
            id: 0,
            group_id,
            title: title.to_string(),
            url: String::new(),
            icon_asset_id: None,
            sort_key,
            is_active: true,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        link.apply(LinkField::Url(url.to_string()))
            .map_err(|e| EditorError::InvalidField {
                entity: Link::KIND,
                id: 0,
                field: e.field,
                reason: e.reason,
            })?;

        link.id = self.mint_id();
        let id = link.id;
        let Some(snap) = self.snapshot.as_mut() else {
            return Ok(None);
        };
        snap.links.entry(group_id).or_default().push(link);
        self.touch();
        Ok(Some(id))
    }

    pub fn update_link(
        &mut self,
        id: i64,
        fields: impl IntoIterator<Item = LinkField>,
    ) -> Result<bool, EditorError> {
        let Some(current) = self.current_link(id) else {
            return Ok(false);
        };
        let next = merged(current, fields)?;
        if &next != current {
            self.overlay.links.updated.insert(id, next);
            self.touch();
        }
        Ok(true)
    }

    pub fn delete_link(&mut self, id: i64) {
        self.overlay.links.tombstones.insert(id);
        self.touch();
    }

    /// Move a link within its group to `new_index`.
    pub fn reorder_link(&mut self, id: i64, new_index: usize) -> Result<bool, EditorError> {
        let Some(group_id) = self.current_link(id).map(|l| l.group_id) else {
            return Ok(false);
        };
        let links = self.links_of(group_id);
        let Some(pos) = links.iter().position(|l| l.id == id) else {
            return Ok(false);
        };
        if pos == new_index.min(links.len() - 1) {
            return Ok(true);
        }
        let key = reorder_key(&links, id, new_index);
        self.update_link(id, [LinkField::SortKey(key)])
    }

    // ---- persistence ----

    /// Minimal diff of everything touched since the last load.
    pub fn compile_save_diff(&self) -> SaveRequest {
        let Some(snap) = &self.snapshot else {
            return SaveRequest::default();
        };
        let groups: &Layer<LinkGroup> = &self.overlay.groups;
        SaveRequest {
            page: self.overlay.page.clone(),
            blocks: self.overlay.blocks.compile(&snap.blocks, |_| false),
            link_groups: groups.compile(&snap.link_groups, |_| false),
            links: self
                .overlay
                .links
                .compile(snap.all_links(), |l| groups.is_deleted(l.group_id)),
        }
    }

    /// The diff to send, or `None` when there is nothing to save.
    ///
    /// A dirty store whose edits cancel out (e.g. a block added then deleted) is marked
    /// clean here without a network round trip.
    pub fn prepare_save(&mut self) -> Option<(i64, SaveRequest)> {
        if !self.dirty {
            return None;
        }
        let page_id = self.page_id()?;
        let req = self.compile_save_diff();
        if req.is_empty() {
            self.dirty = false;
            return None;
        }
        Some((page_id, req))
    }

    /// Submit the diff, then reload to pick up server ids for local entities.
    ///
    /// On failure nothing changes, so the same diff can be retried. Returns `Ok(false)`
    /// when there was nothing to save, including before the first successful load.
    pub async fn save<A: PageApi>(&mut self, api: &A) -> Result<bool, EditorError> {
        let Some((page_id, req)) = self.prepare_save() else {
            return Ok(false);
        };

        log!(
            "[drafts] saving page {page_id}: {} blocks, {} groups, {} links",
            req.blocks.len(),
            req.link_groups.len(),
            req.links.len()
        );
        if let Err(e) = api.save_draft(page_id, &req).await {
            warn!("[drafts] save page {page_id} failed: {e}");
            return Err(EditorError::from_save(e));
        }

        self.load(api, page_id).await?;
        Ok(true)
    }
}

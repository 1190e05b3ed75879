use crate::api::DiffEntry;
use crate::models::{Block, Entity, Link, LinkGroup, Page};
use std::collections::{BTreeMap, BTreeSet};

/// Pending edits for one entity kind: updated versions keyed by id, plus tombstones.
#[derive(Clone, Debug)]
pub struct Layer<T> {
    pub updated: BTreeMap<i64, T>,
    pub tombstones: BTreeSet<i64>,
}

impl<T> Default for Layer<T> {
    fn default() -> Self {
        Self {
            updated: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }
}

impl<T: Entity> Layer<T> {
    pub fn is_deleted(&self, id: i64) -> bool {
        self.tombstones.contains(&id)
    }

    /// The entity as the editor currently sees it, or `None` once tombstoned.
    pub fn resolve<'a>(&'a self, base: &'a T) -> Option<&'a T> {
        if self.is_deleted(base.id()) {
            return None;
        }
        Some(self.updated.get(&base.id()).unwrap_or(base))
    }

    /// Overlay `base`, drop tombstones, sort by ordering key then id.
    pub fn materialize<'a>(&self, base: impl IntoIterator<Item = &'a T>) -> Vec<T>
    where
        T: 'a,
    {
        let mut out: Vec<T> = base
            .into_iter()
            .filter_map(|e| self.resolve(e))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.sort_key()
                .cmp(&b.sort_key())
                .then_with(|| a.id().cmp(&b.id()))
        });
        out
    }

    /// Minimal diff over `base`.
    ///
    /// `cascade` marks entities deleted through their parent. They produce no entry of
    /// their own: the server removes them together with the parent.
    pub fn compile<'a>(
        &self,
        base: impl IntoIterator<Item = &'a T>,
        cascade: impl Fn(&T) -> bool,
    ) -> Vec<DiffEntry<T>>
    where
        T: 'a,
    {
        let mut out = Vec::new();
        for e in base {
            let id = e.id();
            if self.is_deleted(id) {
                // Never-saved entities have nothing to delete server-side.
                if id > 0 {
                    out.push(DiffEntry::delete(e.clone()));
                }
            } else if cascade(e) {
                continue;
            } else if let Some(updated) = self.updated.get(&id) {
                out.push(DiffEntry::upsert(updated.clone()));
            } else if id < 0 {
                out.push(DiffEntry::upsert(e.clone()));
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.updated.clear();
        self.tombstones.clear();
    }
}

/// Everything edited locally since the last load, layered over the canonical snapshot.
#[derive(Clone, Debug, Default)]
pub struct PendingOverlay {
    pub page: Option<Page>,
    pub blocks: Layer<Block>,
    pub groups: Layer<LinkGroup>,
    pub links: Layer<Link>,
}

impl PendingOverlay {
    pub fn is_empty(&self) -> bool {
        self.page.is_none()
            && self.blocks.updated.is_empty()
            && self.blocks.tombstones.is_empty()
            && self.groups.updated.is_empty()
            && self.groups.tombstones.is_empty()
            && self.links.updated.is_empty()
            && self.links.tombstones.is_empty()
    }

    pub fn clear(&mut self) {
        self.page = None;
        self.blocks.clear();
        self.groups.clear();
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockKind;
    use crate::order_key::OrderKey;

    fn block(id: i64, key: &str) -> Block {
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

    #[test]
    fn test_materialize_breaks_key_ties_by_id() {
        let base = vec![block(9, "U"), block(-1, "U"), block(4, "A")];
        let layer = Layer::default();
        let ids: Vec<i64> = layer.materialize(&base).iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![4, -1, 9]);
    }

    #[test]
    fn test_compile_skips_untouched_and_unsynced_deletes() {
        let base = vec![block(1, "A"), block(2, "B"), block(-1, "C"), block(-2, "D")];
        let mut layer = Layer::default();
        layer.tombstones.insert(1);
        layer.tombstones.insert(-2);
        layer.updated.insert(-1, block(-1, "Z"));

        let diff = layer.compile(&base, |_| false);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].entity.id, 1);
        assert!(diff[0].delete);
        assert_eq!(diff[1].entity.sort_key.as_str(), "Z");
        assert!(!diff[1].delete);
    }

    #[test]
    fn test_compile_leaves_cascaded_entities_to_the_parent() {
        let base = vec![block(1, "A"), block(2, "B"), block(3, "C")];
        let mut layer = Layer::default();
        layer.tombstones.insert(2);
        layer.updated.insert(3, block(3, "Z"));

        // Everything counts as deleted through its parent.
        let diff = layer.compile(&base, |_| true);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].entity.id, 2);
        assert!(diff[0].delete);
    }
}

use crate::models::{Block, Link, LinkGroup, Page};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Last confirmed server state for one page, shaped exactly like the draft endpoint's
/// response. Replaced wholesale on load and on reload-after-save.
///
/// Entities created locally are appended to these arrays under a negative id until the
/// next reload replaces them with their server-assigned form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CanonicalSnapshot {
    pub page: Page,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub link_groups: Vec<LinkGroup>,
    /// group id -> links (JSON object keys are decimal strings).
    #[serde(default)]
    pub links: BTreeMap<i64, Vec<Link>>,
}

impl CanonicalSnapshot {
    pub fn find_block(&self, id: i64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn find_group(&self, id: i64) -> Option<&LinkGroup> {
        self.link_groups.iter().find(|g| g.id == id)
    }

    pub fn find_link(&self, id: i64) -> Option<&Link> {
        self.links.values().flatten().find(|l| l.id == id)
    }

    pub fn all_links(&self) -> impl Iterator<Item = &Link> {
        self.links.values().flatten()
    }

    /// Drop every locally created (negative id) entity.
    pub(crate) fn remove_temporary(&mut self) -> usize {
        let before = self.blocks.len() + self.link_groups.len() + self.all_links().count();

        self.blocks.retain(|b| b.id > 0);
        self.link_groups.retain(|g| g.id > 0);
        self.links.retain(|group_id, _| *group_id > 0);
        for links in self.links.values_mut() {
            links.retain(|l| l.id > 0);
        }

        before - (self.blocks.len() + self.link_groups.len() + self.all_links().count())
    }
}

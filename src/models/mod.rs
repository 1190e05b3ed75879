use crate::order_key::OrderKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

fn default_true() -> bool {
    true
}

/// Page metadata as returned by the draft endpoint.
///
/// `settings` belongs to the appearance layer and is carried through untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Page {
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub access_type: String,
    #[serde(default)]
    pub theme_preset_id: i64,
    #[serde(default)]
    pub theme_custom_id: Option<i64>,
    #[serde(default)]
    pub theme_mode: String,
    #[serde(default = "empty_object")]
    pub settings: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Block type. Types this editor does not know are kept verbatim in `Other`, so a page
/// using them still loads and saves them back unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    LinkGroup,
    Text,
    Product,
    Other(String),
}

impl BlockKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LinkGroup => "link_group",
            Self::Text => "text",
            Self::Product => "product",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for BlockKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "link_group" => Self::LinkGroup,
            "text" => Self::Text,
            "product" => Self::Product,
            _ => Self::Other(raw),
        }
    }
}

impl From<BlockKind> for String {
    fn from(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    AsRefStr,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LayoutType {
    #[default]
    List,
    Cards,
    Grid,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Block {
    pub id: i64,
    #[serde(default)]
    pub page_id: i64,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub sort_key: OrderKey,
    /// Referenced entity; the link group for `link_group` blocks.
    #[serde(default)]
    pub ref_id: Option<i64>,
    #[serde(default = "empty_object")]
    pub content: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_visible: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LinkGroup {
    pub id: i64,
    #[serde(default)]
    pub page_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub layout_type: LayoutType,
    #[serde(default = "empty_object")]
    pub layout_config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_override: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Link {
    pub id: i64,
    pub group_id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon_asset_id: Option<i64>,
    pub sort_key: OrderKey,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Page,
    Block,
    LinkGroup,
    Link,
}

/// A field update rejected by the per-kind schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidField {
    pub field: &'static str,
    pub reason: &'static str,
}

fn require_object(field: &'static str, v: &serde_json::Value) -> Result<(), InvalidField> {
    if v.is_object() {
        Ok(())
    } else {
        Err(InvalidField {
            field,
            reason: "must be a JSON object",
        })
    }
}

/// Something the draft store can overlay: identified, positioned, patchable field by field.
pub trait Entity: Clone {
    type Field;

    const KIND: EntityKind;

    fn id(&self) -> i64;

    /// Ordering key among siblings, if the entity carries one.
    fn sort_key(&self) -> Option<&OrderKey>;

    /// Apply one typed field update in place. On error `self` is left unchanged.
    fn apply(&mut self, field: Self::Field) -> Result<(), InvalidField>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockField {
    SortKey(OrderKey),
    RefId(Option<i64>),
    Content(serde_json::Value),
    IsVisible(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupField {
    Title(Option<String>),
    LayoutType(LayoutType),
    LayoutConfig(serde_json::Value),
    StyleOverride(Option<serde_json::Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LinkField {
    Title(String),
    Url(String),
    IconAssetId(Option<i64>),
    SortKey(OrderKey),
    IsActive(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PageField {
    Title(Option<String>),
    Locale(String),
    AccessType(String),
    ThemeMode(String),
    ThemePresetId(i64),
    /// Opaque appearance settings; replaced wholesale.
    Settings(serde_json::Value),
}

impl Entity for Block {
    type Field = BlockField;

    const KIND: EntityKind = EntityKind::Block;

    fn id(&self) -> i64 {
        self.id
    }

    fn sort_key(&self) -> Option<&OrderKey> {
        Some(&self.sort_key)
    }

    fn apply(&mut self, field: BlockField) -> Result<(), InvalidField> {
        match field {
            BlockField::SortKey(k) => self.sort_key = k,
            BlockField::RefId(r) => self.ref_id = r,
            BlockField::Content(c) => {
                require_object("content", &c)?;
                self.content = c;
            }
            BlockField::IsVisible(v) => self.is_visible = v,
        }
        Ok(())
    }
}

impl Entity for LinkGroup {
    type Field = GroupField;

    const KIND: EntityKind = EntityKind::LinkGroup;

    fn id(&self) -> i64 {
        self.id
    }

    fn sort_key(&self) -> Option<&OrderKey> {
        None
    }

    fn apply(&mut self, field: GroupField) -> Result<(), InvalidField> {
        match field {
            GroupField::Title(t) => self.title = t,
            GroupField::LayoutType(l) => self.layout_type = l,
            GroupField::LayoutConfig(c) => {
                require_object("layout_config", &c)?;
                self.layout_config = c;
            }
            GroupField::StyleOverride(s) => {
                if let Some(s) = &s {
                    require_object("style_override", s)?;
                }
                self.style_override = s;
            }
        }
        Ok(())
    }
}

impl Entity for Link {
    type Field = LinkField;

    const KIND: EntityKind = EntityKind::Link;

    fn id(&self) -> i64 {
        self.id
    }

    fn sort_key(&self) -> Option<&OrderKey> {
        Some(&self.sort_key)
    }

    fn apply(&mut self, field: LinkField) -> Result<(), InvalidField> {
        match field {
            LinkField::Title(t) => self.title = t,
            LinkField::Url(u) => {
                if u.trim().is_empty() {
                    return Err(InvalidField {
                        field: "url",
                        reason: "must not be blank",
                    });
                }
                self.url = u;
            }
            LinkField::IconAssetId(i) => self.icon_asset_id = i,
            LinkField::SortKey(k) => self.sort_key = k,
            LinkField::IsActive(a) => self.is_active = a,
        }
        Ok(())
    }
}

impl Page {
    pub fn apply(&mut self, field: PageField) -> Result<(), InvalidField> {
        match field {
            PageField::Title(t) => self.title = t,
            PageField::Locale(l) => self.locale = l,
            PageField::AccessType(a) => self.access_type = a,
            PageField::ThemeMode(m) => self.theme_mode = m,
            PageField::ThemePresetId(p) => self.theme_preset_id = p,
            PageField::Settings(s) => {
                require_object("settings", &s)?;
                self.settings = s;
            }
        }
        Ok(())
    }
}

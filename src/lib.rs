//! Optimistic editing core for link-in-bio pages.
//!
//! A page is edited locally through a [`DraftStore`] (canonical snapshot plus an overlay of
//! pending edits), persisted as a minimal diff, and its save/publish requests are
//! serialized by a [`SaveCoordinator`] so that a slow response never overwrites a newer one.

pub mod api;
pub mod cache;
pub mod drafts;
pub mod error;
pub mod models;
pub mod order_key;
pub mod state;
mod util;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, ApiErrorKind, DiffEntry, EnvConfig, PageApi, SaveRequest};
pub use cache::CanonicalSnapshot;
pub use drafts::DraftStore;
pub use error::EditorError;
pub use models::{
    Block, BlockField, BlockKind, GroupField, LayoutType, Link, LinkField, LinkGroup, Page,
    PageField,
};
pub use order_key::OrderKey;
pub use state::{EditorSyncController, SaveCoordinator, SaveOutcome, SaveStatus, SyncState};

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use leptos::prelude::GetUntracked;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_env_config_defaults_without_window_env() {
        let cfg = EnvConfig::new();
        assert!(!cfg.api_url.trim().is_empty());
    }

    #[wasm_bindgen_test]
    fn test_controller_edits_without_network() {
        let ctrl = EditorSyncController::new(ApiClient::new(EnvConfig::DEFAULT_API_URL.into()));
        assert_eq!(ctrl.status().get_untracked(), SaveStatus::Idle);
        // Nothing loaded: the store refuses to mint entities.
        assert_eq!(
            ctrl.edit(|s| s.add_block(BlockKind::Text, None)),
            Some(None)
        );
        assert!(!ctrl.dirty().get_untracked());
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{server_message, unwrap_envelope};

    #[test]
    fn test_draft_response_contract_deserialize() {
        let json = r#"{
            "page": {
                "id": 12, "user_id": 3, "locale": "en", "title": "Shop",
                "status": "draft", "access_type": "public",
                "theme_preset_id": 2, "theme_custom_id": null, "theme_mode": "light",
                "settings": { "appearance": { "radius": 8 } }
            },
            "blocks": [
                { "id": 1, "page_id": 12, "type": "link_group", "sort_key": "U",
                  "ref_id": 5, "content": {}, "is_visible": true },
                { "id": 2, "page_id": 12, "type": "text", "sort_key": "V",
                  "content": { "text": "hi" }, "is_visible": false }
            ],
            "link_groups": [
                { "id": 5, "page_id": 12, "title": "Links", "layout_type": "cards",
                  "layout_config": { "columns": 2 } }
            ],
            "links": {
                "5": [
                    { "id": 9, "group_id": 5, "title": "Site", "url": "https://a.example",
                      "icon_asset_id": null, "sort_key": "U", "is_active": true,
                      "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z" }
                ]
            }
        }"#;
        let snap: CanonicalSnapshot =
            serde_json::from_str(json).expect("draft response should parse");
        assert_eq!(snap.page.id, 12);
        assert_eq!(snap.blocks[0].kind, BlockKind::LinkGroup);
        assert_eq!(snap.blocks[0].ref_id, Some(5));
        assert!(!snap.blocks[1].is_visible);
        assert_eq!(snap.link_groups[0].layout_type, LayoutType::Cards);
        assert_eq!(snap.links[&5][0].url, "https://a.example");
        // settings is opaque and must survive untouched
        assert_eq!(snap.page.settings["appearance"]["radius"], 8);
    }

    #[test]
    fn test_unknown_block_type_round_trips() {
        let json = r#"{ "page": { "id": 1 },
            "blocks": [
                { "id": 1, "type": "divider", "sort_key": "U", "content": { "style": "dashed" } },
                { "id": 2, "type": "text", "sort_key": "V" }
            ] }"#;
        let snap: CanonicalSnapshot =
            serde_json::from_str(json).expect("unknown block types should not fail the page");
        assert_eq!(snap.blocks[0].kind, BlockKind::Other("divider".into()));
        assert_eq!(snap.blocks[0].kind.to_string(), "divider");
        assert_eq!(snap.blocks[1].kind, BlockKind::Text);

        let mut store = DraftStore::new();
        store.install_snapshot(snap);
        store
            .update_block(1, [BlockField::IsVisible(false)])
            .expect("valid field");
        let v = serde_json::to_value(store.compile_save_diff()).expect("should serialize");
        assert_eq!(v["blocks"][0]["id"], 1);
        assert_eq!(v["blocks"][0]["type"], "divider");
        assert_eq!(v["blocks"][0]["content"]["style"], "dashed");
    }

    #[test]
    fn test_draft_rejects_bad_sort_key() {
        let json = r#"{ "page": { "id": 1 },
            "blocks": [ { "id": 1, "type": "text", "sort_key": "a-b" } ] }"#;
        assert!(serde_json::from_str::<CanonicalSnapshot>(json).is_err());
    }

    #[test]
    fn test_save_request_serialization() {
        let mut store = DraftStore::new();
        let snap: CanonicalSnapshot = serde_json::from_value(serde_json::json!({
            "page": { "id": 1 },
            "blocks": [ { "id": 4, "type": "text", "sort_key": "U" } ]
        }))
        .expect("fixture");
        store.install_snapshot(snap);
        store.delete_block(4);
        store.add_block(BlockKind::Product, None);

        let v = serde_json::to_value(store.compile_save_diff()).expect("should serialize");
        assert!(v.get("page").is_none());
        assert!(v.get("link_groups").is_none());
        assert!(v.get("links").is_none());

        let blocks = v["blocks"].as_array().expect("blocks array");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["id"], 4);
        assert_eq!(blocks[0]["delete"], true);
        assert_eq!(blocks[1]["id"], -1);
        assert_eq!(blocks[1]["type"], "product");
        assert!(blocks[1].get("delete").is_none());
    }

    #[test]
    fn test_empty_save_request_is_empty_object() {
        let v = serde_json::to_value(SaveRequest::default()).expect("should serialize");
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn test_envelope_unwrap() {
        let bare = serde_json::json!({ "updated_at": "t" });
        assert_eq!(unwrap_envelope(bare.clone()).expect("bare"), bare);

        let wrapped = serde_json::json!({ "success": true, "data": { "updated_at": "t" } });
        assert_eq!(unwrap_envelope(wrapped).expect("wrapped"), bare);

        let empty = serde_json::json!({ "success": true, "data": null });
        assert_eq!(unwrap_envelope(empty).expect("empty"), serde_json::json!({}));

        let failed = serde_json::json!({ "success": false, "error": { "message": "Slug taken" } });
        let e = unwrap_envelope(failed).expect_err("failure envelope");
        assert_eq!(e.kind, ApiErrorKind::Http);
        assert_eq!(e.server_message.as_deref(), Some("Slug taken"));
    }

    #[test]
    fn test_server_message_shapes() {
        let nested = serde_json::json!({ "error": { "message": "Nope" } });
        let bare = serde_json::json!({ "error": "Also nope" });
        let blank = serde_json::json!({ "error": { "message": "  " } });
        assert_eq!(server_message(&nested).as_deref(), Some("Nope"));
        assert_eq!(server_message(&bare).as_deref(), Some("Also nope"));
        assert_eq!(server_message(&blank), None);
        assert_eq!(server_message(&serde_json::json!({})), None);
    }

    #[test]
    fn test_editor_error_messages() {
        let rejected = EditorError::from_save(ApiError::rejected("Page is locked"));
        assert_eq!(rejected.to_string(), "Page is locked");

        let offline =
            EditorError::from_save(ApiError::new(ApiErrorKind::Network, "connection refused"));
        assert_eq!(offline.to_string(), "Network error");
        assert!(offline.is_retryable());

        let generic = EditorError::from_save(ApiError::new(ApiErrorKind::Http, "500"));
        assert_eq!(generic.to_string(), "Save failed");
    }

    #[test]
    fn test_api_client_new_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/".to_string());
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_env_config_reads_env_var() {
        std::env::set_var(api::API_URL_ENV, "https://api.example.com");
        assert_eq!(EnvConfig::new().api_url, "https://api.example.com");
        std::env::remove_var(api::API_URL_ENV);
        assert_eq!(EnvConfig::new().api_url, EnvConfig::DEFAULT_API_URL);
    }
}

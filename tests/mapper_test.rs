//! Tests for content mapper save/load semantics

mod common;

use common::{WEBSPACE, save_page, setup};
use rstest::rstest;
use serde_json::json;
use tessera_cms::prelude::*;
use uuid::Uuid;

#[rstest]
#[tokio::test]
async fn test_save_and_load_round_trip() {
	let env = setup();

	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "Testtitle",
				"url": "/news/test",
				"article": "Test article",
			})),
		)
		.await
		.unwrap();

	assert_eq!(saved.template(), "overview");
	assert_eq!(saved.title, "Testtitle");
	assert_eq!(saved.resource_locator.as_deref(), Some("/news/test"));
	assert_eq!(saved.node_state, NodeState::Test);
	assert_eq!(saved.overlay, None);
	assert_eq!(saved.concrete_locales, vec!["en"]);
	assert_eq!(saved.creator, Some(env.user));
	assert_eq!(saved.changer, Some(env.user));
	assert!(saved.created.is_some());

	let loaded = env.mapper.load(saved.uuid, WEBSPACE, "en", false).await.unwrap();
	assert_eq!(loaded.title, "Testtitle");
	assert_eq!(loaded.property("article"), Some(&json!("Test article")));
	assert_eq!(loaded.property("url"), Some(&json!("/news/test")));
	assert_eq!(loaded.path, format!("/{WEBSPACE}/contents/testtitle"));
}

#[rstest]
#[tokio::test]
async fn test_save_is_idempotent() {
	let env = setup();
	let saved = save_page(&env, "en", "Testtitle", "/news/test").await;

	let editor = Uuid::new_v4();
	let resaved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", editor)
				.with_uuid(saved.uuid)
				.with_data(json!({"title": "Testtitle", "url": "/news/test"})),
		)
		.await
		.unwrap();

	assert_eq!(resaved.uuid, saved.uuid);
	assert_eq!(resaved.path, saved.path);
	assert_eq!(resaved.resource_locator, saved.resource_locator);
	// provenance: the creator is fixed, the changer follows the edit
	assert_eq!(resaved.creator, Some(env.user));
	assert_eq!(resaved.changer, Some(editor));
	// no rename, no route demotion
	let history = env
		.mapper
		.locator()
		.history_of(saved.uuid, &env.webspace, "en")
		.await
		.unwrap();
	assert!(history.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_block_and_section_properties_round_trip() {
	let env = setup();
	let blocks = json!([
		{"type": "editorial", "text": "First paragraph"},
		{"type": "editorial", "text": "Second paragraph"},
	]);

	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "Blocky",
				"url": "/blocky",
				"content": blocks,
				"subtitle": "From the meta section",
			})),
		)
		.await
		.unwrap();

	let loaded = env.mapper.load(saved.uuid, WEBSPACE, "en", false).await.unwrap();
	assert_eq!(loaded.property("content"), Some(&blocks));
	// section children live flat in the data map, the section name never
	// becomes a key
	assert_eq!(loaded.property("subtitle"), Some(&json!("From the meta section")));
	assert_eq!(loaded.property("meta"), None);

	let map = loaded.to_map();
	assert_eq!(map["content"], blocks);
	assert_eq!(map["subtitle"], json!("From the meta section"));
	assert!(!map.contains_key("meta"));
}

#[rstest]
#[tokio::test]
async fn test_missing_mandatory_property_fails_and_rolls_back() {
	let env = setup();

	let result = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_data(json!({"title": "No url"})),
		)
		.await;

	match result {
		Err(CmsError::MandatoryPropertyMissing { template, properties }) => {
			assert_eq!(template, "overview");
			assert_eq!(properties, vec!["url".to_string()]);
		}
		other => panic!("expected mandatory error, got {other:?}"),
	}

	// nothing leaked into the store
	let children = env
		.mapper
		.load_by_parent(None, WEBSPACE, "en", 1, false, false, false)
		.await
		.unwrap();
	assert!(children.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_partial_update_keeps_absent_properties() {
	let env = setup();
	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "Testtitle",
				"url": "/news/test",
				"article": "Original",
			})),
		)
		.await
		.unwrap();

	// partial update with only the article does not touch title or url
	let updated = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.partial()
				.with_data(json!({"article": "Updated"})),
		)
		.await
		.unwrap();

	assert_eq!(updated.title, "Testtitle");
	assert_eq!(updated.property("article"), Some(&json!("Updated")));
	assert_eq!(updated.resource_locator.as_deref(), Some("/news/test"));
}

#[rstest]
#[tokio::test]
async fn test_full_update_removes_absent_optional_properties() {
	let env = setup();
	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "Testtitle",
				"url": "/news/test",
				"article": "Will vanish",
			})),
		)
		.await
		.unwrap();

	let updated = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.with_data(json!({"title": "Testtitle", "url": "/news/test"})),
		)
		.await
		.unwrap();

	assert_eq!(updated.property("article"), None);
}

#[rstest]
#[tokio::test]
async fn test_title_change_renames_node_and_demotes_route() {
	let env = setup();
	let saved = save_page(&env, "en", "Old Title", "/old-title").await;
	assert_eq!(saved.path, format!("/{WEBSPACE}/contents/old-title"));

	let renamed = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.with_data(json!({"title": "New Title", "url": "/new-title"})),
		)
		.await
		.unwrap();

	assert_eq!(renamed.path, format!("/{WEBSPACE}/contents/new-title"));
	assert_eq!(renamed.resource_locator.as_deref(), Some("/new-title"));

	// the old URL still resolves, flagged as history
	let matched = env
		.mapper
		.locator()
		.resolve("/old-title", &env.webspace, "en")
		.await
		.unwrap();
	assert_eq!(matched.content_id, saved.uuid);
	assert!(matched.history);
}

#[rstest]
#[tokio::test]
async fn test_template_switch_clears_incompatible_properties() {
	let env = setup();
	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "Testtitle",
				"url": "/news/test",
				"article": "text_area flavoured",
			})),
		)
		.await
		.unwrap();

	// "article" exists in both templates but with different content types
	let switched = env
		.mapper
		.save(
			SaveRequest::new("simple", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.with_data(json!({
					"title": "Testtitle",
					"url": "/news/test",
					"teaser": "short",
				})),
		)
		.await
		.unwrap();

	assert_eq!(switched.template(), "simple");
	assert_eq!(switched.property("article"), None);
	assert_eq!(switched.property("teaser"), Some(&json!("short")));
	// compatible properties survive the switch
	assert_eq!(switched.title, "Testtitle");
	assert_eq!(switched.property("url"), Some(&json!("/news/test")));
}

#[rstest]
#[tokio::test]
async fn test_publication_state_is_monotonic() {
	let env = setup();
	let saved = save_page(&env, "en", "Testtitle", "/news/test").await;
	assert_eq!(saved.node_state, NodeState::Test);
	assert_eq!(saved.published, None);

	let published = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.partial()
				.with_state(NodeState::Published)
				.with_data(json!({})),
		)
		.await
		.unwrap();
	assert_eq!(published.node_state, NodeState::Published);
	let first_published_at = published.published.unwrap();

	// a requested downgrade is ignored, the timestamp survives
	let still_published = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.partial()
				.with_state(NodeState::Test)
				.with_data(json!({})),
		)
		.await
		.unwrap();
	assert_eq!(still_published.node_state, NodeState::Published);
	assert_eq!(still_published.published, Some(first_published_at));
}

#[rstest]
#[tokio::test]
async fn test_sibling_titles_disambiguate_monotonically() {
	let env = setup();

	let first = save_page(&env, "en", "Test", "/test").await;
	let second = save_page(&env, "en", "Test", "/test-b").await;
	let third = save_page(&env, "en", "Test", "/test-c").await;

	assert_eq!(first.path, format!("/{WEBSPACE}/contents/test"));
	assert_eq!(second.path, format!("/{WEBSPACE}/contents/test-1"));
	assert_eq!(third.path, format!("/{WEBSPACE}/contents/test-2"));
}

#[rstest]
#[tokio::test]
async fn test_ghost_fallback_follows_webspace_locale_order() {
	let env = setup();
	let saved = save_page(&env, "en", "Testtitle", "/news/test").await;

	let ghost = env.mapper.load(saved.uuid, WEBSPACE, "de", true).await.unwrap();
	assert_eq!(
		ghost.overlay,
		Some(LocaleOverlay {
			kind: OverlayKind::Ghost,
			locale: "en".to_string(),
		})
	);
	assert_eq!(ghost.title, "Testtitle");
	assert_eq!(ghost.locale, "de");

	// without ghost loading the structure comes back blank
	let blank = env.mapper.load(saved.uuid, WEBSPACE, "de", false).await.unwrap();
	assert_eq!(blank.overlay, None);
	assert_eq!(blank.title, "");
	assert_eq!(blank.property("article"), None);
	assert_eq!(blank.concrete_locales, vec!["en"]);
}

#[rstest]
#[tokio::test]
async fn test_shadow_mirrors_base_locale_live() {
	let env = setup();
	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user).with_data(json!({
				"title": "English",
				"url": "/english",
				"article": "v1",
			})),
		)
		.await
		.unwrap();

	let shadow = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "de", env.user)
				.with_uuid(saved.uuid)
				.with_shadow("en")
				.with_data(json!({"url": "/englisch"})),
		)
		.await
		.unwrap();

	assert_eq!(
		shadow.overlay,
		Some(LocaleOverlay {
			kind: OverlayKind::Shadow,
			locale: "en".to_string(),
		})
	);
	assert!(shadow.shadow_enabled);
	assert_eq!(shadow.shadow_base_locale.as_deref(), Some("en"));
	assert_eq!(shadow.title, "English");
	assert_eq!(shadow.property("article"), Some(&json!("v1")));
	// the URL stays locale-specific
	assert_eq!(shadow.resource_locator.as_deref(), Some("/englisch"));
	// a shadowed locale is not concrete
	assert_eq!(shadow.concrete_locales, vec!["en"]);

	// later base-locale edits shine through without touching the shadow
	env.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.partial()
				.with_data(json!({"article": "v2"})),
		)
		.await
		.unwrap();
	let reloaded = env.mapper.load(saved.uuid, WEBSPACE, "de", true).await.unwrap();
	assert_eq!(reloaded.property("article"), Some(&json!("v2")));
}

#[rstest]
#[case::self_shadow("en")]
#[case::blank_base("es")]
#[tokio::test]
async fn test_invalid_shadow_configuration_fails(#[case] base: &str) {
	let env = setup();
	let saved = save_page(&env, "en", "English", "/english").await;

	let result = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_uuid(saved.uuid)
				.with_shadow(base)
				.with_data(json!({})),
		)
		.await;
	assert!(matches!(result, Err(CmsError::InvalidShadow(_))));
}

#[rstest]
#[tokio::test]
async fn test_shadow_of_shadow_is_rejected() {
	let env = setup();
	let saved = save_page(&env, "en", "English", "/english").await;

	env.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "de", env.user)
				.with_uuid(saved.uuid)
				.with_shadow("en")
				.with_data(json!({})),
		)
		.await
		.unwrap();

	let result = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "es", env.user)
				.with_uuid(saved.uuid)
				.with_shadow("de")
				.with_data(json!({})),
		)
		.await;
	assert!(matches!(result, Err(CmsError::InvalidShadow(_))));
}

#[rstest]
#[tokio::test]
async fn test_load_by_parent_flat_and_nested() {
	let env = setup();
	let parent = save_page(&env, "en", "Parent", "/parent").await;
	let child = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_parent(parent.uuid)
				.with_data(json!({"title": "Child", "url": "/parent/child"})),
		)
		.await
		.unwrap();

	let nested = env
		.mapper
		.load_by_parent(None, WEBSPACE, "en", 2, false, false, false)
		.await
		.unwrap();
	assert_eq!(nested.len(), 1);
	assert_eq!(nested[0].uuid, parent.uuid);
	assert_eq!(nested[0].children.len(), 1);
	assert_eq!(nested[0].children[0].uuid, child.uuid);

	let flat = env
		.mapper
		.load_by_parent(None, WEBSPACE, "en", 2, true, false, false)
		.await
		.unwrap();
	let ids: Vec<Uuid> = flat.iter().map(|s| s.uuid).collect();
	assert_eq!(ids, vec![parent.uuid, child.uuid]);

	// depth 1 stops descending but still reports has_children
	let shallow = env
		.mapper
		.load_by_parent(None, WEBSPACE, "en", 1, false, false, false)
		.await
		.unwrap();
	assert_eq!(shallow.len(), 1);
	assert!(shallow[0].has_children);
	assert!(shallow[0].children.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_load_by_parent_can_exclude_ghosts() {
	let env = setup();
	save_page(&env, "en", "English only", "/english-only").await;
	let german = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "de", env.user)
				.with_data(json!({"title": "Deutsch", "url": "/deutsch"})),
		)
		.await
		.unwrap();

	let all = env
		.mapper
		.load_by_parent(None, WEBSPACE, "de", 1, false, false, false)
		.await
		.unwrap();
	assert_eq!(all.len(), 2);

	let concrete_only = env
		.mapper
		.load_by_parent(None, WEBSPACE, "de", 1, false, true, false)
		.await
		.unwrap();
	assert_eq!(concrete_only.len(), 1);
	assert_eq!(concrete_only[0].uuid, german.uuid);
}

#[rstest]
#[tokio::test]
async fn test_load_by_resource_locator() {
	let env = setup();
	let saved = save_page(&env, "en", "Testtitle", "/news/test").await;

	let loaded = env
		.mapper
		.load_by_resource_locator("/news/test", WEBSPACE, "en")
		.await
		.unwrap();
	assert_eq!(loaded.uuid, saved.uuid);

	let missing = env
		.mapper
		.load_by_resource_locator("/nope", WEBSPACE, "en")
		.await;
	assert!(matches!(missing, Err(CmsError::ResourceLocatorNotFound(_))));
}

#[rstest]
#[tokio::test]
async fn test_unknown_template_and_webspace_fail() {
	let env = setup();

	let no_template = env
		.mapper
		.save(SaveRequest::new("missing", WEBSPACE, "en", env.user))
		.await;
	assert!(matches!(no_template, Err(CmsError::StructureNotFound(_))));

	let no_webspace = env
		.mapper
		.save(SaveRequest::new("overview", "nowhere", "en", env.user))
		.await;
	assert!(matches!(no_webspace, Err(CmsError::UnknownWebspace(_))));

	let no_node = env.mapper.load(Uuid::new_v4(), WEBSPACE, "en", true).await;
	assert!(matches!(no_node, Err(CmsError::NodeNotFound(_))));
}

#[rstest]
#[tokio::test]
async fn test_to_map_exposes_metadata_and_properties() {
	let env = setup();
	let saved = env
		.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, "en", env.user)
				.with_nav_contexts(["main"])
				.with_data(json!({"title": "Testtitle", "url": "/news/test"})),
		)
		.await
		.unwrap();

	let map = saved.to_map();
	assert_eq!(map["template"], json!("overview"));
	assert_eq!(map["webspaceKey"], json!(WEBSPACE));
	assert_eq!(map["title"], json!("Testtitle"));
	assert_eq!(map["url"], json!("/news/test"));
	assert_eq!(map["navContexts"], json!(["main"]));
	assert_eq!(map["type"], json!(null));
	// declared but unset properties resolve to null
	assert_eq!(map["article"], json!(null));
	assert!(map.contains_key("ext"));
}

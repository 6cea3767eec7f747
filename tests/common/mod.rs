//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use tessera_cms::prelude::*;
use uuid::Uuid;

pub const WEBSPACE: &str = "demo_io";

/// Page template with a tagged title, a dedicated URL property, an
/// optional article, a block property and a sectioned subtitle
pub fn overview_definition() -> StructureDefinition {
	StructureDefinition::new("overview", ResourceType::Page)
		.with_view("pages/overview")
		.with_controller("content::render")
		.with_cache_lifetime(2400)
		.with_property(
			PropertyDefinition::new("title", "text_line")
				.mandatory()
				.with_tag(Tag::new("node.name", 10)),
		)
		.with_property(
			PropertyDefinition::new("url", "resource_locator")
				.mandatory()
				.with_tag(Tag::new("resource_locator", 1)),
		)
		.with_property(PropertyDefinition::new("article", "text_area"))
		.with_block(
			BlockDefinition::new("content")
				.with_default_type("editorial")
				.with_type(
					BlockTypeDefinition::new("editorial").with_item(PropertyItem::Simple(
						PropertyDefinition::new("text", "text_area"),
					)),
				),
		)
		.with_section(
			SectionDefinition::new("meta").with_item(PropertyItem::Simple(
				PropertyDefinition::new("subtitle", "text_line"),
			)),
		)
}

/// Second page template; `article` changes its content type here, so a
/// template switch must clear it
pub fn simple_definition() -> StructureDefinition {
	StructureDefinition::new("simple", ResourceType::Page)
		.with_view("pages/simple")
		.with_controller("content::render")
		.with_property(
			PropertyDefinition::new("title", "text_line")
				.mandatory()
				.with_tag(Tag::new("node.name", 10)),
		)
		.with_property(
			PropertyDefinition::new("url", "resource_locator")
				.mandatory()
				.with_tag(Tag::new("resource_locator", 1)),
		)
		.with_property(PropertyDefinition::new("article", "text_line"))
		.with_property(PropertyDefinition::new("teaser", "text_area"))
}

/// Template holding a multi-valued internal link property
pub fn linkpage_definition() -> StructureDefinition {
	StructureDefinition::new("linkpage", ResourceType::Page)
		.with_property(
			PropertyDefinition::new("title", "text_line")
				.mandatory()
				.with_tag(Tag::new("node.name", 10)),
		)
		.with_property(
			PropertyDefinition::new("url", "resource_locator")
				.mandatory()
				.with_tag(Tag::new("resource_locator", 1)),
		)
		.with_property(PropertyDefinition::new("links", "internal_links"))
}

pub struct TestEnv {
	pub mapper: ContentMapper,
	pub store: Arc<MemoryTreeStore>,
	pub manager: Arc<StructureManager>,
	pub webspace: Webspace,
	pub user: Uuid,
}

pub fn setup() -> TestEnv {
	let store = Arc::new(MemoryTreeStore::new());
	let source = StaticDefinitionSource::new()
		.with_definition(overview_definition())
		.with_definition(simple_definition())
		.with_definition(linkpage_definition());
	let registry = StructureRegistry::new(Arc::new(source));
	let manager = Arc::new(StructureManager::new(registry));
	let webspace = Webspace::new(WEBSPACE, ["en", "de", "es"]);
	let webspaces = Arc::new(WebspaceRegistry::new().with_webspace(webspace.clone()));
	let mapper = ContentMapper::new(
		Arc::clone(&store) as Arc<dyn TreeStore>,
		Arc::clone(&manager),
		webspaces,
	);
	TestEnv {
		mapper,
		store,
		manager,
		webspace,
		user: Uuid::new_v4(),
	}
}

/// Save a fresh overview page in one call
pub async fn save_page(env: &TestEnv, locale: &str, title: &str, url: &str) -> Structure {
	env.mapper
		.save(
			SaveRequest::new("overview", WEBSPACE, locale, env.user)
				.with_data(json!({"title": title, "url": url})),
		)
		.await
		.unwrap()
}

//! Populated content instance for one node in one locale
//!
//! A [`Structure`] is constructed fresh on every load or save and never
//! persisted directly; its values are projected onto and from the store's
//! locale-namespaced node properties.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use uuid::Uuid;

use crate::definition::StructureDefinition;
use crate::error::{CmsError, CmsResult};

/// Kind of a content node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeType {
	/// Regular page content
	#[default]
	Content,
	/// Redirect to another content node
	InternalLink,
	/// Redirect to an external URL
	ExternalLink,
	/// Reusable snippet
	Snippet,
}

impl NodeType {
	/// Stable string form used in storage and API maps
	pub fn as_str(&self) -> &'static str {
		match self {
			NodeType::Content => "content",
			NodeType::InternalLink => "internal_link",
			NodeType::ExternalLink => "external_link",
			NodeType::Snippet => "snippet",
		}
	}

	/// Parse the stable string form, defaulting to content
	pub fn parse(value: &str) -> Self {
		match value {
			"internal_link" => NodeType::InternalLink,
			"external_link" => NodeType::ExternalLink,
			"snippet" => NodeType::Snippet,
			_ => NodeType::Content,
		}
	}
}

/// Publication state of a locale variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
	/// Work in progress, not publicly visible
	#[default]
	Test,
	/// Published
	Published,
}

impl NodeState {
	/// Stable string form used in storage and API maps
	pub fn as_str(&self) -> &'static str {
		match self {
			NodeState::Test => "test",
			NodeState::Published => "published",
		}
	}

	/// Parse the stable string form, defaulting to test
	pub fn parse(value: &str) -> Self {
		match value {
			"published" => NodeState::Published,
			_ => NodeState::Test,
		}
	}
}

/// How a non-concrete locale's data was borrowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
	/// Fallback to another locale because no translation exists
	Ghost,
	/// Explicit live mirror of a concrete base locale
	Shadow,
}

impl OverlayKind {
	/// Stable string form used in API maps
	pub fn as_str(&self) -> &'static str {
		match self {
			OverlayKind::Ghost => "ghost",
			OverlayKind::Shadow => "shadow",
		}
	}
}

/// Marker describing borrowed content on a loaded structure
///
/// `None` on a structure means the requested locale is concrete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleOverlay {
	/// Whether the data is ghost or shadow content
	pub kind: OverlayKind,
	/// The locale the data was actually read from
	pub locale: String,
}

/// A populated content instance: one node, one locale, one definition
#[derive(Debug, Clone)]
pub struct Structure {
	/// The schema this instance is bound to
	pub definition: Arc<StructureDefinition>,
	/// Content node identity
	pub uuid: Uuid,
	/// Webspace the node lives in
	pub webspace: String,
	/// Locale this instance was requested for
	pub locale: String,
	/// Node kind
	pub node_type: NodeType,
	/// Publication state of the effective locale
	pub node_state: NodeState,
	/// Title derived from the node-naming property
	pub title: String,
	/// Node path in the content tree
	pub path: String,
	/// Canonical external URL, present for content pages only
	pub resource_locator: Option<String>,
	/// User who created the locale variant
	pub creator: Option<Uuid>,
	/// User who last changed the locale variant
	pub changer: Option<Uuid>,
	/// Creation timestamp
	pub created: Option<DateTime<Utc>>,
	/// Last change timestamp
	pub changed: Option<DateTime<Utc>>,
	/// First publication timestamp; set once, never cleared
	pub published: Option<DateTime<Utc>>,
	/// Navigation context identifiers
	pub nav_contexts: Vec<String>,
	/// Whether this locale is configured as a shadow
	pub shadow_enabled: bool,
	/// Base locale when shadowing
	pub shadow_base_locale: Option<String>,
	/// Ghost/shadow marker, `None` when the locale is concrete
	pub overlay: Option<LocaleOverlay>,
	/// Locales with genuinely authored content on this node
	pub concrete_locales: Vec<String>,
	/// Whether the node has children (set without descending)
	pub has_children: bool,
	/// Materialized children when loaded as part of a tree fetch
	pub children: Vec<Structure>,

	values: HashMap<String, JsonValue>,
	ext: BTreeMap<String, JsonValue>,
}

impl Structure {
	/// Create a blank structure bound to a definition, node and locale
	pub fn new(
		definition: Arc<StructureDefinition>,
		uuid: Uuid,
		webspace: impl Into<String>,
		locale: impl Into<String>,
	) -> Self {
		Self {
			definition,
			uuid,
			webspace: webspace.into(),
			locale: locale.into(),
			node_type: NodeType::default(),
			node_state: NodeState::default(),
			title: String::new(),
			path: String::new(),
			resource_locator: None,
			creator: None,
			changer: None,
			created: None,
			changed: None,
			published: None,
			nav_contexts: Vec::new(),
			shadow_enabled: false,
			shadow_base_locale: None,
			overlay: None,
			concrete_locales: Vec::new(),
			has_children: false,
			children: Vec::new(),
			values: HashMap::new(),
			ext: BTreeMap::new(),
		}
	}

	/// Template key of the bound definition
	pub fn template(&self) -> &str {
		&self.definition.key
	}

	/// Read a property value; `None` when unset
	pub fn property(&self, name: &str) -> Option<&JsonValue> {
		self.values.get(name).filter(|v| !v.is_null())
	}

	/// Set a property value, enforcing the definition's mandatory flag
	///
	/// A null value on a mandatory property fails with
	/// [`CmsError::MandatoryPropertyMissing`] naming the property and
	/// template.
	pub fn set_property(&mut self, name: &str, value: JsonValue) -> CmsResult<()> {
		if let Some(property) = self.definition.value_property(name) {
			if property.mandatory() && value.is_null() {
				return Err(CmsError::MandatoryPropertyMissing {
					template: self.definition.key.clone(),
					properties: vec![name.to_string()],
				});
			}
		}
		self.values.insert(name.to_string(), value);
		Ok(())
	}

	/// Set a property value without validation (used when projecting
	/// stored data into an instance)
	pub fn set_value(&mut self, name: &str, value: JsonValue) {
		self.values.insert(name.to_string(), value);
	}

	/// Value of the single highest-priority property tagged with `tag`
	///
	/// Ties in priority fail with [`CmsError::AmbiguousTag`]; a unique
	/// maximum wins deterministically.
	pub fn property_by_tag(&self, tag: &str) -> CmsResult<Option<&JsonValue>> {
		Ok(self
			.definition
			.property_by_tag(tag)?
			.and_then(|p| self.property(p.name())))
	}

	/// Values of every property tagged with `tag`, highest priority first
	pub fn properties_by_tag(&self, tag: &str) -> Vec<&JsonValue> {
		self.definition
			.properties_by_tag(tag)
			.into_iter()
			.filter_map(|p| self.property(p.name()))
			.collect()
	}

	/// Extension data blocks, keyed by extension name
	pub fn extension_data(&self) -> &BTreeMap<String, JsonValue> {
		&self.ext
	}

	/// Attach one extension data block
	pub fn set_extension_data(&mut self, name: impl Into<String>, data: JsonValue) {
		self.ext.insert(name.into(), data);
	}

	/// Flatten the structure into a plain map for API responses
	///
	/// Contains node metadata, every declared property (absent optional
	/// values resolve to null) and the `ext` sub-map.
	pub fn to_map(&self) -> JsonMap<String, JsonValue> {
		let mut map = JsonMap::new();
		map.insert("id".into(), json!(self.uuid.to_string()));
		map.insert("template".into(), json!(self.definition.key));
		map.insert("webspaceKey".into(), json!(self.webspace));
		map.insert("locale".into(), json!(self.locale));
		map.insert("nodeType".into(), json!(self.node_type.as_str()));
		map.insert("nodeState".into(), json!(self.node_state.as_str()));
		map.insert("title".into(), json!(self.title));
		map.insert("path".into(), json!(self.path));
		map.insert(
			"url".into(),
			self.resource_locator.as_deref().map_or(JsonValue::Null, |rl| json!(rl)),
		);
		map.insert(
			"creator".into(),
			self.creator.map_or(JsonValue::Null, |u| json!(u.to_string())),
		);
		map.insert(
			"changer".into(),
			self.changer.map_or(JsonValue::Null, |u| json!(u.to_string())),
		);
		map.insert(
			"created".into(),
			self.created.map_or(JsonValue::Null, |t| json!(t.to_rfc3339())),
		);
		map.insert(
			"changed".into(),
			self.changed.map_or(JsonValue::Null, |t| json!(t.to_rfc3339())),
		);
		map.insert(
			"published".into(),
			self.published.map_or(JsonValue::Null, |t| json!(t.to_rfc3339())),
		);
		map.insert("navContexts".into(), json!(self.nav_contexts));
		map.insert("shadowOn".into(), json!(self.shadow_enabled));
		map.insert(
			"shadowBaseLanguage".into(),
			self.shadow_base_locale.as_deref().map_or(JsonValue::Null, |l| json!(l)),
		);
		map.insert(
			"type".into(),
			self.overlay.as_ref().map_or(JsonValue::Null, |o| {
				json!({"name": o.kind.as_str(), "value": o.locale})
			}),
		);
		map.insert("concreteLanguages".into(), json!(self.concrete_locales));
		map.insert("hasChildren".into(), json!(self.has_children));

		for property in self.definition.value_properties() {
			let value = self.values.get(property.name()).cloned().unwrap_or(JsonValue::Null);
			map.insert(property.name().to_string(), value);
		}

		let ext: JsonMap<String, JsonValue> =
			self.ext.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
		map.insert("ext".into(), JsonValue::Object(ext));

		if !self.children.is_empty() {
			let children: Vec<JsonValue> = self
				.children
				.iter()
				.map(|c| JsonValue::Object(c.to_map()))
				.collect();
			map.insert("children".into(), JsonValue::Array(children));
		}

		map
	}
}

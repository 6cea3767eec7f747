//! Pluggable per-content-type value codecs
//!
//! Every property definition names a content type (`text_line`,
//! `resource_locator`, `internal_links`, ...). The mapper resolves that
//! name against a [`ContentTypeRegistry`] and stays agnostic to new codec
//! types being registered. Unregistered names fall back to a passthrough
//! codec so the set stays open-ended.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::store::{StoreResult, TreeStore};

/// Codec reading and writing one property value against a store node
///
/// The property key handed in is already locale-namespaced where the
/// definition asks for it.
#[async_trait]
pub trait ContentType: Send + Sync {
	/// Content-type name this codec is registered under
	fn name(&self) -> &str;

	/// Write the value to the node
	async fn write(
		&self,
		store: &dyn TreeStore,
		node: Uuid,
		key: &str,
		value: &JsonValue,
	) -> StoreResult<()> {
		store.set_property(node, key, value.clone()).await
	}

	/// Read the value from the node
	async fn read(&self, store: &dyn TreeStore, node: Uuid, key: &str) -> StoreResult<Option<JsonValue>> {
		store.get_property(node, key).await
	}

	/// Content-node uuids referenced by the value
	///
	/// Link-like codecs report their targets here so the mapper can keep
	/// the store's reference tracking current.
	fn references(&self, _value: &JsonValue) -> Vec<Uuid> {
		Vec::new()
	}
}

/// Plain passthrough codec, the default for unregistered names
pub struct TextLine;

#[async_trait]
impl ContentType for TextLine {
	fn name(&self) -> &str {
		"text_line"
	}
}

/// Multi-valued internal link codec
///
/// Stores an ordered list of content-node uuids and reports each as a
/// reference.
pub struct InternalLinks;

#[async_trait]
impl ContentType for InternalLinks {
	fn name(&self) -> &str {
		"internal_links"
	}

	fn references(&self, value: &JsonValue) -> Vec<Uuid> {
		match value {
			JsonValue::Array(items) => items
				.iter()
				.filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
				.collect(),
			_ => Vec::new(),
		}
	}
}

/// Single internal link codec
pub struct SingleInternalLink;

#[async_trait]
impl ContentType for SingleInternalLink {
	fn name(&self) -> &str {
		"single_internal_link"
	}

	fn references(&self, value: &JsonValue) -> Vec<Uuid> {
		value
			.as_str()
			.and_then(|s| Uuid::parse_str(s).ok())
			.map(|u| vec![u])
			.unwrap_or_default()
	}
}

/// Block codec
///
/// Stores the typed entry list as one JSON value and extracts references
/// from nested link values (entries are maps whose values may themselves
/// be uuid strings or uuid lists).
pub struct BlockContentType;

impl BlockContentType {
	fn collect_refs(value: &JsonValue, out: &mut Vec<Uuid>) {
		match value {
			JsonValue::Object(map) => {
				for (key, child) in map {
					if key == "type" {
						continue;
					}
					Self::collect_refs(child, out);
				}
			}
			JsonValue::Array(items) => {
				for item in items {
					Self::collect_refs(item, out);
				}
			}
			JsonValue::String(s) => {
				if let Ok(uuid) = Uuid::parse_str(s) {
					out.push(uuid);
				}
			}
			_ => {}
		}
	}
}

#[async_trait]
impl ContentType for BlockContentType {
	fn name(&self) -> &str {
		"block"
	}

	fn references(&self, value: &JsonValue) -> Vec<Uuid> {
		let mut out = Vec::new();
		Self::collect_refs(value, &mut out);
		out
	}
}

/// Registry of codecs keyed by content-type name
pub struct ContentTypeRegistry {
	codecs: HashMap<String, Arc<dyn ContentType>>,
	fallback: Arc<dyn ContentType>,
}

impl ContentTypeRegistry {
	/// Create a registry with the built-in codecs registered
	pub fn new() -> Self {
		let mut registry = Self {
			codecs: HashMap::new(),
			fallback: Arc::new(TextLine),
		};
		registry.register(Arc::new(TextLine));
		registry.register(Arc::new(InternalLinks));
		registry.register(Arc::new(SingleInternalLink));
		registry.register(Arc::new(BlockContentType));
		registry
	}

	/// Register a codec under its own name; re-registering a name
	/// replaces the prior codec
	pub fn register(&mut self, codec: Arc<dyn ContentType>) {
		self.codecs.insert(codec.name().to_string(), codec);
	}

	/// Resolve a content-type name, falling back to passthrough for
	/// unregistered names
	pub fn get(&self, name: &str) -> Arc<dyn ContentType> {
		self.codecs
			.get(name)
			.cloned()
			.unwrap_or_else(|| Arc::clone(&self.fallback))
	}
}

impl Default for ContentTypeRegistry {
	fn default() -> Self {
		Self::new()
	}
}

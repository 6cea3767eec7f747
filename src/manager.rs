//! Structure manager and extension registration
//!
//! Extensions are named property groups (e.g. SEO metadata) saved and
//! loaded independently of the main structure. They register globally or
//! per template; registering the same name twice replaces the prior
//! registration in place, keeping its order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::definition::{ResourceType, StructureDefinition};
use crate::error::{CmsError, CmsResult};
use crate::registry::StructureRegistry;
use crate::store::{TreeStore, localized_key};

/// A pluggable property group saved and loaded independently of the main
/// structure
#[async_trait]
pub trait StructureExtension: Send + Sync {
	/// Extension name, the key under `ext` in API maps
	fn name(&self) -> &str;

	/// Persist the extension data for one node and locale
	async fn save(
		&self,
		store: &dyn TreeStore,
		node: Uuid,
		locale: &str,
		data: &JsonValue,
	) -> CmsResult<()>;

	/// Load the extension data for one node and locale
	///
	/// Must return a defaulted value even when nothing was ever saved.
	async fn load(&self, store: &dyn TreeStore, node: Uuid, locale: &str) -> CmsResult<JsonValue>;
}

/// Extension storing a fixed list of string fields
///
/// Fields are persisted under `ext:{extension}-{field}` keys in the locale
/// namespace and default to empty strings on load.
pub struct PropertyListExtension {
	name: String,
	fields: Vec<String>,
}

impl PropertyListExtension {
	/// Create an extension with the given field names
	pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			name: name.into(),
			fields: fields.into_iter().map(Into::into).collect(),
		}
	}

	fn field_key(&self, locale: &str, field: &str) -> String {
		localized_key(locale, &format!("ext:{}-{}", self.name, field))
	}
}

#[async_trait]
impl StructureExtension for PropertyListExtension {
	fn name(&self) -> &str {
		&self.name
	}

	async fn save(
		&self,
		store: &dyn TreeStore,
		node: Uuid,
		locale: &str,
		data: &JsonValue,
	) -> CmsResult<()> {
		for field in &self.fields {
			if let Some(value) = data.get(field) {
				store
					.set_property(node, &self.field_key(locale, field), value.clone())
					.await?;
			}
		}
		Ok(())
	}

	async fn load(&self, store: &dyn TreeStore, node: Uuid, locale: &str) -> CmsResult<JsonValue> {
		let mut map = JsonMap::new();
		for field in &self.fields {
			let value = store
				.get_property(node, &self.field_key(locale, field))
				.await?
				.unwrap_or_else(|| JsonValue::String(String::new()));
			map.insert(field.clone(), value);
		}
		Ok(JsonValue::Object(map))
	}
}

/// Facade over the definition registry plus extension registration
pub struct StructureManager {
	registry: StructureRegistry,
	global: RwLock<Vec<Arc<dyn StructureExtension>>>,
	per_template: RwLock<HashMap<String, Vec<Arc<dyn StructureExtension>>>>,
}

impl StructureManager {
	/// Create a manager over a definition registry
	pub fn new(registry: StructureRegistry) -> Self {
		Self {
			registry,
			global: RwLock::new(Vec::new()),
			per_template: RwLock::new(HashMap::new()),
		}
	}

	/// Get the cached definition for a template key
	pub fn get_structure(&self, key: &str) -> CmsResult<Arc<StructureDefinition>> {
		self.registry.get_structure(key)
	}

	/// List all definitions of a root type
	pub fn get_structures(&self, resource_type: ResourceType) -> CmsResult<Vec<Arc<StructureDefinition>>> {
		self.registry.get_structures(resource_type)
	}

	/// The underlying definition registry
	pub fn registry(&self) -> &StructureRegistry {
		&self.registry
	}

	/// Register an extension, globally or for one template
	///
	/// Re-registering a name replaces the prior registration in place
	/// (last registration wins).
	pub fn add_extension(&self, extension: Arc<dyn StructureExtension>, template: Option<&str>) {
		match template {
			None => Self::insert_replacing(&mut self.global.write(), extension),
			Some(key) => {
				let mut per_template = self.per_template.write();
				Self::insert_replacing(per_template.entry(key.to_string()).or_default(), extension);
			}
		}
	}

	fn insert_replacing(list: &mut Vec<Arc<dyn StructureExtension>>, extension: Arc<dyn StructureExtension>) {
		match list.iter().position(|e| e.name() == extension.name()) {
			Some(index) => list[index] = extension,
			None => list.push(extension),
		}
	}

	/// Extensions applying to a template: globals first, then
	/// template-specific ones, in registration order; a template-specific
	/// extension replaces a same-named global in place
	pub fn get_extensions(&self, template: &str) -> Vec<Arc<dyn StructureExtension>> {
		let mut out: Vec<Arc<dyn StructureExtension>> = self.global.read().clone();
		if let Some(specific) = self.per_template.read().get(template) {
			for extension in specific {
				Self::insert_replacing(&mut out, Arc::clone(extension));
			}
		}
		out
	}

	/// Look up one extension by name for a template
	pub fn get_extension(&self, template: &str, name: &str) -> CmsResult<Arc<dyn StructureExtension>> {
		self.get_extensions(template)
			.into_iter()
			.find(|e| e.name() == name)
			.ok_or_else(|| CmsError::ExtensionNotFound(name.to_string()))
	}
}

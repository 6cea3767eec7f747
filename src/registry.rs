//! Read-through cache over a structure definition source
//!
//! Template descriptors live outside this crate (XML/YAML loaders, code).
//! The registry only consumes the loaded [`StructureDefinition`] shape and
//! caches it process-wide. Entries are replaced wholesale on reload, never
//! partially mutated.

use std::sync::Arc;

use dashmap::DashMap;

use crate::definition::{ResourceType, StructureDefinition};
use crate::error::{CmsError, CmsResult};

/// External source of structure definitions
///
/// Implementations behave as a pure function `template key -> definition`.
pub trait DefinitionSource: Send + Sync {
	/// Load the definition for a template key
	///
	/// Fails with [`CmsError::StructureNotFound`] for unknown keys.
	fn load(&self, key: &str) -> CmsResult<StructureDefinition>;

	/// Enumerate the template keys of a root type
	fn keys(&self, resource_type: ResourceType) -> Vec<String>;
}

/// In-memory definition source
///
/// Useful for tests and for embedders that build definitions in code.
#[derive(Default)]
pub struct StaticDefinitionSource {
	definitions: Vec<StructureDefinition>,
}

impl StaticDefinitionSource {
	/// Create an empty source
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a definition
	pub fn with_definition(mut self, definition: StructureDefinition) -> Self {
		self.definitions.push(definition);
		self
	}
}

impl DefinitionSource for StaticDefinitionSource {
	fn load(&self, key: &str) -> CmsResult<StructureDefinition> {
		self.definitions
			.iter()
			.find(|d| d.key == key)
			.cloned()
			.ok_or_else(|| CmsError::StructureNotFound(key.to_string()))
	}

	fn keys(&self, resource_type: ResourceType) -> Vec<String> {
		self.definitions
			.iter()
			.filter(|d| d.resource_type == resource_type)
			.map(|d| d.key.clone())
			.collect()
	}
}

/// Process-wide read-through cache of structure definitions
pub struct StructureRegistry {
	source: Arc<dyn DefinitionSource>,
	cache: DashMap<String, Arc<StructureDefinition>>,
}

impl StructureRegistry {
	/// Create a registry over the given source
	pub fn new(source: Arc<dyn DefinitionSource>) -> Self {
		Self {
			source,
			cache: DashMap::new(),
		}
	}

	/// Get the cached definition for a template key, loading it on first
	/// use
	pub fn get_structure(&self, key: &str) -> CmsResult<Arc<StructureDefinition>> {
		if let Some(cached) = self.cache.get(key) {
			return Ok(Arc::clone(&cached));
		}
		let loaded = Arc::new(self.source.load(key)?);
		self.cache.insert(key.to_string(), Arc::clone(&loaded));
		Ok(loaded)
	}

	/// List all definitions of a root type
	pub fn get_structures(&self, resource_type: ResourceType) -> CmsResult<Vec<Arc<StructureDefinition>>> {
		self.source
			.keys(resource_type)
			.iter()
			.map(|key| self.get_structure(key))
			.collect()
	}

	/// Drop one cached entry; the next lookup reloads it from the source
	pub fn invalidate(&self, key: &str) {
		self.cache.remove(key);
	}

	/// Drop every cached entry
	pub fn invalidate_all(&self) {
		self.cache.clear();
	}
}

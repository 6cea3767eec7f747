//! Tree store abstraction
//!
//! The content and route trees live in a generic hierarchical document
//! store: nodes addressed by uuid or by slash-separated path, ordered
//! children, string-keyed JSON properties, and incoming-reference
//! tracking. Any backend with those primitives can implement [`TreeStore`];
//! the crate ships [`crate::memory::MemoryTreeStore`] as the reference
//! implementation.
//!
//! Locale namespacing of property keys is a convention applied by the
//! callers, see [`localized_key`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Result type for store operations
///
/// Backend errors are surfaced unchanged through the mapper, so the store
/// reports whatever error its client produces.
pub type StoreResult<T> = anyhow::Result<T>;

/// An incoming reference to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
	/// The node holding the reference
	pub node: Uuid,
	/// The property key the reference is stored under
	pub property_key: String,
}

/// Hierarchical document store with ordered children and references
///
/// A mapper operation performs all of its reads and writes between one
/// `begin`/`commit` pair; any failure rolls the transaction back in full,
/// so partial writes are never observable. Cross-request serialization is
/// the backend's concern.
#[async_trait]
pub trait TreeStore: Send + Sync {
	/// Start a transaction
	async fn begin(&self) -> StoreResult<()>;

	/// Commit the running transaction
	async fn commit(&self) -> StoreResult<()>;

	/// Roll the running transaction back in full
	async fn rollback(&self) -> StoreResult<()>;

	/// The root node
	async fn root(&self) -> StoreResult<Uuid>;

	/// Whether a node exists
	async fn node_exists(&self, id: Uuid) -> StoreResult<bool>;

	/// Resolve a slash-separated absolute path to a node
	async fn node_at_path(&self, path: &str) -> StoreResult<Option<Uuid>>;

	/// Resolve a path, creating missing intermediate nodes
	async fn ensure_path(&self, path: &str) -> StoreResult<Uuid>;

	/// Absolute path of a node
	async fn path_of(&self, id: Uuid) -> StoreResult<String>;

	/// Path segment name of a node
	async fn name_of(&self, id: Uuid) -> StoreResult<String>;

	/// Parent of a node, `None` for the root
	async fn parent_of(&self, id: Uuid) -> StoreResult<Option<Uuid>>;

	/// Children of a node, in order
	async fn children_of(&self, id: Uuid) -> StoreResult<Vec<Uuid>>;

	/// Create a child node under `parent`
	async fn create_node(&self, parent: Uuid, name: &str) -> StoreResult<Uuid>;

	/// Rename a node in place, preserving its position among siblings
	async fn rename_node(&self, id: Uuid, new_name: &str) -> StoreResult<()>;

	/// Re-parent a node (and its subtree); appended as last child
	async fn move_node(&self, id: Uuid, new_parent: Uuid) -> StoreResult<()>;

	/// Reorder a node directly before one of its siblings
	async fn order_before(&self, id: Uuid, before: Uuid) -> StoreResult<()>;

	/// Delete a node and its whole subtree
	async fn delete_node(&self, id: Uuid) -> StoreResult<()>;

	/// Read one property
	async fn get_property(&self, id: Uuid, key: &str) -> StoreResult<Option<JsonValue>>;

	/// Read all properties of a node
	async fn get_properties(&self, id: Uuid) -> StoreResult<HashMap<String, JsonValue>>;

	/// Write one property
	async fn set_property(&self, id: Uuid, key: &str, value: JsonValue) -> StoreResult<()>;

	/// Remove one property
	async fn remove_property(&self, id: Uuid, key: &str) -> StoreResult<()>;

	/// Replace the references held by `(from, property_key)`
	///
	/// An empty `targets` slice clears the entry.
	async fn set_references(&self, from: Uuid, property_key: &str, targets: &[Uuid]) -> StoreResult<()>;

	/// All incoming references to a node
	async fn referrers_of(&self, id: Uuid) -> StoreResult<Vec<Referrer>>;

	/// All outgoing references of a node, keyed by property
	async fn references_of(&self, id: Uuid) -> StoreResult<Vec<(String, Vec<Uuid>)>>;
}

/// Locale-namespaced property key, `i18n:{locale}-{name}`
///
/// Both content properties and per-locale node metadata (template, state,
/// creator, ...) use this namespace.
pub fn localized_key(locale: &str, name: &str) -> String {
	format!("i18n:{locale}-{name}")
}

/// The `i18n:{locale}-` prefix for scanning a node's locale variants
pub fn locale_prefix(locale: &str) -> String {
	format!("i18n:{locale}-")
}

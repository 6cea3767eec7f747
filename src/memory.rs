//! In-memory tree store
//!
//! Reference [`TreeStore`] implementation backing the test suite and
//! useful for embedding. Transactions are snapshot-based: `begin` clones
//! the forest, `rollback` restores it, `commit` discards the snapshot.
//! One transaction at a time; concurrent writers must be serialized by the
//! caller, as with any single-writer backend.

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::store::{Referrer, StoreResult, TreeStore};

#[derive(Debug, Clone)]
struct NodeRecord {
	name: String,
	parent: Option<Uuid>,
	children: Vec<Uuid>,
	properties: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone)]
struct Forest {
	root: Uuid,
	nodes: HashMap<Uuid, NodeRecord>,
	// from -> property key -> targets
	references: HashMap<Uuid, HashMap<String, Vec<Uuid>>>,
}

impl Forest {
	fn new() -> Self {
		let root = Uuid::new_v4();
		let mut nodes = HashMap::new();
		nodes.insert(
			root,
			NodeRecord {
				name: String::new(),
				parent: None,
				children: Vec::new(),
				properties: HashMap::new(),
			},
		);
		Self {
			root,
			nodes,
			references: HashMap::new(),
		}
	}

	fn node(&self, id: Uuid) -> StoreResult<&NodeRecord> {
		self.nodes.get(&id).ok_or_else(|| anyhow!("no such node: {id}"))
	}

	fn node_mut(&mut self, id: Uuid) -> StoreResult<&mut NodeRecord> {
		self.nodes.get_mut(&id).ok_or_else(|| anyhow!("no such node: {id}"))
	}

	fn resolve_path(&self, path: &str) -> StoreResult<Option<Uuid>> {
		if !path.starts_with('/') {
			bail!("path must be absolute: {path}");
		}
		let mut current = self.root;
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			let children = &self.node(current)?.children;
			match children
				.iter()
				.find(|c| self.nodes.get(c).map(|n| n.name == segment).unwrap_or(false))
			{
				Some(&child) => current = child,
				None => return Ok(None),
			}
		}
		Ok(Some(current))
	}

	fn subtree_ids(&self, id: Uuid) -> Vec<Uuid> {
		let mut out = Vec::new();
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			out.push(current);
			if let Some(record) = self.nodes.get(&current) {
				stack.extend(record.children.iter().copied());
			}
		}
		out
	}
}

/// In-memory [`TreeStore`] with snapshot transactions
pub struct MemoryTreeStore {
	state: RwLock<Forest>,
	snapshot: Mutex<Option<Forest>>,
}

impl MemoryTreeStore {
	/// Create an empty store with a fresh root node
	pub fn new() -> Self {
		Self {
			state: RwLock::new(Forest::new()),
			snapshot: Mutex::new(None),
		}
	}
}

impl Default for MemoryTreeStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
	async fn begin(&self) -> StoreResult<()> {
		let mut snapshot = self.snapshot.lock();
		if snapshot.is_some() {
			bail!("transaction already in progress");
		}
		*snapshot = Some(self.state.read().clone());
		Ok(())
	}

	async fn commit(&self) -> StoreResult<()> {
		let mut snapshot = self.snapshot.lock();
		if snapshot.take().is_none() {
			bail!("no transaction in progress");
		}
		Ok(())
	}

	async fn rollback(&self) -> StoreResult<()> {
		let mut snapshot = self.snapshot.lock();
		match snapshot.take() {
			Some(saved) => {
				*self.state.write() = saved;
				Ok(())
			}
			None => bail!("no transaction in progress"),
		}
	}

	async fn root(&self) -> StoreResult<Uuid> {
		Ok(self.state.read().root)
	}

	async fn node_exists(&self, id: Uuid) -> StoreResult<bool> {
		Ok(self.state.read().nodes.contains_key(&id))
	}

	async fn node_at_path(&self, path: &str) -> StoreResult<Option<Uuid>> {
		self.state.read().resolve_path(path)
	}

	async fn ensure_path(&self, path: &str) -> StoreResult<Uuid> {
		if !path.starts_with('/') {
			bail!("path must be absolute: {path}");
		}
		let mut state = self.state.write();
		let mut current = state.root;
		for segment in path.split('/').filter(|s| !s.is_empty()).map(str::to_string) {
			let existing = state
				.node(current)?
				.children
				.iter()
				.find(|c| state.nodes.get(c).map(|n| n.name == segment).unwrap_or(false))
				.copied();
			current = match existing {
				Some(child) => child,
				None => {
					let id = Uuid::new_v4();
					state.nodes.insert(
						id,
						NodeRecord {
							name: segment,
							parent: Some(current),
							children: Vec::new(),
							properties: HashMap::new(),
						},
					);
					state.node_mut(current)?.children.push(id);
					id
				}
			};
		}
		Ok(current)
	}

	async fn path_of(&self, id: Uuid) -> StoreResult<String> {
		let state = self.state.read();
		let mut segments = Vec::new();
		let mut current = state.node(id)?;
		while let Some(parent) = current.parent {
			segments.push(current.name.clone());
			current = state.node(parent)?;
		}
		segments.reverse();
		Ok(format!("/{}", segments.join("/")))
	}

	async fn name_of(&self, id: Uuid) -> StoreResult<String> {
		Ok(self.state.read().node(id)?.name.clone())
	}

	async fn parent_of(&self, id: Uuid) -> StoreResult<Option<Uuid>> {
		Ok(self.state.read().node(id)?.parent)
	}

	async fn children_of(&self, id: Uuid) -> StoreResult<Vec<Uuid>> {
		Ok(self.state.read().node(id)?.children.clone())
	}

	async fn create_node(&self, parent: Uuid, name: &str) -> StoreResult<Uuid> {
		let mut state = self.state.write();
		let duplicate = state
			.node(parent)?
			.children
			.iter()
			.any(|c| state.nodes.get(c).map(|n| n.name == name).unwrap_or(false));
		if duplicate {
			bail!("node {name} already exists under {parent}");
		}
		let id = Uuid::new_v4();
		state.nodes.insert(
			id,
			NodeRecord {
				name: name.to_string(),
				parent: Some(parent),
				children: Vec::new(),
				properties: HashMap::new(),
			},
		);
		state.node_mut(parent)?.children.push(id);
		Ok(id)
	}

	async fn rename_node(&self, id: Uuid, new_name: &str) -> StoreResult<()> {
		let mut state = self.state.write();
		let parent = state.node(id)?.parent.ok_or_else(|| anyhow!("cannot rename root"))?;
		let duplicate = state
			.node(parent)?
			.children
			.iter()
			.filter(|&&c| c != id)
			.any(|c| state.nodes.get(c).map(|n| n.name == new_name).unwrap_or(false));
		if duplicate {
			bail!("node {new_name} already exists under {parent}");
		}
		state.node_mut(id)?.name = new_name.to_string();
		Ok(())
	}

	async fn move_node(&self, id: Uuid, new_parent: Uuid) -> StoreResult<()> {
		let mut state = self.state.write();
		if state.subtree_ids(id).contains(&new_parent) {
			bail!("cannot move node {id} into its own subtree");
		}
		let name = state.node(id)?.name.clone();
		let duplicate = state
			.node(new_parent)?
			.children
			.iter()
			.any(|c| state.nodes.get(c).map(|n| n.name == name).unwrap_or(false));
		if duplicate {
			bail!("node {name} already exists under {new_parent}");
		}
		let old_parent = state.node(id)?.parent.ok_or_else(|| anyhow!("cannot move root"))?;
		state.node_mut(old_parent)?.children.retain(|&c| c != id);
		state.node_mut(new_parent)?.children.push(id);
		state.node_mut(id)?.parent = Some(new_parent);
		Ok(())
	}

	async fn order_before(&self, id: Uuid, before: Uuid) -> StoreResult<()> {
		let mut state = self.state.write();
		let parent = state.node(id)?.parent.ok_or_else(|| anyhow!("cannot order root"))?;
		if state.node(before)?.parent != Some(parent) {
			bail!("nodes {id} and {before} are not siblings");
		}
		let children = &mut state.node_mut(parent)?.children;
		children.retain(|&c| c != id);
		let index = children
			.iter()
			.position(|&c| c == before)
			.ok_or_else(|| anyhow!("sibling {before} not found"))?;
		children.insert(index, id);
		Ok(())
	}

	async fn delete_node(&self, id: Uuid) -> StoreResult<()> {
		let mut state = self.state.write();
		if id == state.root {
			bail!("cannot delete root");
		}
		let parent = state.node(id)?.parent;
		let removed = state.subtree_ids(id);
		for node in &removed {
			state.nodes.remove(node);
			state.references.remove(node);
		}
		if let Some(parent) = parent {
			state.node_mut(parent)?.children.retain(|&c| c != id);
		}
		Ok(())
	}

	async fn get_property(&self, id: Uuid, key: &str) -> StoreResult<Option<JsonValue>> {
		Ok(self.state.read().node(id)?.properties.get(key).cloned())
	}

	async fn get_properties(&self, id: Uuid) -> StoreResult<HashMap<String, JsonValue>> {
		Ok(self.state.read().node(id)?.properties.clone())
	}

	async fn set_property(&self, id: Uuid, key: &str, value: JsonValue) -> StoreResult<()> {
		self.state
			.write()
			.node_mut(id)?
			.properties
			.insert(key.to_string(), value);
		Ok(())
	}

	async fn remove_property(&self, id: Uuid, key: &str) -> StoreResult<()> {
		self.state.write().node_mut(id)?.properties.remove(key);
		Ok(())
	}

	async fn set_references(&self, from: Uuid, property_key: &str, targets: &[Uuid]) -> StoreResult<()> {
		let mut state = self.state.write();
		if !state.nodes.contains_key(&from) {
			bail!("no such node: {from}");
		}
		let entry = state.references.entry(from).or_default();
		if targets.is_empty() {
			entry.remove(property_key);
		} else {
			entry.insert(property_key.to_string(), targets.to_vec());
		}
		Ok(())
	}

	async fn referrers_of(&self, id: Uuid) -> StoreResult<Vec<Referrer>> {
		let state = self.state.read();
		let mut out = Vec::new();
		for (from, by_key) in &state.references {
			for (key, targets) in by_key {
				if targets.contains(&id) {
					out.push(Referrer {
						node: *from,
						property_key: key.clone(),
					});
				}
			}
		}
		Ok(out)
	}

	async fn references_of(&self, id: Uuid) -> StoreResult<Vec<(String, Vec<Uuid>)>> {
		let state = self.state.read();
		Ok(state
			.references
			.get(&id)
			.map(|by_key| {
				by_key
					.iter()
					.map(|(key, targets)| (key.clone(), targets.clone()))
					.collect()
			})
			.unwrap_or_default())
	}
}

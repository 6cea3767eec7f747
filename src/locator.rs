//! Resource locator strategy
//!
//! Canonical URL paths ("resource locators") live in a route tree parallel
//! to the content tree, one subtree per webspace and locale. Each route
//! node references the content node it addresses and carries a history
//! flag. Renaming a URL demotes the old route to history instead of
//! deleting it, so old URLs keep resolving; a chain of renames leaves a
//! chain of history entries all pointing at the current content.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CmsError, CmsResult};
use crate::store::TreeStore;
use crate::webspace::Webspace;

/// Route node property holding the referenced content uuid
const PROP_CONTENT: &str = "content";
/// Route node property marking a demoted (history) route
const PROP_HISTORY: &str = "history";

/// Result of resolving a resource locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
	/// The content node the route addresses
	pub content_id: Uuid,
	/// Whether the route is a demoted former URL
	///
	/// The HTTP layer decides between serving and redirecting on this.
	pub history: bool,
}

/// Fold common latin diacritics to ASCII
fn fold_diacritics(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for ch in text.chars() {
		match ch {
			'à' | 'á' | 'â' | 'ã' | 'å' => out.push('a'),
			'ä' => out.push_str("ae"),
			'æ' => out.push_str("ae"),
			'ç' => out.push('c'),
			'è' | 'é' | 'ê' | 'ë' => out.push('e'),
			'ì' | 'í' | 'î' | 'ï' => out.push('i'),
			'ñ' => out.push('n'),
			'ò' | 'ó' | 'ô' | 'õ' => out.push('o'),
			'ö' => out.push_str("oe"),
			'œ' => out.push_str("oe"),
			'ù' | 'ú' | 'û' => out.push('u'),
			'ü' => out.push_str("ue"),
			'ý' | 'ÿ' => out.push('y'),
			'ß' => out.push_str("ss"),
			_ => out.push(ch),
		}
	}
	out
}

/// Derive a URL-safe path segment from a title
///
/// Diacritics are folded, whitespace runs collapse to single dashes and
/// everything outside `[a-z0-9-_]` is dropped as a separator.
pub fn slugify(title: &str) -> String {
	fold_diacritics(&title.to_lowercase())
		.chars()
		.map(|ch| match ch {
			'a'..='z' | '0'..='9' | '_' => ch,
			_ => '-',
		})
		.collect::<String>()
		.split('-')
		.filter(|s| !s.is_empty())
		.collect::<Vec<_>>()
		.join("-")
}

/// Strategy computing, validating and persisting resource locators
pub struct ResourceLocatorStrategy {
	store: Arc<dyn TreeStore>,
}

impl ResourceLocatorStrategy {
	/// Create a strategy over the given store
	pub fn new(store: Arc<dyn TreeStore>) -> Self {
		Self { store }
	}

	/// Validate a resource locator path
	///
	/// Paths must be absolute, must not end in a slash and every segment
	/// is restricted to `[a-z0-9-_]` (no dots, so literal file extensions
	/// are rejected).
	pub fn validate(&self, path: &str) -> CmsResult<()> {
		let invalid = || CmsError::ResourceLocatorNotValid(path.to_string());
		if !path.starts_with('/') || path == "/" || path.ends_with('/') {
			return Err(invalid());
		}
		for segment in path[1..].split('/') {
			if segment.is_empty() {
				return Err(invalid());
			}
			if !segment
				.chars()
				.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
			{
				return Err(invalid());
			}
		}
		Ok(())
	}

	/// Compute a unique resource locator for a title under a parent path
	///
	/// Appends `-1`, `-2`, ... while the candidate is occupied by an
	/// active or history route. The first free integer wins, so
	/// disambiguation is stable under repeated sibling insertion and a
	/// slot stays blocked for as long as its history entry survives.
	pub async fn generate(
		&self,
		title: &str,
		parent_path: Option<&str>,
		webspace: &Webspace,
		locale: &str,
	) -> CmsResult<String> {
		let slug = slugify(title);
		if slug.is_empty() {
			return Err(CmsError::ResourceLocatorNotValid(title.to_string()));
		}
		let base = format!("{}/{}", parent_path.unwrap_or(""), slug);
		self.validate(&base)?;
		let mut counter = 0u32;
		loop {
			let candidate = if counter == 0 {
				base.clone()
			} else {
				format!("{base}-{counter}")
			};
			if !self.occupied(&candidate, webspace, locale).await? {
				return Ok(candidate);
			}
			counter += 1;
		}
	}

	/// Persist a resource locator for a content node
	///
	/// Fails with [`CmsError::ResourceLocatorNotValid`] on malformed paths
	/// and [`CmsError::ResourceLocatorAlreadyExists`] when a different
	/// node's route occupies the path. When the node already had a
	/// different active route, the old route is demoted to a history
	/// entry pointing at the same content.
	pub async fn save(
		&self,
		content_id: Uuid,
		path: &str,
		webspace: &Webspace,
		locale: &str,
	) -> CmsResult<()> {
		self.validate(path)?;
		let root = webspace.route_root(locale);
		let full = format!("{root}{path}");

		// Inspect whatever sits at the target path before touching anything.
		if let Some(existing) = self.store.node_at_path(&full).await? {
			match self.route_content(existing).await? {
				Some(other) if other != content_id => {
					return Err(CmsError::ResourceLocatorAlreadyExists(path.to_string()));
				}
				Some(_) => {
					// Own route: reactivate when reclaiming a history entry.
					let was_history = self.route_is_history(existing).await?;
					if was_history {
						self.demote_active(content_id, webspace, locale, path).await?;
						self.store
							.set_property(existing, PROP_HISTORY, json!(false))
							.await?;
						debug!(%content_id, path, "reactivated history route");
					}
					return Ok(());
				}
				None => {}
			}
		}

		self.demote_active(content_id, webspace, locale, path).await?;

		let node = self.store.ensure_path(&full).await?;
		self.store
			.set_property(node, PROP_CONTENT, json!(content_id.to_string()))
			.await?;
		self.store.set_property(node, PROP_HISTORY, json!(false)).await?;
		debug!(%content_id, path, locale, "saved resource locator");
		Ok(())
	}

	/// Resolve a resource locator to its content node
	///
	/// History routes resolve too; callers check [`RouteMatch::history`]
	/// to decide between serving and redirecting.
	pub async fn resolve(&self, path: &str, webspace: &Webspace, locale: &str) -> CmsResult<RouteMatch> {
		let full = format!("{}{}", webspace.route_root(locale), path);
		let node = self
			.store
			.node_at_path(&full)
			.await?
			.ok_or_else(|| CmsError::ResourceLocatorNotFound(path.to_string()))?;
		let content_id = self
			.route_content(node)
			.await?
			.ok_or_else(|| CmsError::ResourceLocatorNotFound(path.to_string()))?;
		let history = self.route_is_history(node).await?;
		Ok(RouteMatch { content_id, history })
	}

	/// The active resource locator of a content node, if any
	pub async fn active_path_of(
		&self,
		content_id: Uuid,
		webspace: &Webspace,
		locale: &str,
	) -> CmsResult<Option<String>> {
		for (node, path) in self.walk_routes(webspace, locale).await? {
			if self.route_content(node).await? == Some(content_id)
				&& !self.route_is_history(node).await?
			{
				return Ok(Some(path));
			}
		}
		Ok(None)
	}

	/// All demoted former resource locators of a content node
	pub async fn history_of(
		&self,
		content_id: Uuid,
		webspace: &Webspace,
		locale: &str,
	) -> CmsResult<Vec<String>> {
		let mut out = Vec::new();
		for (node, path) in self.walk_routes(webspace, locale).await? {
			if self.route_content(node).await? == Some(content_id)
				&& self.route_is_history(node).await?
			{
				out.push(path);
			}
		}
		Ok(out)
	}

	/// Remove every route (active and history) of a content node
	///
	/// Route nodes that still carry children of other routes are kept as
	/// plain intermediates with their content reference stripped.
	pub async fn delete_by_content(
		&self,
		content_id: Uuid,
		webspace: &Webspace,
		locale: &str,
	) -> CmsResult<()> {
		let mut owned: Vec<Uuid> = Vec::new();
		for (node, _) in self.walk_routes(webspace, locale).await? {
			if self.route_content(node).await? == Some(content_id) {
				owned.push(node);
			}
		}
		for node in owned {
			if !self.store.node_exists(node).await? {
				// Removed together with an ancestor route.
				continue;
			}
			if self.store.children_of(node).await?.is_empty() {
				self.store.delete_node(node).await?;
			} else {
				self.store.remove_property(node, PROP_CONTENT).await?;
				self.store.remove_property(node, PROP_HISTORY).await?;
			}
		}
		Ok(())
	}

	/// Demote the node's current active route to history when it differs
	/// from `new_path`
	async fn demote_active(
		&self,
		content_id: Uuid,
		webspace: &Webspace,
		locale: &str,
		new_path: &str,
	) -> CmsResult<()> {
		if let Some(old_path) = self.active_path_of(content_id, webspace, locale).await? {
			if old_path != new_path {
				let full = format!("{}{}", webspace.route_root(locale), old_path);
				if let Some(old_node) = self.store.node_at_path(&full).await? {
					self.store
						.set_property(old_node, PROP_HISTORY, json!(true))
						.await?;
					debug!(%content_id, old_path, new_path, "demoted route to history");
				}
			}
		}
		Ok(())
	}

	/// Whether a path is occupied by any active or history route
	async fn occupied(&self, path: &str, webspace: &Webspace, locale: &str) -> CmsResult<bool> {
		let full = format!("{}{}", webspace.route_root(locale), path);
		match self.store.node_at_path(&full).await? {
			Some(node) => Ok(self.route_content(node).await?.is_some()),
			None => Ok(false),
		}
	}

	async fn route_content(&self, node: Uuid) -> CmsResult<Option<Uuid>> {
		Ok(self
			.store
			.get_property(node, PROP_CONTENT)
			.await?
			.and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok())))
	}

	async fn route_is_history(&self, node: Uuid) -> CmsResult<bool> {
		Ok(self
			.store
			.get_property(node, PROP_HISTORY)
			.await?
			.and_then(|v| v.as_bool())
			.unwrap_or(false))
	}

	/// All route nodes of a locale with their paths relative to the route
	/// root
	async fn walk_routes(&self, webspace: &Webspace, locale: &str) -> CmsResult<Vec<(Uuid, String)>> {
		let root = webspace.route_root(locale);
		let Some(root_node) = self.store.node_at_path(&root).await? else {
			return Ok(Vec::new());
		};
		let mut out = Vec::new();
		let mut stack: Vec<(Uuid, String)> = vec![(root_node, String::new())];
		while let Some((node, path)) = stack.pop() {
			for child in self.store.children_of(node).await? {
				let name = self.store.name_of(child).await?;
				let child_path = format!("{path}/{name}");
				out.push((child, child_path.clone()));
				stack.push((child, child_path));
			}
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slugify_folds_and_collapses() {
		assert_eq!(slugify("Hello  World"), "hello-world");
		assert_eq!(slugify("Ünïcödé Tïtle"), "uenicoede-title");
		assert_eq!(slugify("Straße 42"), "strasse-42");
		assert_eq!(slugify("!!!"), "");
	}

	#[test]
	fn validate_rejects_malformed_paths() {
		let strategy = ResourceLocatorStrategy::new(Arc::new(crate::memory::MemoryTreeStore::new()));
		assert!(strategy.validate("/news/test").is_ok());
		assert!(strategy.validate("news/test").is_err());
		assert!(strategy.validate("/news/test.xml").is_err());
		assert!(strategy.validate("/news//test").is_err());
		assert!(strategy.validate("/news/test/").is_err());
		assert!(strategy.validate("/").is_err());
	}
}

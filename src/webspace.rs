//! Webspace and locale configuration
//!
//! A webspace is one site within the content repository, with its own
//! content and route subtrees and an ordered list of locales. The locale
//! order doubles as the ghost-fallback priority.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CmsError, CmsResult};

/// One site: a key plus its locales in fallback-priority order
#[derive(Debug, Clone)]
pub struct Webspace {
	/// Webspace key, used as the content/route subtree prefix
	pub key: String,
	/// Locales in ghost-fallback priority order
	pub locales: Vec<String>,
}

impl Webspace {
	/// Create a webspace with its locales in priority order
	pub fn new(key: impl Into<String>, locales: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			key: key.into(),
			locales: locales.into_iter().map(Into::into).collect(),
		}
	}

	/// The highest-priority locale
	pub fn default_locale(&self) -> Option<&str> {
		self.locales.first().map(String::as_str)
	}

	/// Ghost-fallback candidates for a requested locale, in priority
	/// order, with the requested locale itself skipped
	pub fn fallback_locales<'a>(&'a self, requested: &'a str) -> impl Iterator<Item = &'a str> {
		self.locales
			.iter()
			.map(String::as_str)
			.filter(move |l| *l != requested)
	}

	/// Root path of the webspace's content tree
	pub fn content_root(&self) -> String {
		format!("/{}/contents", self.key)
	}

	/// Root path of the webspace's route tree for a locale
	pub fn route_root(&self, locale: &str) -> String {
		format!("/{}/routes/{}", self.key, locale)
	}
}

/// Lookup of webspaces by key
#[derive(Default)]
pub struct WebspaceRegistry {
	webspaces: HashMap<String, Arc<Webspace>>,
}

impl WebspaceRegistry {
	/// Create an empty registry
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a webspace
	pub fn with_webspace(mut self, webspace: Webspace) -> Self {
		self.webspaces.insert(webspace.key.clone(), Arc::new(webspace));
		self
	}

	/// Look up a webspace by key
	pub fn get(&self, key: &str) -> CmsResult<Arc<Webspace>> {
		self.webspaces
			.get(key)
			.cloned()
			.ok_or_else(|| CmsError::UnknownWebspace(key.to_string()))
	}
}

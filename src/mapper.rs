//! Content mapper
//!
//! Orchestrates save/load/move/copy/delete/order of content nodes against
//! the tree store, combining structure definitions, the resource locator
//! strategy and the content-type codecs. Implements locale resolution
//! (concrete vs. ghost vs. shadow), template switches and the tree
//! operations with their routing consistency guarantees.
//!
//! Every mutating operation runs inside one store transaction and rolls
//! back in full on any validation or store failure; partial writes are
//! never observable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::content_types::ContentTypeRegistry;
use crate::definition::{StructureDefinition, ValueProperty};
use crate::error::{CmsError, CmsResult};
use crate::locator::{ResourceLocatorStrategy, slugify};
use crate::manager::StructureManager;
use crate::store::{TreeStore, localized_key};
use crate::structure::{LocaleOverlay, NodeState, NodeType, OverlayKind, Structure};
use crate::webspace::{Webspace, WebspaceRegistry};

/// Tag marking the property a node's name and title derive from
pub const TAG_NODE_NAME: &str = "node.name";
/// Tag marking the dedicated resource locator property
pub const TAG_RESOURCE_LOCATOR: &str = "resource_locator";
/// Tag marking properties contributing parts to generated locators
pub const TAG_RESOURCE_LOCATOR_PART: &str = "resource_locator.part";

const META_TEMPLATE: &str = "template";
const META_STATE: &str = "state";
const META_PUBLISHED: &str = "published";
const META_CREATOR: &str = "creator";
const META_CHANGER: &str = "changer";
const META_CREATED: &str = "created";
const META_CHANGED: &str = "changed";
const META_NAV_CONTEXTS: &str = "navContexts";
const META_NODE_TYPE: &str = "nodeType";
const META_SHADOW_ON: &str = "shadow-on";
const META_SHADOW_BASE: &str = "shadow-base";

/// Parameters of a [`ContentMapper::save`] call
#[derive(Debug, Clone)]
pub struct SaveRequest {
	/// Template key resolving the structure definition
	pub template: String,
	/// Webspace key
	pub webspace: String,
	/// Locale the data is saved into
	pub locale: String,
	/// Acting user, recorded as creator/changer
	pub user: Uuid,
	/// Flat property data keyed by property name
	pub data: JsonMap<String, JsonValue>,
	/// Existing node to update; a new node is created when `None`
	pub uuid: Option<Uuid>,
	/// Parent for new nodes; the webspace content root when `None`
	pub parent: Option<Uuid>,
	/// Requested publication state; `None` keeps the current state
	pub state: Option<NodeState>,
	/// When true, absent data keys are left untouched instead of being
	/// treated as explicit removal
	pub partial_update: bool,
	/// Configure this locale as a shadow of `shadow_base`
	pub is_shadow: bool,
	/// Base locale when `is_shadow` is set
	pub shadow_base: Option<String>,
	/// Node kind
	pub node_type: NodeType,
	/// Navigation contexts; written only when provided
	pub nav_contexts: Option<Vec<String>>,
	/// Skip mandatory-property validation
	pub ignore_mandatory: bool,
}

impl SaveRequest {
	/// Create a save request with the required parameters
	pub fn new(
		template: impl Into<String>,
		webspace: impl Into<String>,
		locale: impl Into<String>,
		user: Uuid,
	) -> Self {
		Self {
			template: template.into(),
			webspace: webspace.into(),
			locale: locale.into(),
			user,
			data: JsonMap::new(),
			uuid: None,
			parent: None,
			state: None,
			partial_update: false,
			is_shadow: false,
			shadow_base: None,
			node_type: NodeType::Content,
			nav_contexts: None,
			ignore_mandatory: false,
		}
	}

	/// Set the property data from a JSON object
	pub fn with_data(mut self, data: JsonValue) -> Self {
		if let JsonValue::Object(map) = data {
			self.data = map;
		}
		self
	}

	/// Target an existing node
	pub fn with_uuid(mut self, uuid: Uuid) -> Self {
		self.uuid = Some(uuid);
		self
	}

	/// Create the new node under this parent
	pub fn with_parent(mut self, parent: Uuid) -> Self {
		self.parent = Some(parent);
		self
	}

	/// Request a publication state
	pub fn with_state(mut self, state: NodeState) -> Self {
		self.state = Some(state);
		self
	}

	/// Leave absent data keys untouched
	pub fn partial(mut self) -> Self {
		self.partial_update = true;
		self
	}

	/// Configure the locale as a shadow of `base`
	pub fn with_shadow(mut self, base: impl Into<String>) -> Self {
		self.is_shadow = true;
		self.shadow_base = Some(base.into());
		self
	}

	/// Set the node kind
	pub fn with_node_type(mut self, node_type: NodeType) -> Self {
		self.node_type = node_type;
		self
	}

	/// Set the navigation contexts
	pub fn with_nav_contexts(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.nav_contexts = Some(contexts.into_iter().map(Into::into).collect());
		self
	}

	/// Skip mandatory-property validation
	pub fn ignoring_mandatory(mut self) -> Self {
		self.ignore_mandatory = true;
		self
	}
}

/// The content mapper core
pub struct ContentMapper {
	store: Arc<dyn TreeStore>,
	manager: Arc<StructureManager>,
	locator: ResourceLocatorStrategy,
	content_types: Arc<ContentTypeRegistry>,
	webspaces: Arc<WebspaceRegistry>,
}

impl ContentMapper {
	/// Create a mapper with the default content-type codecs
	pub fn new(
		store: Arc<dyn TreeStore>,
		manager: Arc<StructureManager>,
		webspaces: Arc<WebspaceRegistry>,
	) -> Self {
		let locator = ResourceLocatorStrategy::new(Arc::clone(&store));
		Self {
			store,
			manager,
			locator,
			content_types: Arc::new(ContentTypeRegistry::new()),
			webspaces,
		}
	}

	/// Replace the content-type codec registry
	pub fn with_content_types(mut self, content_types: Arc<ContentTypeRegistry>) -> Self {
		self.content_types = content_types;
		self
	}

	/// The resource locator strategy
	pub fn locator(&self) -> &ResourceLocatorStrategy {
		&self.locator
	}

	/// The structure manager
	pub fn manager(&self) -> &StructureManager {
		&self.manager
	}

	/// Save content data for one node and locale
	///
	/// Creates the node when no uuid is given. See [`SaveRequest`] for the
	/// knobs. All writes happen in one store transaction; any failure
	/// leaves the store unchanged.
	pub async fn save(&self, request: SaveRequest) -> CmsResult<Structure> {
		let definition = self.manager.get_structure(&request.template)?;
		let webspace = self.webspaces.get(&request.webspace)?;

		self.store.begin().await?;
		let node = match self.save_inner(&definition, &webspace, &request).await {
			Ok(node) => {
				self.store.commit().await?;
				node
			}
			Err(err) => {
				let _ = self.store.rollback().await;
				return Err(err);
			}
		};
		debug!(template = %request.template, locale = %request.locale, %node, "saved content");
		self.load(node, &request.webspace, &request.locale, true).await
	}

	/// Load one node in one locale
	///
	/// With `load_ghost` the mapper falls back to another concrete locale
	/// and marks the result as ghost content; without it a blank structure
	/// is returned when the locale has no concrete variant.
	pub async fn load(
		&self,
		uuid: Uuid,
		webspace_key: &str,
		locale: &str,
		load_ghost: bool,
	) -> CmsResult<Structure> {
		let webspace = self.webspaces.get(webspace_key)?;
		if !self.store.node_exists(uuid).await? {
			return Err(CmsError::NodeNotFound(uuid));
		}
		self.read_structure(uuid, &webspace, locale, load_ghost).await
	}

	/// Resolve a resource locator and load the addressed node
	///
	/// History routes resolve as well; use [`ResourceLocatorStrategy::resolve`]
	/// to distinguish redirects.
	pub async fn load_by_resource_locator(
		&self,
		path: &str,
		webspace_key: &str,
		locale: &str,
	) -> CmsResult<Structure> {
		let webspace = self.webspaces.get(webspace_key)?;
		let matched = self.locator.resolve(path, &webspace, locale).await?;
		self.load(matched.content_id, webspace_key, locale, true).await
	}

	/// Load the children of a node (or of the content root)
	///
	/// `flat` returns a pre-order flattened list up to `depth` levels;
	/// otherwise direct children come back with `children` populated for
	/// `depth - 1` further levels and `has_children` set without
	/// descending once depth is exhausted.
	#[allow(clippy::too_many_arguments)]
	pub async fn load_by_parent(
		&self,
		parent: Option<Uuid>,
		webspace_key: &str,
		locale: &str,
		depth: u32,
		flat: bool,
		exclude_ghosts: bool,
		exclude_shadows: bool,
	) -> CmsResult<Vec<Structure>> {
		let webspace = self.webspaces.get(webspace_key)?;
		let parent_node = match parent {
			Some(uuid) => {
				if !self.store.node_exists(uuid).await? {
					return Err(CmsError::NodeNotFound(uuid));
				}
				uuid
			}
			None => match self.store.node_at_path(&webspace.content_root()).await? {
				Some(root) => root,
				None => return Ok(Vec::new()),
			},
		};
		if depth == 0 {
			return Ok(Vec::new());
		}
		self.load_children(
			parent_node,
			&webspace,
			locale,
			depth,
			flat,
			exclude_ghosts,
			exclude_shadows,
		)
		.await
	}

	/// Move a node (and its subtree) under a new parent
	///
	/// Every locale's route is recomputed: the moved node gets a
	/// destination-relative locator with the usual disambiguation, while
	/// descendants get a pure prefix rewrite of their existing paths. Old
	/// locators are demoted to history.
	pub async fn move_node(
		&self,
		uuid: Uuid,
		destination_parent: Uuid,
		user: Uuid,
		webspace_key: &str,
		locale: &str,
	) -> CmsResult<Structure> {
		let webspace = self.webspaces.get(webspace_key)?;
		self.store.begin().await?;
		match self.move_inner(uuid, destination_parent, user, &webspace).await {
			Ok(()) => self.store.commit().await?,
			Err(err) => {
				let _ = self.store.rollback().await;
				return Err(err);
			}
		}
		debug!(%uuid, %destination_parent, "moved content node");
		self.load(uuid, webspace_key, locale, true).await
	}

	/// Duplicate a node and its full subtree under a new parent
	///
	/// Copies get fresh uuids and fresh, disambiguated routes; no history
	/// entries are created for them.
	pub async fn copy_node(
		&self,
		uuid: Uuid,
		destination_parent: Uuid,
		user: Uuid,
		webspace_key: &str,
		locale: &str,
	) -> CmsResult<Structure> {
		let webspace = self.webspaces.get(webspace_key)?;
		self.store.begin().await?;
		let copy_root = match self.copy_inner(uuid, destination_parent, user, &webspace).await {
			Ok(root) => {
				self.store.commit().await?;
				root
			}
			Err(err) => {
				let _ = self.store.rollback().await;
				return Err(err);
			}
		};
		debug!(%uuid, %copy_root, "copied content subtree");
		self.load(copy_root, webspace_key, locale, true).await
	}

	/// Reorder a node directly before one of its siblings
	pub async fn order_before(
		&self,
		uuid: Uuid,
		before_sibling: Uuid,
		user: Uuid,
		webspace_key: &str,
		locale: &str,
	) -> CmsResult<Structure> {
		let webspace = self.webspaces.get(webspace_key)?;
		self.store.begin().await?;
		let result: CmsResult<()> = async {
			if !self.store.node_exists(uuid).await? {
				return Err(CmsError::NodeNotFound(uuid));
			}
			if !self.store.node_exists(before_sibling).await? {
				return Err(CmsError::NodeNotFound(before_sibling));
			}
			self.store.order_before(uuid, before_sibling).await?;
			self.touch(uuid, &webspace, user).await?;
			Ok(())
		}
		.await;
		match result {
			Ok(()) => self.store.commit().await?,
			Err(err) => {
				let _ = self.store.rollback().await;
				return Err(err);
			}
		}
		self.load(uuid, webspace_key, locale, true).await
	}

	/// Delete a node, its subtree and all of their routes
	///
	/// Fails with [`CmsError::ReferentialIntegrity`] when other content
	/// still references the subtree and `dereference` is not set. With
	/// `dereference`, referencing properties drop the removed ids and keep
	/// their remaining entries in order.
	pub async fn delete(&self, uuid: Uuid, webspace_key: &str, dereference: bool) -> CmsResult<()> {
		let webspace = self.webspaces.get(webspace_key)?;
		self.store.begin().await?;
		match self.delete_inner(uuid, &webspace, dereference).await {
			Ok(()) => {
				self.store.commit().await?;
				debug!(%uuid, "deleted content node");
				Ok(())
			}
			Err(err) => {
				let _ = self.store.rollback().await;
				Err(err)
			}
		}
	}

	/// Save one named extension data block for a node and locale
	///
	/// The target locale must have concrete content; otherwise the save
	/// fails with [`CmsError::TranslatedNodeNotFound`].
	pub async fn save_extension(
		&self,
		uuid: Uuid,
		extension_name: &str,
		data: JsonValue,
		webspace_key: &str,
		locale: &str,
		user: Uuid,
	) -> CmsResult<Structure> {
		// lookup only validates the webspace key
		self.webspaces.get(webspace_key)?;
		self.store.begin().await?;
		let result: CmsResult<()> = async {
			if !self.store.node_exists(uuid).await? {
				return Err(CmsError::NodeNotFound(uuid));
			}
			let template = self
				.store
				.get_property(uuid, &localized_key(locale, META_TEMPLATE))
				.await?
				.and_then(|v| v.as_str().map(str::to_string))
				.ok_or_else(|| CmsError::TranslatedNodeNotFound {
					node: uuid,
					locale: locale.to_string(),
				})?;
			let extension = self.manager.get_extension(&template, extension_name)?;
			extension.save(self.store.as_ref(), uuid, locale, &data).await?;
			self.set_changer(uuid, locale, user).await?;
			Ok(())
		}
		.await;
		match result {
			Ok(()) => self.store.commit().await?,
			Err(err) => {
				let _ = self.store.rollback().await;
				return Err(err);
			}
		}
		self.load(uuid, webspace_key, locale, true).await
	}

	// ---- save internals ----

	async fn save_inner(
		&self,
		definition: &Arc<StructureDefinition>,
		webspace: &Arc<Webspace>,
		request: &SaveRequest,
	) -> CmsResult<Uuid> {
		let locale = request.locale.as_str();
		let now = Utc::now();
		let content_root = self.store.ensure_path(&webspace.content_root()).await?;

		let title_property = self.title_property_name(definition)?;
		let rl_property = self.resource_locator_property_name(definition)?;
		let title_from_data = request
			.data
			.get(&title_property)
			.and_then(|v| v.as_str())
			.map(str::to_string);

		// Shadow parameters are checked up front; concreteness of the base
		// needs the node and is checked further down.
		if request.is_shadow {
			let base = request
				.shadow_base
				.as_deref()
				.ok_or_else(|| CmsError::InvalidShadow("shadow base locale missing".into()))?;
			if base == locale {
				return Err(CmsError::InvalidShadow(format!(
					"locale {locale} cannot shadow itself"
				)));
			}
		}

		// Mandatory validation. Shadowed locales carry no own content, and
		// the resource locator is only meaningful for content pages.
		if !request.ignore_mandatory && !request.is_shadow {
			let mut missing = Vec::new();
			for property in definition.value_properties() {
				if !property.mandatory() {
					continue;
				}
				if request.node_type != NodeType::Content && property.name() == rl_property {
					continue;
				}
				match request.data.get(property.name()) {
					Some(value) if !value.is_null() => {}
					Some(_) => missing.push(property.name().to_string()),
					None => {
						if request.uuid.is_none() || !request.partial_update {
							missing.push(property.name().to_string());
						}
					}
				}
			}
			if !missing.is_empty() {
				return Err(CmsError::MandatoryPropertyMissing {
					template: definition.key.clone(),
					properties: missing,
				});
			}
		}

		// Resolve or create the node.
		let (node, is_new) = match request.uuid {
			Some(uuid) => {
				if !self.store.node_exists(uuid).await? {
					return Err(CmsError::NodeNotFound(uuid));
				}
				(uuid, false)
			}
			None => {
				let parent = request.parent.unwrap_or(content_root);
				if !self.store.node_exists(parent).await? {
					return Err(CmsError::NodeNotFound(parent));
				}
				let title = title_from_data.clone().ok_or_else(|| {
					CmsError::MandatoryPropertyMissing {
						template: definition.key.clone(),
						properties: vec![title_property.clone()],
					}
				})?;
				let base = node_name_slug(&title);
				let name = self.unique_node_name(parent, &base, None).await?;
				(self.store.create_node(parent, &name).await?, true)
			}
		};

		// Shadow base checks against the actual node.
		if request.is_shadow {
			let base = request.shadow_base.as_deref().unwrap_or_default();
			let base_concrete = self
				.store
				.get_property(node, &localized_key(base, META_TEMPLATE))
				.await?
				.is_some();
			if !base_concrete {
				return Err(CmsError::InvalidShadow(format!(
					"shadow base locale {base} has no concrete content"
				)));
			}
			let base_is_shadow = self
				.store
				.get_property(node, &localized_key(base, META_SHADOW_ON))
				.await?
				.and_then(|v| v.as_bool())
				.unwrap_or(false);
			if base_is_shadow {
				return Err(CmsError::InvalidShadow(format!(
					"shadow base locale {base} is itself a shadow"
				)));
			}
		}

		// Rename on title change, keeping the sibling position.
		if !is_new && !request.is_shadow {
			if let Some(title) = &title_from_data {
				let slug = node_name_slug(title);
				let current = self.store.name_of(node).await?;
				if name_base(&current) != slug {
					let parent = self
						.store
						.parent_of(node)
						.await?
						.unwrap_or(content_root);
					let name = self.unique_node_name(parent, &slug, Some(node)).await?;
					self.store.rename_node(node, &name).await?;
				}
			}
		}

		// Template switch: drop properties that only the old schema knows,
		// keeping those with a compatible name and content type.
		let template_key = localized_key(locale, META_TEMPLATE);
		let old_template = self
			.store
			.get_property(node, &template_key)
			.await?
			.and_then(|v| v.as_str().map(str::to_string));
		if !request.is_shadow {
			if let Some(old) = &old_template {
				if old != &definition.key {
					self.clear_switched_properties(node, locale, old, definition).await?;
				}
			}
		}

		// Publication state is monotonic: published never silently drops
		// back to test.
		let state_key = localized_key(locale, META_STATE);
		let old_state = self
			.store
			.get_property(node, &state_key)
			.await?
			.and_then(|v| v.as_str().map(NodeState::parse));
		let effective_state = match (old_state, request.state) {
			(Some(NodeState::Published), Some(NodeState::Test)) => {
				warn!(%node, locale, "ignoring state regression from published to test");
				NodeState::Published
			}
			(_, Some(requested)) => requested,
			(Some(current), None) => current,
			(None, None) => NodeState::Test,
		};
		self.store
			.set_property(node, &state_key, json!(effective_state.as_str()))
			.await?;
		let published_key = localized_key(locale, META_PUBLISHED);
		if effective_state == NodeState::Published
			&& self.store.get_property(node, &published_key).await?.is_none()
		{
			self.store
				.set_property(node, &published_key, json!(now.to_rfc3339()))
				.await?;
		}

		// Property values.
		if request.is_shadow {
			// Shadowed properties are read from the base locale; only the
			// locale-specific resource locator is written.
			if let Some(value) = request.data.get(&rl_property).and_then(|v| v.as_str()) {
				if request.node_type == NodeType::Content {
					self.locator.save(node, value, webspace, locale).await?;
					self.store
						.set_property(node, &localized_key(locale, &rl_property), json!(value))
						.await?;
				}
			}
		} else {
			for property in definition.value_properties() {
				let key = property_key(locale, &property);
				match request.data.get(property.name()) {
					Some(value) if !value.is_null() => {
						if property.name() == rl_property {
							if request.node_type == NodeType::Content {
								let path = value.as_str().ok_or_else(|| {
									CmsError::ResourceLocatorNotValid(value.to_string())
								})?;
								self.locator.save(node, path, webspace, locale).await?;
							}
						}
						let codec = self.content_types.get(property.content_type());
						codec.write(self.store.as_ref(), node, &key, value).await?;
						let references = codec.references(value);
						self.store.set_references(node, &key, &references).await?;
					}
					_ if !request.partial_update && !is_new => {
						// Absent or null means explicit removal on full
						// updates; mandatory violations were caught above.
						self.store.remove_property(node, &key).await?;
						self.store.set_references(node, &key, &[]).await?;
					}
					_ => {}
				}
			}
			self.store
				.set_property(node, &template_key, json!(definition.key))
				.await?;
		}

		// Locale metadata.
		self.store
			.set_property(node, &localized_key(locale, META_NODE_TYPE), json!(request.node_type.as_str()))
			.await?;
		self.store
			.set_property(node, &localized_key(locale, META_SHADOW_ON), json!(request.is_shadow))
			.await?;
		match (&request.shadow_base, request.is_shadow) {
			(Some(base), true) => {
				self.store
					.set_property(node, &localized_key(locale, META_SHADOW_BASE), json!(base))
					.await?;
			}
			_ => {
				self.store
					.remove_property(node, &localized_key(locale, META_SHADOW_BASE))
					.await?;
			}
		}
		if let Some(contexts) = &request.nav_contexts {
			self.store
				.set_property(node, &localized_key(locale, META_NAV_CONTEXTS), json!(contexts))
				.await?;
		}
		if is_new {
			self.store
				.set_property(node, &localized_key(locale, META_CREATOR), json!(request.user.to_string()))
				.await?;
			self.store
				.set_property(node, &localized_key(locale, META_CREATED), json!(now.to_rfc3339()))
				.await?;
		}
		self.store
			.set_property(node, &localized_key(locale, META_CHANGER), json!(request.user.to_string()))
			.await?;
		self.store
			.set_property(node, &localized_key(locale, META_CHANGED), json!(now.to_rfc3339()))
			.await?;

		Ok(node)
	}

	async fn clear_switched_properties(
		&self,
		node: Uuid,
		locale: &str,
		old_template: &str,
		new_definition: &StructureDefinition,
	) -> CmsResult<()> {
		// An unknown old template cannot tell us what to clear; leave its
		// orphaned values in place rather than guessing.
		let Ok(old_definition) = self.manager.get_structure(old_template) else {
			return Ok(());
		};
		for old_property in old_definition.value_properties() {
			let compatible = new_definition
				.value_property(old_property.name())
				.map(|new_property| new_property.content_type() == old_property.content_type())
				.unwrap_or(false);
			if !compatible {
				let key = property_key(locale, &old_property);
				self.store.remove_property(node, &key).await?;
				self.store.set_references(node, &key, &[]).await?;
			}
		}
		Ok(())
	}

	// ---- load internals ----

	async fn read_structure(
		&self,
		node: Uuid,
		webspace: &Arc<Webspace>,
		locale: &str,
		load_ghost: bool,
	) -> CmsResult<Structure> {
		let props = self.store.get_properties(node).await?;

		let (mut effective, mut overlay) = resolve_locale(&props, webspace, locale);
		if let Some(LocaleOverlay { kind: OverlayKind::Ghost, .. }) = &overlay {
			if !load_ghost {
				effective = None;
				overlay = None;
			}
		}

		let concrete_locales = concrete_locales(&props, webspace);

		let template = effective
			.as_deref()
			.and_then(|l| props.get(&localized_key(l, META_TEMPLATE)))
			.or_else(|| {
				concrete_locales
					.first()
					.and_then(|l| props.get(&localized_key(l, META_TEMPLATE)))
			})
			.and_then(|v| v.as_str().map(str::to_string))
			.ok_or(CmsError::NodeNotFound(node))?;
		let definition = self.manager.get_structure(&template)?;

		let mut structure = Structure::new(Arc::clone(&definition), node, webspace.key.clone(), locale);
		structure.path = self.store.path_of(node).await?;
		structure.overlay = overlay;
		structure.concrete_locales = concrete_locales;
		structure.has_children = !self.store.children_of(node).await?.is_empty();
		structure.shadow_enabled = bool_prop(&props, &localized_key(locale, META_SHADOW_ON));
		structure.shadow_base_locale = str_prop(&props, &localized_key(locale, META_SHADOW_BASE));

		let Some(effective) = effective else {
			// Blank structure: the locale has no content and ghosts were
			// not requested.
			return Ok(structure);
		};

		structure.node_type = str_prop(&props, &localized_key(&effective, META_NODE_TYPE))
			.map(|v| NodeType::parse(&v))
			.unwrap_or_default();
		structure.node_state = str_prop(&props, &localized_key(&effective, META_STATE))
			.map(|v| NodeState::parse(&v))
			.unwrap_or_default();
		structure.creator = uuid_prop(&props, &localized_key(&effective, META_CREATOR));
		structure.changer = uuid_prop(&props, &localized_key(&effective, META_CHANGER));
		structure.created = time_prop(&props, &localized_key(&effective, META_CREATED));
		structure.changed = time_prop(&props, &localized_key(&effective, META_CHANGED));
		structure.published = time_prop(&props, &localized_key(&effective, META_PUBLISHED));
		structure.nav_contexts = props
			.get(&localized_key(&effective, META_NAV_CONTEXTS))
			.and_then(|v| v.as_array())
			.map(|items| {
				items
					.iter()
					.filter_map(|v| v.as_str().map(str::to_string))
					.collect()
			})
			.unwrap_or_default();

		for property in definition.value_properties() {
			let key = property_key(&effective, &property);
			let codec = self.content_types.get(property.content_type());
			if let Some(value) = codec.read(self.store.as_ref(), node, &key).await? {
				structure.set_value(property.name(), value);
			}
		}

		let title_property = self.title_property_name(&definition)?;
		structure.title = structure
			.property(&title_property)
			.and_then(|v| v.as_str())
			.unwrap_or_default()
			.to_string();

		// The resource locator stays locale-specific even for shadows.
		if structure.node_type == NodeType::Content {
			let rl_locale = match &structure.overlay {
				Some(LocaleOverlay { kind: OverlayKind::Shadow, .. }) => locale,
				_ => effective.as_str(),
			};
			structure.resource_locator =
				self.locator.active_path_of(node, webspace, rl_locale).await?;
			let rl_property = self.resource_locator_property_name(&definition)?;
			if let Some(rl) = &structure.resource_locator {
				structure.set_value(&rl_property, json!(rl));
			}
		}

		for extension in self.manager.get_extensions(&definition.key) {
			let data = extension.load(self.store.as_ref(), node, &effective).await?;
			structure.set_extension_data(extension.name().to_string(), data);
		}

		Ok(structure)
	}

	fn load_children<'a>(
		&'a self,
		parent: Uuid,
		webspace: &'a Arc<Webspace>,
		locale: &'a str,
		depth: u32,
		flat: bool,
		exclude_ghosts: bool,
		exclude_shadows: bool,
	) -> BoxFuture<'a, CmsResult<Vec<Structure>>> {
		async move {
			let mut out = Vec::new();
			for child in self.store.children_of(parent).await? {
				let mut structure = self.read_structure(child, webspace, locale, true).await?;
				let skip = match &structure.overlay {
					Some(LocaleOverlay { kind: OverlayKind::Ghost, .. }) => exclude_ghosts,
					Some(LocaleOverlay { kind: OverlayKind::Shadow, .. }) => exclude_shadows,
					None => false,
				};
				if skip {
					continue;
				}
				if depth > 1 {
					let nested = self
						.load_children(
							child,
							webspace,
							locale,
							depth - 1,
							flat,
							exclude_ghosts,
							exclude_shadows,
						)
						.await?;
					if flat {
						out.push(structure);
						out.extend(nested);
						continue;
					}
					structure.children = nested;
				}
				out.push(structure);
			}
			Ok(out)
		}
		.boxed()
	}

	// ---- tree operation internals ----

	async fn move_inner(
		&self,
		uuid: Uuid,
		destination_parent: Uuid,
		user: Uuid,
		webspace: &Arc<Webspace>,
	) -> CmsResult<()> {
		if !self.store.node_exists(uuid).await? {
			return Err(CmsError::NodeNotFound(uuid));
		}
		if !self.store.node_exists(destination_parent).await? {
			return Err(CmsError::NodeNotFound(destination_parent));
		}

		// Capture the routes to rewrite before touching the tree.
		let mut locale_routes: Vec<(String, String)> = Vec::new();
		for loc in &webspace.locales {
			if let Some(old) = self.locator.active_path_of(uuid, webspace, loc).await? {
				locale_routes.push((loc.clone(), old));
			}
		}
		let descendants = self.subtree_of(uuid).await?;

		// Disambiguate the node name against both old and new siblings so
		// a single rename suffices.
		let current_name = self.store.name_of(uuid).await?;
		let base = name_base(&current_name).to_string();
		let mut taken: HashSet<String> = HashSet::new();
		for sibling in self.store.children_of(destination_parent).await? {
			taken.insert(self.store.name_of(sibling).await?);
		}
		if let Some(old_parent) = self.store.parent_of(uuid).await? {
			for sibling in self.store.children_of(old_parent).await? {
				if sibling != uuid {
					taken.insert(self.store.name_of(sibling).await?);
				}
			}
		}
		let target_name = first_free_name(&base, &taken);
		if target_name != current_name {
			self.store.rename_node(uuid, &target_name).await?;
		}
		self.store.move_node(uuid, destination_parent).await?;

		for (loc, old_rl) in locale_routes {
			let parent_rl = self
				.locator
				.active_path_of(destination_parent, webspace, &loc)
				.await?;
			let segment = old_rl.rsplit('/').next().unwrap_or_default();
			let new_rl = self
				.free_route(name_base(segment), parent_rl.as_deref(), webspace, &loc)
				.await?;
			self.locator.save(uuid, &new_rl, webspace, &loc).await?;

			// Descendants keep their relative paths: pure prefix rewrite.
			let old_prefix = format!("{old_rl}/");
			for descendant in &descendants {
				if *descendant == uuid {
					continue;
				}
				if let Some(d_rl) = self.locator.active_path_of(*descendant, webspace, &loc).await? {
					if let Some(suffix) = d_rl.strip_prefix(&old_prefix) {
						let rewritten = format!("{new_rl}/{suffix}");
						self.locator.save(*descendant, &rewritten, webspace, &loc).await?;
					}
				}
			}
		}

		self.touch(uuid, webspace, user).await?;
		Ok(())
	}

	async fn copy_inner(
		&self,
		uuid: Uuid,
		destination_parent: Uuid,
		user: Uuid,
		webspace: &Arc<Webspace>,
	) -> CmsResult<Uuid> {
		if !self.store.node_exists(uuid).await? {
			return Err(CmsError::NodeNotFound(uuid));
		}
		if !self.store.node_exists(destination_parent).await? {
			return Err(CmsError::NodeNotFound(destination_parent));
		}
		let subtree = self.subtree_of(uuid).await?;
		if subtree.contains(&destination_parent) {
			return Err(CmsError::Store(anyhow::anyhow!(
				"cannot copy node {uuid} into its own subtree"
			)));
		}

		let current_name = self.store.name_of(uuid).await?;
		let name = self
			.unique_node_name(destination_parent, name_base(&current_name), None)
			.await?;
		let mut mapping: Vec<(Uuid, Uuid)> = Vec::new();
		let root_copy = self
			.deep_copy(uuid, destination_parent, &name, &mut mapping)
			.await?;

		let now = Utc::now();
		for (_, copy) in &mapping {
			// Fresh provenance on every copied locale variant.
			for loc in &webspace.locales {
				let template_key = localized_key(loc, META_TEMPLATE);
				if self.store.get_property(*copy, &template_key).await?.is_none() {
					continue;
				}
				for (meta, value) in [
					(META_CREATOR, json!(user.to_string())),
					(META_CHANGER, json!(user.to_string())),
					(META_CREATED, json!(now.to_rfc3339())),
					(META_CHANGED, json!(now.to_rfc3339())),
				] {
					self.store
						.set_property(*copy, &localized_key(loc, meta), value.clone())
						.await?;
				}
			}
		}

		// Fresh routes for the copies, disambiguated at the destination;
		// descendants mirror the relative structure of the source.
		for loc in &webspace.locales {
			let Some(source_rl) = self.locator.active_path_of(uuid, webspace, loc).await? else {
				continue;
			};
			let parent_rl = self
				.locator
				.active_path_of(destination_parent, webspace, loc)
				.await?;
			let segment = source_rl.rsplit('/').next().unwrap_or_default();
			let copy_rl = self
				.free_route(name_base(segment), parent_rl.as_deref(), webspace, loc)
				.await?;
			self.locator.save(root_copy, &copy_rl, webspace, loc).await?;

			let old_prefix = format!("{source_rl}/");
			for (source, copy) in &mapping {
				if *source == uuid {
					continue;
				}
				if let Some(d_rl) = self.locator.active_path_of(*source, webspace, loc).await? {
					if let Some(suffix) = d_rl.strip_prefix(&old_prefix) {
						let rewritten = format!("{copy_rl}/{suffix}");
						self.locator.save(*copy, &rewritten, webspace, loc).await?;
					}
				}
			}
		}

		Ok(root_copy)
	}

	fn deep_copy<'a>(
		&'a self,
		source: Uuid,
		parent: Uuid,
		name: &'a str,
		mapping: &'a mut Vec<(Uuid, Uuid)>,
	) -> BoxFuture<'a, CmsResult<Uuid>> {
		async move {
			let copy = self.store.create_node(parent, name).await?;
			for (key, value) in self.store.get_properties(source).await? {
				self.store.set_property(copy, &key, value).await?;
			}
			for (key, targets) in self.store.references_of(source).await? {
				self.store.set_references(copy, &key, &targets).await?;
			}
			mapping.push((source, copy));
			for child in self.store.children_of(source).await? {
				let child_name = self.store.name_of(child).await?;
				self.deep_copy(child, copy, &child_name, mapping).await?;
			}
			Ok(copy)
		}
		.boxed()
	}

	async fn delete_inner(
		&self,
		uuid: Uuid,
		webspace: &Arc<Webspace>,
		dereference: bool,
	) -> CmsResult<()> {
		if !self.store.node_exists(uuid).await? {
			return Err(CmsError::NodeNotFound(uuid));
		}
		let subtree = self.subtree_of(uuid).await?;
		let subtree_set: HashSet<Uuid> = subtree.iter().copied().collect();

		let mut external = Vec::new();
		for node in &subtree {
			for referrer in self.store.referrers_of(*node).await? {
				if !subtree_set.contains(&referrer.node) {
					external.push(referrer);
				}
			}
		}

		if !external.is_empty() {
			if !dereference {
				let mut referrers: Vec<Uuid> = external.iter().map(|r| r.node).collect();
				referrers.sort();
				referrers.dedup();
				return Err(CmsError::ReferentialIntegrity {
					node: uuid,
					referrers,
				});
			}
			for referrer in external {
				self.drop_reference(&referrer, &subtree_set).await?;
			}
		}

		for node in &subtree {
			for loc in &webspace.locales {
				self.locator.delete_by_content(*node, webspace, loc).await?;
			}
		}
		self.store.delete_node(uuid).await?;
		Ok(())
	}

	/// Remove the deleted ids from a referencing property, keeping the
	/// remaining entries in order
	async fn drop_reference(
		&self,
		referrer: &crate::store::Referrer,
		deleted: &HashSet<Uuid>,
	) -> CmsResult<()> {
		let value = self
			.store
			.get_property(referrer.node, &referrer.property_key)
			.await?;
		let retained: Vec<Uuid> = match &value {
			Some(JsonValue::Array(items)) => {
				let kept: Vec<JsonValue> = items
					.iter()
					.filter(|v| {
						v.as_str()
							.and_then(|s| Uuid::parse_str(s).ok())
							.map(|u| !deleted.contains(&u))
							.unwrap_or(true)
					})
					.cloned()
					.collect();
				let ids = kept
					.iter()
					.filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
					.collect();
				self.store
					.set_property(referrer.node, &referrer.property_key, JsonValue::Array(kept))
					.await?;
				ids
			}
			Some(JsonValue::String(s)) => {
				if Uuid::parse_str(s).map(|u| deleted.contains(&u)).unwrap_or(false) {
					self.store
						.remove_property(referrer.node, &referrer.property_key)
						.await?;
				}
				Vec::new()
			}
			_ => Vec::new(),
		};
		self.store
			.set_references(referrer.node, &referrer.property_key, &retained)
			.await?;
		Ok(())
	}

	// ---- shared helpers ----

	/// Update changer/changed on every concrete locale of a node
	async fn touch(&self, node: Uuid, webspace: &Arc<Webspace>, user: Uuid) -> CmsResult<()> {
		let props = self.store.get_properties(node).await?;
		for loc in concrete_locales(&props, webspace) {
			self.set_changer(node, &loc, user).await?;
		}
		Ok(())
	}

	async fn set_changer(&self, node: Uuid, locale: &str, user: Uuid) -> CmsResult<()> {
		self.store
			.set_property(node, &localized_key(locale, META_CHANGER), json!(user.to_string()))
			.await?;
		self.store
			.set_property(node, &localized_key(locale, META_CHANGED), json!(Utc::now().to_rfc3339()))
			.await?;
		Ok(())
	}

	async fn subtree_of(&self, root: Uuid) -> CmsResult<Vec<Uuid>> {
		let mut out = Vec::new();
		let mut stack = vec![root];
		while let Some(node) = stack.pop() {
			out.push(node);
			stack.extend(self.store.children_of(node).await?);
		}
		Ok(out)
	}

	async fn unique_node_name(
		&self,
		parent: Uuid,
		base: &str,
		exclude: Option<Uuid>,
	) -> CmsResult<String> {
		let mut taken = HashSet::new();
		for sibling in self.store.children_of(parent).await? {
			if Some(sibling) == exclude {
				continue;
			}
			taken.insert(self.store.name_of(sibling).await?);
		}
		Ok(first_free_name(base, &taken))
	}

	/// First free route under `parent_rl` derived from `segment`
	async fn free_route(
		&self,
		segment: &str,
		parent_rl: Option<&str>,
		webspace: &Arc<Webspace>,
		locale: &str,
	) -> CmsResult<String> {
		// Same probing as locator generation, but on an existing segment
		// instead of a fresh slug.
		let mut counter = 0u32;
		loop {
			let candidate = if counter == 0 {
				format!("{}/{}", parent_rl.unwrap_or(""), segment)
			} else {
				format!("{}/{}-{}", parent_rl.unwrap_or(""), segment, counter)
			};
			match self.locator.resolve(&candidate, webspace, locale).await {
				Err(CmsError::ResourceLocatorNotFound(_)) => return Ok(candidate),
				Ok(_) => counter += 1,
				Err(other) => return Err(other),
			}
		}
	}

	fn title_property_name(&self, definition: &StructureDefinition) -> CmsResult<String> {
		Ok(definition
			.property_by_tag(TAG_NODE_NAME)?
			.map(|p| p.name().to_string())
			.unwrap_or_else(|| "title".to_string()))
	}

	fn resource_locator_property_name(&self, definition: &StructureDefinition) -> CmsResult<String> {
		if let Some(tagged) = definition.property_by_tag(TAG_RESOURCE_LOCATOR)? {
			return Ok(tagged.name().to_string());
		}
		Ok(definition
			.value_properties()
			.iter()
			.find(|p| p.content_type() == "resource_locator")
			.map(|p| p.name().to_string())
			.unwrap_or_else(|| "url".to_string()))
	}
}

/// Storage key of a property: locale-namespaced unless the definition
/// opts out of localization
fn property_key(locale: &str, property: &ValueProperty<'_>) -> String {
	if property.multilingual() {
		localized_key(locale, property.name())
	} else {
		property.name().to_string()
	}
}

/// Node-name slug for a title; empty titles fall back to "untitled"
fn node_name_slug(title: &str) -> String {
	let slug = slugify(title);
	if slug.is_empty() { "untitled".to_string() } else { slug }
}

/// Strip a trailing `-<digits>` disambiguator
fn name_base(name: &str) -> &str {
	if let Some((base, suffix)) = name.rsplit_once('-') {
		if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
			return base;
		}
	}
	name
}

/// First free `base`, `base-1`, `base-2`, ... not contained in `taken`
fn first_free_name(base: &str, taken: &HashSet<String>) -> String {
	let mut counter = 0u32;
	loop {
		let candidate = if counter == 0 {
			base.to_string()
		} else {
			format!("{base}-{counter}")
		};
		if !taken.contains(&candidate) {
			return candidate;
		}
		counter += 1;
	}
}

/// Compute the effective locale and overlay for a read
///
/// Shadow configuration wins, then concrete content, then ghost fallback
/// along the webspace's locale order. Computed on every read so shadows
/// always reflect the current base-locale state.
fn resolve_locale(
	props: &HashMap<String, JsonValue>,
	webspace: &Webspace,
	requested: &str,
) -> (Option<String>, Option<LocaleOverlay>) {
	let shadow_on = |loc: &str| {
		props
			.get(&localized_key(loc, META_SHADOW_ON))
			.and_then(|v| v.as_bool())
			.unwrap_or(false)
	};
	let concrete =
		|loc: &str| props.contains_key(&localized_key(loc, META_TEMPLATE)) && !shadow_on(loc);

	if shadow_on(requested) {
		if let Some(base) = props
			.get(&localized_key(requested, META_SHADOW_BASE))
			.and_then(|v| v.as_str())
		{
			return (
				Some(base.to_string()),
				Some(LocaleOverlay {
					kind: OverlayKind::Shadow,
					locale: base.to_string(),
				}),
			);
		}
	}
	if concrete(requested) {
		return (Some(requested.to_string()), None);
	}
	for fallback in webspace.fallback_locales(requested) {
		if concrete(fallback) {
			return (
				Some(fallback.to_string()),
				Some(LocaleOverlay {
					kind: OverlayKind::Ghost,
					locale: fallback.to_string(),
				}),
			);
		}
	}
	(None, None)
}

/// Locales with genuinely authored content, in webspace priority order
fn concrete_locales(props: &HashMap<String, JsonValue>, webspace: &Webspace) -> Vec<String> {
	webspace
		.locales
		.iter()
		.filter(|loc| {
			props.contains_key(&localized_key(loc, META_TEMPLATE))
				&& !props
					.get(&localized_key(loc, META_SHADOW_ON))
					.and_then(|v| v.as_bool())
					.unwrap_or(false)
		})
		.cloned()
		.collect()
}

fn str_prop(props: &HashMap<String, JsonValue>, key: &str) -> Option<String> {
	props.get(key).and_then(|v| v.as_str().map(str::to_string))
}

fn bool_prop(props: &HashMap<String, JsonValue>, key: &str) -> bool {
	props.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn uuid_prop(props: &HashMap<String, JsonValue>, key: &str) -> Option<Uuid> {
	props
		.get(key)
		.and_then(|v| v.as_str())
		.and_then(|s| Uuid::parse_str(s).ok())
}

fn time_prop(props: &HashMap<String, JsonValue>, key: &str) -> Option<DateTime<Utc>> {
	props
		.get(key)
		.and_then(|v| v.as_str())
		.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
		.map(|t| t.with_timezone(&Utc))
}

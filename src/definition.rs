//! Structure definition model
//!
//! A [`StructureDefinition`] is the immutable schema behind one template
//! key: an ordered list of simple, block (repeating, typed) and section
//! (grouping) properties. Definitions are loaded once per template key and
//! shared read-only across all structures using that template.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::{CmsError, CmsResult};

/// Root type a structure definition belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
	/// Regular page content
	Page,
	/// Reusable snippet content
	Snippet,
}

/// Named marker attached to a property definition
///
/// Tags locate special properties inside a template without hardcoding
/// property names, e.g. the node-naming source or resource locator parts.
/// Ties between properties sharing a tag are broken by `priority`
/// (higher wins).
#[derive(Debug, Clone)]
pub struct Tag {
	/// Tag name, e.g. `node.name`
	pub name: String,
	/// Priority used to break ties between properties sharing the tag
	pub priority: i32,
	/// Arbitrary additional attributes
	pub attributes: HashMap<String, String>,
}

impl Tag {
	/// Create a tag with the given name and priority
	pub fn new(name: impl Into<String>, priority: i32) -> Self {
		Self {
			name: name.into(),
			priority,
			attributes: HashMap::new(),
		}
	}

	/// Attach an attribute to the tag
	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}
}

/// Definition of a simple (scalar) property
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
	/// Property name, the key in the flat data map
	pub name: String,
	/// Content-type name resolved against the codec registry,
	/// e.g. `text_line` or `resource_locator`
	pub content_type: String,
	/// Whether a non-null value is required on save
	pub mandatory: bool,
	/// Whether the value is stored under a locale-namespaced key
	pub multilingual: bool,
	/// Minimum number of occurrences
	pub min_occurs: u32,
	/// Maximum number of occurrences, unbounded when `None`
	pub max_occurs: Option<u32>,
	/// Content-type specific parameters
	pub parameters: HashMap<String, JsonValue>,
	/// Named markers attached to this property
	pub tags: Vec<Tag>,
}

impl PropertyDefinition {
	/// Create a property definition with the given name and content type
	pub fn new(name: impl Into<String>, content_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			content_type: content_type.into(),
			mandatory: false,
			multilingual: true,
			min_occurs: 0,
			max_occurs: None,
			parameters: HashMap::new(),
			tags: Vec::new(),
		}
	}

	/// Mark the property as mandatory
	pub fn mandatory(mut self) -> Self {
		self.mandatory = true;
		self
	}

	/// Store the value under a single shared key instead of per locale
	pub fn unlocalized(mut self) -> Self {
		self.multilingual = false;
		self
	}

	/// Set occurrence bounds
	pub fn with_occurs(mut self, min: u32, max: Option<u32>) -> Self {
		self.min_occurs = min;
		self.max_occurs = max;
		self
	}

	/// Attach a content-type parameter
	pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
		self.parameters.insert(key.into(), value);
		self
	}

	/// Attach a tag
	pub fn with_tag(mut self, tag: Tag) -> Self {
		self.tags.push(tag);
		self
	}

	/// Look up a tag by name
	pub fn tag(&self, name: &str) -> Option<&Tag> {
		self.tags.iter().find(|t| t.name == name)
	}
}

/// One named variant of a block, an ordered list of child properties
///
/// Block children may themselves be blocks, so block types nest
/// recursively.
#[derive(Debug, Clone)]
pub struct BlockTypeDefinition {
	/// Variant name, stored as `type` in every block entry
	pub name: String,
	/// Ordered child properties of this variant
	pub items: Vec<PropertyItem>,
}

impl BlockTypeDefinition {
	/// Create an empty block type
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			items: Vec::new(),
		}
	}

	/// Append a child item
	pub fn with_item(mut self, item: PropertyItem) -> Self {
		self.items.push(item);
		self
	}
}

/// Definition of a repeating composite (block) property
#[derive(Debug, Clone)]
pub struct BlockDefinition {
	/// Property name, the key in the flat data map
	pub name: String,
	/// Whether at least one entry is required on save
	pub mandatory: bool,
	/// Minimum number of entries
	pub min_occurs: u32,
	/// Maximum number of entries, unbounded when `None`
	pub max_occurs: Option<u32>,
	/// Variant used when an entry omits its `type`
	pub default_type: Option<String>,
	/// Available variants
	pub types: Vec<BlockTypeDefinition>,
	/// Named markers attached to this block
	pub tags: Vec<Tag>,
}

impl BlockDefinition {
	/// Create a block definition with the given name
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			mandatory: false,
			min_occurs: 0,
			max_occurs: None,
			default_type: None,
			types: Vec::new(),
			tags: Vec::new(),
		}
	}

	/// Mark the block as mandatory
	pub fn mandatory(mut self) -> Self {
		self.mandatory = true;
		self
	}

	/// Set occurrence bounds
	pub fn with_occurs(mut self, min: u32, max: Option<u32>) -> Self {
		self.min_occurs = min;
		self.max_occurs = max;
		self
	}

	/// Set the default variant
	pub fn with_default_type(mut self, name: impl Into<String>) -> Self {
		self.default_type = Some(name.into());
		self
	}

	/// Add a variant
	pub fn with_type(mut self, block_type: BlockTypeDefinition) -> Self {
		self.types.push(block_type);
		self
	}

	/// Attach a tag
	pub fn with_tag(mut self, tag: Tag) -> Self {
		self.tags.push(tag);
		self
	}

	/// Look up a variant by name
	pub fn block_type(&self, name: &str) -> Option<&BlockTypeDefinition> {
		self.types.iter().find(|t| t.name == name)
	}
}

/// A non-repeating grouping of child properties with no value of its own
///
/// Section children merge flat into the parent data map.
#[derive(Debug, Clone)]
pub struct SectionDefinition {
	/// Section name (presentation only, never a data key)
	pub name: String,
	/// Grouped child items
	pub items: Vec<PropertyItem>,
}

impl SectionDefinition {
	/// Create an empty section
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			items: Vec::new(),
		}
	}

	/// Append a child item
	pub fn with_item(mut self, item: PropertyItem) -> Self {
		self.items.push(item);
		self
	}
}

/// Tagged union over the three property kinds
#[derive(Debug, Clone)]
pub enum PropertyItem {
	/// A simple scalar property
	Simple(PropertyDefinition),
	/// A repeating composite property
	Block(BlockDefinition),
	/// A flat grouping of child properties
	Section(SectionDefinition),
}

/// A property that carries a value in the flat data map
///
/// Sections are transparent: their children appear here directly. Blocks
/// appear as a single entry whose value is the list of typed child maps.
#[derive(Debug, Clone, Copy)]
pub enum ValueProperty<'a> {
	/// Simple property
	Simple(&'a PropertyDefinition),
	/// Block property
	Block(&'a BlockDefinition),
}

impl<'a> ValueProperty<'a> {
	/// The data-map key of this property
	pub fn name(&self) -> &'a str {
		match self {
			ValueProperty::Simple(p) => &p.name,
			ValueProperty::Block(b) => &b.name,
		}
	}

	/// Whether a non-null value is required on save
	pub fn mandatory(&self) -> bool {
		match self {
			ValueProperty::Simple(p) => p.mandatory,
			ValueProperty::Block(b) => b.mandatory,
		}
	}

	/// Whether the value is stored under a locale-namespaced key
	pub fn multilingual(&self) -> bool {
		match self {
			ValueProperty::Simple(p) => p.multilingual,
			// Block values always live in the locale overlay
			ValueProperty::Block(_) => true,
		}
	}

	/// The codec name used to read/write the value
	pub fn content_type(&self) -> &'a str {
		match self {
			ValueProperty::Simple(p) => &p.content_type,
			ValueProperty::Block(_) => "block",
		}
	}

	/// Tags attached to the property
	pub fn tags(&self) -> &'a [Tag] {
		match self {
			ValueProperty::Simple(p) => &p.tags,
			ValueProperty::Block(b) => &b.tags,
		}
	}
}

/// Immutable schema for one template key
#[derive(Debug, Clone)]
pub struct StructureDefinition {
	/// Template key identifying this definition
	pub key: String,
	/// View hint forwarded to the rendering layer
	pub view: String,
	/// Controller hint forwarded to the routing layer
	pub controller: String,
	/// Cache lifetime in seconds
	pub cache_lifetime: u32,
	/// Root type the definition belongs to
	pub resource_type: ResourceType,
	/// Ordered property items
	pub items: Vec<PropertyItem>,
}

impl StructureDefinition {
	/// Create an empty page definition for the given template key
	pub fn new(key: impl Into<String>, resource_type: ResourceType) -> Self {
		Self {
			key: key.into(),
			view: String::new(),
			controller: String::new(),
			cache_lifetime: 0,
			resource_type,
			items: Vec::new(),
		}
	}

	/// Set the view hint
	pub fn with_view(mut self, view: impl Into<String>) -> Self {
		self.view = view.into();
		self
	}

	/// Set the controller hint
	pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
		self.controller = controller.into();
		self
	}

	/// Set the cache lifetime in seconds
	pub fn with_cache_lifetime(mut self, seconds: u32) -> Self {
		self.cache_lifetime = seconds;
		self
	}

	/// Append a property item
	pub fn with_item(mut self, item: PropertyItem) -> Self {
		self.items.push(item);
		self
	}

	/// Append a simple property
	pub fn with_property(self, property: PropertyDefinition) -> Self {
		self.with_item(PropertyItem::Simple(property))
	}

	/// Append a block property
	pub fn with_block(self, block: BlockDefinition) -> Self {
		self.with_item(PropertyItem::Block(block))
	}

	/// Append a section
	pub fn with_section(self, section: SectionDefinition) -> Self {
		self.with_item(PropertyItem::Section(section))
	}

	/// The properties carrying a value in the flat data map, in declared
	/// order, with sections flattened into their parent
	pub fn value_properties(&self) -> Vec<ValueProperty<'_>> {
		fn collect<'a>(items: &'a [PropertyItem], out: &mut Vec<ValueProperty<'a>>) {
			for item in items {
				match item {
					PropertyItem::Simple(p) => out.push(ValueProperty::Simple(p)),
					PropertyItem::Block(b) => out.push(ValueProperty::Block(b)),
					PropertyItem::Section(s) => collect(&s.items, out),
				}
			}
		}
		let mut out = Vec::new();
		collect(&self.items, &mut out);
		out
	}

	/// Look up a value-carrying property by name
	pub fn value_property(&self, name: &str) -> Option<ValueProperty<'_>> {
		self.value_properties().into_iter().find(|p| p.name() == name)
	}

	/// Visit every simple property definition, descending into sections
	/// and block type variants
	pub fn visit_properties(&self, f: &mut dyn FnMut(&PropertyDefinition)) {
		fn walk(items: &[PropertyItem], f: &mut dyn FnMut(&PropertyDefinition)) {
			for item in items {
				match item {
					PropertyItem::Simple(p) => f(p),
					PropertyItem::Section(s) => walk(&s.items, f),
					PropertyItem::Block(b) => {
						for block_type in &b.types {
							walk(&block_type.items, f);
						}
					}
				}
			}
		}
		walk(&self.items, f);
	}

	/// All value-carrying properties tagged with `tag`, highest priority
	/// first; declaration order breaks exact ties
	pub fn properties_by_tag(&self, tag: &str) -> Vec<ValueProperty<'_>> {
		let mut tagged: Vec<(i32, ValueProperty<'_>)> = self
			.value_properties()
			.into_iter()
			.filter_map(|p| {
				p.tags()
					.iter()
					.find(|t| t.name == tag)
					.map(|t| (t.priority, p))
			})
			.collect();
		tagged.sort_by(|a, b| b.0.cmp(&a.0));
		tagged.into_iter().map(|(_, p)| p).collect()
	}

	/// The single highest-priority property tagged with `tag`
	///
	/// Fails with [`CmsError::AmbiguousTag`] only when the two leading
	/// candidates share the same priority; a unique maximum always wins
	/// deterministically.
	pub fn property_by_tag(&self, tag: &str) -> CmsResult<Option<ValueProperty<'_>>> {
		let mut tagged: Vec<(i32, ValueProperty<'_>)> = self
			.value_properties()
			.into_iter()
			.filter_map(|p| {
				p.tags()
					.iter()
					.find(|t| t.name == tag)
					.map(|t| (t.priority, p))
			})
			.collect();
		tagged.sort_by(|a, b| b.0.cmp(&a.0));
		match tagged.len() {
			0 => Ok(None),
			1 => Ok(Some(tagged[0].1)),
			_ if tagged[0].0 == tagged[1].0 => Err(CmsError::AmbiguousTag(tag.to_string())),
			_ => Ok(Some(tagged[0].1)),
		}
	}
}

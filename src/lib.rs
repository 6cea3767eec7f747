//! # Tessera CMS
//!
//! Hierarchical content mapping core for localized content trees,
//! in the spirit of JCR-backed content repositories.
//!
//! ## Features
//!
//! - **Structure definitions**: template-driven property schemas with
//!   simple, block (repeating) and section (grouping) properties
//! - **Localized content tree**: per-locale property overlays stored in a
//!   generic hierarchical tree store
//! - **Ghost & shadow locales**: read-time fallback to other locales
//!   (ghost) and live mirroring of a concrete base locale (shadow)
//! - **Resource locators**: locale-scoped URL trees with rename history
//!   kept for redirects
//! - **Tree operations**: move, copy, reorder and delete with route and
//!   reference consistency
//! - **Extensions**: pluggable property groups saved and loaded
//!   independently of the main structure (e.g. SEO metadata)
//!
//! ## Architecture
//!
//! ```text
//! tessera-cms
//! ├── definition    - StructureDefinition schema model
//! ├── registry      - read-through cache over a DefinitionSource
//! ├── structure     - populated content instance for one node/locale
//! ├── store         - TreeStore abstraction (hierarchical document store)
//! ├── memory        - in-memory TreeStore reference implementation
//! ├── locator       - resource locator strategy, route history
//! ├── content_types - pluggable per-content-type value codecs
//! ├── webspace      - webspace/locale configuration
//! ├── mapper        - the content mapper core (save/load/move/copy/...)
//! └── manager       - structure manager, extension registration
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tessera_cms::prelude::*;
//!
//! let store = Arc::new(MemoryTreeStore::new());
//! let mapper = ContentMapper::new(store, manager, webspaces);
//!
//! let saved = mapper
//!     .save(
//!         SaveRequest::new("overview", "demo_io", "en", user)
//!             .with_data(json!({"title": "Testtitle", "url": "/news/test"})),
//!     )
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

// Re-export for downstream codec implementations
pub use serde_json;

// Module declarations
pub mod content_types;
pub mod definition;
pub mod error;
pub mod locator;
pub mod manager;
pub mod mapper;
pub mod memory;
pub mod registry;
pub mod store;
pub mod structure;
pub mod webspace;

// Prelude for convenient imports
pub mod prelude {
	//! Convenient re-exports of commonly used items

	// Definitions
	pub use crate::definition::{
		BlockDefinition, BlockTypeDefinition, PropertyDefinition, PropertyItem, ResourceType,
		SectionDefinition, StructureDefinition, Tag,
	};

	// Registry
	pub use crate::registry::{DefinitionSource, StaticDefinitionSource, StructureRegistry};

	// Structures
	pub use crate::structure::{LocaleOverlay, NodeState, NodeType, OverlayKind, Structure};

	// Store
	pub use crate::memory::MemoryTreeStore;
	pub use crate::store::{Referrer, TreeStore, localized_key};

	// Content types
	pub use crate::content_types::{ContentType, ContentTypeRegistry};

	// Locator
	pub use crate::locator::{ResourceLocatorStrategy, RouteMatch};

	// Mapper
	pub use crate::mapper::{ContentMapper, SaveRequest};

	// Manager
	pub use crate::manager::{PropertyListExtension, StructureExtension, StructureManager};

	// Webspaces
	pub use crate::webspace::{Webspace, WebspaceRegistry};

	// Errors
	pub use crate::error::{CmsError, CmsResult};
}

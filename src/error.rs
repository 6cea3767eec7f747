//! Error taxonomy for content mapping operations
//!
//! Every error aborts the enclosing store transaction; none are retried
//! internally. Translating these into HTTP status codes is the caller's
//! concern.

use thiserror::Error;
use uuid::Uuid;

/// Content-mapping errors
#[derive(Error, Debug)]
pub enum CmsError {
	/// Unknown template key
	#[error("structure not found for template key: {0}")]
	StructureNotFound(String),

	/// Required properties missing or null on save
	#[error("mandatory properties missing for template {template}: {}", properties.join(", "))]
	MandatoryPropertyMissing {
		/// Template key the validation ran against
		template: String,
		/// Names of the offending properties
		properties: Vec<String>,
	},

	/// Malformed resource locator path
	#[error("resource locator is not valid: {0}")]
	ResourceLocatorNotValid(String),

	/// Resource locator collides with another node's active route
	#[error("resource locator already exists: {0}")]
	ResourceLocatorAlreadyExists(String),

	/// No route node found for a resource locator
	#[error("resource locator not found: {0}")]
	ResourceLocatorNotFound(String),

	/// Shadow configuration violates concreteness or self-reference rules
	#[error("invalid shadow configuration: {0}")]
	InvalidShadow(String),

	/// Node uuid does not resolve
	#[error("node not found: {0}")]
	NodeNotFound(Uuid),

	/// Delete blocked by live incoming references
	#[error("node {node} is still referenced by {} other node(s)", referrers.len())]
	ReferentialIntegrity {
		/// The node whose deletion was requested
		node: Uuid,
		/// Nodes holding references to it
		referrers: Vec<Uuid>,
	},

	/// Node exists but carries no concrete content in the requested locale
	#[error("node {node} has no content in locale {locale}")]
	TranslatedNodeNotFound {
		/// The node addressed by the operation
		node: Uuid,
		/// The locale that has no concrete content
		locale: String,
	},

	/// Tag lookup could not be resolved to a single property
	#[error("tag {0} resolves to multiple properties with equal priority")]
	AmbiguousTag(String),

	/// Extension name not registered for the template
	#[error("extension not found: {0}")]
	ExtensionNotFound(String),

	/// Webspace key not registered
	#[error("unknown webspace: {0}")]
	UnknownWebspace(String),

	/// Error surfaced unchanged from the tree store
	#[error(transparent)]
	Store(#[from] anyhow::Error),
}

/// Result type for content-mapping operations
pub type CmsResult<T> = Result<T, CmsError>;

//! Property-based tests for slug and resource locator generation

mod common;

use std::sync::Arc;

use common::setup;
use proptest::prelude::*;
use tessera_cms::locator::{ResourceLocatorStrategy, slugify};
use tessera_cms::prelude::*;

proptest! {
	#[test]
	fn prop_slugify_output_is_url_safe(title in ".{0,64}") {
		let slug = slugify(&title);

		prop_assert!(slug
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'));
		prop_assert!(!slug.starts_with('-'));
		prop_assert!(!slug.ends_with('-'));
		prop_assert!(!slug.contains("--"));
	}

	#[test]
	fn prop_slugify_is_idempotent(title in ".{0,64}") {
		let once = slugify(&title);
		prop_assert_eq!(slugify(&once), once);
	}

	#[test]
	fn prop_nonempty_slugs_validate(title in "[a-z0-9 ]{1,32}") {
		prop_assume!(!slugify(&title).is_empty());
		let strategy = ResourceLocatorStrategy::new(Arc::new(MemoryTreeStore::new()));

		let path = format!("/{}", slugify(&title));
		prop_assert!(strategy.validate(&path).is_ok());
	}

	#[test]
	fn prop_generate_yields_valid_paths_or_rejects(title in ".{0,64}") {
		let rt = tokio::runtime::Runtime::new().unwrap();

		let env = setup();
		let result = rt.block_on(async {
			env.mapper
				.locator()
				.generate(&title, None, &env.webspace, "en")
				.await
		});

		match result {
			Ok(path) => {
				prop_assert!(path.starts_with('/'));
				prop_assert!(env.mapper.locator().validate(&path).is_ok());
			}
			Err(CmsError::ResourceLocatorNotValid(_)) => {}
			Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
		}
	}

	#[test]
	fn prop_generated_paths_never_collide_with_existing_routes(
		title in "[a-z]{1,16}",
		sibling_count in 0usize..4,
	) {
		let rt = tokio::runtime::Runtime::new().unwrap();

		let env = setup();
		let collision = rt.block_on(async {
			let store = Arc::clone(&env.store) as Arc<dyn TreeStore>;
			let strategy = ResourceLocatorStrategy::new(store);
			let mut taken = Vec::new();
			for _ in 0..sibling_count {
				let path = strategy
					.generate(&title, None, &env.webspace, "en")
					.await
					.unwrap();
				strategy
					.save(uuid::Uuid::new_v4(), &path, &env.webspace, "en")
					.await
					.unwrap();
				taken.push(path);
			}
			let fresh = strategy
				.generate(&title, None, &env.webspace, "en")
				.await
				.unwrap();
			taken.contains(&fresh)
		});

		prop_assert!(!collision);
	}
}

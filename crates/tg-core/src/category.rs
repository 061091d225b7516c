//! Application → productivity category resolution.
//!
//! Resolution order for an application name:
//!
//! 1. Case-insensitive exact match on a category name.
//! 2. Case-insensitive substring match in either direction. The first match in
//!    registry iteration order wins, so overlapping names (`Chrome` and
//!    `Google Chrome`) depend on registry order. Known limitation.
//! 3. The default category, created on first use.
//!
//! Registry read failures in steps 1 and 2 are logged and resolution falls
//! through; only a failure to obtain the default category is an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{CategoryId, ProductivityType};

/// Name of the fallback category for unmatched applications.
pub const DEFAULT_CATEGORY_NAME: &str = "Uncategorized";

/// A productivity category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,

    /// Unique, compared case-insensitively.
    pub name: String,

    pub productivity_type: ProductivityType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Storage for productivity categories.
///
/// Implementations must be safe to share between classification passes running
/// on different threads.
pub trait CategoryRegistry {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Finds a category by name, ignoring case.
    fn find_by_name(&self, name: &str) -> Result<Option<Category>, Self::Error>;

    /// Lists every category in a stable iteration order.
    fn list_all(&self) -> Result<Vec<Category>, Self::Error>;

    /// Creates a category, or returns the existing one with the same name.
    ///
    /// Must be idempotent under concurrency: losing a creation race is success.
    fn create(
        &self,
        name: &str,
        productivity_type: ProductivityType,
        description: Option<&str>,
    ) -> Result<Category, Self::Error>;
}

/// Resolves application names to category IDs, caching for one pass.
pub struct Classifier<'a, R: CategoryRegistry + ?Sized> {
    registry: &'a R,
    default_name: &'a str,
    resolved: HashMap<String, CategoryId>,
    listing: Option<Vec<Category>>,
    default_id: Option<CategoryId>,
}

impl<'a, R: CategoryRegistry + ?Sized> Classifier<'a, R> {
    pub fn new(registry: &'a R, default_name: &'a str) -> Self {
        Self {
            registry,
            default_name,
            resolved: HashMap::new(),
            listing: None,
            default_id: None,
        }
    }

    /// Returns the category ID for `app_name`.
    pub fn classify(&mut self, app_name: &str) -> Result<CategoryId, R::Error> {
        if let Some(&id) = self.resolved.get(app_name) {
            return Ok(id);
        }

        let id = match self.exact_match(app_name) {
            Some(id) => id,
            None => match self.substring_match(app_name) {
                Some(id) => id,
                None => self.default_category()?,
            },
        };

        self.resolved.insert(app_name.to_string(), id);
        Ok(id)
    }

    fn exact_match(&self, app_name: &str) -> Option<CategoryId> {
        match self.registry.find_by_name(app_name) {
            Ok(found) => found.map(|c| c.id),
            Err(e) => {
                warn!(app = app_name, error = %e, "category lookup failed, falling through");
                None
            }
        }
    }

    fn substring_match(&mut self, app_name: &str) -> Option<CategoryId> {
        let registry = self.registry;
        let listing = self.listing.get_or_insert_with(|| {
            registry.list_all().unwrap_or_else(|e| {
                warn!(error = %e, "listing categories failed, skipping substring match");
                Vec::new()
            })
        });

        let app = app_name.to_lowercase();
        listing
            .iter()
            .find(|c| {
                let name = c.name.to_lowercase();
                !name.is_empty() && (app.contains(&name) || name.contains(&app))
            })
            .map(|c| {
                debug!(app = app_name, category = %c.name, "substring category match");
                c.id
            })
    }

    fn default_category(&mut self) -> Result<CategoryId, R::Error> {
        if let Some(id) = self.default_id {
            return Ok(id);
        }

        let category = match self.registry.find_by_name(self.default_name) {
            Ok(Some(category)) => category,
            Ok(None) => self
                .registry
                .create(self.default_name, ProductivityType::Neutral, None)?,
            Err(e) => {
                warn!(error = %e, "default category lookup failed, creating");
                self.registry
                    .create(self.default_name, ProductivityType::Neutral, None)?
            }
        };

        self.default_id = Some(category.id);
        Ok(category.id)
    }
}

/// Classifies a single application without keeping a cache.
pub fn classify<R: CategoryRegistry + ?Sized>(
    registry: &R,
    app_name: &str,
    default_name: &str,
) -> Result<CategoryId, R::Error> {
    Classifier::new(registry, default_name).classify(app_name)
}

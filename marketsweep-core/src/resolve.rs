//! Find-or-create of taxonomy nodes, including nested `Parent > Child` names
//! and the top-level merge used by the farm taxonomy import.

use crate::error::{ImportError, Result};
use crate::model::{Category, CategoryStatus, NewCategory};
use crate::repository::CategoryRepository;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const NESTING_DELIMITER: char = '>';

/// What to do when a subcategory's name already exists as a top-level
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Move the existing top-level category under the new parent.
    ReparentTopLevel,
    /// Leave it alone and create a separate child.
    KeepSeparate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Existing,
    Created,
    Reparented,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub category: Category,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    fn existing(category: Category) -> Self {
        Self {
            category,
            outcome: ResolutionOutcome::Existing,
        }
    }

    /// The taxonomy changed while resolving.
    pub fn is_change(&self) -> bool {
        self.outcome != ResolutionOutcome::Existing
    }
}

/// Strips markup, collapses whitespace and trims. Returns `None` when nothing
/// is left.
///
/// Only `<` followed by a letter, `/` or `!` opens a tag, so decoded text such
/// as `Kids < 5 years` survives.
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut text = String::with_capacity(raw.len());
    let mut in_tag = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '<' if !in_tag
                && chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!')) =>
            {
                in_tag = true;
            }
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let name = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some(name)
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "category".to_string()
    } else {
        slug.to_string()
    }
}

/// Splits `Parent > Child` at the last delimiter, so deeper paths resolve
/// their parent recursively.
fn split_nested(name: &str) -> Option<(&str, &str)> {
    name.rsplit_once(NESTING_DELIMITER)
        .map(|(parent, child)| (parent.trim(), child.trim()))
}

pub struct CategoryResolver<'a, R: CategoryRepository> {
    repo: &'a R,
}

impl<'a, R: CategoryRepository> CategoryResolver<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Resolves a taxonomy name to a category, creating it (and its parent for
    /// nested names) when missing. An exact name match anywhere in the
    /// taxonomy is returned unchanged.
    pub fn resolve(&self, raw_name: &str) -> Result<Option<Resolution>> {
        let Some(name) = normalize_name(raw_name) else {
            debug!(raw_name, "Category name is empty after normalization");
            return Ok(None);
        };

        if let Some(existing) = self.repo.find_category_by_name(&name)? {
            return Ok(Some(Resolution::existing(existing)));
        }

        match split_nested(&name) {
            Some((parent_name, child_name)) => {
                let parent = match (parent_name.is_empty(), child_name.is_empty()) {
                    (true, true) => return Ok(None),
                    (true, false) => return self.find_or_create(None, child_name).map(Some),
                    (false, true) => return self.resolve(parent_name),
                    (false, false) => match self.resolve(parent_name)? {
                        Some(parent) => parent.category,
                        None => return self.find_or_create(None, child_name).map(Some),
                    },
                };
                self.find_or_create(Some(parent.id), child_name).map(Some)
            }
            None => self.find_or_create(None, &name).map(Some),
        }
    }

    /// Resolves a subcategory discovered under `parent`.
    pub fn resolve_child(
        &self,
        parent: &Category,
        raw_name: &str,
        policy: MergePolicy,
    ) -> Result<Option<Resolution>> {
        let Some(name) = normalize_name(raw_name) else {
            debug!(raw_name, parent = %parent.name, "Subcategory name is empty after normalization");
            return Ok(None);
        };

        if let Some(existing) = self.repo.find_child_by_name(Some(parent.id), &name)? {
            return Ok(Some(Resolution::existing(existing)));
        }

        if policy == MergePolicy::ReparentTopLevel
            && let Some(top_level) = self.repo.find_child_by_name(None, &name)?
            && top_level.id != parent.id
        {
            if let Some(resolution) = self.merge_into(top_level, parent)? {
                return Ok(Some(resolution));
            }
        }

        self.find_or_create(Some(parent.id), &name).map(Some)
    }

    /// Re-parents a top-level category under `parent`. Returns `None` when the
    /// merge must be skipped and a separate child created instead.
    fn merge_into(&self, category: Category, parent: &Category) -> Result<Option<Resolution>> {
        if self.is_ancestor(category.id, parent)? {
            warn!(
                category = %category.name,
                parent = %parent.name,
                "Refusing merge that would create a category cycle"
            );
            return Ok(Some(Resolution::existing(category)));
        }

        if self.repo.slug_taken(Some(parent.id), &category.slug)? {
            warn!(
                category = %category.name,
                parent = %parent.name,
                slug = %category.slug,
                "Slug already used under parent, creating a separate subcategory"
            );
            return Ok(None);
        }

        match self.repo.reparent_category(category.id, Some(parent.id)) {
            Ok(()) => {}
            Err(ImportError::Duplicate(what)) => {
                warn!(duplicate = %what, "Merge raced with another run, creating a separate subcategory");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        info!(
            category = %category.name,
            parent = %parent.name,
            "Merged top-level category under parent"
        );

        Ok(Some(Resolution {
            category: Category {
                parent_id: Some(parent.id),
                ..category
            },
            outcome: ResolutionOutcome::Reparented,
        }))
    }

    /// Whether `candidate_id` is `node` or one of its ancestors.
    fn is_ancestor(&self, candidate_id: i64, node: &Category) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut current = Some(node.clone());

        while let Some(category) = current {
            if category.id == candidate_id {
                return Ok(true);
            }
            if !seen.insert(category.id) {
                // Already cyclic; treat as unsafe
                return Ok(true);
            }
            current = match category.parent_id {
                Some(parent_id) => self.repo.find_category_by_id(parent_id)?,
                None => None,
            };
        }

        Ok(false)
    }

    fn find_or_create(&self, parent_id: Option<i64>, name: &str) -> Result<Resolution> {
        if let Some(existing) = self.repo.find_child_by_name(parent_id, name)? {
            return Ok(Resolution::existing(existing));
        }

        let new_category = NewCategory {
            name: name.to_string(),
            slug: self.unique_slug(parent_id, name)?,
            parent_id,
            status: CategoryStatus::Active,
            description: String::new(),
        };

        match self.repo.create_category(&new_category) {
            Ok(category) => {
                info!(
                    id = category.id,
                    name = %category.name,
                    parent_id = ?category.parent_id,
                    "Created category"
                );
                Ok(Resolution {
                    category,
                    outcome: ResolutionOutcome::Created,
                })
            }
            Err(ImportError::Duplicate(what)) => {
                // Another run created it between our lookup and insert
                debug!(duplicate = %what, "Category created concurrently, re-reading");
                self.repo
                    .find_child_by_name(parent_id, name)?
                    .map(Resolution::existing)
                    .ok_or(ImportError::Duplicate(what))
            }
            Err(e) => Err(e),
        }
    }

    fn unique_slug(&self, parent_id: Option<i64>, name: &str) -> Result<String> {
        let base = slugify(name);
        if !self.repo.slug_taken(parent_id, &base)? {
            return Ok(base);
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if !self.repo.slug_taken(parent_id, &candidate)? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::{required_text, slug};
use storefront_core::{CategoryId, DomainError, DomainResult, Entity, Ordering, ValidationErrors, nullable};

pub const SLUG_MAX: usize = 120;
pub const NAME_MAX: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "parent")]
    pub parent_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> CategoryId {
        self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDraft {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<CategoryId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub slug: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent: Option<Option<CategoryId>>,
}

impl Category {
    pub fn create(draft: CategoryDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let category = Self {
            id: CategoryId::new(),
            slug: draft.slug.trim().to_string(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            parent_id: draft.parent,
            created_at: now,
        };
        category.validate()?;
        Ok(category)
    }

    pub fn apply(&mut self, patch: CategoryPatch) -> DomainResult<()> {
        if let Some(s) = patch.slug {
            self.slug = s.trim().to_string();
        }
        if let Some(n) = patch.name {
            self.name = n.trim().to_string();
        }
        if let Some(d) = patch.description {
            self.description = d;
        }
        if let Some(p) = patch.parent {
            self.parent_id = p;
        }
        self.validate()
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        slug(&mut errors, "slug", &self.slug, SLUG_MAX);
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        errors.check(
            self.parent_id == Some(self.id),
            "parent",
            "A category cannot be its own parent.",
        );
        errors.into_result()
    }
}

/// Check that giving `id` the parent `new_parent` keeps the hierarchy a tree.
///
/// `categories` is the full set of existing categories.
pub fn ensure_no_cycle(
    categories: &[Category],
    id: CategoryId,
    new_parent: Option<CategoryId>,
) -> DomainResult<()> {
    let Some(parent) = new_parent else {
        return Ok(());
    };
    if parent == id {
        return Err(DomainError::field("parent", "A category cannot be its own parent."));
    }

    let parents: HashMap<CategoryId, Option<CategoryId>> =
        categories.iter().map(|c| (c.id, c.parent_id)).collect();
    if !parents.contains_key(&parent) {
        return Err(DomainError::field(
            "parent",
            format!("Invalid pk \"{parent}\" - object does not exist."),
        ));
    }

    let mut seen = HashSet::new();
    let mut cursor = Some(parent);
    while let Some(current) = cursor {
        if current == id {
            return Err(DomainError::field(
                "parent",
                "A category cannot be moved under one of its descendants.",
            ));
        }
        if !seen.insert(current) {
            break;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    Ok(())
}

/// Category with its subtree, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Nest every descendant of `root` under it, children sorted by name.
pub fn build_tree(all: &[Category], root: &Category) -> CategoryNode {
    let mut by_parent: HashMap<CategoryId, Vec<&Category>> = HashMap::new();
    for c in all {
        if let Some(parent) = c.parent_id {
            by_parent.entry(parent).or_default().push(c);
        }
    }
    for children in by_parent.values_mut() {
        children.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }

    let mut visited = HashSet::new();
    nest(root, &by_parent, &mut visited)
}

fn nest(
    category: &Category,
    by_parent: &HashMap<CategoryId, Vec<&Category>>,
    visited: &mut HashSet<CategoryId>,
) -> CategoryNode {
    visited.insert(category.id);
    let mut children = Vec::new();
    for child in by_parent.get(&category.id).into_iter().flatten() {
        if !visited.contains(&child.id) {
            children.push(nest(child, by_parent, visited));
        }
    }
    CategoryNode {
        category: category.clone(),
        children,
    }
}

/// All ids in the subtree rooted at `root`, including `root`.
pub fn subtree_ids(all: &[Category], root: CategoryId) -> Vec<CategoryId> {
    let mut out = vec![root];
    let mut i = 0;
    while i < out.len() {
        let current = out[i];
        let next: Vec<CategoryId> = all
            .iter()
            .filter(|c| c.parent_id == Some(current) && !out.contains(&c.id))
            .map(|c| c.id)
            .collect();
        out.extend(next);
        i += 1;
    }
    out
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CategorySort {
    Name,
    CreatedAt,
}

impl CategorySort {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "created_at" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    pub fn compare(ordering: &Ordering<Self>, a: &Category, b: &Category) -> core::cmp::Ordering {
        let ord = match ordering.field {
            Self::Name => a.name.cmp(&b.name),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        ordering.apply(ord)
    }
}

/// List filters for categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub parent: Option<CategoryId>,
    pub search: Option<String>,
}

impl CategoryFilter {
    pub fn matches(&self, c: &Category) -> bool {
        if self.parent.is_some() && c.parent_id != self.parent {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !c.name.to_lowercase().contains(&term) && !c.slug.to_lowercase().contains(&term) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<CategoryId>) -> Category {
        Category {
            id: CategoryId::new(),
            slug: name.to_lowercase(),
            name: name.to_string(),
            description: None,
            parent_id: parent,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_validates_slug_and_name() {
        let err = Category::create(
            CategoryDraft {
                slug: "Not A Slug".to_string(),
                name: String::new(),
                description: None,
                parent: None,
            },
            Utc::now(),
        )
        .unwrap_err();
        let DomainError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.get("slug").is_some());
        assert!(errors.get("name").is_some());
    }

    #[test]
    fn rejects_cycles_and_self_parent() {
        let root = category("Root", None);
        let child = category("Child", Some(root.id));
        let grandchild = category("Grandchild", Some(child.id));
        let all = vec![root.clone(), child.clone(), grandchild.clone()];

        assert!(ensure_no_cycle(&all, root.id, Some(root.id)).is_err());
        assert!(ensure_no_cycle(&all, root.id, Some(grandchild.id)).is_err());
        assert!(ensure_no_cycle(&all, grandchild.id, Some(root.id)).is_ok());
        assert!(ensure_no_cycle(&all, root.id, None).is_ok());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let root = category("Root", None);
        let err = ensure_no_cycle(&[root.clone()], root.id, Some(CategoryId::new())).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn tree_nests_children_sorted_by_name() {
        let root = category("Electronics", None);
        let phones = category("Phones", Some(root.id));
        let laptops = category("Laptops", Some(root.id));
        let android = category("Android", Some(phones.id));
        let all = vec![root.clone(), phones, laptops, android];

        let tree = build_tree(&all, &root);
        let names: Vec<_> = tree.children.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, ["Laptops", "Phones"]);
        assert_eq!(tree.children[1].children[0].category.name, "Android");

        assert_eq!(subtree_ids(&all, root.id).len(), 4);
    }

    #[test]
    fn tree_and_subtree_stop_at_cycles() {
        let mut a = category("A", None);
        let b = category("B", Some(a.id));
        a.parent_id = Some(b.id);
        let all = vec![a.clone(), b.clone()];

        let tree = build_tree(&all, &a);
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());

        let ids = subtree_ids(&all, a.id);
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn filter_by_parent_and_search() {
        let root = category("Electronics", None);
        let phones = category("Phones", Some(root.id));
        let by_parent = CategoryFilter {
            parent: Some(root.id),
            search: None,
        };
        assert!(by_parent.matches(&phones));
        assert!(!by_parent.matches(&root));

        let search = CategoryFilter {
            parent: None,
            search: Some("PHO".to_string()),
        };
        assert!(search.matches(&phones));
        assert!(!search.matches(&root));
    }
}

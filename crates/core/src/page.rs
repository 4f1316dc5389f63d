//! Pagination and ordering for list queries.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request from optional query values, clamping the size to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> DomainResult<Self> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(DomainError::field("page", "must be at least 1"));
        }
        let page_size = page_size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE);
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Slice an already filtered and ordered collection.
    pub fn paginate(items: Vec<T>, req: PageRequest) -> Self {
        let count = items.len() as u64;
        let results = items
            .into_iter()
            .skip(req.offset() as usize)
            .take(req.limit() as usize)
            .collect();
        Self {
            count,
            page: req.page,
            page_size: req.page_size,
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Parsed `ordering` query value: a field name with an optional `-` prefix
/// for descending order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ordering<F> {
    pub field: F,
    pub descending: bool,
}

impl<F: Copy> Ordering<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parse `raw` with `lookup` mapping names to fields; unknown names are a
    /// validation error on the `ordering` parameter.
    pub fn parse(raw: &str, lookup: impl Fn(&str) -> Option<F>) -> DomainResult<Self> {
        let raw = raw.trim();
        let (name, descending) = match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        let field = lookup(name)
            .ok_or_else(|| DomainError::field("ordering", format!("unknown ordering field '{name}'")))?;
        Ok(Self { field, descending })
    }

    /// Apply the direction to an ascending comparison.
    pub fn apply(&self, ord: core::cmp::Ordering) -> core::cmp::Ordering {
        if self.descending { ord.reverse() } else { ord }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Field {
        Name,
    }

    #[test]
    fn paginate_reports_total_count() {
        let req = PageRequest::new(Some(2), Some(2), DEFAULT_PAGE_SIZE).unwrap();
        let page = Page::paginate(vec![1, 2, 3, 4, 5], req);
        assert_eq!(page.count, 5);
        assert_eq!(page.results, vec![3, 4]);
    }

    #[test]
    fn page_size_is_clamped() {
        let req = PageRequest::new(None, Some(10_000), DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(req.page_size, MAX_PAGE_SIZE);
        assert!(PageRequest::new(Some(0), None, DEFAULT_PAGE_SIZE).is_err());
    }

    #[test]
    fn ordering_parses_direction() {
        let lookup = |s: &str| (s == "name").then_some(Field::Name);
        let o = Ordering::parse("-name", lookup).unwrap();
        assert_eq!(o, Ordering::desc(Field::Name));
        assert!(Ordering::parse("price", lookup).is_err());
    }
}

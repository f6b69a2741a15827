//! Page-number pagination for list endpoints.
//!
//! Pagination is opt-in: when neither `page` nor `page_size` is present the
//! caller gets the whole list. Otherwise results are wrapped in
//! `{count, page_count, next, previous, results}`.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;

/// Raw `?page=&page_size=` query parameters.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number or `last`.
    pub page: Option<String>,
    pub page_size: Option<String>,
}

/// Requested page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNumber {
    Number(u64),
    Last,
}

/// A validated pagination request, not yet resolved against a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: PageNumber,
    pub size: u64,
}

/// A page resolved against the total row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub size: u64,
    pub page_count: u64,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        ((self.number - 1) * self.size) as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

impl PageQuery {
    /// Resolve the query against configured defaults.
    ///
    /// Returns `Ok(None)` when the client did not ask for pagination. An
    /// unusable `page_size` falls back to the default; an unusable `page`
    /// is an error.
    pub fn resolve(
        &self,
        default_size: u64,
        max_size: u64,
    ) -> Result<Option<PageRequest>, AppError> {
        if self.page.is_none() && self.page_size.is_none() {
            return Ok(None);
        }

        let size = self
            .page_size
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(|s| s.min(max_size))
            .unwrap_or(default_size)
            .max(1);

        let number = match self.page.as_deref().map(str::trim) {
            None => PageNumber::Number(1),
            Some("last") => PageNumber::Last,
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n >= 1 => PageNumber::Number(n),
                _ => return Err(invalid_page()),
            },
        };

        Ok(Some(PageRequest { number, size }))
    }
}

impl PageRequest {
    /// Resolve against `count` rows. Page 1 of an empty list is valid.
    pub fn window(&self, count: u64) -> Result<PageWindow, AppError> {
        let page_count = count.div_ceil(self.size).max(1);
        let number = match self.number {
            PageNumber::Number(n) => n,
            PageNumber::Last => page_count,
        };
        if number > page_count {
            return Err(invalid_page());
        }
        Ok(PageWindow {
            number,
            size: self.size,
            page_count,
        })
    }
}

fn invalid_page() -> AppError {
    AppError::NotFound("Invalid page.".to_string())
}

/// One page of results plus navigation links.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub count: u64,
    pub page_count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page; `path` is the request path the links are relative to.
    pub fn new(window: &PageWindow, count: u64, results: Vec<T>, path: &str) -> Self {
        let link = |n: u64| format!("{}?page={}&page_size={}", path, n, window.size);
        Self {
            count,
            page_count: window.page_count,
            next: (window.number < window.page_count).then(|| link(window.number + 1)),
            previous: (window.number > 1).then(|| link(window.number - 1)),
            results,
        }
    }
}

/// Either the full list or a single page, serialized untagged.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum Listing<T> {
    Full(Vec<T>),
    Paged(Page<T>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, page_size: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(str::to_string),
            page_size: page_size.map(str::to_string),
        }
    }

    #[test]
    fn test_no_params_means_unpaginated() {
        assert_eq!(query(None, None).resolve(10, 100).unwrap(), None);
    }

    #[test]
    fn test_page_size_defaults_and_caps() {
        let req = query(Some("2"), None).resolve(10, 100).unwrap().unwrap();
        assert_eq!(req.size, 10);
        assert_eq!(req.number, PageNumber::Number(2));

        let req = query(None, Some("500")).resolve(10, 100).unwrap().unwrap();
        assert_eq!(req.size, 100);
        assert_eq!(req.number, PageNumber::Number(1));

        let req = query(None, Some("abc")).resolve(10, 100).unwrap().unwrap();
        assert_eq!(req.size, 10);
    }

    #[test]
    fn test_bad_page_rejected() {
        assert!(query(Some("0"), None).resolve(10, 100).is_err());
        assert!(query(Some("x"), None).resolve(10, 100).is_err());
    }

    #[test]
    fn test_window_bounds() {
        let req = PageRequest {
            number: PageNumber::Number(3),
            size: 10,
        };
        let window = req.window(25).unwrap();
        assert_eq!(window.page_count, 3);
        assert_eq!(window.offset(), 20);
        assert_eq!(window.limit(), 10);
        assert!(req.window(20).is_err());
    }

    #[test]
    fn test_empty_list_has_one_page() {
        let req = PageRequest {
            number: PageNumber::Number(1),
            size: 10,
        };
        let window = req.window(0).unwrap();
        assert_eq!(window.page_count, 1);
        assert_eq!(window.offset(), 0);
    }

    #[test]
    fn test_last_page_resolves() {
        let req = query(Some("last"), Some("4")).resolve(10, 100).unwrap().unwrap();
        let window = req.window(9).unwrap();
        assert_eq!(window.number, 3);
        assert_eq!(window.offset(), 8);
    }

    #[test]
    fn test_page_links() {
        let window = PageWindow {
            number: 2,
            size: 5,
            page_count: 3,
        };
        let page = Page::new(&window, 12, vec![1, 2, 3, 4, 5], "/api/v1/x/");
        assert_eq!(page.next.as_deref(), Some("/api/v1/x/?page=3&page_size=5"));
        assert_eq!(page.previous.as_deref(), Some("/api/v1/x/?page=1&page_size=5"));

        let first = PageWindow {
            number: 1,
            size: 5,
            page_count: 1,
        };
        let page = Page::new(&first, 2, vec![1, 2], "/p/");
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }
}

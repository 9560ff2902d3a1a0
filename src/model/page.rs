//! Page and cursor parameters

use serde::{Deserialize, Serialize};

use crate::errors::{ExploreError, ExploreResult};

/// Default number of hits per page
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Scan direction of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDirection {
    After,
    Before,
}

/// Paging parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default)]
    pub from: usize,
    /// Comma-separated sort tokens
    #[serde(default)]
    pub sort: Option<String>,
    /// Comma-separated sort values of the last row already seen
    #[serde(default)]
    pub after: Option<String>,
    /// Comma-separated sort values of the first row already seen
    #[serde(default)]
    pub before: Option<String>,
}

fn default_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for Page {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SIZE,
            from: 0,
            sort: None,
            after: None,
            before: None,
        }
    }
}

impl Page {
    pub fn new(size: usize, from: usize) -> Self {
        Self {
            size,
            from,
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }

    pub fn with_before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    /// Returns the active cursor, if any, after checking companion rules.
    pub fn cursor(&self) -> ExploreResult<Option<(CursorDirection, &str)>> {
        let cursor = match (&self.after, &self.before) {
            (Some(_), Some(_)) => {
                return Err(ExploreError::bad_request(
                    "'after' and 'before' cannot be used together",
                ))
            }
            (Some(after), None) => (CursorDirection::After, after.as_str()),
            (None, Some(before)) => (CursorDirection::Before, before.as_str()),
            (None, None) => return Ok(None),
        };

        if self.sort.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(ExploreError::bad_request(
                "'sort' must be specified when 'after' or 'before' is used",
            ));
        }
        if self.from > 0 {
            return Err(ExploreError::bad_request(
                "'from' must be 0 when 'after' or 'before' is used",
            ));
        }
        Ok(Some(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExploreErrorCode;

    #[test]
    fn test_default_page() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page.size, DEFAULT_PAGE_SIZE);
        assert_eq!(page.from, 0);
        assert_eq!(page.cursor().unwrap(), None);
    }

    #[test]
    fn test_cursor_requires_sort() {
        let page = Page::default().with_after("10,5");
        let err = page.cursor().unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::BadRequest);
    }

    #[test]
    fn test_after_and_before_conflict() {
        let page = Page::default()
            .with_sort("-count,id")
            .with_after("1,a")
            .with_before("2,b");
        assert_eq!(page.cursor().unwrap_err().code(), ExploreErrorCode::BadRequest);
    }

    #[test]
    fn test_cursor_with_offset_rejected() {
        let page = Page::new(10, 20).with_sort("id").with_after("a");
        assert_eq!(page.cursor().unwrap_err().code(), ExploreErrorCode::BadRequest);
    }

    #[test]
    fn test_before_cursor() {
        let page = Page::default().with_sort("-count,id").with_before("10,5");
        assert_eq!(
            page.cursor().unwrap(),
            Some((CursorDirection::Before, "10,5"))
        );
    }
}

use serde::{Deserialize, Serialize};

pub(crate) const fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub(crate) struct SkipLimit {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaginatedResponse<T> {
    pub(crate) items: Vec<T>,
    pub(crate) total_count: i64,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

/// Page-numbered slice used by the dashboards.
#[derive(Debug, Serialize)]
pub(crate) struct Page<T> {
    pub(crate) items: Vec<T>,
    pub(crate) page: i64,
    pub(crate) page_size: i64,
    pub(crate) total_count: i64,
    pub(crate) total_pages: i64,
}

/// Normalizes a 1-based page request into `(page, page_size, offset)`.
pub(crate) fn page_window(page: Option<i64>, page_size: Option<i64>, default_size: i64) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(default_size).clamp(1, 100);
    (page, page_size, (page - 1) * page_size)
}

pub(crate) fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if total_count <= 0 {
        1
    } else {
        (total_count + page_size - 1) / page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_window_clamps_inputs() {
        assert_eq!(page_window(None, None, 10), (1, 10, 0));
        assert_eq!(page_window(Some(3), Some(5), 10), (3, 5, 10));
        assert_eq!(page_window(Some(0), Some(1000), 10), (1, 100, 0));
    }

    #[test]
    fn total_pages_rounds_up_and_never_zero() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }
}

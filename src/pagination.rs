//! Pagination math and the list response envelope.
//!
//! The engine is a pure function over `(current, pageSize, total)`. It does
//! not clamp `current` below 1; callers validate that upstream. The
//! envelope echoes the caller's raw inputs, not the effective values.

use serde::Serialize;

/// Fallback page size when the caller supplies none or a non-positive one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Computed window for one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Number of records to skip. Negative when `current < 1`; see module docs.
    pub offset: i64,
    /// Limit actually applied to the fetch.
    pub effective_limit: i64,
    /// Total pages for the filtered set.
    pub total_pages: i64,
}

/// Compute the page window for a listing.
pub fn paginate(current: i64, page_size: i64, total_items: i64) -> PageWindow {
    let effective_limit = if page_size >= 1 {
        page_size
    } else {
        DEFAULT_PAGE_SIZE
    };

    // Saturate instead of overflowing: any such page is past the end
    // anyway, and `current` is client-controlled.
    let offset = current.saturating_sub(1).saturating_mul(effective_limit);

    let total_pages = if total_items <= 0 {
        0
    } else {
        (total_items + effective_limit - 1) / effective_limit
    };

    PageWindow {
        offset,
        effective_limit,
        total_pages,
    }
}

/// Listing metadata, echoing raw caller inputs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageMeta {
    pub current: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    pub pages: i64,
    pub total: i64,
}

/// Response envelope for every list operation.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub meta: PageMeta,
    pub result: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(current: i64, page_size: i64, pages: i64, total: i64, result: Vec<T>) -> Self {
        Self {
            meta: PageMeta {
                current,
                page_size,
                pages,
                total,
            },
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_example() {
        // current=2, pageSize=10, totalItems=25 -> offset=10, totalPages=3
        let window = paginate(2, 10, 25);
        assert_eq!(window.offset, 10);
        assert_eq!(window.effective_limit, 10);
        assert_eq!(window.total_pages, 3);
    }

    #[test]
    fn non_positive_page_size_falls_back_to_default() {
        assert_eq!(paginate(1, 0, 100).effective_limit, DEFAULT_PAGE_SIZE);
        assert_eq!(paginate(1, -5, 100).effective_limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn zero_total_yields_zero_pages() {
        assert_eq!(paginate(1, 10, 0).total_pages, 0);
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        assert_eq!(paginate(1, 10, 30).total_pages, 3);
        assert_eq!(paginate(1, 10, 31).total_pages, 4);
    }

    #[test]
    fn current_below_one_is_not_clamped() {
        // Input validation is the caller's concern; the math stays honest.
        assert_eq!(paginate(0, 10, 25).offset, -10);
        assert_eq!(paginate(-1, 10, 25).offset, -20);
    }

    #[test]
    fn huge_current_saturates_instead_of_overflowing() {
        let window = paginate(i64::MAX, 10, 25);
        assert_eq!(window.offset, i64::MAX);
        assert_eq!(window.total_pages, 3);

        let window = paginate(i64::MAX, i64::MAX, 25);
        assert_eq!(window.offset, i64::MAX);
    }

    #[test]
    fn envelope_echoes_raw_inputs() {
        // pageSize=0 falls back to 10 for the fetch, but the meta echoes 0.
        let window = paginate(3, 0, 25);
        let page: Paginated<i64> = Paginated::new(3, 0, window.total_pages, 25, vec![]);
        assert_eq!(page.meta.current, 3);
        assert_eq!(page.meta.page_size, 0);
        assert_eq!(page.meta.pages, 3);
        assert_eq!(page.meta.total, 25);
    }

    #[test]
    fn envelope_serializes_with_camel_case_page_size() {
        let page: Paginated<i64> = Paginated::new(1, 10, 1, 2, vec![1, 2]);
        let json = serde_json::to_value(&page).expect("should serialize");
        assert_eq!(json["meta"]["pageSize"], 10);
        assert_eq!(json["result"], serde_json::json!([1, 2]));
    }
}

/// Limit/offset/page arithmetic for listing endpoints

use serde::Serialize;

use super::query::QueryParams;
use crate::utils::constants::{DEFAULT_LIMIT, DEFAULT_MAX_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

/// Raw pagination parameters as the client sent them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
}

impl PageRequest {
    /// Unparsable numbers are treated as if they were not sent
    pub fn from_params(params: &QueryParams) -> Self {
        let number = |key: &str| params.get(key).and_then(|v| v.trim().parse::<i64>().ok());
        Self {
            limit: number("limit"),
            offset: number("offset"),
            page: number("page"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    #[serde(skip)]
    pub limit: i64,
    #[serde(skip)]
    pub offset: i64,
    pub count: i64,
    pub remaining: i64,
    pub page: i64,
    pub total_pages: i64,
}

/// Resolve the window to fetch given the number of matching rows.
///
/// A non-zero `page` overrides `offset` and is computed from the limit the
/// client asked for, before clamping. An offset past the end snaps back to the
/// last full window. `total_pages` is `count / limit - 1`, floored at 1.
pub fn paginate(req: &PageRequest, count: u64, limits: &PageLimits) -> Page {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    let requested = req.limit.unwrap_or(limits.default_limit);

    let mut offset = req.offset.unwrap_or(0);
    if let Some(page) = req.page.filter(|p| *p != 0) {
        offset = requested.saturating_mul(page.saturating_sub(1));
    }
    if offset < 0 {
        offset = 0;
    }

    let limit = if requested <= 0 {
        limits.default_limit
    } else if requested > limits.max_limit {
        limits.max_limit
    } else {
        requested
    }
    .max(1);

    if offset >= count {
        offset = (count - limit).max(0);
    }

    let page = (offset / limit + 1).max(1);
    let total_pages = (count / limit - 1).max(1);

    Page {
        limit,
        offset,
        count,
        remaining: count - offset,
        page,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(limit: Option<i64>, offset: Option<i64>, page: Option<i64>) -> PageRequest {
        PageRequest { limit, offset, page }
    }

    #[test]
    fn test_offset_past_end_snaps_back() {
        let page = paginate(&req(Some(50), Some(120), None), 95, &PageLimits::default());
        assert_eq!(page.offset, 45);
        assert_eq!(page.remaining, 50);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.count, 95);
    }

    #[test]
    fn test_page_overrides_offset() {
        let page = paginate(&req(Some(10), Some(3), Some(3)), 200, &PageLimits::default());
        assert_eq!(page.offset, 20);
        assert_eq!(page.page, 3);
        assert_eq!(page.remaining, 180);
        assert_eq!(page.total_pages, 19);
    }

    #[test]
    fn test_page_zero_is_ignored() {
        let page = paginate(&req(Some(10), Some(30), Some(0)), 200, &PageLimits::default());
        assert_eq!(page.offset, 30);
        assert_eq!(page.page, 4);
    }

    #[test]
    fn test_limit_clamping() {
        let limits = PageLimits {
            default_limit: 50,
            max_limit: 100,
        };
        assert_eq!(paginate(&req(Some(0), None, None), 500, &limits).limit, 50);
        assert_eq!(paginate(&req(Some(-4), None, None), 500, &limits).limit, 50);
        assert_eq!(paginate(&req(Some(5000), None, None), 500, &limits).limit, 100);
        assert_eq!(paginate(&req(None, None, None), 500, &limits).limit, 50);
    }

    #[test]
    fn test_page_offset_uses_unclamped_limit() {
        let limits = PageLimits {
            default_limit: 50,
            max_limit: 100,
        };
        let page = paginate(&req(Some(500), None, Some(2)), 10_000, &limits);
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset, 500);
        assert_eq!(page.page, 6);
    }

    #[test]
    fn test_negative_offset_and_empty_result() {
        let page = paginate(&req(None, Some(-10), None), 0, &PageLimits::default());
        assert_eq!(page.offset, 0);
        assert_eq!(page.remaining, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_extreme_page_and_limit_do_not_overflow() {
        let page = paginate(&req(None, None, Some(i64::MIN)), 10, &PageLimits::default());
        assert_eq!(page.offset, 0);
        assert_eq!(page.remaining, 10);
        assert_eq!(page.page, 1);

        let page = paginate(&req(Some(i64::MIN), None, None), 10, &PageLimits::default());
        assert_eq!(page.limit, DEFAULT_LIMIT);
        assert_eq!(page.offset, 0);

        let page = paginate(&req(Some(i64::MIN), Some(i64::MIN), Some(i64::MIN)), 10, &PageLimits::default());
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, DEFAULT_LIMIT);

        let params: QueryParams = vec![("page", "-9223372036854775808")].into_iter().collect();
        let page = paginate(&PageRequest::from_params(&params), 10, &PageLimits::default());
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn test_from_params_ignores_garbage() {
        let params: QueryParams = vec![("limit", "ten"), ("offset", "5"), ("page", "")]
            .into_iter()
            .collect();
        assert_eq!(PageRequest::from_params(&params), req(None, Some(5), None));
    }
}

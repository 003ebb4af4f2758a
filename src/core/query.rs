/// Query-string filter compilation
///
/// Every non-reserved query parameter becomes one `Filter`; filters are
/// ANDed in arrival order. Key and value grammar:
///
/// | key / value        | filter                              |
/// |--------------------|-------------------------------------|
/// | `a.b=v`            | `doc[a][b] == v`                    |
/// | `a__lt=v`          | `doc[a] <= v`                       |
/// | `a__gt=v`          | `doc[a] >= v`                       |
/// | `a=*v*`            | `doc[a]` contains `v`               |
/// | `a=*v`             | `doc[a]` ends with `v`              |
/// | `a=v*`             | `doc[a]` starts with `v`            |
/// | `a=v`              | `doc[a] == v`                       |
///
/// Filters only ever match string values.

use serde_json::Value;
use std::fmt;

use super::error::StoreError;
use super::pagination::{paginate, Page, PageLimits, PageRequest};
use super::store::{Document, DocumentStore};

/// Parameters that control paging and ordering rather than filtering
pub const RESERVED_KEYS: [&str; 5] = ["limit", "offset", "page", "order", "order_dir"];

pub const DEFAULT_ORDER: &str = "last_attempt";

/// Flat query-string pairs in arrival order. A repeated key keeps its first value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.pairs.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.pairs.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pairs that are not paging/ordering controls
    pub fn filter_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(k, _)| !RESERVED_KEYS.contains(k))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

/// A top-level field, optionally with one level of nesting (`status.code`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub field: String,
    pub sub_field: Option<String>,
}

impl FieldPath {
    pub fn top(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sub_field: None,
        }
    }

    pub fn nested(field: impl Into<String>, sub_field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sub_field: Some(sub_field.into()),
        }
    }

    pub fn resolve<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let top = doc.get(&self.field)?;
        match &self.sub_field {
            Some(sub) => top.as_object()?.get(sub),
            None => Some(top),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_field {
            Some(sub) => write!(f, "{}.{}", self.field, sub),
            None => write!(f, "{}", self.field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    /// `<=` despite the `__lt` spelling
    Lte,
    /// `>=` despite the `__gt` spelling
    Gte,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub path: FieldPath,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    /// Compile one query-string pair. Never fails; unknown shapes are equality.
    pub fn parse(key: &str, value: &str) -> Self {
        if let Some((field, sub_field)) = key.split_once('.') {
            return Self {
                path: FieldPath::nested(field, sub_field),
                op: FilterOp::Eq,
                value: value.to_string(),
            };
        }

        if let Some(field) = key.strip_suffix("__lt") {
            return Self {
                path: FieldPath::top(field),
                op: FilterOp::Lte,
                value: value.to_string(),
            };
        }

        if let Some(field) = key.strip_suffix("__gt") {
            return Self {
                path: FieldPath::top(field),
                op: FilterOp::Gte,
                value: value.to_string(),
            };
        }

        let path = FieldPath::top(key);
        let (op, anchor) = match (value.strip_prefix('*'), value.strip_suffix('*')) {
            (Some(rest), Some(_)) => (FilterOp::Contains, rest.strip_suffix('*').unwrap_or(rest)),
            (Some(rest), None) => (FilterOp::EndsWith, rest),
            (None, Some(rest)) => (FilterOp::StartsWith, rest),
            (None, None) => (FilterOp::Eq, value),
        };

        Self {
            path,
            op,
            value: anchor.to_string(),
        }
    }

    /// Evaluate against a stored document
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(Value::String(stored)) = self.path.resolve(doc) else {
            return false;
        };
        let stored = stored.as_str();
        let value = self.value.as_str();

        match self.op {
            FilterOp::Eq => stored == value,
            FilterOp::Lte => stored <= value,
            FilterOp::Gte => stored >= value,
            FilterOp::Contains => stored.contains(value),
            FilterOp::StartsWith => stored.starts_with(value),
            FilterOp::EndsWith => stored.ends_with(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `asc` (any case) is ascending; anything else is descending
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl Default for OrderBy {
    fn default() -> Self {
        Self {
            field: DEFAULT_ORDER.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

impl OrderBy {
    pub fn from_params(params: &QueryParams) -> Self {
        Self {
            field: params
                .get("order")
                .map(|o| o.trim().to_lowercase())
                .filter(|o| !o.is_empty())
                .unwrap_or_else(|| DEFAULT_ORDER.to_string()),
            direction: params
                .get("order_dir")
                .map(SortDirection::parse)
                .unwrap_or(SortDirection::Desc),
        }
    }
}

/// Everything a store needs to run a read: filter, sort, then window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub filters: Vec<Filter>,
    pub order: OrderBy,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl QueryPlan {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            order: OrderBy::default(),
            skip: 0,
            limit: None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

pub fn compile_filters(params: &QueryParams) -> Vec<Filter> {
    params
        .filter_pairs()
        .map(|(key, value)| Filter::parse(key, value))
        .collect()
}

/// One page of documents plus the numbers needed to fetch the next
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub page: Page,
    pub result: Vec<Document>,
}

/// Count, paginate, then fetch a window of `table` matching `params`
pub async fn list_documents(
    store: &dyn DocumentStore,
    table: &str,
    params: &QueryParams,
    limits: &PageLimits,
) -> Result<Listing, StoreError> {
    let filters = compile_filters(params);
    let count = store.count(table, &filters).await?;
    let page = paginate(&PageRequest::from_params(params), count, limits);

    tracing::debug!(
        "Listing {} with {} filter(s): count={} offset={} limit={}",
        table,
        filters.len(),
        count,
        page.offset,
        page.limit
    );

    let plan = QueryPlan {
        filters,
        order: OrderBy::from_params(params),
        skip: u64::try_from(page.offset).unwrap_or(0),
        limit: u64::try_from(page.limit).ok(),
    };
    let result = store.query(table, &plan).await?;

    Ok(Listing { page, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::memory::MemoryStore;
    use crate::core::store::TableSpec;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_nested_key_is_equality_on_sub_field() {
        let filter = Filter::parse("status.code", "bounced");
        assert_eq!(filter.path, FieldPath::nested("status", "code"));
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, "bounced");
        assert_eq!(filter.path.to_string(), "status.code");
    }

    #[test]
    fn test_nested_key_splits_at_first_dot() {
        let filter = Filter::parse("relay.host.name", "x");
        assert_eq!(filter.path, FieldPath::nested("relay", "host.name"));
    }

    #[test]
    fn test_inequality_suffixes() {
        let lt = Filter::parse("timestamp__lt", "2019-09-17");
        assert_eq!(lt.path, FieldPath::top("timestamp"));
        assert_eq!(lt.op, FilterOp::Lte);

        let gt = Filter::parse("timestamp__gt", "2019-09-10");
        assert_eq!(gt.op, FilterOp::Gte);
        assert_eq!(gt.value, "2019-09-10");
    }

    #[test]
    fn test_wildcards() {
        let suffix = Filter::parse("mail_to", "*acme.com");
        assert_eq!(suffix.op, FilterOp::EndsWith);
        assert_eq!(suffix.value, "acme.com");

        let prefix = Filter::parse("mail_to", "john*");
        assert_eq!(prefix.op, FilterOp::StartsWith);
        assert_eq!(prefix.value, "john");

        let contains = Filter::parse("mail_to", "*acme*");
        assert_eq!(contains.op, FilterOp::Contains);
        assert_eq!(contains.value, "acme");

        let lone = Filter::parse("mail_to", "*");
        assert_eq!(lone.op, FilterOp::Contains);
        assert_eq!(lone.value, "");
    }

    #[test]
    fn test_dotted_key_wins_over_suffix_and_wildcard() {
        let filter = Filter::parse("status.code__lt", "*x");
        assert_eq!(filter.path, FieldPath::nested("status", "code__lt"));
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, "*x");
    }

    #[test]
    fn test_matches_strings_only() {
        let record = doc(json!({
            "id": "E553EBD87B",
            "mail_to": "b@acme.com",
            "timestamp": "2019-09-16T06:25:01Z",
            "status": {"code": "bounced", "message": ""},
            "size": 10
        }));

        assert!(Filter::parse("status.code", "bounced").matches(&record));
        assert!(Filter::parse("mail_to", "*acme.com").matches(&record));
        assert!(Filter::parse("timestamp__lt", "2019-09-17").matches(&record));
        assert!(!Filter::parse("timestamp__gt", "2019-09-17").matches(&record));
        assert!(!Filter::parse("size", "10").matches(&record));
        assert!(!Filter::parse("status", "bounced").matches(&record));
        assert!(!Filter::parse("missing", "*").matches(&record));
    }

    #[test]
    fn test_compile_skips_reserved_and_keeps_arrival_order() {
        let params: QueryParams = vec![
            ("limit", "10"),
            ("mail_to", "*acme.com"),
            ("order", "Timestamp"),
            ("status.code", "sent"),
            ("mail_to", "ignored"),
        ]
        .into_iter()
        .collect();

        let filters = compile_filters(&params);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].path.field, "mail_to");
        assert_eq!(filters[0].value, "acme.com");
        assert_eq!(filters[1].path, FieldPath::nested("status", "code"));

        let order = OrderBy::from_params(&params);
        assert_eq!(order.field, "timestamp");
        assert_eq!(order.direction, SortDirection::Desc);
    }

    #[test]
    fn test_order_defaults() {
        let order = OrderBy::from_params(&QueryParams::new());
        assert_eq!(order, OrderBy::default());
        assert_eq!(order.field, "last_attempt");
        assert_eq!(SortDirection::parse("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Desc);
    }

    #[tokio::test]
    async fn test_list_documents_pages_through_store() {
        let store = MemoryStore::new();
        store
            .ensure_table(&TableSpec::new("sent_mail", &["mail_to"]))
            .await
            .unwrap();

        for i in 0..7 {
            let to = if i % 2 == 0 { "x@acme.com" } else { "x@other.com" };
            store
                .insert(
                    "sent_mail",
                    doc(json!({
                        "id": format!("AAAAAAAAA{}", i),
                        "mail_to": to,
                        "last_attempt": format!("2019-09-17T06:2{}:00Z", i),
                    })),
                )
                .await
                .unwrap();
        }

        let params: QueryParams = vec![("mail_to", "*acme.com"), ("limit", "2"), ("page", "2")]
            .into_iter()
            .collect();
        let listing = list_documents(&store, "sent_mail", &params, &PageLimits::default())
            .await
            .unwrap();

        assert_eq!(listing.page.count, 4);
        assert_eq!(listing.page.offset, 2);
        assert_eq!(listing.page.remaining, 2);
        let ids: Vec<_> = listing
            .result
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        // last_attempt desc: 6, 4, 2, 0 -> second page is 2, 0
        assert_eq!(ids, vec!["AAAAAAAAA2", "AAAAAAAAA0"]);
    }
}

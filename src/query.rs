//! List query parameters and the SQL they turn into.
//!
//! Parsing is deliberately forgiving: a bad `page` or an unknown
//! `date_filter` never fails a request, it just falls back to the default.
//! [`ListParams::resolve`] pins the relative date window to a concrete
//! instant, and [`VideoFilter::build_sql`] renders the count and data
//! statements from that one filter so `total` and the page always agree.

use std::cmp::Ordering;

use chrono::{DateTime, Days, Months, Utc};
use rusqlite::types::Value;

use crate::video::Video;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PER_PAGE: u64 = 10;

/// Columns selected by every video query, in `row_to_video` order.
pub const VIDEO_COLUMNS: &str =
    "id, title, cover_url, length, author_json, stats_json, created_at";

const LIKES_EXPR: &str = "CASE WHEN json_type(stats_json, '$.likes') IN ('integer', 'real') \
     THEN json_extract(stats_json, '$.likes') ELSE 0 END";

/// Relative creation-time window selected by `date_filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateWindow {
    #[default]
    Any,
    Today,
    Week,
    Month,
}

impl DateWindow {
    /// Unknown labels (and `""`/`"all"`) mean no window.
    pub fn from_label(label: &str) -> Self {
        match label {
            "today" => Self::Today,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::Any,
        }
    }

    /// Exclusive lower bound for `createdAt`, relative to `now`.
    pub fn lower_bound(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Any => None,
            Self::Today => now.checked_sub_days(Days::new(1)),
            Self::Week => now.checked_sub_days(Days::new(7)),
            Self::Month => now.checked_sub_months(Months::new(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Newest `createdAt` first.
    #[default]
    Recent,
    /// Highest `stats.likes` first.
    Likes,
}

impl SortOrder {
    pub fn from_label(label: &str) -> Self {
        if label == "likes" {
            Self::Likes
        } else {
            Self::Recent
        }
    }
}

/// Normalized `GET /api/videos` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub query: String,
    pub date_window: DateWindow,
    pub sort: SortOrder,
    pub page: u64,
    pub per_page: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            date_window: DateWindow::Any,
            sort: SortOrder::Recent,
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListParams {
    /// Builds parameters from decoded query-string pairs. The first
    /// occurrence of a repeated key wins.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut query = None;
        let mut date_filter = None;
        let mut sort_by = None;
        let mut page = None;
        let mut per_page = None;

        for (key, value) in pairs {
            let slot = match key {
                "query" => &mut query,
                "date_filter" => &mut date_filter,
                "sort_by" => &mut sort_by,
                "page" => &mut page,
                "per_page" => &mut per_page,
                _ => continue,
            };
            slot.get_or_insert(value);
        }

        Self {
            query: query.unwrap_or_default().to_owned(),
            date_window: DateWindow::from_label(date_filter.unwrap_or_default()),
            sort: SortOrder::from_label(sort_by.unwrap_or_default()),
            page: positive_or(page, DEFAULT_PAGE),
            per_page: positive_or(per_page, DEFAULT_PER_PAGE),
        }
    }

    /// Pins the date window to `now`. Call once per request.
    pub fn resolve(&self, now: DateTime<Utc>) -> VideoFilter {
        VideoFilter {
            title: (!self.query.is_empty()).then(|| self.query.clone()),
            created_after: self.date_window.lower_bound(now),
            sort: self.sort,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value >= 1)
        .unwrap_or(default)
}

/// Fully resolved list filter handed to a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFilter {
    pub title: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub sort: SortOrder,
    pub page: u64,
    pub per_page: u64,
}

impl Default for VideoFilter {
    fn default() -> Self {
        ListParams::default().resolve(Utc::now())
    }
}

impl VideoFilter {
    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }

    /// In-process equivalent of the SQL WHERE clause.
    pub fn matches(&self, video: &Video) -> bool {
        if let Some(title) = &self.title {
            let haystack = video.title.to_ascii_lowercase();
            if !haystack.contains(&title.to_ascii_lowercase()) {
                return false;
            }
        }
        match self.created_after {
            Some(limit) => {
                let limit = limit.timestamp_millis();
                video.created_millis().is_some_and(|created| created > limit)
            }
            None => true,
        }
    }

    /// In-process equivalent of the SQL ORDER BY clause.
    pub fn compare(&self, a: &Video, b: &Video) -> Ordering {
        let primary = match self.sort {
            SortOrder::Likes => b.likes().total_cmp(&a.likes()),
            SortOrder::Recent => match (a.created_millis(), b.created_millis()) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Renders the count and page statements against the `videos` table.
    pub fn build_sql(&self) -> BuiltQuery {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(title) = &self.title {
            clauses.push("title LIKE ? ESCAPE '\\'");
            params.push(Value::Text(format!("%{}%", escape_like(title))));
        }
        if let Some(limit) = self.created_after {
            clauses.push("created_ts > ?");
            params.push(Value::Integer(limit.timestamp_millis()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let order_sql = match self.sort {
            SortOrder::Likes => format!("{LIKES_EXPR} DESC, id ASC"),
            // NULL created_ts (unparseable createdAt) sorts last under DESC.
            SortOrder::Recent => "created_ts DESC, id ASC".to_owned(),
        };

        BuiltQuery {
            count_sql: format!("SELECT COUNT(*) FROM videos{where_sql}"),
            data_sql: format!(
                "SELECT {VIDEO_COLUMNS} FROM videos{where_sql} \
                 ORDER BY {order_sql} LIMIT ? OFFSET ?"
            ),
            params,
            limit: clamp_i64(self.limit()),
            offset: clamp_i64(self.offset()),
        }
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Count and data statements sharing one WHERE clause.
///
/// `params` binds the WHERE placeholders of both statements; the data
/// statement additionally takes `limit` and `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub count_sql: String,
    pub data_sql: String,
    pub params: Vec<Value>,
    pub limit: i64,
    pub offset: i64,
}

impl BuiltQuery {
    pub fn data_params(&self) -> Vec<Value> {
        let mut params = self.params.clone();
        params.push(Value::Integer(self.limit));
        params.push(Value::Integer(self.offset));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(query: &str) -> ListParams {
        let pairs: Vec<(&str, &str)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .collect();
        ListParams::from_pairs(pairs)
    }

    #[test]
    fn missing_params_use_defaults() {
        assert_eq!(parse(""), ListParams::default());
    }

    #[test]
    fn malformed_pagination_falls_back_to_defaults() {
        for raw in ["abc", "0", "-3", "1.5", "", "18446744073709551616"] {
            let params = parse(&format!("page={raw}&per_page={raw}"));
            assert_eq!(params.page, 1, "page={raw}");
            assert_eq!(params.per_page, 10, "per_page={raw}");
        }
        let params = parse("page=3&per_page=25");
        assert_eq!((params.page, params.per_page), (3, 25));
    }

    #[test]
    fn large_pages_are_kept() {
        let params = parse("page=99999999999&per_page=2");
        assert_eq!((params.page, params.per_page), (99_999_999_999, 2));

        let filter = parse("page=5000000000&per_page=2").resolve(Utc::now());
        assert_eq!(filter.page, 5_000_000_000);
        assert_eq!(filter.offset(), 9_999_999_998);
        assert_eq!(filter.build_sql().offset, 9_999_999_998);
    }

    #[test]
    fn first_occurrence_wins() {
        let params = parse("page=2&page=5&query=cat&query=dog");
        assert_eq!(params.page, 2);
        assert_eq!(params.query, "cat");
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let params = parse("date_filter=decade&sort_by=views");
        assert_eq!(params.date_window, DateWindow::Any);
        assert_eq!(params.sort, SortOrder::Recent);
        assert_eq!(parse("date_filter=all").date_window, DateWindow::Any);
        assert_eq!(parse("date_filter=week").date_window, DateWindow::Week);
        assert_eq!(parse("sort_by=likes").sort, SortOrder::Likes);
    }

    #[test]
    fn date_windows_resolve_against_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(DateWindow::Any.lower_bound(now), None);
        assert_eq!(
            DateWindow::Today.lower_bound(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap())
        );
        assert_eq!(
            DateWindow::Week.lower_bound(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 24, 12, 0, 0).unwrap())
        );
        // Month arithmetic clamps to the end of the shorter month.
        assert_eq!(
            DateWindow::Month.lower_bound(now),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn offset_follows_page_and_size() {
        let filter = parse("page=4&per_page=15").resolve(Utc::now());
        assert_eq!(filter.offset(), 45);
        assert_eq!(filter.limit(), 15);

        let huge = VideoFilter {
            page: u64::MAX,
            per_page: u64::MAX,
            ..VideoFilter::default()
        };
        assert_eq!(huge.offset(), u64::MAX);
        let built = huge.build_sql();
        assert_eq!((built.limit, built.offset), (i64::MAX, i64::MAX));
    }

    #[test]
    fn count_and_data_share_the_where_clause() {
        let built = parse("query=cat&date_filter=week&sort_by=likes")
            .resolve(Utc::now())
            .build_sql();
        let where_of = |sql: &str| {
            let start = sql.find(" WHERE ").unwrap();
            let end = sql.find(" ORDER BY ").unwrap_or(sql.len());
            sql[start..end].to_owned()
        };
        assert_eq!(where_of(&built.count_sql), where_of(&built.data_sql));
        assert_eq!(built.params.len(), 2);
        assert_eq!(built.data_params().len(), 4);
        assert!(built.data_sql.contains("json_extract(stats_json, '$.likes')"));
    }

    #[test]
    fn date_window_binds_epoch_millis() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let built = parse("date_filter=today").resolve(now).build_sql();
        assert!(built.count_sql.ends_with("WHERE created_ts > ?"));
        let bound = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();
        assert_eq!(built.params, vec![Value::Integer(bound.timestamp_millis())]);
    }

    #[test]
    fn empty_filter_has_no_where_clause() {
        let built = ListParams::default().resolve(Utc::now()).build_sql();
        assert_eq!(built.count_sql, "SELECT COUNT(*) FROM videos");
        assert!(!built.data_sql.contains("WHERE"));
        assert!(built.data_sql.contains("ORDER BY created_ts DESC, id ASC"));
        assert!(built.params.is_empty());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        let built = parse("query=100%").resolve(Utc::now()).build_sql();
        assert_eq!(built.params, vec![Value::Text("%100\\%%".into())]);
    }
}

//! Video records as they are stored and exposed over the API.
//!
//! `author` and `stats` are kept as raw JSON documents. The service never
//! looks inside them except to pull `stats.likes` out for sorting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A stored video, including its server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub cover_url: String,
    pub length: String,
    pub author: serde_json::Value,
    pub stats: serde_json::Value,
    pub created_at: String,
}

/// Body accepted by create and update requests.
///
/// `createdAt` may be omitted on create, in which case the current time is
/// stamped. Updates never touch the stored `createdAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInput {
    pub title: String,
    pub cover_url: String,
    pub length: String,
    pub author: serde_json::Value,
    pub stats: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// One page of a list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    pub videos: Vec<Video>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

impl Video {
    /// Builds the record persisted by a create call.
    pub fn from_input(id: impl Into<String>, input: VideoInput, now: DateTime<Utc>) -> Self {
        let created_at = match input.created_at {
            Some(value) if !value.trim().is_empty() => value,
            _ => now.to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        Self {
            id: id.into(),
            title: input.title,
            cover_url: input.cover_url,
            length: input.length,
            author: input.author,
            stats: input.stats,
            created_at,
        }
    }

    /// Replaces every mutable field, keeping `id` and `created_at`.
    pub fn apply(&mut self, input: VideoInput) {
        self.title = input.title;
        self.cover_url = input.cover_url;
        self.length = input.length;
        self.author = input.author;
        self.stats = input.stats;
    }

    /// Numeric `stats.likes`, or 0 when it is missing or not a number.
    pub fn likes(&self) -> f64 {
        likes_of(&self.stats)
    }

    pub fn created_millis(&self) -> Option<i64> {
        timestamp_millis(&self.created_at)
    }
}

pub fn likes_of(stats: &serde_json::Value) -> f64 {
    stats
        .get("likes")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0)
}

/// Offset-carrying layouts RFC 3339 parsing rejects (no seconds).
const OFFSET_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"];

/// Layouts without an offset; a trailing `Z` is stripped before these run.
const NAIVE_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses a `createdAt` value. Values without an offset are read as UTC.
///
/// This is the only place timestamps are interpreted: the SQLite store
/// persists its result as `created_ts` and the memory store calls it
/// directly, so both filter and sort the same instants.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for layout in OFFSET_LAYOUTS {
        if let Ok(parsed) = DateTime::parse_from_str(value, layout) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let naive = value.strip_suffix(['Z', 'z']).unwrap_or(value);
    for layout in NAIVE_LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, layout) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|parsed| parsed.and_utc())
}

/// Milliseconds since the Unix epoch, the unit `created_ts` is stored in.
pub fn timestamp_millis(value: &str) -> Option<i64> {
    parse_timestamp(value).map(|instant| instant.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn input() -> VideoInput {
        VideoInput {
            title: "A".into(),
            cover_url: "u".into(),
            length: "1:00".into(),
            author: json!({}),
            stats: json!({"likes": 0}),
            created_at: None,
        }
    }

    #[test]
    fn video_serializes_with_camel_case_keys() {
        let video = Video::from_input("abc", input(), Utc::now());
        let value = serde_json::to_value(&video).unwrap();
        for key in ["id", "title", "coverUrl", "length", "author", "stats", "createdAt"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn missing_created_at_is_stamped() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let video = Video::from_input("abc", input(), now);
        assert_eq!(video.created_at, "2024-05-01T12:00:00Z");

        let mut explicit = input();
        explicit.created_at = Some("2024-01-01T00:00:00Z".into());
        let video = Video::from_input("abc", explicit, now);
        assert_eq!(video.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn apply_keeps_identity_and_creation_time() {
        let mut video = Video::from_input("abc", input(), Utc::now());
        let created_at = video.created_at.clone();
        let mut changed = input();
        changed.title = "B".into();
        changed.created_at = Some("1999-01-01T00:00:00Z".into());
        video.apply(changed);
        assert_eq!(video.id, "abc");
        assert_eq!(video.title, "B");
        assert_eq!(video.created_at, created_at);
    }

    #[test]
    fn likes_fall_back_to_zero() {
        assert_eq!(likes_of(&json!({"likes": 42})), 42.0);
        assert_eq!(likes_of(&json!({"likes": "42"})), 0.0);
        assert_eq!(likes_of(&json!({})), 0.0);
        assert_eq!(likes_of(&json!(null)), 0.0);
    }

    #[test]
    fn parses_common_timestamp_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05"), Some(expected));
        assert!(parse_timestamp("2024-01-02").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2460000").is_none());
    }

    #[test]
    fn parses_minute_precision_with_offset() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T05:04+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:00Z"), Some(expected));
        assert_eq!(
            timestamp_millis("2024-01-02T03:04:00.250Z"),
            Some(expected.timestamp_millis() + 250)
        );
    }
}

//! Incoming event normalization
//!
//! Events arrive as loose JSON objects. Descriptive fields are optional and
//! never cause a rejection; a field with an unexpected shape is stored as
//! NULL in its flattened column and stays available through `raw_json`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

use super::StoreError;

/// A validated event ready to be written to the `events` table
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub timestamp: String,
    pub timestamp_ms: i64,
    pub source_ip: Option<String>,
    pub source_port: Option<i64>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<i64>,
    pub protocol: Option<String>,
    pub domain: Option<String>,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub http_status: Option<i64>,
    pub user_agent: Option<String>,
    /// The payload as received, after timestamp defaulting
    pub raw: Map<String, Value>,
}

impl NewEvent {
    /// Build an event from a request body, stamping `now` when no timestamp was supplied.
    pub fn from_json(body: Value, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let Value::Object(mut raw) = body else {
            return Err(StoreError::NotAnObject);
        };

        let timestamp = match raw.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => return Err(StoreError::InvalidTimestamp(other.to_string())),
        };
        let timestamp = match timestamp {
            Some(ts) => ts,
            None => {
                let ts = format_timestamp(now);
                raw.insert("timestamp".to_string(), Value::String(ts.clone()));
                ts
            }
        };
        let timestamp_ms = parse_timestamp(&timestamp)?.timestamp_millis();

        let http = raw.get("http").and_then(Value::as_object);

        Ok(Self {
            timestamp_ms,
            source_ip: string_field(raw.get("source_ip")),
            source_port: integer_field(raw.get("source_port")),
            dest_ip: string_field(raw.get("dest_ip")),
            dest_port: integer_field(raw.get("dest_port")),
            protocol: string_field(raw.get("protocol")),
            domain: string_field(raw.get("domain")),
            http_method: http.and_then(|h| non_empty(string_field(h.get("method")))),
            http_path: http.and_then(|h| non_empty(string_field(h.get("path")))),
            http_status: http.and_then(|h| integer_field(h.get("status"))).filter(|s| *s != 0),
            user_agent: http.and_then(|h| non_empty(string_field(h.get("user_agent")))),
            timestamp,
            raw,
        })
    }

    pub fn raw_json(&self) -> String {
        Value::Object(self.raw.clone()).to_string()
    }

    pub fn into_raw(self) -> Value {
        Value::Object(self.raw)
    }
}

/// ISO-8601 with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp.
///
/// Accepts RFC 3339, a date-time without offset (read as UTC) and a bare
/// date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_iso8601(value, DateOnly::StartOfDay)
}

/// Like [`parse_timestamp`], but a bare date covers the whole day: it maps
/// to the last millisecond of that day so an inclusive upper bound keeps it.
pub fn parse_upper_bound(value: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_iso8601(value, DateOnly::EndOfDay)
}

enum DateOnly {
    StartOfDay,
    EndOfDay,
}

fn parse_iso8601(value: &str, date_only: DateOnly) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = match date_only {
            DateOnly::StartOfDay => date.and_hms_milli_opt(0, 0, 0, 0),
            DateOnly::EndOfDay => date.and_hms_milli_opt(23, 59, 59, 999),
        };
        if let Some(naive) = naive {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(StoreError::InvalidTimestamp(value.to_string()))
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn integer_field(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_flattens_nested_http() {
        let body = json!({
            "timestamp": "2024-05-01T10:00:00.000Z",
            "source_ip": "192.0.2.10",
            "source_port": 51000,
            "dest_ip": "198.51.100.7",
            "dest_port": "443",
            "protocol": "tcp",
            "domain": "login.example.com",
            "http": { "method": "POST", "path": "/login", "status": 302, "user_agent": "curl/8.0" }
        });

        let event = NewEvent::from_json(body, fixed_now()).unwrap();
        assert_eq!(event.timestamp, "2024-05-01T10:00:00.000Z");
        assert_eq!(event.source_port, Some(51000));
        assert_eq!(event.dest_port, Some(443));
        assert_eq!(event.http_method.as_deref(), Some("POST"));
        assert_eq!(event.http_path.as_deref(), Some("/login"));
        assert_eq!(event.http_status, Some(302));
        assert_eq!(event.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_missing_timestamp_is_defaulted_and_recorded() {
        let body = json!({ "domain": "bad.example", "source_ip": "192.0.2.1" });
        let event = NewEvent::from_json(body, fixed_now()).unwrap();

        assert_eq!(event.timestamp, "2024-05-01T12:00:00.000Z");
        assert_eq!(event.timestamp_ms, fixed_now().timestamp_millis());
        assert_eq!(
            event.raw_json(),
            r#"{"domain":"bad.example","source_ip":"192.0.2.1","timestamp":"2024-05-01T12:00:00.000Z"}"#
        );
    }

    #[test]
    fn test_empty_timestamp_is_defaulted() {
        let event = NewEvent::from_json(json!({ "timestamp": "" }), fixed_now()).unwrap();
        assert_eq!(event.timestamp, "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn test_raw_json_preserves_input_order_and_unknown_fields() {
        let input = r#"{"timestamp":"2024-05-01T10:00:00Z","zeta":1,"http":{"path":"/","method":"GET","extra":[1,2]},"alpha":null}"#;
        let body: Value = serde_json::from_str(input).unwrap();

        let event = NewEvent::from_json(body, fixed_now()).unwrap();
        assert_eq!(event.raw_json(), input);
    }

    #[test]
    fn test_unexpected_shapes_fall_back_to_null() {
        let body = json!({
            "source_ip": 12345,
            "source_port": "not-a-port",
            "domain": ["a", "b"],
            "http": "GET /"
        });

        let event = NewEvent::from_json(body, fixed_now()).unwrap();
        assert_eq!(event.source_ip, None);
        assert_eq!(event.source_port, None);
        assert_eq!(event.domain, None);
        assert_eq!(event.http_method, None);
        assert_eq!(event.http_path, None);
    }

    #[test]
    fn test_rejects_non_object_body() {
        let err = NewEvent::from_json(json!([1, 2, 3]), fixed_now()).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject));
    }

    #[test]
    fn test_rejects_unparseable_timestamp() {
        let err = NewEvent::from_json(json!({ "timestamp": "yesterday" }), fixed_now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestamp(_)));

        let err = NewEvent::from_json(json!({ "timestamp": 1714557600 }), fixed_now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_accepts_iso8601_without_offset() {
        let event = NewEvent::from_json(json!({ "timestamp": "2024-05-01T10:00:00" }), fixed_now()).unwrap();
        assert_eq!(event.timestamp, "2024-05-01T10:00:00");
        assert_eq!(
            event.timestamp_ms,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap().timestamp_millis()
        );

        let fractional = parse_timestamp("2024-05-01T10:00:00.250").unwrap();
        assert_eq!(fractional.timestamp_millis(), event.timestamp_ms + 250);
    }

    #[test]
    fn test_date_only_bounds() {
        let start = parse_timestamp("2024-05-01").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());

        let end = parse_upper_bound("2024-05-01").unwrap();
        assert_eq!(
            end.timestamp_millis(),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap().timestamp_millis() - 1
        );

        // Full date-times are not widened
        assert_eq!(
            parse_upper_bound("2024-05-01T10:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert!(parse_upper_bound("2024-13-01").is_err());
    }

    #[test]
    fn test_raw_json_keeps_number_text() {
        let input = r#"{"timestamp":"2024-05-01T10:00:00Z","n":1e3,"x":1.10,"big":123456789012345678901234567890}"#;
        let event = NewEvent::from_json(serde_json::from_str(input).unwrap(), fixed_now()).unwrap();
        assert_eq!(event.raw_json(), input);
    }

    #[test]
    fn test_offset_timestamps_compare_by_instant() {
        let a = NewEvent::from_json(json!({ "timestamp": "2024-05-01T12:00:00+02:00" }), fixed_now()).unwrap();
        let b = NewEvent::from_json(json!({ "timestamp": "2024-05-01T11:00:00Z" }), fixed_now()).unwrap();

        assert!(a.timestamp_ms < b.timestamp_ms);
        assert_eq!(a.timestamp, "2024-05-01T12:00:00+02:00");
    }
}

use chrono::{SecondsFormat, Utc};

/// Current UTC time as the RFC 3339 string the API uses for timestamps.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use common::model::{ClassifiedHit, DayBucketing};

/// Day-key helpers for the `_day_` key families. Days are local calendar days.
pub struct DateUtils;

impl DateUtils {
    pub const DAY_FORMAT: &'static str = "%Y-%m-%d";

    #[inline]
    pub fn day_key(at: &DateTime<Local>) -> String {
        at.format(Self::DAY_FORMAT).to_string()
    }

    /// Parses a client-supplied timestamp.
    ///
    /// Accepts unix seconds, unix milliseconds (13+ digits), RFC 3339 and
    /// `%Y-%m-%d %H:%M:%S` in local time. Anything else yields `None`.
    pub fn parse_event_time(raw: &str) -> Option<DateTime<Local>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let n: i64 = s.parse().ok()?;
            let utc = if s.len() >= 13 {
                DateTime::from_timestamp_millis(n)?
            } else {
                DateTime::from_timestamp(n, 0)?
            };
            return Some(utc.with_timezone(&Local));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Local));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
    }

    /// Day the hit is aggregated under.
    pub fn bucket_day(hit: &ClassifiedHit, bucketing: DayBucketing) -> String {
        match bucketing {
            DayBucketing::Ingestion => Self::day_key(&hit.ingested_at),
            DayBucketing::Event => {
                let at = Self::parse_event_time(&hit.client_timestamp).unwrap_or(hit.ingested_at);
                Self::day_key(&at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::ResourceType;
    use rust_decimal::Decimal;

    fn hit_at(ts: &str, ingested_at: DateTime<Local>) -> ClassifiedHit {
        ClassifiedHit::new(ResourceType::Movie, 42, Decimal::new(105, 1), ts, ingested_at)
    }

    #[test]
    fn day_key_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(DateUtils::day_key(&at), "2024-03-07");
    }

    #[test]
    fn parses_supported_timestamp_shapes() {
        let local = Local.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let secs = local.timestamp().to_string();
        let millis = local.timestamp_millis().to_string();

        assert_eq!(DateUtils::parse_event_time(&secs), Some(local));
        assert_eq!(DateUtils::parse_event_time(&millis), Some(local));
        assert_eq!(
            DateUtils::parse_event_time("2024-03-07 12:00:00"),
            Some(local)
        );
        assert_eq!(
            DateUtils::parse_event_time(&local.to_rfc3339()),
            Some(local)
        );
        assert_eq!(DateUtils::parse_event_time("yesterday"), None);
        assert_eq!(DateUtils::parse_event_time(""), None);
    }

    #[test]
    fn ingestion_bucketing_ignores_client_time() {
        let ingested = Local.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let hit = hit_at("2020-01-01 08:00:00", ingested);
        assert_eq!(
            DateUtils::bucket_day(&hit, DayBucketing::Ingestion),
            "2024-03-07"
        );
    }

    #[test]
    fn event_bucketing_falls_back_to_ingestion() {
        let ingested = Local.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let hit = hit_at("2020-01-01 08:00:00", ingested);
        assert_eq!(DateUtils::bucket_day(&hit, DayBucketing::Event), "2020-01-01");

        let garbled = hit_at("not-a-time", ingested);
        assert_eq!(
            DateUtils::bucket_day(&garbled, DayBucketing::Event),
            "2024-03-07"
        );
    }
}

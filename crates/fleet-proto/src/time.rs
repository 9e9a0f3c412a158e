//! `google.protobuf.Timestamp` 与 `chrono` 之间的转换

use chrono::{DateTime, SecondsFormat, Utc};
use prost_types::Timestamp;

/// 当前时间
pub fn now() -> Timestamp {
    to_timestamp(Utc::now())
}

pub fn to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// 超出表示范围的时间戳返回 `None`
pub fn to_datetime(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// RFC 3339 格式，UTC，`Z` 结尾
pub fn format_timestamp(ts: &Timestamp) -> String {
    match to_datetime(ts) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => format!("{}s", ts.seconds),
    }
}

pub fn parse_timestamp(text: &str) -> Result<Timestamp, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(text)?;
    Ok(to_timestamp(dt.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let ts = Timestamp {
            seconds: 1_600_000_000,
            nanos: 0,
        };
        let text = format_timestamp(&ts);
        assert_eq!(text, "2020-09-13T12:26:40Z");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);

        let parsed = parse_timestamp("2020-09-13T14:26:40.5+02:00").unwrap();
        assert_eq!(parsed.seconds, 1_600_000_000);
        assert_eq!(parsed.nanos, 500_000_000);
    }

    #[test]
    fn test_negative_nanos_rejected() {
        let ts = Timestamp {
            seconds: 1,
            nanos: -1,
        };
        assert!(to_datetime(&ts).is_none());
    }
}

// ==========================================
// 语言学校课时账本 - 时间字段编解码
// ==========================================
// 存储格式: RFC3339 (UTC), 日期 %Y-%m-%d
// ==========================================

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;

pub fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn opt_ts_from_sql(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts_from_sql(idx, &s)).transpose()
}

pub fn date_to_sql(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn date_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip_preserves_instant() {
        let now = Utc::now();
        let parsed = ts_from_sql(0, &ts_to_sql(&now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_bad_date_is_conversion_error() {
        assert!(date_from_sql(3, "17/10/2026").is_err());
    }
}

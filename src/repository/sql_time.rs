// ==========================================
// 产线运行引擎 - 时间字段编解码
// ==========================================
// 存储格式: 时间戳 "YYYY-MM-DD HH:MM:SS"；日期 "YYYY-MM-DD"；时刻 "HH:MM"
// ==========================================

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;

pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const HM_FORMAT: &str = "%H:%M";

pub fn fmt_ts(t: NaiveDateTime) -> String {
    t.format(TS_FORMAT).to_string()
}

pub fn fmt_opt_ts(t: Option<NaiveDateTime>) -> Option<String> {
    t.map(fmt_ts)
}

pub fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn fmt_hm(t: NaiveTime) -> String {
    t.format(HM_FORMAT).to_string()
}

/// 读取必填时间戳列
pub fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw, idx)
}

/// 读取可空时间戳列
pub fn get_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw, idx).map(Some),
        None => Ok(None),
    }
}

pub fn get_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn get_hm(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, HM_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 读取 JSON 文本列
pub fn get_json<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_ts(raw: &str, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_format_is_sortable_text() {
        let t = NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(fmt_ts(t), "2025-03-09 07:05:00");
        assert!(fmt_ts(t) < "2025-03-10 00:00:00".to_string());
    }
}

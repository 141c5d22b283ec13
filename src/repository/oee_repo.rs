// ==========================================
// 产线运行引擎 - OEE 记录 / 生产履历数据仓储
// ==========================================
// 对齐: oee_record / production_history 表
// 红线: OEE 按 (line_id, period_type, period_date) 覆盖写入，不产生重复记录
// 说明: production_history 由外部遥测写入，引擎只读
// ==========================================

use crate::domain::oee::{OeeRecord, ProductionHistory};
use crate::domain::types::OeePeriodType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{fmt_date, fmt_opt_ts, fmt_ts, get_date, get_opt_ts, get_ts};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const OEE_COLUMNS: &str = r#"record_id, line_id, period_type, period_date, period_start,
    period_end, shift, operation_time_hours, uptime_hours, downtime_hours, total_count,
    good_count, reject_count, target_count, avg_cycle_time, availability, performance,
    quality, achievement_rate, oee, total_failures, calculated_at"#;

// ==========================================
// OeeRepository - OEE 记录仓储
// ==========================================
pub struct OeeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OeeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或覆盖周期记录
    ///
    /// 已存在同周期记录时保留原 record_id，其余字段整体覆盖
    ///
    /// # 返回
    /// - 持久化后的 record_id
    pub fn upsert(&self, record: &OeeRecord) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                r#"INSERT INTO oee_record ({})
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(line_id, period_type, period_date) DO UPDATE SET
                     period_start = excluded.period_start,
                     period_end = excluded.period_end,
                     shift = excluded.shift,
                     operation_time_hours = excluded.operation_time_hours,
                     uptime_hours = excluded.uptime_hours,
                     downtime_hours = excluded.downtime_hours,
                     total_count = excluded.total_count,
                     good_count = excluded.good_count,
                     reject_count = excluded.reject_count,
                     target_count = excluded.target_count,
                     avg_cycle_time = excluded.avg_cycle_time,
                     availability = excluded.availability,
                     performance = excluded.performance,
                     quality = excluded.quality,
                     achievement_rate = excluded.achievement_rate,
                     oee = excluded.oee,
                     total_failures = excluded.total_failures,
                     calculated_at = excluded.calculated_at"#,
                OEE_COLUMNS
            ),
            params![
                record.record_id,
                record.line_id,
                record.period_type.to_db_str(),
                fmt_date(record.period_date),
                fmt_ts(record.period_start),
                fmt_ts(record.period_end),
                record.shift,
                record.operation_time_hours,
                record.uptime_hours,
                record.downtime_hours,
                record.total_count,
                record.good_count,
                record.reject_count,
                record.target_count,
                record.avg_cycle_time,
                record.availability,
                record.performance,
                record.quality,
                record.achievement_rate,
                record.oee,
                record.total_failures,
                fmt_ts(record.calculated_at),
            ],
        )?;

        let record_id: String = conn.query_row(
            r#"SELECT record_id FROM oee_record
               WHERE line_id = ? AND period_type = ? AND period_date = ?"#,
            params![
                record.line_id,
                record.period_type.to_db_str(),
                fmt_date(record.period_date)
            ],
            |row| row.get(0),
        )?;
        Ok(record_id)
    }

    pub fn find_by_period(
        &self,
        line_id: &str,
        period_type: OeePeriodType,
        period_date: NaiveDate,
    ) -> RepositoryResult<Option<OeeRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM oee_record
                       WHERE line_id = ? AND period_type = ? AND period_date = ?"#,
                    OEE_COLUMNS
                ),
                params![line_id, period_type.to_db_str(), fmt_date(period_date)],
                map_oee_row,
            )
            .optional()?;
        Ok(record)
    }

    /// 按日期区间查询（闭区间，按 period_date 升序）
    pub fn list_by_line(
        &self,
        line_id: &str,
        period_type: OeePeriodType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<Vec<OeeRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM oee_record
               WHERE line_id = ? AND period_type = ? AND period_date BETWEEN ? AND ?
               ORDER BY period_date"#,
            OEE_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![line_id, period_type.to_db_str(), fmt_date(from), fmt_date(to)],
                map_oee_row,
            )?
            .collect::<Result<Vec<OeeRecord>, _>>()?;
        Ok(records)
    }
}

fn map_oee_row(row: &rusqlite::Row) -> rusqlite::Result<OeeRecord> {
    let period_type: String = row.get(2)?;
    Ok(OeeRecord {
        record_id: row.get(0)?,
        line_id: row.get(1)?,
        period_type: OeePeriodType::from_db_str(&period_type),
        period_date: get_date(row, 3)?,
        period_start: get_ts(row, 4)?,
        period_end: get_ts(row, 5)?,
        shift: row.get(6)?,
        operation_time_hours: row.get(7)?,
        uptime_hours: row.get(8)?,
        downtime_hours: row.get(9)?,
        total_count: row.get(10)?,
        good_count: row.get(11)?,
        reject_count: row.get(12)?,
        target_count: row.get(13)?,
        avg_cycle_time: row.get(14)?,
        availability: row.get(15)?,
        performance: row.get(16)?,
        quality: row.get(17)?,
        achievement_rate: row.get(18)?,
        oee: row.get(19)?,
        total_failures: row.get(20)?,
        calculated_at: get_ts(row, 21)?,
    })
}

// ==========================================
// ProductionHistoryRepository - 生产履历仓储（只读 + 测试/回放写入）
// ==========================================
pub struct ProductionHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 设备在窗口 [start, end) 内开始的履历
    pub fn list_in_window(
        &self,
        counter_device_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<ProductionHistory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT history_id, counter_device_id, counter_a_total, reject_total,
                      cycle_time, max_count, started_at, finished_at, shift
               FROM production_history
               WHERE counter_device_id = ? AND started_at >= ? AND started_at < ?
               ORDER BY started_at, history_id"#,
        )?;
        let rows = stmt
            .query_map(params![counter_device_id, fmt_ts(start), fmt_ts(end)], |row| {
                Ok(ProductionHistory {
                    history_id: row.get(0)?,
                    counter_device_id: row.get(1)?,
                    counter_a_total: row.get(2)?,
                    reject_total: row.get(3)?,
                    cycle_time: row.get(4)?,
                    max_count: row.get(5)?,
                    started_at: get_ts(row, 6)?,
                    finished_at: get_opt_ts(row, 7)?,
                    shift: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<ProductionHistory>, _>>()?;
        Ok(rows)
    }

    /// 写入履历（遥测回放 / 开发工具）
    pub fn insert(&self, history: &ProductionHistory) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_history (
                counter_device_id, counter_a_total, reject_total, cycle_time,
                max_count, started_at, finished_at, shift
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                history.counter_device_id,
                history.counter_a_total,
                history.reject_total,
                history.cycle_time,
                history.max_count,
                fmt_ts(history.started_at),
                fmt_opt_ts(history.finished_at),
                history.shift,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::line::Line;
    use crate::repository::line_repo::LineRepository;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn record(line_id: &str, oee: f64) -> OeeRecord {
        OeeRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            line_id: line_id.to_string(),
            period_type: OeePeriodType::Daily,
            period_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            period_start: at(10, 7),
            period_end: at(11, 7),
            shift: 1,
            operation_time_hours: 8.0,
            uptime_hours: 7.0,
            downtime_hours: 1.0,
            total_count: 1000,
            good_count: 950,
            reject_count: 50,
            target_count: 1200,
            avg_cycle_time: 21.0,
            availability: 87.5,
            performance: 83.3,
            quality: 95.0,
            achievement_rate: 83.3,
            oee,
            total_failures: 1,
            calculated_at: at(11, 8),
        }
    }

    #[test]
    fn test_upsert_overwrites_same_period() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let line = Line::new("LINE-A".into(), "A线".into(), None, None, at(1, 7));
        LineRepository::new(conn.clone()).insert(&line).unwrap();
        let repo = OeeRepository::new(conn);

        let first_id = repo.upsert(&record(&line.line_id, 60.0)).unwrap();
        let second_id = repo.upsert(&record(&line.line_id, 65.0)).unwrap();
        assert_eq!(first_id, second_id);

        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let all = repo
            .list_by_line(&line.line_id, OeePeriodType::Daily, day, day)
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].oee, 65.0);
    }
}

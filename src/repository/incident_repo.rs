// ==========================================
// 产线运行引擎 - 维修单数据仓储
// ==========================================
// 对齐: repair_incident 表
// 并发控制: revision 乐观锁
// 红线: 报修 → 产线 MAINTENANCE；最后一张维修单完成 → 产线 OPERATING（同一事务）
// ==========================================

use crate::domain::incident::RepairIncident;
use crate::domain::types::{IncidentStatus, LineStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{fmt_opt_ts, fmt_ts, get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const INCIDENT_COLUMNS: &str = r#"incident_id, report_number, line_id, machine_id, session_id,
    problem, reported_by, status, shift, reported_at, line_stopped_at, started_at,
    completed_at, completed_by, repair_duration_minutes, line_stop_duration_minutes, revision"#;

// ==========================================
// IncidentRepository - 维修单仓储
// ==========================================
pub struct IncidentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl IncidentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建维修单并将产线置为 MAINTENANCE
    ///
    /// 产线已有待处理停线时间时沿用该时间（避免重复计停机），
    /// 否则以 `now` 作为停线时间；结果回写到 `incident.line_stopped_at`
    pub fn insert_with_line_maintenance(
        &self,
        incident: &mut RepairIncident,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let pending: Option<Option<String>> = tx
            .query_row(
                "SELECT line_stopped_at FROM production_line WHERE line_id = ? AND is_archived = 0",
                params![incident.line_id],
                |row| row.get(0),
            )
            .optional()?;
        let pending = match pending {
            Some(p) => p,
            None => {
                return Err(RepositoryError::NotFound {
                    entity: "Line".to_string(),
                    id: incident.line_id.clone(),
                })
            }
        };
        if let Some(raw) = pending {
            incident.line_stopped_at =
                NaiveDateTime::parse_from_str(&raw, crate::repository::sql_time::TS_FORMAT)
                    .map_err(|e| RepositoryError::FieldValueError {
                        field: "line_stopped_at".to_string(),
                        message: e.to_string(),
                    })?;
        }

        insert_incident(&tx, incident)?;
        tx.execute(
            r#"UPDATE production_line
               SET status = ?, line_stopped_at = ?, updated_at = ?
               WHERE line_id = ?"#,
            params![
                LineStatus::Maintenance.to_db_str(),
                fmt_ts(incident.line_stopped_at),
                fmt_ts(now),
                incident.line_id,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 带乐观锁写回维修单（开始维修）
    pub fn update_with_cas(
        &self,
        incident: &RepairIncident,
        expected_revision: i64,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        cas_update(&conn, incident, expected_revision)?;
        Ok(expected_revision + 1)
    }

    /// 带乐观锁写回已完成的维修单，并在无其他活动维修单时恢复产线
    ///
    /// # 返回
    /// - `true`: 产线已恢复为 OPERATING 且清除停线时间
    pub fn complete_with_cas(
        &self,
        incident: &RepairIncident,
        expected_revision: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        cas_update(&tx, incident, expected_revision)?;

        let remaining: i64 = tx.query_row(
            r#"SELECT COUNT(*) FROM repair_incident
               WHERE line_id = ? AND status <> 'COMPLETED'"#,
            params![incident.line_id],
            |row| row.get(0),
        )?;

        let cleared = remaining == 0;
        if cleared {
            tx.execute(
                r#"UPDATE production_line
                   SET status = ?, line_stopped_at = NULL, updated_at = ?
                   WHERE line_id = ?"#,
                params![LineStatus::Operating.to_db_str(), fmt_ts(now), incident.line_id],
            )?;
        }

        tx.commit()?;
        Ok(cleared)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, incident_id: &str) -> RepositoryResult<Option<RepairIncident>> {
        let conn = self.get_conn()?;
        let incident = conn
            .query_row(
                &format!("SELECT {} FROM repair_incident WHERE incident_id = ?", INCIDENT_COLUMNS),
                params![incident_id],
                map_incident_row,
            )
            .optional()?;
        Ok(incident)
    }

    /// 产线上未完成的维修单
    pub fn list_active_by_line(&self, line_id: &str) -> RepositoryResult<Vec<RepairIncident>> {
        self.query_list(
            "WHERE line_id = ? AND status <> 'COMPLETED' ORDER BY reported_at",
            params![line_id],
        )
    }

    /// 某时刻之后完成的维修单（滚动指标重算）
    pub fn list_completed_since(
        &self,
        line_id: &str,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<RepairIncident>> {
        self.query_list(
            r#"WHERE line_id = ? AND status = 'COMPLETED' AND completed_at >= ?
               ORDER BY completed_at"#,
            params![line_id, fmt_ts(since)],
        )
    }

    /// 窗口 [start, end) 内完成的维修单（OEE 停机时间）
    pub fn list_completed_in_window(
        &self,
        line_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<RepairIncident>> {
        self.query_list(
            r#"WHERE line_id = ? AND status = 'COMPLETED'
                 AND completed_at >= ? AND completed_at < ?
               ORDER BY completed_at"#,
            params![line_id, fmt_ts(start), fmt_ts(end)],
        )
    }

    /// 会话下已完成的维修单数量（会话 MTBF 的故障数）
    pub fn count_completed_by_session(&self, session_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"SELECT COUNT(*) FROM repair_incident
               WHERE session_id = ? AND status = 'COMPLETED'"#,
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_list(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<RepairIncident>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM repair_incident {}",
            INCIDENT_COLUMNS, where_clause
        ))?;
        let incidents = stmt
            .query_map(params, map_incident_row)?
            .collect::<Result<Vec<RepairIncident>, _>>()?;
        Ok(incidents)
    }
}

// ==========================================
// 共享 SQL
// ==========================================

fn insert_incident(conn: &Connection, incident: &RepairIncident) -> RepositoryResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO repair_incident ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            INCIDENT_COLUMNS
        ),
        params![
            incident.incident_id,
            incident.report_number,
            incident.line_id,
            incident.machine_id,
            incident.session_id,
            incident.problem,
            incident.reported_by,
            incident.status.to_db_str(),
            incident.shift,
            fmt_ts(incident.reported_at),
            fmt_ts(incident.line_stopped_at),
            fmt_opt_ts(incident.started_at),
            fmt_opt_ts(incident.completed_at),
            incident.completed_by,
            incident.repair_duration_minutes,
            incident.line_stop_duration_minutes,
            incident.revision,
        ],
    )?;
    Ok(())
}

fn cas_update(conn: &Connection, incident: &RepairIncident, expected_revision: i64) -> RepositoryResult<()> {
    let rows_affected = conn.execute(
        r#"UPDATE repair_incident
           SET status = ?, started_at = ?, completed_at = ?, completed_by = ?,
               repair_duration_minutes = ?, line_stop_duration_minutes = ?,
               revision = revision + 1
           WHERE incident_id = ? AND revision = ?"#,
        params![
            incident.status.to_db_str(),
            fmt_opt_ts(incident.started_at),
            fmt_opt_ts(incident.completed_at),
            incident.completed_by,
            incident.repair_duration_minutes,
            incident.line_stop_duration_minutes,
            incident.incident_id,
            expected_revision,
        ],
    )?;

    if rows_affected == 0 {
        let actual: Option<i64> = conn
            .query_row(
                "SELECT revision FROM repair_incident WHERE incident_id = ?",
                params![incident.incident_id],
                |row| row.get(0),
            )
            .optional()?;
        return Err(match actual {
            Some(actual) => RepositoryError::OptimisticLockFailure {
                entity: "RepairIncident".to_string(),
                id: incident.incident_id.clone(),
                expected: expected_revision,
                actual,
            },
            None => RepositoryError::NotFound {
                entity: "RepairIncident".to_string(),
                id: incident.incident_id.clone(),
            },
        });
    }
    Ok(())
}

fn map_incident_row(row: &rusqlite::Row) -> rusqlite::Result<RepairIncident> {
    let status: String = row.get(7)?;
    Ok(RepairIncident {
        incident_id: row.get(0)?,
        report_number: row.get(1)?,
        line_id: row.get(2)?,
        machine_id: row.get(3)?,
        session_id: row.get(4)?,
        problem: row.get(5)?,
        reported_by: row.get(6)?,
        status: IncidentStatus::from_db_str(&status),
        shift: row.get(8)?,
        reported_at: get_ts(row, 9)?,
        line_stopped_at: get_ts(row, 10)?,
        started_at: get_opt_ts(row, 11)?,
        completed_at: get_opt_ts(row, 12)?,
        completed_by: row.get(13)?,
        repair_duration_minutes: row.get(14)?,
        line_stop_duration_minutes: row.get(15)?,
        revision: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::incident::IncidentReport;
    use crate::domain::line::{Line, Machine};
    use crate::repository::line_repo::LineRepository;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup() -> (IncidentRepository, LineRepository, Line, Machine) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let lines = LineRepository::new(conn.clone());
        let line = Line::new("LINE-A".into(), "A线".into(), None, None, at(7, 0));
        lines.insert(&line).unwrap();
        let machine = Machine::new(line.line_id.clone(), "M-01".into(), "冲压机".into(), at(7, 0));
        lines.insert_machine(&machine).unwrap();
        (IncidentRepository::new(conn), lines, line, machine)
    }

    fn report(line: &Line, machine: &Machine) -> IncidentReport {
        IncidentReport {
            line_id: line.line_id.clone(),
            machine_id: machine.machine_id.clone(),
            problem: "模具破损".to_string(),
            reported_by: "op".to_string(),
            start_repair_immediately: false,
        }
    }

    #[test]
    fn test_second_report_reuses_pending_stop_time() {
        let (repo, lines, line, machine) = setup();

        let mut first = RepairIncident::report(&report(&line, &machine), None, 1, at(10, 0), at(10, 0));
        repo.insert_with_line_maintenance(&mut first, at(10, 0)).unwrap();

        let mut second = RepairIncident::report(&report(&line, &machine), None, 1, at(10, 20), at(10, 20));
        repo.insert_with_line_maintenance(&mut second, at(10, 20)).unwrap();
        assert_eq!(second.line_stopped_at, at(10, 0));

        let loaded = lines.get(&line.line_id).unwrap();
        assert_eq!(loaded.status, LineStatus::Maintenance);
        assert_eq!(loaded.line_stopped_at, Some(at(10, 0)));
    }

    #[test]
    fn test_line_restored_only_after_last_incident() {
        let (repo, lines, line, machine) = setup();

        let mut a = RepairIncident::report(&report(&line, &machine), None, 1, at(10, 0), at(10, 0));
        repo.insert_with_line_maintenance(&mut a, at(10, 0)).unwrap();
        let mut b = RepairIncident::report(&report(&line, &machine), None, 1, at(10, 5), at(10, 5));
        repo.insert_with_line_maintenance(&mut b, at(10, 5)).unwrap();

        a.complete("tech", at(10, 30)).unwrap();
        assert!(!repo.complete_with_cas(&a, 0, at(10, 30)).unwrap());
        assert_eq!(lines.get(&line.line_id).unwrap().status, LineStatus::Maintenance);

        b.complete("tech", at(11, 0)).unwrap();
        assert!(repo.complete_with_cas(&b, 0, at(11, 0)).unwrap());
        let restored = lines.get(&line.line_id).unwrap();
        assert_eq!(restored.status, LineStatus::Operating);
        assert!(restored.line_stopped_at.is_none());
    }

    #[test]
    fn test_stale_complete_is_rejected() {
        let (repo, _lines, line, machine) = setup();
        let mut inc = RepairIncident::report(&report(&line, &machine), None, 1, at(10, 0), at(10, 0));
        repo.insert_with_line_maintenance(&mut inc, at(10, 0)).unwrap();

        let mut first = inc.clone();
        first.complete("tech-1", at(10, 30)).unwrap();
        repo.complete_with_cas(&first, 0, at(10, 30)).unwrap();

        let mut second = inc.clone();
        second.complete("tech-2", at(10, 40)).unwrap();
        let err = repo.complete_with_cas(&second, 0, at(10, 40)).unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));

        let stored = repo.find_by_id(&inc.incident_id).unwrap().unwrap();
        assert_eq!(stored.completed_by.as_deref(), Some("tech-1"));
    }
}

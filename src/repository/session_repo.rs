// ==========================================
// 产线运行引擎 - 运行会话数据仓储
// ==========================================
// 对齐: operation_session 表
// 并发控制: revision 乐观锁；每条产线至多一个 RUNNING/PAUSED 会话（唯一部分索引）
// 红线: 会话状态与产线状态在同一事务内写入
// ==========================================

use crate::domain::session::OperationSession;
use crate::domain::types::{LineStatus, SessionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{fmt_opt_ts, fmt_ts, get_json, get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SESSION_COLUMNS: &str = r#"session_id, line_id, status, started_at, started_by,
    stopped_at, stopped_by, paused_at, resumed_at, total_pause_minutes,
    duration_minutes, mtbf_hours, is_auto_paused, is_stub, pause_history_json, revision"#;

// ==========================================
// SessionRepository - 运行会话仓储
// ==========================================
pub struct SessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SessionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入会话（不改动产线状态，用于补建的已停止会话）
    pub fn insert(&self, session: &OperationSession) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_session(&conn, session)?;
        Ok(session.session_id.clone())
    }

    /// 插入新会话并同步产线状态
    ///
    /// # 错误
    /// - `UniqueConstraintViolation`: 产线已有 RUNNING/PAUSED 会话
    pub fn insert_with_line_status(
        &self,
        session: &OperationSession,
        line_status: LineStatus,
        now: NaiveDateTime,
    ) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        insert_session(&tx, session)?;
        set_line_status(&tx, &session.line_id, line_status, now)?;

        tx.commit()?;
        Ok(session.session_id.clone())
    }

    /// 带乐观锁写回会话，可选同步产线状态
    ///
    /// # 参数
    /// - `expected_revision`: 读取时的 revision
    /// - `line_status`: Some 时同步写入产线状态（MAINTENANCE 不被覆盖）
    ///
    /// # 返回
    /// - 新的 revision
    ///
    /// # 错误
    /// - `OptimisticLockFailure`: 会话已被其他调用方更新
    /// - `NotFound`: 会话不存在
    pub fn update_with_cas(
        &self,
        session: &OperationSession,
        expected_revision: i64,
        line_status: Option<LineStatus>,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE operation_session
               SET status = ?, stopped_at = ?, stopped_by = ?, paused_at = ?, resumed_at = ?,
                   total_pause_minutes = ?, duration_minutes = ?, mtbf_hours = ?,
                   is_auto_paused = ?, pause_history_json = ?, revision = revision + 1
               WHERE session_id = ? AND revision = ?"#,
            params![
                session.status.to_db_str(),
                fmt_opt_ts(session.stopped_at),
                session.stopped_by,
                fmt_opt_ts(session.paused_at),
                fmt_opt_ts(session.resumed_at),
                session.total_pause_minutes,
                session.duration_minutes,
                session.mtbf_hours,
                session.is_auto_paused,
                serde_json::to_string(&session.pause_history)?,
                session.session_id,
                expected_revision,
            ],
        )?;

        if rows_affected == 0 {
            // 判断是记录不存在还是 revision 冲突
            let actual: Option<i64> = tx
                .query_row(
                    "SELECT revision FROM operation_session WHERE session_id = ?",
                    params![session.session_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity: "OperationSession".to_string(),
                    id: session.session_id.clone(),
                    expected: expected_revision,
                    actual,
                },
                None => RepositoryError::NotFound {
                    entity: "OperationSession".to_string(),
                    id: session.session_id.clone(),
                },
            });
        }

        if let Some(status) = line_status {
            set_line_status(&tx, &session.line_id, status, now)?;
        }

        tx.commit()?;
        Ok(expected_revision + 1)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, session_id: &str) -> RepositoryResult<Option<OperationSession>> {
        let conn = self.get_conn()?;
        let session = conn
            .query_row(
                &format!("SELECT {} FROM operation_session WHERE session_id = ?", SESSION_COLUMNS),
                params![session_id],
                map_session_row,
            )
            .optional()?;
        Ok(session)
    }

    /// 查询产线当前的 RUNNING/PAUSED 会话
    pub fn find_active_by_line(&self, line_id: &str) -> RepositoryResult<Option<OperationSession>> {
        let conn = self.get_conn()?;
        let session = conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM operation_session
                       WHERE line_id = ? AND status IN ('RUNNING', 'PAUSED')"#,
                    SESSION_COLUMNS
                ),
                params![line_id],
                map_session_row,
            )
            .optional()?;
        Ok(session)
    }

    /// 查询全部活动会话（调度循环扫描入口）
    pub fn list_active(&self) -> RepositoryResult<Vec<OperationSession>> {
        self.query_list(
            "WHERE status IN ('RUNNING', 'PAUSED') ORDER BY line_id",
            params![],
        )
    }

    /// 查询产线最近的会话
    pub fn list_by_line(&self, line_id: &str, limit: usize) -> RepositoryResult<Vec<OperationSession>> {
        self.query_list(
            "WHERE line_id = ? ORDER BY started_at DESC LIMIT ?",
            params![line_id, limit as i64],
        )
    }

    /// 查询某时刻之后停止的会话（滚动指标重算）
    pub fn list_stopped_since(
        &self,
        line_id: &str,
        since: NaiveDateTime,
    ) -> RepositoryResult<Vec<OperationSession>> {
        self.query_list(
            r#"WHERE line_id = ? AND status = 'STOPPED' AND stopped_at >= ?
               ORDER BY started_at"#,
            params![line_id, fmt_ts(since)],
        )
    }

    /// 查询与窗口 [start, end) 有重叠的会话（OEE 计算）
    pub fn list_overlapping(
        &self,
        line_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<OperationSession>> {
        self.query_list(
            r#"WHERE line_id = ? AND started_at < ?
                 AND (stopped_at IS NULL OR stopped_at > ?)
               ORDER BY started_at"#,
            params![line_id, fmt_ts(end), fmt_ts(start)],
        )
    }

    fn query_list(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<OperationSession>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM operation_session {}",
            SESSION_COLUMNS, where_clause
        ))?;
        let sessions = stmt
            .query_map(params, map_session_row)?
            .collect::<Result<Vec<OperationSession>, _>>()?;
        Ok(sessions)
    }
}

// ==========================================
// 共享 SQL
// ==========================================

fn insert_session(conn: &Connection, session: &OperationSession) -> RepositoryResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO operation_session ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SESSION_COLUMNS
        ),
        params![
            session.session_id,
            session.line_id,
            session.status.to_db_str(),
            fmt_ts(session.started_at),
            session.started_by,
            fmt_opt_ts(session.stopped_at),
            session.stopped_by,
            fmt_opt_ts(session.paused_at),
            fmt_opt_ts(session.resumed_at),
            session.total_pause_minutes,
            session.duration_minutes,
            session.mtbf_hours,
            session.is_auto_paused,
            session.is_stub,
            serde_json::to_string(&session.pause_history)?,
            session.revision,
        ],
    )?;
    Ok(())
}

/// 写产线运行状态（维修中的产线不被会话状态覆盖）
fn set_line_status(
    conn: &Connection,
    line_id: &str,
    status: LineStatus,
    now: NaiveDateTime,
) -> RepositoryResult<()> {
    conn.execute(
        r#"UPDATE production_line
           SET status = ?, updated_at = ?
           WHERE line_id = ? AND status <> 'MAINTENANCE'"#,
        params![status.to_db_str(), fmt_ts(now), line_id],
    )?;
    Ok(())
}

fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<OperationSession> {
    let status: String = row.get(2)?;
    Ok(OperationSession {
        session_id: row.get(0)?,
        line_id: row.get(1)?,
        status: SessionStatus::from_db_str(&status),
        started_at: get_ts(row, 3)?,
        started_by: row.get(4)?,
        stopped_at: get_opt_ts(row, 5)?,
        stopped_by: row.get(6)?,
        paused_at: get_opt_ts(row, 7)?,
        resumed_at: get_opt_ts(row, 8)?,
        total_pause_minutes: row.get(9)?,
        duration_minutes: row.get(10)?,
        mtbf_hours: row.get(11)?,
        is_auto_paused: row.get(12)?,
        is_stub: row.get(13)?,
        pause_history: get_json(row, 14)?,
        revision: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::line::Line;
    use crate::repository::line_repo::LineRepository;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup() -> (SessionRepository, LineRepository, String) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let line_repo = LineRepository::new(conn.clone());
        let line = Line::new("LINE-A".into(), "A线".into(), None, None, at(7, 0));
        line_repo.insert(&line).unwrap();
        (SessionRepository::new(conn), line_repo, line.line_id)
    }

    #[test]
    fn test_second_active_session_rejected_by_index() {
        let (repo, _lines, line_id) = setup();
        let first = OperationSession::start(&line_id, "op", at(8, 0));
        repo.insert_with_line_status(&first, LineStatus::Operating, at(8, 0))
            .unwrap();

        let second = OperationSession::start(&line_id, "op", at(8, 1));
        let err = repo
            .insert_with_line_status(&second, LineStatus::Operating, at(8, 1))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_cas_rejects_stale_revision() {
        let (repo, lines, line_id) = setup();
        let session = OperationSession::start(&line_id, "op", at(8, 0));
        repo.insert_with_line_status(&session, LineStatus::Operating, at(8, 0))
            .unwrap();
        assert_eq!(lines.get(&line_id).unwrap().status, LineStatus::Operating);

        let mut stopped = repo.find_by_id(&session.session_id).unwrap().unwrap();
        let mut paused = stopped.clone();

        stopped.stop("op", 0, at(9, 0)).unwrap();
        let rev = repo
            .update_with_cas(&stopped, stopped.revision, Some(LineStatus::Stopped), at(9, 0))
            .unwrap();
        assert_eq!(rev, 1);

        paused.pause("system", true, at(9, 0));
        let err = repo
            .update_with_cas(&paused, paused.revision, Some(LineStatus::Paused), at(9, 0))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { expected: 0, actual: 1, .. }));

        let reloaded = repo.find_by_id(&session.session_id).unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Stopped);
        assert_eq!(lines.get(&line_id).unwrap().status, LineStatus::Stopped);
    }

    #[test]
    fn test_pause_history_round_trips() {
        let (repo, _lines, line_id) = setup();
        let mut session = OperationSession::start(&line_id, "op", at(8, 0));
        repo.insert(&session).unwrap();
        session.pause("system", true, at(9, 0));
        session.resume("system", at(9, 30));
        repo.update_with_cas(&session, 0, None, at(9, 30)).unwrap();

        let loaded = repo.find_by_id(&session.session_id).unwrap().unwrap();
        assert_eq!(loaded.pause_history.len(), 1);
        assert_eq!(loaded.pause_history[0].duration_minutes, Some(30.0));
        assert_eq!(loaded.total_pause_minutes, 30.0);
        assert_eq!(loaded.revision, 1);
    }
}

use super::core::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::repository::error::RepositoryResult;
use crate::repository::sql_time::get_ts;
use rusqlite::{params, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, line_id, action_type, action_ts, actor, payload_json, detail
            FROM action_log
            WHERE action_id = ?
            "#,
        )?;

        match stmt.query_row(params![action_id], |row| self.map_row(row)) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询产线最近的操作日志（按时间倒序）
    pub fn list_by_line(&self, line_id: &str, limit: usize) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, line_id, action_type, action_ts, actor, payload_json, detail
            FROM action_log
            WHERE line_id = ?
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let logs = stmt
            .query_map(params![line_id, limit as i64], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 统计产线某类操作的次数
    pub fn count_by_line_and_type(&self, line_id: &str, action_type: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM action_log WHERE line_id = ? AND action_type = ?",
            params![line_id, action_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(&self, row: &Row) -> SqliteResult<ActionLog> {
        let payload: Option<String> = row.get(5)?;
        Ok(ActionLog {
            action_id: row.get(0)?,
            line_id: row.get(1)?,
            action_type: row.get(2)?,
            action_ts: get_ts(row, 3)?,
            actor: row.get(4)?,
            payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
            detail: row.get(6)?,
        })
    }
}

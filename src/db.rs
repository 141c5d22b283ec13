// ==========================================
// 产线运行引擎 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少调度循环与人工操作并发写入时的 busy 错误
// - 统一建表入口（幂等），保证引擎依赖的唯一索引存在
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 创建引擎所需的全部表（幂等）
///
/// 约束落在数据库层：
/// - 每个产线编码至多一条未归档记录
/// - 每条产线至多一个 RUNNING/PAUSED 会话
/// - OEE 记录按 (line_id, period_type, period_date) 唯一
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
          version INTEGER PRIMARY KEY,
          applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
          scope_id TEXT NOT NULL,
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at TEXT NOT NULL DEFAULT (datetime('now')),
          PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS production_line (
          line_id TEXT PRIMARY KEY,
          line_code TEXT NOT NULL,
          line_name TEXT NOT NULL,
          plant TEXT,
          description TEXT,
          status TEXT NOT NULL DEFAULT 'STOPPED',
          counter_device_id TEXT,
          start_time TEXT NOT NULL DEFAULT '07:00',
          end_time TEXT NOT NULL DEFAULT '21:00',
          break_windows_json TEXT NOT NULL DEFAULT '[]',
          line_stopped_at TEXT,
          total_operation_hours REAL NOT NULL DEFAULT 0.0,
          total_repair_hours REAL NOT NULL DEFAULT 0.0,
          total_failures INTEGER NOT NULL DEFAULT 0,
          average_mttr REAL NOT NULL DEFAULT 0.0,
          average_mtbf REAL NOT NULL DEFAULT 0.0,
          is_archived INTEGER NOT NULL DEFAULT 0,
          current_period_start TEXT,
          period_start TEXT,
          period_end TEXT,
          parent_line_id TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_production_line_live_code
          ON production_line(line_code) WHERE is_archived = 0;
        CREATE INDEX IF NOT EXISTS idx_production_line_parent
          ON production_line(parent_line_id, period_end);

        CREATE TABLE IF NOT EXISTS line_machine (
          machine_id TEXT PRIMARY KEY,
          line_id TEXT NOT NULL REFERENCES production_line(line_id) ON DELETE CASCADE,
          machine_code TEXT NOT NULL,
          machine_name TEXT NOT NULL,
          total_operation_hours REAL NOT NULL DEFAULT 0.0,
          total_repair_hours REAL NOT NULL DEFAULT 0.0,
          total_failures INTEGER NOT NULL DEFAULT 0,
          average_mttr REAL NOT NULL DEFAULT 0.0,
          average_mtbf REAL NOT NULL DEFAULT 0.0,
          is_archived INTEGER NOT NULL DEFAULT 0,
          period_start TEXT,
          period_end TEXT,
          parent_machine_id TEXT,
          created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_line_machine_line
          ON line_machine(line_id, is_archived);

        CREATE TABLE IF NOT EXISTS operation_session (
          session_id TEXT PRIMARY KEY,
          line_id TEXT NOT NULL REFERENCES production_line(line_id) ON DELETE CASCADE,
          status TEXT NOT NULL,
          started_at TEXT NOT NULL,
          started_by TEXT NOT NULL,
          stopped_at TEXT,
          stopped_by TEXT,
          paused_at TEXT,
          resumed_at TEXT,
          total_pause_minutes REAL NOT NULL DEFAULT 0.0,
          duration_minutes REAL,
          mtbf_hours REAL,
          is_auto_paused INTEGER NOT NULL DEFAULT 0,
          is_stub INTEGER NOT NULL DEFAULT 0,
          pause_history_json TEXT NOT NULL DEFAULT '[]',
          revision INTEGER NOT NULL DEFAULT 0
        );

        CREATE UNIQUE INDEX IF NOT EXISTS uq_operation_session_active_line
          ON operation_session(line_id) WHERE status IN ('RUNNING', 'PAUSED');
        CREATE INDEX IF NOT EXISTS idx_operation_session_line_stopped
          ON operation_session(line_id, stopped_at);

        CREATE TABLE IF NOT EXISTS repair_incident (
          incident_id TEXT PRIMARY KEY,
          report_number TEXT NOT NULL UNIQUE,
          line_id TEXT NOT NULL REFERENCES production_line(line_id) ON DELETE CASCADE,
          machine_id TEXT NOT NULL REFERENCES line_machine(machine_id) ON DELETE CASCADE,
          session_id TEXT REFERENCES operation_session(session_id) ON DELETE SET NULL,
          problem TEXT NOT NULL,
          reported_by TEXT NOT NULL,
          status TEXT NOT NULL,
          shift INTEGER NOT NULL,
          reported_at TEXT NOT NULL,
          line_stopped_at TEXT NOT NULL,
          started_at TEXT,
          completed_at TEXT,
          completed_by TEXT,
          repair_duration_minutes REAL,
          line_stop_duration_minutes REAL,
          revision INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_repair_incident_line_status
          ON repair_incident(line_id, status);
        CREATE INDEX IF NOT EXISTS idx_repair_incident_session
          ON repair_incident(session_id, status);

        CREATE TABLE IF NOT EXISTS oee_record (
          record_id TEXT PRIMARY KEY,
          line_id TEXT NOT NULL REFERENCES production_line(line_id) ON DELETE CASCADE,
          period_type TEXT NOT NULL,
          period_date TEXT NOT NULL,
          period_start TEXT NOT NULL,
          period_end TEXT NOT NULL,
          shift INTEGER NOT NULL,
          operation_time_hours REAL NOT NULL,
          uptime_hours REAL NOT NULL,
          downtime_hours REAL NOT NULL,
          total_count INTEGER NOT NULL,
          good_count INTEGER NOT NULL,
          reject_count INTEGER NOT NULL,
          target_count INTEGER NOT NULL,
          avg_cycle_time REAL NOT NULL,
          availability REAL NOT NULL,
          performance REAL NOT NULL,
          quality REAL NOT NULL,
          achievement_rate REAL NOT NULL,
          oee REAL NOT NULL,
          total_failures INTEGER NOT NULL,
          calculated_at TEXT NOT NULL,
          UNIQUE (line_id, period_type, period_date)
        );

        CREATE TABLE IF NOT EXISTS production_history (
          history_id INTEGER PRIMARY KEY AUTOINCREMENT,
          counter_device_id TEXT NOT NULL,
          counter_a_total INTEGER NOT NULL DEFAULT 0,
          reject_total INTEGER NOT NULL DEFAULT 0,
          cycle_time REAL NOT NULL DEFAULT 0.0,
          max_count INTEGER NOT NULL DEFAULT 0,
          started_at TEXT NOT NULL,
          finished_at TEXT,
          shift INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_production_history_device_started
          ON production_history(counter_device_id, started_at);

        CREATE TABLE IF NOT EXISTS counter_device_state (
          counter_device_id TEXT PRIMARY KEY,
          is_paused INTEGER NOT NULL DEFAULT 0,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS action_log (
          action_id TEXT PRIMARY KEY,
          line_id TEXT,
          action_type TEXT NOT NULL,
          action_ts TEXT NOT NULL,
          actor TEXT NOT NULL,
          payload_json TEXT,
          detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_action_log_line_ts
          ON action_log(line_id, action_ts DESC);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}

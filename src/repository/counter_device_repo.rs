// ==========================================
// 产线运行引擎 - 计数设备状态仓储
// ==========================================
// 对齐: counter_device_state 表
// 用途: 自动暂停 / 恢复时尽力同步设备暂停标志
// ==========================================

use crate::engine::events::DevicePauseNotifier;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::fmt_ts;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::sync::{Arc, Mutex};

pub struct CounterDeviceStateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CounterDeviceStateRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入设备暂停标志（不存在则创建）
    pub fn set_paused(
        &self,
        counter_device_id: &str,
        paused: bool,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO counter_device_state (counter_device_id, is_paused, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(counter_device_id) DO UPDATE SET
                 is_paused = excluded.is_paused,
                 updated_at = excluded.updated_at"#,
            params![counter_device_id, paused, fmt_ts(now)],
        )?;
        Ok(())
    }

    /// 读取设备暂停标志（未登记的设备返回 None）
    pub fn is_paused(&self, counter_device_id: &str) -> RepositoryResult<Option<bool>> {
        let conn = self.get_conn()?;
        let paused = conn
            .query_row(
                "SELECT is_paused FROM counter_device_state WHERE counter_device_id = ?",
                params![counter_device_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(paused)
    }
}

// ==========================================
// SqliteDevicePauseNotifier - 基于本地状态表的设备同步
// ==========================================
pub struct SqliteDevicePauseNotifier {
    repo: CounterDeviceStateRepository,
}

impl SqliteDevicePauseNotifier {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            repo: CounterDeviceStateRepository::new(conn),
        }
    }
}

impl DevicePauseNotifier for SqliteDevicePauseNotifier {
    fn set_paused(
        &self,
        counter_device_id: &str,
        paused: bool,
        now: NaiveDateTime,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.repo.set_paused(counter_device_id, paused, now)?;
        tracing::debug!(device = counter_device_id, paused, "设备暂停标志已同步");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_notifier_upserts_flag() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let now = NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let notifier = SqliteDevicePauseNotifier::new(conn.clone());
        let repo = CounterDeviceStateRepository::new(conn);
        assert_eq!(repo.is_paused("CNT-A").unwrap(), None);

        notifier.set_paused("CNT-A", true, now).unwrap();
        assert_eq!(repo.is_paused("CNT-A").unwrap(), Some(true));
        notifier.set_paused("CNT-A", false, now).unwrap();
        assert_eq!(repo.is_paused("CNT-A").unwrap(), Some(false));
    }
}

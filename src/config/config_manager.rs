// ==========================================
// 产线运行引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config_trait::EngineConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 默认调度周期（秒）
pub const DEFAULT_SCHEDULE_TICK_INTERVAL_SECS: u64 = 60;
/// 默认补建会话时长（分钟）
pub const DEFAULT_STUB_SESSION_MINUTES: i64 = 5;
/// 补建会话时长上限（分钟）
pub const MAX_STUB_SESSION_MINUTES: i64 = 24 * 60;
/// 默认自动操作人
pub const DEFAULT_AUTO_ACTION_ACTOR: &str = "system";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有 global 配置的快照（JSON格式，键有序）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    // ===== 引擎参数（同步读取，供 API / 调度循环使用） =====

    /// 调度周期（秒），非法值回退默认值
    pub fn schedule_tick_interval_secs(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(
            config_keys::SCHEDULE_TICK_INTERVAL_SECS,
            &DEFAULT_SCHEDULE_TICK_INTERVAL_SECS.to_string(),
        )?;
        Ok(match value.trim().parse::<u64>() {
            Ok(v) if v > 0 => v,
            _ => {
                tracing::warn!(
                    config_key = config_keys::SCHEDULE_TICK_INTERVAL_SECS,
                    raw_value = %value,
                    "调度周期配置无效，使用默认值"
                );
                DEFAULT_SCHEDULE_TICK_INTERVAL_SECS
            }
        })
    }

    /// 无活动会话报修时补建会话的回溯分钟数
    pub fn stub_session_minutes(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(
            config_keys::STUB_SESSION_MINUTES,
            &DEFAULT_STUB_SESSION_MINUTES.to_string(),
        )?;
        Ok(match value.trim().parse::<i64>() {
            Ok(v) if (0..=MAX_STUB_SESSION_MINUTES).contains(&v) => v,
            _ => {
                tracing::warn!(
                    config_key = config_keys::STUB_SESSION_MINUTES,
                    raw_value = %value,
                    "补建会话时长配置无效，使用默认值"
                );
                DEFAULT_STUB_SESSION_MINUTES
            }
        })
    }

    /// 业务日切换时是否自动计算前一日 OEE
    pub fn oee_auto_daily_enabled(&self) -> Result<bool, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::OEE_AUTO_DAILY_ENABLED, "true")?;
        Ok(!matches!(
            value.trim().to_lowercase().as_str(),
            "false" | "0" | "no" | "off"
        ))
    }

    /// 自动暂停 / 恢复记录的操作人
    pub fn auto_action_actor(&self) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::AUTO_ACTION_ACTOR, DEFAULT_AUTO_ACTION_ACTOR)?;
        let value = value.trim();
        Ok(if value.is_empty() {
            DEFAULT_AUTO_ACTION_ACTOR.to_string()
        } else {
            value.to_string()
        })
    }
}

// ==========================================
// EngineConfigReader Trait 实现
// ==========================================
#[async_trait]
impl EngineConfigReader for ConfigManager {
    async fn get_schedule_tick_interval_secs(&self) -> Result<u64, Box<dyn Error>> {
        self.schedule_tick_interval_secs()
    }

    async fn get_stub_session_minutes(&self) -> Result<i64, Box<dyn Error>> {
        self.stub_session_minutes()
    }

    async fn is_oee_auto_daily_enabled(&self) -> Result<bool, Box<dyn Error>> {
        self.oee_auto_daily_enabled()
    }

    async fn get_auto_action_actor(&self) -> Result<String, Box<dyn Error>> {
        self.auto_action_actor()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 调度循环
    pub const SCHEDULE_TICK_INTERVAL_SECS: &str = "schedule_tick_interval_secs";
    pub const AUTO_ACTION_ACTOR: &str = "auto_action_actor";

    // 报修
    pub const STUB_SESSION_MINUTES: &str = "stub_session_minutes";

    // OEE
    pub const OEE_AUTO_DAILY_ENABLED: &str = "oee_auto_daily_enabled";
}

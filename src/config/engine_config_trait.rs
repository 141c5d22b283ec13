// ==========================================
// 产线运行引擎 - 引擎配置读取 Trait
// ==========================================
// 职责: 定义宿主循环所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// EngineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait EngineConfigReader: Send + Sync {
    /// 调度循环周期（秒）
    ///
    /// # 默认值
    /// - 60
    async fn get_schedule_tick_interval_secs(&self) -> Result<u64, Box<dyn Error>>;

    /// 无活动会话报修时，补建会话向前回溯的分钟数
    ///
    /// # 默认值
    /// - 5
    async fn get_stub_session_minutes(&self) -> Result<i64, Box<dyn Error>>;

    /// 业务日切换时是否自动计算前一业务日的日 OEE
    ///
    /// # 默认值
    /// - true
    async fn is_oee_auto_daily_enabled(&self) -> Result<bool, Box<dyn Error>>;

    /// 自动暂停 / 恢复记录的操作人
    ///
    /// # 默认值
    /// - "system"
    async fn get_auto_action_actor(&self) -> Result<String, Box<dyn Error>>;
}

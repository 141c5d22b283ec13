// ==========================================
// 产线运行引擎 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和 API / 服务实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{IncidentApi, LineApi, LineMetricsRecalculator, OperationApi};
use crate::config::config_manager::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::events::{DevicePauseNotifier, OptionalNotificationPublisher};
use crate::repository::{
    ActionLogRepository, IncidentRepository, LineRepository, OeeRepository,
    ProductionHistoryRepository, SessionRepository, SqliteDevicePauseNotifier,
};
use crate::services::{OeeService, ScheduleController};

/// 应用状态
///
/// 所有仓储共享同一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub line_api: Arc<LineApi>,
    pub operation_api: Arc<OperationApi>,
    pub incident_api: Arc<IncidentApi>,

    /// 排班控制循环
    pub schedule_controller: Arc<ScheduleController>,

    /// OEE 计算服务
    pub oee_service: Arc<OeeService>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,

    /// 生产履历仓储（遥测回放 / 开发工具写入）
    pub history_repo: Arc<ProductionHistoryRepository>,
}

impl AppState {
    /// 创建 AppState（未接入通知通道，设备同步写本地状态表）
    ///
    /// # 错误
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));
        let device_notifier: Arc<dyn DevicePauseNotifier> =
            Arc::new(SqliteDevicePauseNotifier::new(conn.clone()));

        Self::with_collaborators(db_path, conn, OptionalNotificationPublisher::none(), device_notifier)
    }

    /// 使用指定的外部协作者创建 AppState
    ///
    /// 该方法会：
    /// 1. 确保表结构存在
    /// 2. 初始化所有 Repository
    /// 3. 创建所有 API / 服务实例
    pub fn with_collaborators(
        db_path: String,
        conn: Arc<Mutex<rusqlite::Connection>>,
        publisher: OptionalNotificationPublisher,
        device_notifier: Arc<dyn DevicePauseNotifier>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            ensure_schema(&guard).map_err(|e| format!("无法初始化表结构: {}", e))?;
        }

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let line_repo = Arc::new(LineRepository::new(conn.clone()));
        let session_repo = Arc::new(SessionRepository::new(conn.clone()));
        let incident_repo = Arc::new(IncidentRepository::new(conn.clone()));
        let oee_repo = Arc::new(OeeRepository::new(conn.clone()));
        let history_repo = Arc::new(ProductionHistoryRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化API层
        // ==========================================
        let recalculator = Arc::new(LineMetricsRecalculator::new(
            line_repo.clone(),
            session_repo.clone(),
            incident_repo.clone(),
        ));

        let line_api = Arc::new(LineApi::new(
            line_repo.clone(),
            action_log_repo.clone(),
            recalculator.clone(),
        ));

        let operation_api = Arc::new(OperationApi::new(
            line_repo.clone(),
            session_repo.clone(),
            incident_repo.clone(),
            action_log_repo.clone(),
            recalculator.clone(),
        ));

        let incident_api = Arc::new(IncidentApi::new(
            line_repo.clone(),
            session_repo.clone(),
            incident_repo.clone(),
            action_log_repo.clone(),
            recalculator,
            config_manager.clone(),
            Arc::new(publisher),
        ));

        // ==========================================
        // 初始化服务层
        // ==========================================
        let schedule_controller = Arc::new(ScheduleController::new(
            operation_api.clone(),
            line_repo.clone(),
            session_repo.clone(),
            device_notifier,
            config_manager.clone(),
        ));

        let oee_service = Arc::new(OeeService::new(
            line_repo,
            session_repo,
            incident_repo,
            oee_repo,
            history_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            line_api,
            operation_api,
            incident_api,
            schedule_controller,
            oee_service,
            config_manager,
            action_log_repo,
            history_repo,
        })
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 LINE_OPS_DB_PATH（非空时优先）
/// - 用户数据目录/line-ops-engine/line_ops.db
/// - 无法获取数据目录时: ./line_ops.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("LINE_OPS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./line_ops.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("line-ops-engine");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("line_ops.db");
        }
    }

    path.to_string_lossy().to_string()
}

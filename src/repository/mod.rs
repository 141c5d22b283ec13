// ==========================================
// 产线运行引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 多行写入在单个仓储方法内的事务中完成
// ==========================================

pub mod action_log_repo;
pub mod counter_device_repo;
pub mod error;
pub mod incident_repo;
pub mod line_repo;
pub mod oee_repo;
pub mod session_repo;
pub mod sql_time;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use counter_device_repo::{CounterDeviceStateRepository, SqliteDevicePauseNotifier};
pub use error::{RepositoryError, RepositoryResult};
pub use incident_repo::IncidentRepository;
pub use line_repo::LineRepository;
pub use oee_repo::{OeeRepository, ProductionHistoryRepository};
pub use session_repo::SessionRepository;

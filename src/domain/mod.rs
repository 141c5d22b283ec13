// ==========================================
// 产线运行引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、封闭状态枚举、纯状态变换
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod incident;
pub mod line;
pub mod oee;
pub mod session;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use incident::{IncidentReport, RepairIncident};
pub use line::{BreakWindow, DayMinute, Line, LineSchedule, Machine, RollingCounters};
pub use oee::{OeeRecord, ProductionHistory};
pub use session::{OperationSession, PauseHistoryEntry};
pub use types::{
    IncidentStatus, LineStatus, OeePeriodType, SessionStatus, TransitionOutcome,
    TransitionRejected,
};

// ==========================================
// 产线运行引擎 - 核心库
// ==========================================
// 范围: 运行会话生命周期、维修单、滚动 MTTR/MTBF、周期归档、排班自动暂停、OEE
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 引擎参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 服务层 - 周期任务
pub mod services;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{IncidentStatus, LineStatus, OeePeriodType, SessionStatus};

// 领域实体
pub use domain::{
    ActionLog, ActionType, IncidentReport, Line, LineSchedule, Machine, OeeRecord,
    OperationSession, RepairIncident,
};

// 引擎
pub use engine::{MetricsEngine, OeeCalculator, ScheduleEngine, ShiftClock};

// API
pub use api::{ApiError, ApiResult, IncidentApi, LineApi, OperationApi};

// 服务
pub use services::{OeeService, ScheduleController};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "产线运行引擎";

// ==========================================
// 产线运行引擎 - API 层
// ==========================================
// 职责: 编排仓储与引擎，对调用方提供用例级接口并归类错误
// ==========================================

pub mod error;
pub mod incident_api;
pub mod line_api;
pub mod line_metrics;
pub mod operation_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use incident_api::{IncidentApi, IncidentTransition};
pub use line_api::LineApi;
pub use line_metrics::LineMetricsRecalculator;
pub use operation_api::{OperationApi, SessionTransition};

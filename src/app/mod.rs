// ==========================================
// 产线运行引擎 - 应用层
// ==========================================
// 职责: 组装共享状态，供宿主进程与开发工具使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};

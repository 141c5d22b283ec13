// ==========================================
// 产线运行引擎 - 服务层
// ==========================================
// 职责: 周期任务（排班控制循环、OEE 批量计算）
// ==========================================

pub mod oee_service;
pub mod schedule_controller;

pub use oee_service::OeeService;
pub use schedule_controller::{ScheduleController, TickReport};

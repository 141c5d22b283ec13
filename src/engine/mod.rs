// ==========================================
// 产线运行引擎 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不访问数据库，输入输出均为领域对象
// ==========================================

pub mod events;
pub mod metrics;
pub mod oee;
pub mod schedule;
pub mod shift_clock;

// 重导出核心引擎
pub use events::{
    DevicePauseNotifier, LineStopEvent, NoOpDevicePauseNotifier, NoOpNotificationPublisher,
    NotificationEvent, NotificationPublisher, OptionalNotificationPublisher, RepairCompleteEvent,
};
pub use metrics::{AggregateRollup, MetricsEngine};
pub use oee::{OeeCalculator, OeeInput};
pub use schedule::{ScheduleDecision, ScheduleEngine};
pub use shift_clock::ShiftClock;

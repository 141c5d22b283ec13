// ==========================================
// 产线运行引擎 - 引擎层外部协作接口
// ==========================================
// 职责: 定义通知事件与设备暂停同步 trait，实现依赖倒置
// 说明: 投递 / 设备写入失败只记录日志，不回滚引擎事务
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 通知事件
// ==========================================

/// 停线通知（报修时发出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineStopEvent {
    pub report_number: String,
    pub line: String,
    pub machine: String,
    pub problem: String,
    pub reported_by: String,
    pub shift: u8,
}

/// 维修完成通知
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairCompleteEvent {
    pub report_number: String,
    pub line: String,
    pub machine: String,
    /// 维修时长（分钟）
    pub repair_duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    LineStop(LineStopEvent),
    RepairComplete(RepairCompleteEvent),
}

impl NotificationEvent {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationEvent::LineStop(_) => "line_stop",
            NotificationEvent::RepairComplete(_) => "repair_complete",
        }
    }

    pub fn report_number(&self) -> &str {
        match self {
            NotificationEvent::LineStop(e) => &e.report_number,
            NotificationEvent::RepairComplete(e) => &e.report_number,
        }
    }
}

// ==========================================
// 通知发布 Trait
// ==========================================

/// 通知发布者
///
/// # 返回
/// - `Ok(message_id)`: 外部消息 ID（如果支持）或空字符串
/// - `Err`: 投递失败
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作发布者（单元测试 / 未接入推送通道）
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationPublisher;

impl NotificationPublisher for NoOpNotificationPublisher {
    fn publish(&self, event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpNotificationPublisher: 跳过通知 - type={}, report_number={}",
            event.as_str(),
            event.report_number()
        );
        Ok(String::new())
    }
}

/// 可选的通知发布者包装
pub struct OptionalNotificationPublisher {
    inner: Option<Arc<dyn NotificationPublisher>>,
}

impl OptionalNotificationPublisher {
    pub fn with_publisher(publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn publish(&self, event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalNotificationPublisher: 未配置发布者，跳过通知 - type={}",
                    event.as_str()
                );
                Ok(String::new())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalNotificationPublisher {
    fn default() -> Self {
        Self::none()
    }
}

// ==========================================
// 设备暂停同步 Trait
// ==========================================

/// 计数设备暂停状态同步（自动暂停 / 恢复时尽力写入）
pub trait DevicePauseNotifier: Send + Sync {
    fn set_paused(
        &self,
        counter_device_id: &str,
        paused: bool,
        now: NaiveDateTime,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Clone, Default)]
pub struct NoOpDevicePauseNotifier;

impl DevicePauseNotifier for NoOpDevicePauseNotifier {
    fn set_paused(
        &self,
        counter_device_id: &str,
        paused: bool,
        _now: NaiveDateTime,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpDevicePauseNotifier: 跳过设备同步 - device={}, paused={}",
            counter_device_id,
            paused
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPublisher {
        seen: Mutex<Vec<String>>,
    }

    impl NotificationPublisher for RecordingPublisher {
        fn publish(&self, event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(event.report_number().to_string());
            Ok("msg-1".to_string())
        }
    }

    fn line_stop() -> NotificationEvent {
        NotificationEvent::LineStop(LineStopEvent {
            report_number: "RPT-20250310-ABCDEF12".to_string(),
            line: "LINE-A".to_string(),
            machine: "PRESS-01".to_string(),
            problem: "液压泄漏".to_string(),
            reported_by: "op".to_string(),
            shift: 1,
        })
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(line_stop()).unwrap();
        assert_eq!(json["type"], "line_stop");
        assert_eq!(json["machine"], "PRESS-01");
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalNotificationPublisher::none();
        assert!(!publisher.is_configured());
        assert!(publisher.publish(line_stop()).unwrap().is_empty());
    }

    #[test]
    fn test_optional_publisher_forwards() {
        let inner = Arc::new(RecordingPublisher {
            seen: Mutex::new(Vec::new()),
        });
        let publisher =
            OptionalNotificationPublisher::with_publisher(inner.clone() as Arc<dyn NotificationPublisher>);
        assert_eq!(publisher.publish(line_stop()).unwrap(), "msg-1");
        assert_eq!(inner.seen.lock().unwrap().len(), 1);
    }
}

// ==========================================
// 产线运行引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有状态变换必须记录
// 用途: 审计追踪
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub line_id: Option<String>,
    pub action_type: String, // ActionType::as_str()
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

impl ActionLog {
    pub fn new(
        line_id: &str,
        action_type: ActionType,
        actor: &str,
        now: NaiveDateTime,
        payload: Option<JsonValue>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            line_id: Some(line_id.to_string()),
            action_type: action_type.as_str().to_string(),
            action_ts: now,
            actor: actor.to_string(),
            payload_json: payload,
            detail: Some(detail.into()),
        }
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    StartOperation,  // 开始运行
    PauseOperation,  // 人工暂停
    ResumeOperation, // 人工恢复
    AutoPause,       // 排班自动暂停
    AutoResume,      // 排班自动恢复
    StopOperation,   // 停止运行
    ReportIncident,  // 报修
    StartRepair,     // 开始维修
    CompleteRepair,  // 完成维修
    ResetPeriod,     // 周期归档重置
    UpdateSchedule,  // 修改排班
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::StartOperation => "START_OPERATION",
            ActionType::PauseOperation => "PAUSE_OPERATION",
            ActionType::ResumeOperation => "RESUME_OPERATION",
            ActionType::AutoPause => "AUTO_PAUSE",
            ActionType::AutoResume => "AUTO_RESUME",
            ActionType::StopOperation => "STOP_OPERATION",
            ActionType::ReportIncident => "REPORT_INCIDENT",
            ActionType::StartRepair => "START_REPAIR",
            ActionType::CompleteRepair => "COMPLETE_REPAIR",
            ActionType::ResetPeriod => "RESET_PERIOD",
            ActionType::UpdateSchedule => "UPDATE_SCHEDULE",
        }
    }
}

// ==========================================
// 产线运行引擎 - 领域类型定义
// ==========================================
// 状态一律为封闭枚举，数据库中以 SCREAMING_SNAKE_CASE 字符串存储
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 产线状态 (Line Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Stopped,     // 停机
    Operating,   // 运行中
    Maintenance, // 故障维修中
    Paused,      // 暂停
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LineStatus {
    /// 从数据库字符串解析（未知值回落为 STOPPED）
    pub fn from_db_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "OPERATING" => LineStatus::Operating,
            "MAINTENANCE" => LineStatus::Maintenance,
            "PAUSED" => LineStatus::Paused,
            _ => LineStatus::Stopped,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LineStatus::Stopped => "STOPPED",
            LineStatus::Operating => "OPERATING",
            LineStatus::Maintenance => "MAINTENANCE",
            LineStatus::Paused => "PAUSED",
        }
    }
}

// ==========================================
// 运行会话状态 (Session Status)
// ==========================================
// 终态: Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl SessionStatus {
    pub fn from_db_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "RUNNING" => SessionStatus::Running,
            "PAUSED" => SessionStatus::Paused,
            _ => SessionStatus::Stopped,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "RUNNING",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Stopped => "STOPPED",
        }
    }

    /// 是否为活动会话（RUNNING / PAUSED）
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }
}

// ==========================================
// 维修单状态 (Incident Status)
// ==========================================
// 终态: Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Reported, // 已报修
    InRepair, // 维修中
    Completed, // 已完成
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl IncidentStatus {
    pub fn from_db_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "IN_REPAIR" => IncidentStatus::InRepair,
            "COMPLETED" => IncidentStatus::Completed,
            _ => IncidentStatus::Reported,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            IncidentStatus::Reported => "REPORTED",
            IncidentStatus::InRepair => "IN_REPAIR",
            IncidentStatus::Completed => "COMPLETED",
        }
    }
}

// ==========================================
// OEE 统计周期 (OEE Period Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OeePeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for OeePeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl OeePeriodType {
    pub fn from_db_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WEEKLY" => OeePeriodType::Weekly,
            "MONTHLY" => OeePeriodType::Monthly,
            _ => OeePeriodType::Daily,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OeePeriodType::Daily => "DAILY",
            OeePeriodType::Weekly => "WEEKLY",
            OeePeriodType::Monthly => "MONTHLY",
        }
    }
}

// ==========================================
// 状态变换结果
// ==========================================

/// 状态变换结果（前置条件不满足时为空操作，不报错）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// 已应用
    Applied,
    /// 空操作（附提示信息）
    NoOp(&'static str),
}

impl TransitionOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, TransitionOutcome::NoOp(_))
    }
}

/// 被拒绝的状态变换
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub from: String,
    pub to: String,
}

impl TransitionRejected {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "无效的状态转换: from={} to={}", self.from, self.to)
    }
}

// ==========================================
// 产线运行引擎 - OEE 领域模型
// ==========================================
// 对齐: oee_record / production_history 表
// ==========================================

use crate::domain::types::OeePeriodType;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionHistory - 计数设备生产履历（外部数据，只读）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionHistory {
    pub history_id: i64,
    pub counter_device_id: String,
    pub counter_a_total: i64, // 产出计数
    pub reject_total: i64,    // 不良计数
    pub cycle_time: f64,      // 节拍（秒）
    pub max_count: i64,       // 目标计数
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub shift: Option<u8>,
}

// ==========================================
// OeeRecord - OEE 记录
// ==========================================
// 唯一键: (line_id, period_type, period_date)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OeeRecord {
    pub record_id: String,
    pub line_id: String,
    pub period_type: OeePeriodType,
    pub period_date: NaiveDate,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub shift: u8,

    // ===== 时间 (小时) =====
    pub operation_time_hours: f64,
    pub uptime_hours: f64,
    pub downtime_hours: f64,

    // ===== 计数 =====
    pub total_count: i64,
    pub good_count: i64,
    pub reject_count: i64,
    pub target_count: i64,
    pub avg_cycle_time: f64,

    // ===== 指标 (%) =====
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub achievement_rate: f64,
    pub oee: f64,

    pub total_failures: i64,
    pub calculated_at: NaiveDateTime,
}

// ==========================================
// 产线运行引擎 - 产线/设备领域模型
// ==========================================
// 对齐: production_line / line_machine 表
// 说明: 归档行是独立副本，parent_line_id 仅用于历史查询（非拥有关系）
// ==========================================

use crate::domain::types::LineStatus;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// ==========================================
// DayMinute - 一日内的分钟刻度
// ==========================================
// 取值 0..=1440；1440 即 "24:00"，仅用作休息时段的结束边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayMinute(u16);

impl DayMinute {
    pub const END_OF_DAY: DayMinute = DayMinute(24 * 60);

    /// 解析 "HH:MM"（兼容 "HH:MM:SS"，秒必须为 0）；允许 "24:00"
    pub fn parse(s: &str) -> Result<Self, String> {
        let raw = s.trim();
        let parts: Vec<&str> = raw.split(':').collect();
        if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.len() != 2) {
            return Err(format!("时间格式错误 '{}': 应为 HH:MM", raw));
        }
        let mut fields = [0u16; 3];
        for (i, part) in parts.iter().enumerate() {
            fields[i] = part
                .parse::<u16>()
                .map_err(|e| format!("时间格式错误 '{}': {}", raw, e))?;
        }
        let [hour, minute, second] = fields;
        let valid = match hour {
            0..=23 => minute < 60 && second < 60,
            24 => minute == 0 && second == 0,
            _ => false,
        };
        if !valid {
            return Err(format!("时间格式错误 '{}': input is out of range", raw));
        }
        Ok(DayMinute(hour * 60 + minute))
    }

    /// 时刻所在分钟（秒被截断）
    pub fn of(t: NaiveTime) -> Self {
        DayMinute((t.hour() * 60 + t.minute()) as u16)
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for DayMinute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for DayMinute {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DayMinute::parse(&value)
    }
}

impl From<DayMinute> for String {
    fn from(value: DayMinute) -> Self {
        value.to_string()
    }
}

// ==========================================
// BreakWindow - 休息时段
// ==========================================
// 区间语义 [start, end)，精度为分钟；不允许跨零点，
// 跨零点的休息拆成 "23:45-24:00" 与 "00:00-00:15" 两个时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindow {
    pub start: DayMinute,
    pub end: DayMinute,
}

impl BreakWindow {
    pub fn new(start: DayMinute, end: DayMinute) -> Self {
        Self { start, end }
    }

    /// 从 "HH:MM" 字符串构造
    pub fn parse(start: &str, end: &str) -> Result<Self, String> {
        let start = DayMinute::parse(start)?;
        let end = DayMinute::parse(end)?;
        Ok(Self { start, end })
    }

    /// 校验时段合法性
    pub fn validate(&self) -> Result<(), String> {
        if self.start >= self.end || self.start == DayMinute::END_OF_DAY {
            return Err(format!(
                "休息时段无效: {}-{}（开始必须早于结束，跨零点请拆分为两个时段）",
                self.start, self.end
            ));
        }
        Ok(())
    }

    /// 判断某时刻是否落在时段内（精度: 分钟）
    pub fn contains(&self, t: NaiveTime) -> bool {
        let minute = DayMinute::of(t);
        self.start <= minute && minute < self.end
    }
}

/// 解析 "HH:MM"（也兼容 "HH:MM:SS"）
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| format!("时间格式错误 '{}': {}", s, e))
}

// ==========================================
// LineSchedule - 产线日排班
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSchedule {
    // start_time > end_time 为跨零点班次；二者相等为全天
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_windows: Vec<BreakWindow>, // 按开始时间排序
}

impl LineSchedule {
    /// 校验并排序休息时段
    pub fn normalized(mut self) -> Result<Self, String> {
        for window in &self.break_windows {
            window.validate()?;
        }
        self.break_windows.sort_by_key(|w| w.start);
        Ok(self)
    }

    /// 当前时刻是否处于任一休息时段
    pub fn is_in_break_time(&self, now: NaiveDateTime) -> bool {
        let t = now.time();
        self.break_windows.iter().any(|w| w.contains(t))
    }
}

impl Default for LineSchedule {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default(),
            break_windows: Vec::new(),
        }
    }
}

// ==========================================
// RollingCounters - 滚动累计指标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingCounters {
    pub total_operation_hours: f64,
    pub total_repair_hours: f64,
    pub total_failures: i64,
    pub average_mttr: f64, // 小时
    pub average_mtbf: f64, // 小时
}

impl RollingCounters {
    pub fn zero() -> Self {
        Self::default()
    }
}

// ==========================================
// Line - 产线
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    // ===== 标识 =====
    pub line_id: String,
    pub line_code: String,
    pub line_name: String,
    pub plant: Option<String>,
    pub description: Option<String>,

    // ===== 状态 =====
    pub status: LineStatus,
    pub counter_device_id: Option<String>, // 计数设备（外部遥测）
    pub schedule: LineSchedule,
    pub line_stopped_at: Option<NaiveDateTime>, // 待处理停线时间（故障期间保持）

    // ===== 滚动指标 =====
    pub counters: RollingCounters,

    // ===== 归档 =====
    pub is_archived: bool,
    pub current_period_start: Option<NaiveDateTime>,
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    pub parent_line_id: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Line {
    /// 创建新产线（停机状态，计数清零）
    pub fn new(
        line_code: String,
        line_name: String,
        plant: Option<String>,
        counter_device_id: Option<String>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            line_id: uuid::Uuid::new_v4().to_string(),
            line_code,
            line_name,
            plant,
            description: None,
            status: LineStatus::Stopped,
            counter_device_id,
            schedule: LineSchedule::default(),
            line_stopped_at: None,
            counters: RollingCounters::zero(),
            is_archived: false,
            current_period_start: Some(now),
            period_start: None,
            period_end: None,
            parent_line_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 当前统计周期起点（未设置时取创建时间）
    pub fn effective_period_start(&self) -> NaiveDateTime {
        self.current_period_start.unwrap_or(self.created_at)
    }
}

// ==========================================
// Machine - 设备
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub machine_id: String,
    pub line_id: String,
    pub machine_code: String,
    pub machine_name: String,
    pub counters: RollingCounters,
    pub is_archived: bool,
    pub period_start: Option<NaiveDateTime>,
    pub period_end: Option<NaiveDateTime>,
    pub parent_machine_id: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Machine {
    pub fn new(line_id: String, machine_code: String, machine_name: String, now: NaiveDateTime) -> Self {
        Self {
            machine_id: uuid::Uuid::new_v4().to_string(),
            line_id,
            machine_code,
            machine_name,
            counters: RollingCounters::zero(),
            is_archived: false,
            period_start: None,
            period_end: None,
            parent_machine_id: None,
            created_at: now,
        }
    }
}

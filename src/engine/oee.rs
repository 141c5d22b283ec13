// ==========================================
// 产线运行引擎 - OEE 计算引擎
// ==========================================
// 职责: 对 (产线, 周期) 汇总生产履历 + 运行时间 + 停机时间 → OEE
// 公式: OEE = Availability × Performance × Quality / 10000
// 红线: 数据不足时返回 None，绝不输出半成品记录
// ==========================================

use crate::domain::incident::RepairIncident;
use crate::domain::oee::{OeeRecord, ProductionHistory};
use crate::domain::session::OperationSession;
use crate::domain::types::{IncidentStatus, OeePeriodType, SessionStatus};
use crate::engine::shift_clock::ShiftClock;
use chrono::NaiveDateTime;
use tracing::instrument;

/// OEE 计算输入（数据由调用方按窗口预取，引擎内再按规则过滤）
#[derive(Debug, Clone)]
pub struct OeeInput<'a> {
    pub line_id: &'a str,
    pub period_type: OeePeriodType,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub history: &'a [ProductionHistory],
    pub sessions: &'a [OperationSession],
    pub incidents: &'a [RepairIncident],
}

// ==========================================
// OeeCalculator
// ==========================================
#[derive(Debug, Default)]
pub struct OeeCalculator;

impl OeeCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 计算 OEE
    ///
    /// # 返回
    /// - `None`: 窗口内无生产履历，或运行时间为 0
    /// - `Some(record)`: 完整的 OEE 记录（record_id 为新 UUID，持久化时按周期键覆盖）
    #[instrument(skip(self, input), fields(line_id = %input.line_id))]
    pub fn calculate(&self, input: &OeeInput<'_>, now: NaiveDateTime) -> Option<OeeRecord> {
        let history: Vec<&ProductionHistory> = input
            .history
            .iter()
            .filter(|h| h.started_at >= input.period_start && h.started_at < input.period_end)
            .collect();
        if history.is_empty() {
            tracing::debug!("窗口内无生产履历，跳过 OEE 计算");
            return None;
        }

        // ----- 计数 -----
        let total_count: i64 = history.iter().map(|h| h.counter_a_total).sum();
        let reject_count: i64 = history.iter().map(|h| h.reject_total).sum();
        let target_count: i64 = history.iter().map(|h| h.max_count).sum();
        let avg_cycle_time =
            history.iter().map(|h| h.cycle_time).sum::<f64>() / history.len() as f64;
        let good_count = total_count - reject_count;

        // ----- 运行时间：完全落在窗口内的已停止会话 -----
        let operation_minutes: f64 = input
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Stopped)
            .filter(|s| {
                s.started_at >= input.period_start
                    && s.stopped_at.map_or(false, |t| t <= input.period_end)
            })
            .filter_map(|s| s.duration_minutes)
            .sum();
        let operation_time_hours = operation_minutes / 60.0;
        if operation_time_hours <= 0.0 {
            tracing::debug!("窗口内运行时间为 0，无法计算可用率");
            return None;
        }

        // ----- 停机时间：窗口内完成的维修，按整秒取整 -----
        let completed: Vec<&RepairIncident> = input
            .incidents
            .iter()
            .filter(|i| i.line_id == input.line_id && i.status == IncidentStatus::Completed)
            .filter(|i| {
                i.completed_at
                    .map_or(false, |t| t >= input.period_start && t < input.period_end)
            })
            .collect();
        let downtime_seconds: i64 = completed
            .iter()
            .map(|i| (i.repair_duration_minutes.unwrap_or(0.0) * 60.0).round() as i64)
            .sum();
        let downtime_hours = downtime_seconds as f64 / 3600.0;

        let uptime_hours = (operation_time_hours - downtime_hours).max(0.0);

        // ----- 指标 -----
        let availability = uptime_hours / operation_time_hours * 100.0;
        let performance = if uptime_hours > 0.0 {
            (avg_cycle_time * total_count as f64) / (uptime_hours * 3600.0) * 100.0
        } else {
            0.0
        };
        let quality = if total_count > 0 {
            good_count as f64 / total_count as f64 * 100.0
        } else {
            0.0
        };
        let achievement_rate = if target_count > 0 {
            total_count as f64 / target_count as f64 * 100.0
        } else {
            0.0
        };
        let oee = availability * performance * quality / 10000.0;

        let shift = self.resolve_shift(input, &history);

        Some(OeeRecord {
            record_id: uuid::Uuid::new_v4().to_string(),
            line_id: input.line_id.to_string(),
            period_type: input.period_type,
            period_date: ShiftClock::effective_date(input.period_start),
            period_start: input.period_start,
            period_end: input.period_end,
            shift,
            operation_time_hours,
            uptime_hours,
            downtime_hours,
            total_count,
            good_count,
            reject_count,
            target_count,
            avg_cycle_time,
            availability,
            performance,
            quality,
            achievement_rate,
            oee,
            total_failures: completed.len() as i64,
            calculated_at: now,
        })
    }

    /// 班次标记: 首条履历 → 重叠会话 → 周期起点
    fn resolve_shift(&self, input: &OeeInput<'_>, history: &[&ProductionHistory]) -> u8 {
        if let Some(shift) = history.first().and_then(|h| h.shift) {
            return shift;
        }

        let overlapping = input.sessions.iter().find(|s| {
            s.started_at < input.period_end
                && s.stopped_at.map_or(true, |t| t > input.period_start)
        });
        match overlapping {
            Some(s) => ShiftClock::current_shift(s.started_at.max(input.period_start)),
            None => ShiftClock::current_shift(input.period_start),
        }
    }
}

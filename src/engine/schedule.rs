// ==========================================
// 产线运行引擎 - 排班判定引擎
// ==========================================
// 职责: 根据产线休息时段判定会话应自动暂停 / 自动恢复 / 保持
// 规则:
// - 休息时段内且会话 RUNNING → AutoPause
// - 休息时段外且会话 PAUSED 且 is_auto_paused → AutoResume
// - 人工暂停（is_auto_paused=false）永不自动恢复
// ==========================================

use crate::domain::line::LineSchedule;
use crate::domain::session::OperationSession;
use crate::domain::types::SessionStatus;
use chrono::NaiveDateTime;

/// 排班判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    AutoPause,
    AutoResume,
    Keep,
}

#[derive(Debug, Default)]
pub struct ScheduleEngine;

impl ScheduleEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(
        &self,
        session: &OperationSession,
        schedule: &LineSchedule,
        now: NaiveDateTime,
    ) -> ScheduleDecision {
        let in_break = schedule.is_in_break_time(now);
        match session.status {
            SessionStatus::Running if in_break => ScheduleDecision::AutoPause,
            SessionStatus::Paused if !in_break && session.is_auto_paused => {
                ScheduleDecision::AutoResume
            }
            _ => ScheduleDecision::Keep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::line::BreakWindow;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn schedule() -> LineSchedule {
        LineSchedule {
            break_windows: vec![BreakWindow::parse("09:00", "09:30").unwrap()],
            ..LineSchedule::default()
        }
    }

    #[test]
    fn test_running_in_break_pauses() {
        let engine = ScheduleEngine::new();
        let session = OperationSession::start("L1", "op", at(8, 0));
        assert_eq!(engine.decide(&session, &schedule(), at(9, 0)), ScheduleDecision::AutoPause);
        assert_eq!(engine.decide(&session, &schedule(), at(9, 29)), ScheduleDecision::AutoPause);
        assert_eq!(engine.decide(&session, &schedule(), at(9, 30)), ScheduleDecision::Keep);
    }

    #[test]
    fn test_auto_paused_resumes_after_break() {
        let engine = ScheduleEngine::new();
        let mut session = OperationSession::start("L1", "op", at(8, 0));
        session.pause("system", true, at(9, 0));
        assert_eq!(engine.decide(&session, &schedule(), at(9, 15)), ScheduleDecision::Keep);
        assert_eq!(engine.decide(&session, &schedule(), at(9, 30)), ScheduleDecision::AutoResume);
    }

    #[test]
    fn test_manual_pause_never_auto_resumes() {
        let engine = ScheduleEngine::new();
        let mut session = OperationSession::start("L1", "op", at(8, 0));
        session.pause("op", false, at(8, 30));
        assert_eq!(engine.decide(&session, &schedule(), at(10, 0)), ScheduleDecision::Keep);
    }
}

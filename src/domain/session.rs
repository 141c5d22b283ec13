// ==========================================
// 产线运行引擎 - 运行会话领域模型
// ==========================================
// 状态机: RUNNING → PAUSED → RUNNING → … → STOPPED（终态）
// 说明: 本模块只做纯状态变换，持久化与并发控制由仓储层负责
// ==========================================

use crate::domain::types::{SessionStatus, TransitionOutcome, TransitionRejected};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// PauseHistoryEntry - 暂停记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseHistoryEntry {
    pub paused_at: NaiveDateTime,
    pub paused_by: String,
    pub automatic: bool,
    pub resumed_at: Option<NaiveDateTime>,
    pub resumed_by: Option<String>,
    pub duration_minutes: Option<f64>,
}

// ==========================================
// OperationSession - 运行会话
// ==========================================
// 对齐: operation_session 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSession {
    pub session_id: String,
    pub line_id: String,
    pub status: SessionStatus,

    // ===== 时间 =====
    pub started_at: NaiveDateTime,
    pub started_by: String,
    pub stopped_at: Option<NaiveDateTime>,
    pub stopped_by: Option<String>,
    pub paused_at: Option<NaiveDateTime>,
    pub resumed_at: Option<NaiveDateTime>,

    // ===== 暂停累计 =====
    pub total_pause_minutes: f64,
    pub is_auto_paused: bool,
    pub pause_history: Vec<PauseHistoryEntry>,

    // ===== 停止时计算（之后不可变）=====
    pub duration_minutes: Option<f64>, // 净运行分钟（已扣除暂停）
    pub mtbf_hours: Option<f64>,

    /// 报修时无活动会话而自动补建的会话
    pub is_stub: bool,

    /// 乐观锁版本号
    pub revision: i64,
}

impl OperationSession {
    /// 开始新会话
    pub fn start(line_id: &str, by: &str, now: NaiveDateTime) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            line_id: line_id.to_string(),
            status: SessionStatus::Running,
            started_at: now,
            started_by: by.to_string(),
            stopped_at: None,
            stopped_by: None,
            paused_at: None,
            resumed_at: None,
            total_pause_minutes: 0.0,
            is_auto_paused: false,
            pause_history: Vec::new(),
            duration_minutes: None,
            mtbf_hours: None,
            is_stub: false,
            revision: 0,
        }
    }

    /// 暂停（仅 RUNNING 时生效，否则为空操作）
    pub fn pause(&mut self, by: &str, automatic: bool, now: NaiveDateTime) -> TransitionOutcome {
        match self.status {
            SessionStatus::Running => {
                self.status = SessionStatus::Paused;
                self.paused_at = Some(now);
                self.is_auto_paused = automatic;
                self.pause_history.push(PauseHistoryEntry {
                    paused_at: now,
                    paused_by: by.to_string(),
                    automatic,
                    resumed_at: None,
                    resumed_by: None,
                    duration_minutes: None,
                });
                TransitionOutcome::Applied
            }
            SessionStatus::Paused => TransitionOutcome::NoOp("会话已处于暂停状态"),
            SessionStatus::Stopped => TransitionOutcome::NoOp("会话已停止"),
        }
    }

    /// 恢复（仅 PAUSED 时生效，否则为空操作）
    ///
    /// 暂停时长只在此处根据唯一的 paused_at 计算一次
    pub fn resume(&mut self, by: &str, now: NaiveDateTime) -> TransitionOutcome {
        match self.status {
            SessionStatus::Paused => {
                self.close_open_pause(by, now);
                self.status = SessionStatus::Running;
                self.resumed_at = Some(now);
                TransitionOutcome::Applied
            }
            SessionStatus::Running => TransitionOutcome::NoOp("会话已处于运行状态"),
            SessionStatus::Stopped => TransitionOutcome::NoOp("会话已停止"),
        }
    }

    /// 排班自动恢复：只恢复自动暂停，人工暂停为空操作
    pub fn auto_resume(&mut self, by: &str, now: NaiveDateTime) -> TransitionOutcome {
        if self.status == SessionStatus::Paused && !self.is_auto_paused {
            return TransitionOutcome::NoOp("人工暂停需人工恢复");
        }
        self.resume(by, now)
    }

    /// 停止并计算指标
    ///
    /// # 参数
    /// - `failures`: 本会话下已完成的维修单数量
    ///
    /// 停止时若仍处于暂停，未结束的暂停按停止时间结算
    pub fn stop(
        &mut self,
        by: &str,
        failures: i64,
        now: NaiveDateTime,
    ) -> Result<(), TransitionRejected> {
        if self.status == SessionStatus::Stopped {
            return Err(TransitionRejected::new(
                self.status.to_db_str(),
                SessionStatus::Stopped.to_db_str(),
            ));
        }

        if self.status == SessionStatus::Paused {
            self.close_open_pause(by, now);
        }

        self.status = SessionStatus::Stopped;
        self.stopped_at = Some(now);
        self.stopped_by = Some(by.to_string());
        self.calculate_metrics(failures);
        Ok(())
    }

    /// 净运行秒数 = (stopped_at - started_at) - 暂停时长，最小为 0
    pub fn net_seconds(&self) -> f64 {
        let end = match self.stopped_at {
            Some(t) => t,
            None => return 0.0,
        };
        let gross = (end - self.started_at).num_seconds() as f64;
        (gross - self.total_pause_minutes * 60.0).max(0.0)
    }

    fn calculate_metrics(&mut self, failures: i64) {
        let net_seconds = self.net_seconds();
        let net_hours = net_seconds / 3600.0;
        self.duration_minutes = Some(net_seconds / 60.0);
        self.mtbf_hours = Some(if failures > 0 {
            net_hours / failures as f64
        } else {
            net_hours
        });
    }

    fn close_open_pause(&mut self, by: &str, now: NaiveDateTime) {
        let pause_minutes = self
            .paused_at
            .map(|p| ((now - p).num_seconds().max(0) as f64) / 60.0)
            .unwrap_or(0.0);

        self.total_pause_minutes += pause_minutes;
        if let Some(entry) = self
            .pause_history
            .iter_mut()
            .rev()
            .find(|e| e.resumed_at.is_none())
        {
            entry.resumed_at = Some(now);
            entry.resumed_by = Some(by.to_string());
            entry.duration_minutes = Some(pause_minutes);
        }
        self.paused_at = None;
        self.is_auto_paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_pause_resume_accumulates_pause_minutes() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));

        assert_eq!(s.pause("system", true, at(9, 0)), TransitionOutcome::Applied);
        assert!(s.is_auto_paused);
        assert_eq!(s.resume("system", at(9, 30)), TransitionOutcome::Applied);
        assert!(!s.is_auto_paused);

        assert_eq!(s.pause("op", false, at(12, 0)), TransitionOutcome::Applied);
        assert_eq!(s.resume("op", at(12, 45)), TransitionOutcome::Applied);

        assert_eq!(s.total_pause_minutes, 75.0);
        assert_eq!(s.pause_history.len(), 2);
        assert_eq!(s.pause_history[0].duration_minutes, Some(30.0));
        assert_eq!(s.pause_history[1].duration_minutes, Some(45.0));
    }

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));

        assert!(s.resume("op", at(8, 10)).is_noop());
        s.pause("op", false, at(9, 0));
        let snapshot = s.clone();
        assert!(s.pause("system", true, at(9, 5)).is_noop());

        assert_eq!(s.paused_at, snapshot.paused_at);
        assert_eq!(s.pause_history.len(), 1);
        assert!(!s.is_auto_paused);
    }

    #[test]
    fn test_auto_resume_leaves_manual_pause() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.pause("op", false, at(9, 0));
        assert!(s.auto_resume("system", at(9, 30)).is_noop());
        assert_eq!(s.status, SessionStatus::Paused);
        assert_eq!(s.paused_at, Some(at(9, 0)));

        assert_eq!(s.resume("op", at(9, 40)), TransitionOutcome::Applied);
        s.pause("system", true, at(12, 0));
        assert_eq!(s.auto_resume("system", at(12, 30)), TransitionOutcome::Applied);
        assert_eq!(s.total_pause_minutes, 70.0);
    }

    #[test]
    fn test_stop_computes_net_duration_and_mtbf() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.pause("system", true, at(9, 0));
        s.resume("system", at(9, 30));
        s.stop("op", 0, at(10, 0)).unwrap();

        assert_eq!(s.status, SessionStatus::Stopped);
        assert_eq!(s.total_pause_minutes, 30.0);
        assert_eq!(s.duration_minutes, Some(90.0));
        assert_eq!(s.mtbf_hours, Some(1.5));
    }

    #[test]
    fn test_stop_mtbf_divides_by_failures() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.stop("op", 2, at(12, 0)).unwrap();
        assert_eq!(s.mtbf_hours, Some(2.0));
    }

    #[test]
    fn test_stop_while_paused_closes_open_pause() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.pause("op", false, at(9, 0));
        s.stop("op", 0, at(9, 20)).unwrap();

        assert_eq!(s.total_pause_minutes, 20.0);
        assert_eq!(s.duration_minutes, Some(60.0));
        assert!(s.paused_at.is_none());
        assert_eq!(s.pause_history[0].resumed_at, Some(at(9, 20)));
    }

    #[test]
    fn test_double_stop_is_rejected() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.stop("op", 0, at(9, 0)).unwrap();
        let err = s.stop("op", 0, at(9, 5)).unwrap_err();
        assert_eq!(err.from, "STOPPED");
        assert_eq!(s.stopped_at, Some(at(9, 0)));
    }

    #[test]
    fn test_net_seconds_clamped_at_zero() {
        let mut s = OperationSession::start("L1", "op", at(8, 0));
        s.total_pause_minutes = 500.0;
        s.stop("op", 0, at(9, 0)).unwrap();
        assert_eq!(s.duration_minutes, Some(0.0));
    }
}

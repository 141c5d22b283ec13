// ==========================================
// 产线运行引擎 - 运行会话 API
// ==========================================
// 职责: 开始 / 暂停 / 恢复 / 停止运行，会话查询
// 并发: 每次变换基于最新读取的 revision 做 CAS 写入，过期写入被拒绝
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::line_metrics::LineMetricsRecalculator;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::session::OperationSession;
use crate::domain::types::{LineStatus, SessionStatus, TransitionOutcome};
use crate::repository::{ActionLogRepository, IncidentRepository, LineRepository, SessionRepository};

/// 会话状态变换结果
#[derive(Debug, Clone)]
pub struct SessionTransition {
    pub session: OperationSession,
    pub outcome: TransitionOutcome,
}

impl SessionTransition {
    pub fn applied(&self) -> bool {
        !self.outcome.is_noop()
    }
}

// ==========================================
// OperationApi - 运行会话 API
// ==========================================
pub struct OperationApi {
    line_repo: Arc<LineRepository>,
    session_repo: Arc<SessionRepository>,
    incident_repo: Arc<IncidentRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    recalculator: Arc<LineMetricsRecalculator>,
}

impl OperationApi {
    pub fn new(
        line_repo: Arc<LineRepository>,
        session_repo: Arc<SessionRepository>,
        incident_repo: Arc<IncidentRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        recalculator: Arc<LineMetricsRecalculator>,
    ) -> Self {
        Self {
            line_repo,
            session_repo,
            incident_repo,
            action_log_repo,
            recalculator,
        }
    }

    // ==========================================
    // 开始运行
    // ==========================================

    pub fn start(&self, line_id: &str, by: &str) -> ApiResult<OperationSession> {
        self.start_at(line_id, by, chrono::Local::now().naive_local())
    }

    /// 开始运行
    ///
    /// # 错误
    /// - `Conflict`: 产线已有 RUNNING/PAUSED 会话
    /// - `NotFound`: 产线不存在
    pub fn start_at(&self, line_id: &str, by: &str, now: NaiveDateTime) -> ApiResult<OperationSession> {
        require_actor(by)?;
        let line = self.line_repo.get(line_id)?;
        if line.is_archived {
            return Err(ApiError::InvalidInput(format!("归档产线不可运行: {}", line.line_code)));
        }

        if let Some(active) = self.session_repo.find_active_by_line(line_id)? {
            return Err(ApiError::Conflict(format!(
                "产线 {} 已有进行中的会话: session_id={}, status={}",
                line.line_code, active.session_id, active.status
            )));
        }

        let session = OperationSession::start(line_id, by, now);
        self.session_repo
            .insert_with_line_status(&session, LineStatus::Operating, now)?;

        tracing::info!(line_id, session_id = %session.session_id, by, "产线开始运行");
        self.record_action(ActionLog::new(
            line_id,
            ActionType::StartOperation,
            by,
            now,
            Some(json!({ "session_id": session.session_id })),
            format!("产线 {} 开始运行", line.line_code),
        ));

        Ok(session)
    }

    // ==========================================
    // 暂停 / 恢复
    // ==========================================

    /// 人工暂停
    pub fn pause(&self, session_id: &str, by: &str) -> ApiResult<SessionTransition> {
        self.pause_at(session_id, by, false, chrono::Local::now().naive_local())
    }

    /// 暂停（仅 RUNNING 生效，其余状态为空操作）
    ///
    /// # 参数
    /// - `automatic`: true 表示排班自动暂停
    pub fn pause_at(
        &self,
        session_id: &str,
        by: &str,
        automatic: bool,
        now: NaiveDateTime,
    ) -> ApiResult<SessionTransition> {
        require_actor(by)?;
        let mut session = self.load(session_id)?;
        let expected = session.revision;

        let outcome = session.pause(by, automatic, now);
        if let TransitionOutcome::NoOp(reason) = outcome {
            tracing::debug!(session_id, reason, "暂停为空操作");
            return Ok(SessionTransition { session, outcome });
        }

        session.revision = self.session_repo.update_with_cas(
            &session,
            expected,
            Some(LineStatus::Paused),
            now,
        )?;

        let action_type = if automatic {
            ActionType::AutoPause
        } else {
            ActionType::PauseOperation
        };
        tracing::info!(line_id = %session.line_id, session_id, automatic, "会话已暂停");
        self.record_action(ActionLog::new(
            &session.line_id,
            action_type,
            by,
            now,
            Some(json!({ "session_id": session_id, "automatic": automatic })),
            if automatic { "排班休息自动暂停" } else { "人工暂停" },
        ));

        Ok(SessionTransition { session, outcome })
    }

    /// 人工恢复
    pub fn resume(&self, session_id: &str, by: &str) -> ApiResult<SessionTransition> {
        self.resume_at(session_id, by, false, chrono::Local::now().naive_local())
    }

    /// 恢复（仅 PAUSED 生效，其余状态为空操作）
    ///
    /// # 参数
    /// - `automatic`: true 表示排班自动恢复；以重新加载的会话为准，人工暂停不会被自动恢复
    pub fn resume_at(
        &self,
        session_id: &str,
        by: &str,
        automatic: bool,
        now: NaiveDateTime,
    ) -> ApiResult<SessionTransition> {
        require_actor(by)?;
        let mut session = self.load(session_id)?;
        let expected = session.revision;

        let outcome = if automatic {
            session.auto_resume(by, now)
        } else {
            session.resume(by, now)
        };
        if let TransitionOutcome::NoOp(reason) = outcome {
            tracing::debug!(session_id, reason, "恢复为空操作");
            return Ok(SessionTransition { session, outcome });
        }

        session.revision = self.session_repo.update_with_cas(
            &session,
            expected,
            Some(LineStatus::Operating),
            now,
        )?;

        let pause_minutes = session
            .pause_history
            .last()
            .and_then(|e| e.duration_minutes)
            .unwrap_or(0.0);
        let action_type = if automatic {
            ActionType::AutoResume
        } else {
            ActionType::ResumeOperation
        };
        tracing::info!(
            line_id = %session.line_id,
            session_id,
            automatic,
            pause_minutes,
            total_pause_minutes = session.total_pause_minutes,
            "会话已恢复"
        );
        self.record_action(ActionLog::new(
            &session.line_id,
            action_type,
            by,
            now,
            Some(json!({
                "session_id": session_id,
                "automatic": automatic,
                "pause_minutes": pause_minutes,
            })),
            if automatic { "休息结束自动恢复" } else { "人工恢复" },
        ));

        Ok(SessionTransition { session, outcome })
    }

    // ==========================================
    // 停止运行
    // ==========================================

    pub fn stop(&self, session_id: &str, by: &str) -> ApiResult<OperationSession> {
        self.stop_at(session_id, by, chrono::Local::now().naive_local())
    }

    /// 停止运行，计算会话指标并重算产线滚动指标
    ///
    /// # 错误
    /// - `Conflict`: 会话已停止，或与其他操作并发修改
    pub fn stop_at(&self, session_id: &str, by: &str, now: NaiveDateTime) -> ApiResult<OperationSession> {
        require_actor(by)?;
        let mut session = self.load(session_id)?;
        if session.status == SessionStatus::Stopped {
            return Err(ApiError::Conflict(format!("会话已停止: session_id={}", session_id)));
        }
        let expected = session.revision;

        let failures = self.incident_repo.count_completed_by_session(session_id)?;
        session
            .stop(by, failures, now)
            .map_err(|e| ApiError::Conflict(e.to_string()))?;

        session.revision = self.session_repo.update_with_cas(
            &session,
            expected,
            Some(LineStatus::Stopped),
            now,
        )?;

        tracing::info!(
            line_id = %session.line_id,
            session_id,
            duration_minutes = session.duration_minutes.unwrap_or(0.0),
            mtbf_hours = session.mtbf_hours.unwrap_or(0.0),
            failures,
            "产线停止运行"
        );
        self.record_action(ActionLog::new(
            &session.line_id,
            ActionType::StopOperation,
            by,
            now,
            Some(json!({
                "session_id": session_id,
                "duration_minutes": session.duration_minutes,
                "total_pause_minutes": session.total_pause_minutes,
                "mtbf_hours": session.mtbf_hours,
                "failures": failures,
            })),
            "停止运行",
        ));

        self.recalculator.recalculate_after_commit(&session.line_id, now);
        Ok(session)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_session(&self, session_id: &str) -> ApiResult<OperationSession> {
        self.load(session_id)
    }

    /// 产线当前的 RUNNING/PAUSED 会话
    pub fn get_active_session(&self, line_id: &str) -> ApiResult<Option<OperationSession>> {
        Ok(self.session_repo.find_active_by_line(line_id)?)
    }

    /// 产线最近的会话（按开始时间倒序）
    pub fn list_sessions(&self, line_id: &str, limit: usize) -> ApiResult<Vec<OperationSession>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self.session_repo.list_by_line(line_id, limit)?)
    }

    fn load(&self, session_id: &str) -> ApiResult<OperationSession> {
        self.session_repo
            .find_by_id(session_id)?
            .ok_or_else(|| ApiError::NotFound(format!("OperationSession(id={})不存在", session_id)))
    }

    fn record_action(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("记录操作日志失败: {}", e);
        }
    }
}

pub(crate) fn require_actor(by: &str) -> ApiResult<()> {
    if by.trim().is_empty() {
        return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
    }
    Ok(())
}

// ==========================================
// 产线运行引擎 - 排班控制循环
// ==========================================
// 职责: 每个周期扫描活动会话，按休息时段自动暂停 / 自动恢复
// 红线:
// - 单条产线失败只记录日志，不中断本周期其他产线
// - 重复执行同一周期不重复暂停，也不重复累计暂停时长
// - 设备同步尽力而为，失败不影响会话状态
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::api::error::{ApiError, ApiResult};
use crate::api::operation_api::OperationApi;
use crate::config::config_manager::{ConfigManager, DEFAULT_AUTO_ACTION_ACTOR};
use crate::domain::session::OperationSession;
use crate::engine::events::DevicePauseNotifier;
use crate::engine::schedule::{ScheduleDecision, ScheduleEngine};
use crate::repository::{LineRepository, SessionRepository};

/// 单个周期的执行汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub auto_paused: usize,
    pub auto_resumed: usize,
    pub failed: usize,
}

// ==========================================
// ScheduleController
// ==========================================
pub struct ScheduleController {
    operation_api: Arc<OperationApi>,
    line_repo: Arc<LineRepository>,
    session_repo: Arc<SessionRepository>,
    device_notifier: Arc<dyn DevicePauseNotifier>,
    config: Arc<ConfigManager>,
    engine: ScheduleEngine,
}

impl ScheduleController {
    pub fn new(
        operation_api: Arc<OperationApi>,
        line_repo: Arc<LineRepository>,
        session_repo: Arc<SessionRepository>,
        device_notifier: Arc<dyn DevicePauseNotifier>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            operation_api,
            line_repo,
            session_repo,
            device_notifier,
            config,
            engine: ScheduleEngine::new(),
        }
    }

    pub fn tick(&self) -> ApiResult<TickReport> {
        self.tick_at(chrono::Local::now().naive_local())
    }

    /// 执行一个周期
    ///
    /// 只有加载活动会话列表失败才返回错误；逐条产线的错误计入 `failed`
    pub fn tick_at(&self, now: NaiveDateTime) -> ApiResult<TickReport> {
        let actor = self.config.auto_action_actor().unwrap_or_else(|e| {
            tracing::warn!("读取自动操作人配置失败，使用默认值: {}", e);
            DEFAULT_AUTO_ACTION_ACTOR.to_string()
        });

        let sessions = self.session_repo.list_active()?;
        let mut report = TickReport {
            scanned: sessions.len(),
            ..TickReport::default()
        };

        for session in &sessions {
            match self.process_session(session, &actor, now) {
                Ok(ScheduleDecision::AutoPause) => report.auto_paused += 1,
                Ok(ScheduleDecision::AutoResume) => report.auto_resumed += 1,
                Ok(ScheduleDecision::Keep) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        line_id = %session.line_id,
                        session_id = %session.session_id,
                        error = %e,
                        "排班控制处理失败，跳过该产线"
                    );
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            auto_paused = report.auto_paused,
            auto_resumed = report.auto_resumed,
            failed = report.failed,
            "排班控制周期完成"
        );
        Ok(report)
    }

    /// 处理单个活动会话，返回实际生效的动作（空操作记为 Keep）
    fn process_session(
        &self,
        session: &OperationSession,
        actor: &str,
        now: NaiveDateTime,
    ) -> ApiResult<ScheduleDecision> {
        let line = self.line_repo.find_by_id(&session.line_id)?.ok_or_else(|| {
            ApiError::NotFound(format!("Line(id={})不存在", session.line_id))
        })?;

        let decision = self.engine.decide(session, &line.schedule, now);
        let paused = match decision {
            ScheduleDecision::Keep => return Ok(ScheduleDecision::Keep),
            ScheduleDecision::AutoPause => {
                let transition = self
                    .operation_api
                    .pause_at(&session.session_id, actor, true, now)?;
                if !transition.applied() {
                    return Ok(ScheduleDecision::Keep);
                }
                true
            }
            ScheduleDecision::AutoResume => {
                let transition = self
                    .operation_api
                    .resume_at(&session.session_id, actor, true, now)?;
                if !transition.applied() {
                    return Ok(ScheduleDecision::Keep);
                }
                false
            }
        };

        if let Some(device_id) = line.counter_device_id.as_deref() {
            if let Err(e) = self.device_notifier.set_paused(device_id, paused, now) {
                let warning = ApiError::ExternalSyncWarning(format!(
                    "计数设备 {} 暂停状态同步失败: {}",
                    device_id, e
                ));
                tracing::warn!(line_id = %line.line_id, "{}", warning);
            }
        }

        Ok(decision)
    }
}

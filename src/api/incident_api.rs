// ==========================================
// 产线运行引擎 - 维修单 API
// ==========================================
// 职责: 报修 / 开始维修 / 完成维修，维修单查询
// 红线: 通知投递失败不回滚引擎自身的写入
// ==========================================

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::line_metrics::LineMetricsRecalculator;
use crate::api::operation_api::require_actor;
use crate::config::ConfigManager;
use crate::config::config_manager::DEFAULT_STUB_SESSION_MINUTES;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::incident::{IncidentReport, RepairIncident};
use crate::domain::line::Line;
use crate::domain::session::OperationSession;
use crate::domain::types::TransitionOutcome;
use crate::engine::events::{
    LineStopEvent, NotificationEvent, OptionalNotificationPublisher, RepairCompleteEvent,
};
use crate::engine::ShiftClock;
use crate::repository::{ActionLogRepository, IncidentRepository, LineRepository, SessionRepository};

/// 维修单状态变换结果
#[derive(Debug, Clone)]
pub struct IncidentTransition {
    pub incident: RepairIncident,
    pub outcome: TransitionOutcome,
}

// ==========================================
// IncidentApi - 维修单 API
// ==========================================
pub struct IncidentApi {
    line_repo: Arc<LineRepository>,
    session_repo: Arc<SessionRepository>,
    incident_repo: Arc<IncidentRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    recalculator: Arc<LineMetricsRecalculator>,
    config: Arc<ConfigManager>,
    publisher: Arc<OptionalNotificationPublisher>,
}

impl IncidentApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        line_repo: Arc<LineRepository>,
        session_repo: Arc<SessionRepository>,
        incident_repo: Arc<IncidentRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        recalculator: Arc<LineMetricsRecalculator>,
        config: Arc<ConfigManager>,
        publisher: Arc<OptionalNotificationPublisher>,
    ) -> Self {
        Self {
            line_repo,
            session_repo,
            incident_repo,
            action_log_repo,
            recalculator,
            config,
            publisher,
        }
    }

    // ==========================================
    // 报修
    // ==========================================

    pub fn report(&self, report: IncidentReport) -> ApiResult<RepairIncident> {
        self.report_at(report, chrono::Local::now().naive_local())
    }

    /// 报修
    ///
    /// # 流程
    /// 1. 校验产线 / 设备
    /// 2. 产线无活动会话时补建一个已停止的短会话，保证维修单总能关联会话
    /// 3. 写入维修单，产线置为 MAINTENANCE（沿用已有的待处理停线时间）
    /// 4. 发布停线通知（尽力而为）
    pub fn report_at(&self, report: IncidentReport, now: NaiveDateTime) -> ApiResult<RepairIncident> {
        require_actor(&report.reported_by)?;
        if report.problem.trim().is_empty() {
            return Err(ApiError::InvalidInput("故障描述不能为空".to_string()));
        }

        let line = self.line_repo.get(&report.line_id)?;
        if line.is_archived {
            return Err(ApiError::InvalidInput(format!("归档产线不可报修: {}", line.line_code)));
        }
        let machine = self
            .line_repo
            .find_machine(&report.machine_id)?
            .filter(|m| m.line_id == line.line_id && !m.is_archived)
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "设备(id={})不属于产线 {}",
                    report.machine_id, line.line_code
                ))
            })?;

        let session_id = match self.session_repo.find_active_by_line(&line.line_id)? {
            Some(active) => active.session_id,
            None => self.create_stub_session(&line, &report.reported_by, now)?,
        };

        let shift = ShiftClock::current_shift(now);
        let mut incident = RepairIncident::report(&report, Some(session_id.clone()), shift, now, now);
        self.incident_repo.insert_with_line_maintenance(&mut incident, now)?;

        tracing::info!(
            line_id = %line.line_id,
            incident_id = %incident.incident_id,
            session_id = %session_id,
            report_number = %incident.report_number,
            shift,
            "已报修，产线进入维修状态"
        );
        self.record_action(ActionLog::new(
            &line.line_id,
            ActionType::ReportIncident,
            &report.reported_by,
            now,
            Some(json!({
                "incident_id": incident.incident_id,
                "report_number": incident.report_number,
                "machine_id": machine.machine_id,
                "session_id": session_id,
                "line_stopped_at": incident.line_stopped_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })),
            format!("{} / {}: {}", line.line_code, machine.machine_code, report.problem),
        ));

        self.notify(NotificationEvent::LineStop(LineStopEvent {
            report_number: incident.report_number.clone(),
            line: line.line_name.clone(),
            machine: machine.machine_name.clone(),
            problem: incident.problem.clone(),
            reported_by: incident.reported_by.clone(),
            shift,
        }));

        Ok(incident)
    }

    /// 补建会话: 开始时间回溯 stub_session_minutes，随即在 now 停止
    fn create_stub_session(&self, line: &Line, by: &str, now: NaiveDateTime) -> ApiResult<String> {
        let minutes = self.config.stub_session_minutes().unwrap_or_else(|e| {
            tracing::warn!("读取补建会话时长失败，使用默认值: {}", e);
            DEFAULT_STUB_SESSION_MINUTES
        });

        let started_at = Duration::try_minutes(minutes)
            .and_then(|backdate| now.checked_sub_signed(backdate))
            .ok_or_else(|| {
                ApiError::InvalidInput(format!("补建会话时长超出范围: {} 分钟", minutes))
            })?;
        let mut stub = OperationSession::start(&line.line_id, by, started_at);
        stub.is_stub = true;
        stub.stop(by, 0, now)?;
        self.session_repo.insert(&stub)?;

        tracing::info!(
            line_id = %line.line_id,
            session_id = %stub.session_id,
            backdate_minutes = minutes,
            "无活动会话，已补建短会话"
        );
        self.record_action(ActionLog::new(
            &line.line_id,
            ActionType::StopOperation,
            by,
            now,
            Some(json!({
                "session_id": stub.session_id,
                "is_stub": true,
                "duration_minutes": stub.duration_minutes,
            })),
            "报修时无活动会话，自动补建会话",
        ));

        self.recalculator.recalculate_after_commit(&line.line_id, now);
        Ok(stub.session_id)
    }

    // ==========================================
    // 开始维修
    // ==========================================

    pub fn start_repair(&self, incident_id: &str, by: &str) -> ApiResult<IncidentTransition> {
        self.start_repair_at(incident_id, by, chrono::Local::now().naive_local())
    }

    /// 开始维修（已在维修中为空操作）
    pub fn start_repair_at(
        &self,
        incident_id: &str,
        by: &str,
        now: NaiveDateTime,
    ) -> ApiResult<IncidentTransition> {
        require_actor(by)?;
        let mut incident = self.load(incident_id)?;
        let expected = incident.revision;

        let outcome = incident.start_repair(now)?;
        if let TransitionOutcome::NoOp(reason) = outcome {
            tracing::info!(incident_id, reason, "开始维修为空操作");
            return Ok(IncidentTransition { incident, outcome });
        }

        incident.revision = self.incident_repo.update_with_cas(&incident, expected)?;

        tracing::info!(line_id = %incident.line_id, incident_id, by, "开始维修");
        self.record_action(ActionLog::new(
            &incident.line_id,
            ActionType::StartRepair,
            by,
            now,
            Some(json!({ "incident_id": incident_id, "report_number": incident.report_number })),
            "开始维修",
        ));

        Ok(IncidentTransition { incident, outcome })
    }

    // ==========================================
    // 完成维修
    // ==========================================

    pub fn complete(&self, incident_id: &str, by: &str) -> ApiResult<RepairIncident> {
        self.complete_at(incident_id, by, chrono::Local::now().naive_local())
    }

    /// 完成维修
    ///
    /// # 错误
    /// - `Domain`: 维修单已完成
    pub fn complete_at(&self, incident_id: &str, by: &str, now: NaiveDateTime) -> ApiResult<RepairIncident> {
        require_actor(by)?;
        let mut incident = self.load(incident_id)?;
        let expected = incident.revision;

        incident.complete(by, now)?;
        let line_cleared = self.incident_repo.complete_with_cas(&incident, expected, now)?;
        incident.revision = expected + 1;

        let repair_minutes = incident.repair_duration_minutes.unwrap_or(0.0);
        tracing::info!(
            line_id = %incident.line_id,
            incident_id,
            repair_minutes,
            line_stop_minutes = incident.line_stop_duration_minutes.unwrap_or(0.0),
            line_cleared,
            "维修完成"
        );
        self.record_action(ActionLog::new(
            &incident.line_id,
            ActionType::CompleteRepair,
            by,
            now,
            Some(json!({
                "incident_id": incident_id,
                "report_number": incident.report_number,
                "repair_duration_minutes": incident.repair_duration_minutes,
                "line_stop_duration_minutes": incident.line_stop_duration_minutes,
                "line_cleared": line_cleared,
            })),
            "维修完成",
        ));

        self.recalculator.recalculate_after_commit(&incident.line_id, now);

        // 通知内容尽力补全名称，读取失败时退回 id
        let line_name = match self.line_repo.find_by_id(&incident.line_id) {
            Ok(Some(line)) => line.line_name,
            _ => incident.line_id.clone(),
        };
        let machine_name = match self.line_repo.find_machine(&incident.machine_id) {
            Ok(Some(machine)) => machine.machine_name,
            _ => incident.machine_id.clone(),
        };
        self.notify(NotificationEvent::RepairComplete(RepairCompleteEvent {
            report_number: incident.report_number.clone(),
            line: line_name,
            machine: machine_name,
            repair_duration: repair_minutes,
        }));

        Ok(incident)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_incident(&self, incident_id: &str) -> ApiResult<RepairIncident> {
        self.load(incident_id)
    }

    /// 产线未完成的维修单（按报修时间升序）
    pub fn list_active_incidents(&self, line_id: &str) -> ApiResult<Vec<RepairIncident>> {
        Ok(self.incident_repo.list_active_by_line(line_id)?)
    }

    fn load(&self, incident_id: &str) -> ApiResult<RepairIncident> {
        self.incident_repo
            .find_by_id(incident_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairIncident(id={})不存在", incident_id)))
    }

    fn notify(&self, event: NotificationEvent) {
        let kind = event.as_str().to_string();
        let report_number = event.report_number().to_string();
        if let Err(e) = self.publisher.publish(event) {
            let warning = ApiError::ExternalSyncWarning(format!(
                "通知投递失败 type={} report_number={}: {}",
                kind, report_number, e
            ));
            tracing::warn!("{}", warning);
        }
    }

    fn record_action(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("记录操作日志失败: {}", e);
        }
    }
}

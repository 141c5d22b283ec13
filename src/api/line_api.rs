// ==========================================
// 产线运行引擎 - 产线 API
// ==========================================
// 职责: 产线 / 设备管理、排班配置、滚动指标、周期归档、历史查询
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::line_metrics::LineMetricsRecalculator;
use crate::api::operation_api::require_actor;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::line::{parse_hhmm, BreakWindow, Line, LineSchedule, Machine};
use crate::engine::metrics::AggregateRollup;
use crate::repository::{ActionLogRepository, LineRepository};

// ==========================================
// LineApi - 产线 API
// ==========================================
pub struct LineApi {
    line_repo: Arc<LineRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    recalculator: Arc<LineMetricsRecalculator>,
}

impl LineApi {
    pub fn new(
        line_repo: Arc<LineRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        recalculator: Arc<LineMetricsRecalculator>,
    ) -> Self {
        Self {
            line_repo,
            action_log_repo,
            recalculator,
        }
    }

    // ==========================================
    // 产线 / 设备
    // ==========================================

    /// 新建产线
    ///
    /// # 错误
    /// - `Conflict`: line_code 与现有在用产线重复
    pub fn create_line(
        &self,
        line_code: &str,
        line_name: &str,
        plant: Option<String>,
        counter_device_id: Option<String>,
    ) -> ApiResult<Line> {
        self.create_line_at(
            line_code,
            line_name,
            plant,
            counter_device_id,
            chrono::Local::now().naive_local(),
        )
    }

    pub fn create_line_at(
        &self,
        line_code: &str,
        line_name: &str,
        plant: Option<String>,
        counter_device_id: Option<String>,
        now: NaiveDateTime,
    ) -> ApiResult<Line> {
        if line_code.trim().is_empty() || line_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("产线编码和名称不能为空".to_string()));
        }

        let counter_device_id = counter_device_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let line = Line::new(
            line_code.trim().to_string(),
            line_name.trim().to_string(),
            plant,
            counter_device_id,
            now,
        );
        self.line_repo.insert(&line)?;
        tracing::info!(line_id = %line.line_id, line_code = %line.line_code, "产线已创建");
        Ok(line)
    }

    /// 为产线添加设备
    pub fn add_machine(&self, line_id: &str, machine_code: &str, machine_name: &str) -> ApiResult<Machine> {
        self.add_machine_at(line_id, machine_code, machine_name, chrono::Local::now().naive_local())
    }

    pub fn add_machine_at(
        &self,
        line_id: &str,
        machine_code: &str,
        machine_name: &str,
        now: NaiveDateTime,
    ) -> ApiResult<Machine> {
        if machine_code.trim().is_empty() {
            return Err(ApiError::InvalidInput("设备编码不能为空".to_string()));
        }
        let line = self.line_repo.get(line_id)?;
        if line.is_archived {
            return Err(ApiError::InvalidInput(format!("归档产线不可添加设备: {}", line.line_code)));
        }

        let machine = Machine::new(
            line.line_id,
            machine_code.trim().to_string(),
            machine_name.trim().to_string(),
            now,
        );
        self.line_repo.insert_machine(&machine)?;
        tracing::info!(line_id, machine_id = %machine.machine_id, "设备已添加");
        Ok(machine)
    }

    pub fn get_line(&self, line_id: &str) -> ApiResult<Line> {
        Ok(self.line_repo.get(line_id)?)
    }

    /// 在用产线列表
    pub fn list_lines(&self) -> ApiResult<Vec<Line>> {
        Ok(self.line_repo.list_live()?)
    }

    pub fn list_machines(&self, line_id: &str) -> ApiResult<Vec<Machine>> {
        Ok(self.line_repo.list_live_machines(line_id)?)
    }

    // ==========================================
    // 排班
    // ==========================================

    pub fn update_schedule(
        &self,
        line_id: &str,
        start_time: &str,
        end_time: &str,
        breaks: &[(String, String)],
        by: &str,
    ) -> ApiResult<LineSchedule> {
        self.update_schedule_at(
            line_id,
            start_time,
            end_time,
            breaks,
            by,
            chrono::Local::now().naive_local(),
        )
    }

    /// 修改排班（运行时段 + 休息时段）
    ///
    /// # 错误
    /// - `InvalidInput`: 时间格式错误
    /// - `Domain`: 休息时段开始不早于结束（含跨零点）
    ///
    /// 运行时段允许跨零点（如 21:00-05:00）；开始等于结束表示全天运行
    pub fn update_schedule_at(
        &self,
        line_id: &str,
        start_time: &str,
        end_time: &str,
        breaks: &[(String, String)],
        by: &str,
        now: NaiveDateTime,
    ) -> ApiResult<LineSchedule> {
        require_actor(by)?;
        let start = parse_hhmm(start_time).map_err(ApiError::InvalidInput)?;
        let end = parse_hhmm(end_time).map_err(ApiError::InvalidInput)?;

        let break_windows = breaks
            .iter()
            .map(|(s, e)| BreakWindow::parse(s, e))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::InvalidInput)?;

        let schedule = LineSchedule {
            start_time: start,
            end_time: end,
            break_windows,
        }
        .normalized()
        .map_err(ApiError::Domain)?;

        let line = self.line_repo.get(line_id)?;
        self.line_repo.update_schedule(line_id, &schedule, now)?;

        let windows: Vec<String> = schedule
            .break_windows
            .iter()
            .map(|w| format!("{}-{}", w.start, w.end))
            .collect();
        tracing::info!(line_id, breaks = ?windows, "排班已更新");
        self.record_action(ActionLog::new(
            line_id,
            ActionType::UpdateSchedule,
            by,
            now,
            Some(json!({
                "start_time": start.format("%H:%M").to_string(),
                "end_time": end.format("%H:%M").to_string(),
                "break_windows": windows,
            })),
            format!("产线 {} 排班更新", line.line_code),
        ));

        Ok(schedule)
    }

    // ==========================================
    // 滚动指标
    // ==========================================

    /// 人工触发滚动指标重算
    pub fn recalculate_metrics(&self, line_id: &str) -> ApiResult<AggregateRollup> {
        self.recalculator
            .recalculate(line_id, chrono::Local::now().naive_local())
    }

    // ==========================================
    // 周期归档
    // ==========================================

    pub fn reset_period(&self, line_id: &str, reason: &str, by: &str) -> ApiResult<Line> {
        self.reset_period_at(line_id, reason, by, chrono::Local::now().naive_local())
    }

    /// 归档当前周期并清零滚动指标
    ///
    /// # 返回
    /// 归档快照行
    ///
    /// # 错误
    /// - `Conflict`: 产线有运行中 / 暂停中的会话（需先停止运行）
    pub fn reset_period_at(
        &self,
        line_id: &str,
        reason: &str,
        by: &str,
        now: NaiveDateTime,
    ) -> ApiResult<Line> {
        require_actor(by)?;
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("归档原因不能为空".to_string()));
        }

        let archived = self.line_repo.archive_period(line_id, reason.trim(), now)?;

        tracing::info!(
            line_id,
            archived_line_id = %archived.line_id,
            operation_hours = archived.counters.total_operation_hours,
            failures = archived.counters.total_failures,
            "周期已归档"
        );
        self.record_action(ActionLog::new(
            line_id,
            ActionType::ResetPeriod,
            by,
            now,
            Some(json!({
                "archived_line_id": archived.line_id,
                "period_start": archived.period_start.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                "period_end": archived.period_end.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
                "counters": archived.counters,
            })),
            reason.trim(),
        ));

        Ok(archived)
    }

    // ==========================================
    // 历史查询
    // ==========================================

    /// 产线的归档快照（period_end 倒序）
    pub fn list_period_history(&self, line_id: &str) -> ApiResult<Vec<Line>> {
        Ok(self.line_repo.list_archived_by_parent(line_id)?)
    }

    /// 归档快照下的设备
    pub fn list_archived_machines(&self, archived_line_id: &str) -> ApiResult<Vec<Machine>> {
        Ok(self.line_repo.list_archived_machines(archived_line_id)?)
    }

    /// 产线操作日志（按时间倒序）
    pub fn list_action_logs(&self, line_id: &str, limit: usize) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.list_by_line(line_id, limit)?)
    }

    fn record_action(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("记录操作日志失败: {}", e);
        }
    }
}

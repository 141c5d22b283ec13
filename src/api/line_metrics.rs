// ==========================================
// 产线运行引擎 - 滚动指标重算
// ==========================================
// 职责: 读取当前周期内的会话 / 维修单 → MetricsEngine → 整体写回
// 触发: 会话停止、维修完成、人工重算
// 说明: 提交后的重算失败不回滚状态转换，由下一次重算修正
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::engine::metrics::{AggregateRollup, MetricsEngine};
use crate::repository::{IncidentRepository, LineRepository, SessionRepository};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::instrument;

pub struct LineMetricsRecalculator {
    line_repo: Arc<LineRepository>,
    session_repo: Arc<SessionRepository>,
    incident_repo: Arc<IncidentRepository>,
    engine: MetricsEngine,
}

impl LineMetricsRecalculator {
    pub fn new(
        line_repo: Arc<LineRepository>,
        session_repo: Arc<SessionRepository>,
        incident_repo: Arc<IncidentRepository>,
    ) -> Self {
        Self {
            line_repo,
            session_repo,
            incident_repo,
            engine: MetricsEngine::new(),
        }
    }

    /// 重算产线及其设备的滚动指标
    #[instrument(skip(self))]
    pub fn recalculate(&self, line_id: &str, now: NaiveDateTime) -> ApiResult<AggregateRollup> {
        let line = self.line_repo.get(line_id)?;
        if line.is_archived {
            return Err(ApiError::InvalidInput(format!(
                "归档产线不参与重算: line_id={}",
                line_id
            )));
        }

        let since = line.effective_period_start();
        let sessions = self.session_repo.list_stopped_since(line_id, since)?;
        let incidents = self.incident_repo.list_completed_since(line_id, since)?;
        let machine_ids: Vec<String> = self
            .line_repo
            .list_live_machines(line_id)?
            .into_iter()
            .map(|m| m.machine_id)
            .collect();

        let rollup = self.engine.rollup(&sessions, &incidents, &machine_ids);
        self.line_repo.save_rollup(line_id, &rollup, now)?;

        tracing::info!(
            line_id,
            operation_hours = rollup.line.total_operation_hours,
            failures = rollup.line.total_failures,
            mttr = rollup.line.average_mttr,
            mtbf = rollup.line.average_mtbf,
            "滚动指标已重算"
        );
        Ok(rollup)
    }

    /// 状态转换提交之后的重算：失败只记录日志，由下一次重算修正
    pub fn recalculate_after_commit(&self, line_id: &str, now: NaiveDateTime) {
        if let Err(e) = self.recalculate(line_id, now) {
            tracing::error!(line_id, error = %e, "状态已提交，滚动指标重算失败");
        }
    }
}

// ==========================================
// 产线运行引擎 - OEE 计算服务
// ==========================================
// 职责: 按周期窗口预取履历 / 会话 / 维修单 → OeeCalculator → 按周期键覆盖写入
// 说明: 无生产数据是正常结果（返回 None），不视为错误
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::oee::OeeRecord;
use crate::domain::types::OeePeriodType;
use crate::engine::oee::{OeeCalculator, OeeInput};
use crate::engine::shift_clock::ShiftClock;
use crate::repository::{
    IncidentRepository, LineRepository, OeeRepository, ProductionHistoryRepository,
    SessionRepository,
};

pub struct OeeService {
    line_repo: Arc<LineRepository>,
    session_repo: Arc<SessionRepository>,
    incident_repo: Arc<IncidentRepository>,
    oee_repo: Arc<OeeRepository>,
    history_repo: Arc<ProductionHistoryRepository>,
    calculator: OeeCalculator,
}

impl OeeService {
    pub fn new(
        line_repo: Arc<LineRepository>,
        session_repo: Arc<SessionRepository>,
        incident_repo: Arc<IncidentRepository>,
        oee_repo: Arc<OeeRepository>,
        history_repo: Arc<ProductionHistoryRepository>,
    ) -> Self {
        Self {
            line_repo,
            session_repo,
            incident_repo,
            oee_repo,
            history_repo,
            calculator: OeeCalculator::new(),
        }
    }

    /// 计算并写入单条产线某周期的 OEE
    ///
    /// # 参数
    /// - `date`: 周期内任一业务日（周 / 月按所在周 / 月展开）
    ///
    /// # 返回
    /// - `Ok(None)`: 无计数设备、无生产履历或运行时间为 0
    pub fn calculate_for_line(
        &self,
        line_id: &str,
        period_type: OeePeriodType,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> ApiResult<Option<OeeRecord>> {
        let line = self.line_repo.get(line_id)?;
        if line.is_archived {
            return Err(ApiError::InvalidInput(format!(
                "归档产线不计算 OEE: line_id={}",
                line_id
            )));
        }

        let device_id = match line.counter_device_id.as_deref() {
            Some(id) => id,
            None => {
                tracing::debug!(line_id, "产线未绑定计数设备，跳过 OEE 计算");
                return Ok(None);
            }
        };

        let (period_start, period_end) = ShiftClock::period_window(period_type, date);
        let history = self
            .history_repo
            .list_in_window(device_id, period_start, period_end)?;
        if history.is_empty() {
            tracing::debug!(line_id, %period_type, %date, "周期内无生产履历");
            return Ok(None);
        }

        let sessions = self
            .session_repo
            .list_overlapping(line_id, period_start, period_end)?;
        let incidents = self
            .incident_repo
            .list_completed_in_window(line_id, period_start, period_end)?;

        let input = OeeInput {
            line_id,
            period_type,
            period_start,
            period_end,
            history: &history,
            sessions: &sessions,
            incidents: &incidents,
        };
        let mut record = match self.calculator.calculate(&input, now) {
            Some(record) => record,
            None => return Ok(None),
        };

        record.record_id = self.oee_repo.upsert(&record)?;
        tracing::info!(
            line_id,
            %period_type,
            period_date = %record.period_date,
            availability = record.availability,
            performance = record.performance,
            quality = record.quality,
            oee = record.oee,
            "OEE 已计算"
        );
        Ok(Some(record))
    }

    /// 计算所有在用产线的日 OEE（单条产线失败不影响其他产线）
    pub fn calculate_daily_all_lines(&self, date: NaiveDate) -> ApiResult<Vec<OeeRecord>> {
        self.calculate_daily_all_lines_at(date, chrono::Local::now().naive_local())
    }

    pub fn calculate_daily_all_lines_at(
        &self,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> ApiResult<Vec<OeeRecord>> {
        let lines = self.line_repo.list_live()?;
        let mut records = Vec::new();
        let mut failed = 0usize;

        for line in &lines {
            match self.calculate_for_line(&line.line_id, OeePeriodType::Daily, date, now) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    failed += 1;
                    tracing::error!(line_id = %line.line_id, error = %e, "日 OEE 计算失败");
                }
            }
        }

        tracing::info!(
            %date,
            lines = lines.len(),
            calculated = records.len(),
            failed,
            "日 OEE 批量计算完成"
        );
        Ok(records)
    }

    /// 查询 OEE 记录（period_date 闭区间）
    pub fn list_records(
        &self,
        line_id: &str,
        period_type: OeePeriodType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResult<Vec<OeeRecord>> {
        if from > to {
            return Err(ApiError::InvalidInput(format!(
                "日期区间无效: {} > {}",
                from, to
            )));
        }
        Ok(self.oee_repo.list_by_line(line_id, period_type, from, to)?)
    }
}

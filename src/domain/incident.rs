// ==========================================
// 产线运行引擎 - 维修单领域模型
// ==========================================
// 状态机: REPORTED → IN_REPAIR → COMPLETED（终态）
// 红线: 时长字段在完成前为空，完成后不可变
// ==========================================

use crate::domain::types::{IncidentStatus, TransitionOutcome, TransitionRejected};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 报修输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub line_id: String,
    pub machine_id: String,
    pub problem: String,
    pub reported_by: String,
    /// 报修即开始维修（带停线上下文的报修直接进入 IN_REPAIR）
    #[serde(default)]
    pub start_repair_immediately: bool,
}

// ==========================================
// RepairIncident - 维修单
// ==========================================
// 对齐: repair_incident 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairIncident {
    pub incident_id: String,
    pub report_number: String,
    pub line_id: String,
    pub machine_id: String,
    pub session_id: Option<String>, // 报修时的活动会话（非拥有引用）
    pub problem: String,
    pub reported_by: String,
    pub status: IncidentStatus,
    pub shift: u8,

    // ===== 时间 =====
    pub reported_at: NaiveDateTime,
    pub line_stopped_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>, // 维修开始
    pub completed_at: Option<NaiveDateTime>,
    pub completed_by: Option<String>,

    // ===== 完成时计算 =====
    pub repair_duration_minutes: Option<f64>,
    pub line_stop_duration_minutes: Option<f64>,

    /// 乐观锁版本号
    pub revision: i64,
}

impl RepairIncident {
    /// 新建维修单
    ///
    /// `line_stopped_at` 由调用方决定（复用产线已有的待处理停线时间，避免重复计停机）
    pub fn report(
        report: &IncidentReport,
        session_id: Option<String>,
        shift: u8,
        line_stopped_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        let incident_id = uuid::Uuid::new_v4().to_string();
        let report_number = generate_report_number(&incident_id, now);
        let (status, started_at) = if report.start_repair_immediately {
            (IncidentStatus::InRepair, Some(now))
        } else {
            (IncidentStatus::Reported, None)
        };

        Self {
            incident_id,
            report_number,
            line_id: report.line_id.clone(),
            machine_id: report.machine_id.clone(),
            session_id,
            problem: report.problem.clone(),
            reported_by: report.reported_by.clone(),
            status,
            shift,
            reported_at: now,
            line_stopped_at,
            started_at,
            completed_at: None,
            completed_by: None,
            repair_duration_minutes: None,
            line_stop_duration_minutes: None,
            revision: 0,
        }
    }

    /// 开始维修（重复调用为空操作）
    pub fn start_repair(&mut self, now: NaiveDateTime) -> Result<TransitionOutcome, TransitionRejected> {
        match self.status {
            IncidentStatus::Reported => {
                self.status = IncidentStatus::InRepair;
                self.started_at = Some(now);
                Ok(TransitionOutcome::Applied)
            }
            IncidentStatus::InRepair => Ok(TransitionOutcome::NoOp("维修已开始")),
            IncidentStatus::Completed => Err(TransitionRejected::new(
                IncidentStatus::Completed.to_db_str(),
                IncidentStatus::InRepair.to_db_str(),
            )),
        }
    }

    /// 完成维修并计算时长
    ///
    /// 未显式开始维修时，维修开始时间取报修时间
    pub fn complete(&mut self, by: &str, now: NaiveDateTime) -> Result<(), TransitionRejected> {
        if self.status == IncidentStatus::Completed {
            return Err(TransitionRejected::new(
                IncidentStatus::Completed.to_db_str(),
                IncidentStatus::Completed.to_db_str(),
            ));
        }

        let started_at = *self.started_at.get_or_insert(self.reported_at);
        self.status = IncidentStatus::Completed;
        self.completed_at = Some(now);
        self.completed_by = Some(by.to_string());
        self.repair_duration_minutes = Some(minutes_between(started_at, now));
        self.line_stop_duration_minutes = Some(minutes_between(self.line_stopped_at, now));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status != IncidentStatus::Completed
    }
}

fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    ((to - from).num_seconds().max(0) as f64) / 60.0
}

/// 报修单号: RPT-YYYYMMDD-XXXXXXXX
fn generate_report_number(incident_id: &str, now: NaiveDateTime) -> String {
    let suffix: String = incident_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("RPT-{}-{}", now.format("%Y%m%d"), suffix)
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

    fn sample_report(immediate: bool) -> IncidentReport {
        IncidentReport {
            line_id: "L1".to_string(),
            machine_id: "M1".to_string(),
            problem: "传送带卡料".to_string(),
            reported_by: "op".to_string(),
            start_repair_immediately: immediate,
        }
    }

    #[test]
    fn test_report_number_format() {
        let inc = RepairIncident::report(&sample_report(false), None, 1, at(10, 0), at(10, 0));
        assert!(inc.report_number.starts_with("RPT-20250310-"));
        assert_eq!(inc.report_number.len(), "RPT-20250310-".len() + 8);
    }

    #[test]
    fn test_durations_null_until_completed() {
        let mut inc = RepairIncident::report(&sample_report(false), None, 1, at(9, 50), at(10, 0));
        assert_eq!(inc.status, IncidentStatus::Reported);
        assert!(inc.repair_duration_minutes.is_none());

        inc.start_repair(at(10, 10)).unwrap();
        assert!(inc.line_stop_duration_minutes.is_none());

        inc.complete("tech", at(10, 40)).unwrap();
        assert_eq!(inc.repair_duration_minutes, Some(30.0));
        assert_eq!(inc.line_stop_duration_minutes, Some(50.0));
    }

    #[test]
    fn test_start_repair_is_reentrant() {
        let mut inc = RepairIncident::report(&sample_report(true), None, 1, at(10, 0), at(10, 0));
        assert_eq!(inc.status, IncidentStatus::InRepair);
        let outcome = inc.start_repair(at(10, 5)).unwrap();
        assert!(outcome.is_noop());
        assert_eq!(inc.started_at, Some(at(10, 0)));
    }

    #[test]
    fn test_complete_twice_is_rejected() {
        let mut inc = RepairIncident::report(&sample_report(true), None, 1, at(10, 0), at(10, 0));
        inc.complete("tech", at(11, 0)).unwrap();
        assert!(inc.complete("tech", at(12, 0)).is_err());
        assert_eq!(inc.completed_at, Some(at(11, 0)));
        assert_eq!(inc.repair_duration_minutes, Some(60.0));
    }

    #[test]
    fn test_complete_without_start_uses_report_time() {
        let mut inc = RepairIncident::report(&sample_report(false), None, 1, at(10, 0), at(10, 0));
        inc.complete("tech", at(10, 20)).unwrap();
        assert_eq!(inc.started_at, Some(at(10, 0)));
        assert_eq!(inc.repair_duration_minutes, Some(20.0));
    }
}

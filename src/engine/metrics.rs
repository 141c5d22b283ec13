// ==========================================
// 产线运行引擎 - 滚动指标汇总引擎
// ==========================================
// 职责: 从周期内的不可变历史行重新汇总 Line / Machine 滚动指标
// 输入: 已停止会话 + 已完成维修单（均限定在当前周期内）
// 输出: AggregateRollup（由仓储层整体写回）
// 红线: 不做增量累加，每次从源数据重算
// ==========================================

use crate::domain::incident::RepairIncident;
use crate::domain::line::RollingCounters;
use crate::domain::session::OperationSession;
use crate::domain::types::{IncidentStatus, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRollup {
    pub line: RollingCounters,
    /// (machine_id, counters)，顺序与输入 machine_ids 一致
    pub machines: Vec<(String, RollingCounters)>,
}

// ==========================================
// MetricsEngine
// ==========================================
#[derive(Debug, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    /// 汇总产线与设备指标
    ///
    /// - 运行小时 = Σ 已停止会话 duration_minutes / 60
    /// - 维修小时 = Σ 已完成维修单 repair_duration_minutes / 60
    /// - 设备 MTTR = 设备维修小时 / 设备故障次数
    /// - 设备 MTBF = 产线运行小时 / 设备故障次数（无故障时取运行小时）
    /// - 产线 MTTR/MTBF = 有故障设备的均值（无故障时 MTTR=0，MTBF=运行小时）
    pub fn rollup(
        &self,
        sessions: &[OperationSession],
        incidents: &[RepairIncident],
        machine_ids: &[String],
    ) -> AggregateRollup {
        let operation_hours: f64 = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Stopped)
            .filter_map(|s| s.duration_minutes)
            .sum::<f64>()
            / 60.0;

        let completed: Vec<&RepairIncident> = incidents
            .iter()
            .filter(|i| i.status == IncidentStatus::Completed)
            .collect();

        // machine_id -> (维修小时, 故障次数)
        let mut per_machine: HashMap<&str, (f64, i64)> = HashMap::new();
        for incident in &completed {
            let entry = per_machine.entry(incident.machine_id.as_str()).or_insert((0.0, 0));
            entry.0 += incident.repair_duration_minutes.unwrap_or(0.0) / 60.0;
            entry.1 += 1;
        }

        let machines: Vec<(String, RollingCounters)> = machine_ids
            .iter()
            .map(|id| {
                let (repair_hours, failures) =
                    per_machine.get(id.as_str()).copied().unwrap_or((0.0, 0));
                (id.clone(), machine_counters(operation_hours, repair_hours, failures))
            })
            .collect();

        let failing: Vec<&RollingCounters> = machines
            .iter()
            .map(|(_, c)| c)
            .filter(|c| c.total_failures > 0)
            .collect();

        let total_repair_hours: f64 = completed
            .iter()
            .map(|i| i.repair_duration_minutes.unwrap_or(0.0) / 60.0)
            .sum();
        let total_failures = completed.len() as i64;

        let (average_mttr, average_mtbf) = if failing.is_empty() {
            if total_failures > 0 {
                // 故障设备不在当前设备清单内（例如已归档），按产线整体计算
                (
                    total_repair_hours / total_failures as f64,
                    operation_hours / total_failures as f64,
                )
            } else {
                (0.0, operation_hours)
            }
        } else {
            let n = failing.len() as f64;
            (
                failing.iter().map(|c| c.average_mttr).sum::<f64>() / n,
                failing.iter().map(|c| c.average_mtbf).sum::<f64>() / n,
            )
        };

        AggregateRollup {
            line: RollingCounters {
                total_operation_hours: operation_hours,
                total_repair_hours,
                total_failures,
                average_mttr,
                average_mtbf,
            },
            machines,
        }
    }
}

fn machine_counters(operation_hours: f64, repair_hours: f64, failures: i64) -> RollingCounters {
    let (mttr, mtbf) = if failures > 0 {
        (repair_hours / failures as f64, operation_hours / failures as f64)
    } else {
        (0.0, operation_hours)
    };
    RollingCounters {
        total_operation_hours: operation_hours,
        total_repair_hours: repair_hours,
        total_failures: failures,
        average_mttr: mttr,
        average_mtbf: mtbf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::incident::IncidentReport;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn stopped_session(start: NaiveDateTime, stop: NaiveDateTime) -> OperationSession {
        let mut s = OperationSession::start("L1", "op", start);
        s.stop("op", 0, stop).unwrap();
        s
    }

    fn completed_incident(machine: &str, start: NaiveDateTime, end: NaiveDateTime) -> RepairIncident {
        let report = IncidentReport {
            line_id: "L1".to_string(),
            machine_id: machine.to_string(),
            problem: "故障".to_string(),
            reported_by: "op".to_string(),
            start_repair_immediately: true,
        };
        let mut inc = RepairIncident::report(&report, None, 1, start, start);
        inc.complete("tech", end).unwrap();
        inc
    }

    #[test]
    fn test_rollup_without_failures() {
        let engine = MetricsEngine::new();
        let sessions = vec![stopped_session(at(8, 0), at(12, 0))];
        let rollup = engine.rollup(&sessions, &[], &["M1".to_string()]);

        assert_eq!(rollup.line.total_operation_hours, 4.0);
        assert_eq!(rollup.line.total_failures, 0);
        assert_eq!(rollup.line.average_mttr, 0.0);
        assert_eq!(rollup.line.average_mtbf, 4.0);
        assert_eq!(rollup.machines[0].1.average_mtbf, 4.0);
    }

    #[test]
    fn test_rollup_per_machine() {
        let engine = MetricsEngine::new();
        let sessions = vec![stopped_session(at(8, 0), at(16, 0))];
        let incidents = vec![
            completed_incident("M1", at(9, 0), at(9, 30)),
            completed_incident("M1", at(10, 0), at(11, 30)),
            completed_incident("M2", at(12, 0), at(13, 0)),
        ];
        let machine_ids = vec!["M1".to_string(), "M2".to_string(), "M3".to_string()];
        let rollup = engine.rollup(&sessions, &incidents, &machine_ids);

        let m1 = rollup.machines[0].1;
        assert_eq!(m1.total_failures, 2);
        assert_eq!(m1.total_repair_hours, 2.0);
        assert_eq!(m1.average_mttr, 1.0);
        assert_eq!(m1.average_mtbf, 4.0);

        let m2 = rollup.machines[1].1;
        assert_eq!(m2.average_mttr, 1.0);
        assert_eq!(m2.average_mtbf, 8.0);

        let m3 = rollup.machines[2].1;
        assert_eq!(m3.total_failures, 0);
        assert_eq!(m3.average_mtbf, 8.0);

        assert_eq!(rollup.line.total_failures, 3);
        assert_eq!(rollup.line.total_repair_hours, 3.0);
        assert_eq!(rollup.line.average_mttr, 1.0);
        assert_eq!(rollup.line.average_mtbf, 6.0);
    }

    #[test]
    fn test_active_sessions_are_ignored() {
        let engine = MetricsEngine::new();
        let sessions = vec![
            stopped_session(at(8, 0), at(9, 0)),
            OperationSession::start("L1", "op", at(10, 0)),
        ];
        let rollup = engine.rollup(&sessions, &[], &[]);
        assert_eq!(rollup.line.total_operation_hours, 1.0);
    }
}

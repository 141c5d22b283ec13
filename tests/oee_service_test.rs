// ==========================================
// OEE 计算服务集成测试
// ==========================================
// 测试目标: 日 / 周 OEE 计算、无数据返回 None、按周期键覆盖、批量计算隔离
// ==========================================


use chrono::NaiveDate;
use line_ops_engine::domain::{IncidentReport, OeePeriodType};
use test_helpers::{at, insert_history, seed_line, setup_env, TestEnv};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// 08:00-16:00 运行，10:00-11:00 维修一次
fn run_day(env: &TestEnv, line_id: &str, machine_id: &str) {
    let session = env
        .state
        .operation_api
        .start_at(line_id, "op", at(8, 0))
        .unwrap();
    let incident = env
        .state
        .incident_api
        .report_at(
            IncidentReport {
                line_id: line_id.to_string(),
                machine_id: machine_id.to_string(),
                problem: "模具磨损".to_string(),
                reported_by: "op".to_string(),
                start_repair_immediately: true,
            },
            at(10, 0),
        )
        .unwrap();
    env.state
        .incident_api
        .complete_at(&incident.incident_id, "tech", at(11, 0))
        .unwrap();
    env.state
        .operation_api
        .stop_at(&session.session_id, "op", at(16, 0))
        .unwrap();
}

#[test]
fn test_daily_oee_full_computation() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", Some("CNT-01"));
    run_day(&env, &line.line_id, &machine.machine_id);
    insert_history(&env, "CNT-01", at(8, 0), 1000, 50, 21.0, 1200, Some(1));

    let record = env
        .state
        .oee_service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 0))
        .unwrap()
        .expect("record");

    assert_eq!(record.period_date, base_date());
    assert_eq!(record.period_start, at(7, 0));
    assert_eq!(record.shift, 1);
    assert!(approx(record.operation_time_hours, 8.0));
    assert!(approx(record.downtime_hours, 1.0));
    assert!(approx(record.uptime_hours, 7.0));
    assert_eq!(record.total_count, 1000);
    assert_eq!(record.good_count, 950);
    assert_eq!(record.target_count, 1200);
    assert!(approx(record.availability, 87.5));
    assert!(approx(record.performance, 21.0 * 1000.0 / (7.0 * 3600.0) * 100.0));
    assert!(approx(record.quality, 95.0));
    assert!(approx(record.achievement_rate, 1000.0 / 1200.0 * 100.0));
    assert!(approx(
        record.oee,
        record.availability * record.performance * record.quality / 10000.0
    ));
    assert_eq!(record.total_failures, 1);
}

#[test]
fn test_no_history_returns_none() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", Some("CNT-01"));
    run_day(&env, &line.line_id, &machine.machine_id);

    let record = env
        .state
        .oee_service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 0))
        .unwrap();
    assert!(record.is_none());
    assert!(env
        .state
        .oee_service
        .list_records(&line.line_id, OeePeriodType::Daily, base_date(), base_date())
        .unwrap()
        .is_empty());
}

#[test]
fn test_line_without_counter_device_returns_none() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    run_day(&env, &line.line_id, &machine.machine_id);

    let record = env
        .state
        .oee_service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 0))
        .unwrap();
    assert!(record.is_none());
}

#[test]
fn test_zero_operation_time_returns_none() {
    let env = setup_env();
    let (line, _) = seed_line(&env, "L01", Some("CNT-01"));
    insert_history(&env, "CNT-01", at(8, 0), 100, 0, 10.0, 100, Some(1));

    let record = env
        .state
        .oee_service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 0))
        .unwrap();
    assert!(record.is_none());
}

#[test]
fn test_recalculation_overwrites_same_period() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", Some("CNT-01"));
    run_day(&env, &line.line_id, &machine.machine_id);
    insert_history(&env, "CNT-01", at(8, 0), 1000, 50, 21.0, 1200, Some(1));

    let service = &env.state.oee_service;
    let first = service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 0))
        .unwrap()
        .unwrap();

    insert_history(&env, "CNT-01", at(13, 0), 500, 0, 21.0, 600, Some(1));
    let second = service
        .calculate_for_line(&line.line_id, OeePeriodType::Daily, base_date(), at(23, 30))
        .unwrap()
        .unwrap();

    assert_eq!(second.record_id, first.record_id);
    assert_eq!(second.total_count, 1500);

    let records = service
        .list_records(&line.line_id, OeePeriodType::Daily, base_date(), base_date())
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].total_count, 1500);
}

#[test]
fn test_weekly_period_anchors_on_monday() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", Some("CNT-01"));
    run_day(&env, &line.line_id, &machine.machine_id);
    insert_history(&env, "CNT-01", at(8, 0), 1000, 50, 21.0, 1200, None);

    let wednesday = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
    let record = env
        .state
        .oee_service
        .calculate_for_line(&line.line_id, OeePeriodType::Weekly, wednesday, at(23, 0))
        .unwrap()
        .unwrap();

    assert_eq!(record.period_type, OeePeriodType::Weekly);
    assert_eq!(record.period_date, base_date());
    // 履历无班次时按重叠会话的开始时间推断
    assert_eq!(record.shift, 1);
}

#[test]
fn test_daily_all_lines_isolates_idle_lines() {
    let env = setup_env();
    let (busy, machine) = seed_line(&env, "L01", Some("CNT-01"));
    seed_line(&env, "L02", Some("CNT-02"));
    seed_line(&env, "L03", None);
    run_day(&env, &busy.line_id, &machine.machine_id);
    insert_history(&env, "CNT-01", at(8, 0), 1000, 50, 21.0, 1200, Some(1));

    let records = env
        .state
        .oee_service
        .calculate_daily_all_lines_at(base_date(), at(23, 0))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].line_id, busy.line_id);
}

#[test]
fn test_list_records_rejects_inverted_range() {
    let env = setup_env();
    let (line, _) = seed_line(&env, "L01", Some("CNT-01"));
    let err = env
        .state
        .oee_service
        .list_records(
            &line.line_id,
            OeePeriodType::Daily,
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap(),
            base_date(),
        )
        .unwrap_err();
    assert!(matches!(err, line_ops_engine::ApiError::InvalidInput(_)));
}

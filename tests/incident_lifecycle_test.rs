// ==========================================
// 维修单生命周期集成测试
// ==========================================
// 测试目标: 报修补建会话、停线时间沿用、维修完成恢复产线、会话 MTBF、通知尽力投递
// ==========================================


use std::error::Error;
use std::sync::{Arc, Mutex};

use line_ops_engine::api::ApiError;
use line_ops_engine::domain::{IncidentReport, IncidentStatus};
use line_ops_engine::engine::events::{
    NoOpDevicePauseNotifier, NotificationEvent, NotificationPublisher,
    OptionalNotificationPublisher,
};
use test_helpers::{add_machine, at, line_status, seed_line, setup_env, setup_env_with};

fn report(line_id: &str, machine_id: &str) -> IncidentReport {
    IncidentReport {
        line_id: line_id.to_string(),
        machine_id: machine_id.to_string(),
        problem: "液压站压力不足".to_string(),
        reported_by: "op".to_string(),
        start_repair_immediately: false,
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<NotificationEvent>>,
}

impl NotificationPublisher for RecordingPublisher {
    fn publish(&self, event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok("msg-1".to_string())
    }
}

struct FailingPublisher;

impl NotificationPublisher for FailingPublisher {
    fn publish(&self, _event: NotificationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        Err("推送通道不可用".into())
    }
}

#[test]
fn test_report_without_active_session_creates_stub() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);

    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 5))
        .unwrap();

    let session_id = incident.session_id.clone().expect("session reference");
    let stub = env.state.operation_api.get_session(&session_id).unwrap();
    assert!(stub.is_stub);
    assert_eq!(stub.status, line_ops_engine::SessionStatus::Stopped);
    assert_eq!(stub.started_at, at(10, 0));
    assert_eq!(stub.stopped_at, Some(at(10, 5)));
    assert_eq!(stub.duration_minutes, Some(5.0));

    assert_eq!(incident.status, IncidentStatus::Reported);
    assert_eq!(incident.shift, 1);
    assert_eq!(incident.line_stopped_at, at(10, 5));
    assert_eq!(line_status(&env, &line.line_id), "MAINTENANCE");
    assert!(env
        .state
        .operation_api
        .get_active_session(&line.line_id)
        .unwrap()
        .is_none());
}

#[test]
fn test_report_uses_active_session() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    let session = env
        .state
        .operation_api
        .start_at(&line.line_id, "op", at(8, 0))
        .unwrap();

    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(9, 0))
        .unwrap();
    assert_eq!(incident.session_id.as_deref(), Some(session.session_id.as_str()));
    assert_eq!(env.state.operation_api.list_sessions(&line.line_id, 10).unwrap().len(), 1);
}

#[test]
fn test_session_mtbf_divides_by_completed_incidents() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    let ops = &env.state.operation_api;
    let incidents = &env.state.incident_api;

    let session = ops.start_at(&line.line_id, "op", at(8, 0)).unwrap();

    let first = incidents
        .report_at(report(&line.line_id, &machine.machine_id), at(9, 0))
        .unwrap();
    let done = incidents.complete_at(&first.incident_id, "tech", at(9, 30)).unwrap();
    assert_eq!(done.repair_duration_minutes, Some(30.0));

    let second = incidents
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();
    let done = incidents.complete_at(&second.incident_id, "tech", at(11, 30)).unwrap();
    assert_eq!(done.repair_duration_minutes, Some(90.0));

    let stopped = ops.stop_at(&session.session_id, "op", at(12, 0)).unwrap();
    assert_eq!(stopped.duration_minutes, Some(240.0));
    assert_eq!(stopped.mtbf_hours, Some(2.0));
    assert_eq!(line_status(&env, &line.line_id), "STOPPED");

    let line = env.state.line_api.get_line(&line.line_id).unwrap();
    assert_eq!(line.counters.total_failures, 2);
    assert_eq!(line.counters.total_repair_hours, 2.0);
    assert_eq!(line.counters.total_operation_hours, 4.0);
    assert_eq!(line.counters.average_mttr, 1.0);
    assert_eq!(line.counters.average_mtbf, 2.0);

    let machines = env.state.line_api.list_machines(&line.line_id).unwrap();
    assert_eq!(machines[0].counters.total_failures, 2);
    assert_eq!(machines[0].counters.average_mttr, 1.0);
}

#[test]
fn test_pending_line_stop_time_is_preserved() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    let other = add_machine(&env, &line.line_id, "L01-M2");
    let api = &env.state.incident_api;

    env.state
        .operation_api
        .start_at(&line.line_id, "op", at(8, 0))
        .unwrap();
    let a = api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();
    let b = api
        .report_at(report(&line.line_id, &other.machine_id), at(10, 20))
        .unwrap();
    assert_eq!(b.line_stopped_at, at(10, 0));
    assert_eq!(api.list_active_incidents(&line.line_id).unwrap().len(), 2);

    api.complete_at(&a.incident_id, "tech", at(10, 40)).unwrap();
    assert_eq!(line_status(&env, &line.line_id), "MAINTENANCE");

    let b = api.complete_at(&b.incident_id, "tech", at(11, 0)).unwrap();
    assert_eq!(b.line_stop_duration_minutes, Some(60.0));
    assert_eq!(line_status(&env, &line.line_id), "OPERATING");

    let line = env.state.line_api.get_line(&line.line_id).unwrap();
    assert!(line.line_stopped_at.is_none());
    assert!(api.list_active_incidents(&line.line_id).unwrap().is_empty());
}

#[test]
fn test_recomplete_is_domain_error() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    let api = &env.state.incident_api;

    let incident = api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();
    api.complete_at(&incident.incident_id, "tech", at(10, 30)).unwrap();

    let err = api.complete_at(&incident.incident_id, "tech", at(11, 0)).unwrap_err();
    assert!(matches!(err, ApiError::Domain(_)), "got {:?}", err);

    let stored = api.get_incident(&incident.incident_id).unwrap();
    assert_eq!(stored.completed_at, Some(at(10, 30)));

    let err = api.start_repair_at(&incident.incident_id, "tech", at(11, 0)).unwrap_err();
    assert!(matches!(err, ApiError::Domain(_)));
}

#[test]
fn test_start_repair_is_reentrant() {
    let env = setup_env();
    let (line, machine) = seed_line(&env, "L01", None);
    let api = &env.state.incident_api;

    let incident = api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();
    let first = api.start_repair_at(&incident.incident_id, "tech", at(10, 10)).unwrap();
    assert!(!first.outcome.is_noop());
    assert_eq!(first.incident.status, IncidentStatus::InRepair);

    let second = api.start_repair_at(&incident.incident_id, "tech", at(10, 15)).unwrap();
    assert!(second.outcome.is_noop());
    assert_eq!(second.incident.started_at, Some(at(10, 10)));

    let done = api.complete_at(&incident.incident_id, "tech", at(10, 40)).unwrap();
    assert_eq!(done.repair_duration_minutes, Some(30.0));
    assert_eq!(done.line_stop_duration_minutes, Some(40.0));
}

#[test]
fn test_machine_outside_line_is_rejected() {
    let env = setup_env();
    let (line, _) = seed_line(&env, "L01", None);
    let (_, foreign) = seed_line(&env, "L02", None);

    let err = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &foreign.machine_id), at(10, 0))
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(line_status(&env, &line.line_id), "STOPPED");
}

#[test]
fn test_notifications_published_on_report_and_complete() {
    let publisher = Arc::new(RecordingPublisher::default());
    let env = setup_env_with(
        OptionalNotificationPublisher::with_publisher(publisher.clone()),
        Arc::new(NoOpDevicePauseNotifier),
    );
    let (line, machine) = seed_line(&env, "L01", None);

    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(22, 0))
        .unwrap();
    env.state
        .incident_api
        .complete_at(&incident.incident_id, "tech", at(22, 45))
        .unwrap();

    let events = publisher.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    match &events[0] {
        NotificationEvent::LineStop(e) => {
            assert_eq!(e.report_number, incident.report_number);
            assert_eq!(e.line, "L01 产线");
            assert_eq!(e.machine, "冲压机");
            assert_eq!(e.shift, 2);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[1] {
        NotificationEvent::RepairComplete(e) => assert_eq!(e.repair_duration, 45.0),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_notification_failure_does_not_roll_back() {
    let env = setup_env_with(
        OptionalNotificationPublisher::with_publisher(Arc::new(FailingPublisher)),
        Arc::new(NoOpDevicePauseNotifier),
    );
    let (line, machine) = seed_line(&env, "L01", None);

    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();
    assert_eq!(line_status(&env, &line.line_id), "MAINTENANCE");

    let done = env
        .state
        .incident_api
        .complete_at(&incident.incident_id, "tech", at(10, 30))
        .unwrap();
    assert_eq!(done.status, IncidentStatus::Completed);
    assert_eq!(line_status(&env, &line.line_id), "OPERATING");
}

#[test]
fn test_oversized_stub_minutes_falls_back_to_default() {
    let env = setup_env();
    env.state
        .config_manager
        .set_global_config_value("stub_session_minutes", "9223372036854775807")
        .unwrap();
    let (line, machine) = seed_line(&env, "L01", None);

    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 5))
        .unwrap();

    let stub = env
        .state
        .operation_api
        .get_session(incident.session_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(stub.started_at, at(10, 0));
    assert_eq!(stub.duration_minutes, Some(5.0));
}

#[test]
fn test_complete_survives_failed_rollup() {
    let publisher = Arc::new(RecordingPublisher::default());
    let env = setup_env_with(
        OptionalNotificationPublisher::with_publisher(publisher.clone()),
        Arc::new(NoOpDevicePauseNotifier),
    );
    let (line, machine) = seed_line(&env, "L01", None);
    let incident = env
        .state
        .incident_api
        .report_at(report(&line.line_id, &machine.machine_id), at(10, 0))
        .unwrap();

    {
        let conn = env.conn.lock().unwrap();
        conn.execute(
            "UPDATE production_line SET break_windows_json = 'not-json' WHERE line_id = ?1",
            [&line.line_id],
        )
        .unwrap();
    }

    let done = env
        .state
        .incident_api
        .complete_at(&incident.incident_id, "tech", at(10, 30))
        .unwrap();
    assert_eq!(done.status, IncidentStatus::Completed);
    assert_eq!(line_status(&env, &line.line_id), "OPERATING");

    let stored = env.state.incident_api.get_incident(&incident.incident_id).unwrap();
    assert_eq!(stored.completed_at, Some(at(10, 30)));

    let events = publisher.events.lock().unwrap();
    match events.last() {
        Some(NotificationEvent::RepairComplete(e)) => {
            assert_eq!(e.line, line.line_id);
            assert_eq!(e.machine, "冲压机");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 10)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = ActionLog::new(
        "L1",
        ActionType::StartOperation,
        "op",
        at(8, 0),
        Some(json!({"session_id": "S1"})),
        "开始运行",
    );
    assert_eq!(repo.insert(&log).unwrap(), log.action_id);

    let found = repo.find_by_id(&log.action_id).unwrap().unwrap();
    assert_eq!(found.action_type, "START_OPERATION");
    assert_eq!(found.payload_json.unwrap()["session_id"], "S1");
    assert!(repo.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_list_by_line_newest_first() {
    let repo = ActionLogRepository::new(setup_test_db());

    repo.insert(&ActionLog::new("L1", ActionType::StartOperation, "op", at(8, 0), None, "开始"))
        .unwrap();
    repo.insert(&ActionLog::new("L1", ActionType::AutoPause, "system", at(9, 0), None, "自动暂停"))
        .unwrap();
    repo.insert(&ActionLog::new("L2", ActionType::StartOperation, "op", at(9, 5), None, "开始"))
        .unwrap();

    let logs = repo.list_by_line("L1", 10).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].action_type, "AUTO_PAUSE");
    assert_eq!(repo.count_by_line_and_type("L1", "AUTO_PAUSE").unwrap(), 1);
}

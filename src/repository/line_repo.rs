// ==========================================
// 产线运行引擎 - 产线/设备数据仓储
// ==========================================
// 对齐: production_line / line_machine 表
// 红线: Repository 不含业务逻辑
// 红线: 周期归档（快照 + 清零）必须在同一事务内完成
// ==========================================

use crate::domain::line::{Line, LineSchedule, Machine, RollingCounters};
use crate::domain::types::LineStatus;
use crate::engine::metrics::AggregateRollup;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{fmt_hm, fmt_opt_ts, fmt_ts, get_hm, get_json, get_opt_ts, get_ts};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const LINE_COLUMNS: &str = r#"line_id, line_code, line_name, plant, description, status,
    counter_device_id, start_time, end_time, break_windows_json, line_stopped_at,
    total_operation_hours, total_repair_hours, total_failures, average_mttr, average_mtbf,
    is_archived, current_period_start, period_start, period_end, parent_line_id,
    created_at, updated_at"#;

const MACHINE_COLUMNS: &str = r#"machine_id, line_id, machine_code, machine_name,
    total_operation_hours, total_repair_hours, total_failures, average_mttr, average_mtbf,
    is_archived, period_start, period_end, parent_machine_id, created_at"#;

// ==========================================
// LineRepository - 产线仓储
// ==========================================
pub struct LineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 产线
    // ==========================================

    /// 新建产线
    ///
    /// # 错误
    /// - `UniqueConstraintViolation`: 已存在同编码的未归档产线
    pub fn insert(&self, line: &Line) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_line(&conn, line)?;
        Ok(line.line_id.clone())
    }

    pub fn find_by_id(&self, line_id: &str) -> RepositoryResult<Option<Line>> {
        let conn = self.get_conn()?;
        find_line(&conn, line_id)
    }

    /// 按 id 查询，不存在时返回 NotFound
    pub fn get(&self, line_id: &str) -> RepositoryResult<Line> {
        self.find_by_id(line_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "Line".to_string(),
            id: line_id.to_string(),
        })
    }

    /// 查询全部未归档产线
    pub fn list_live(&self) -> RepositoryResult<Vec<Line>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM production_line WHERE is_archived = 0 ORDER BY line_code",
            LINE_COLUMNS
        ))?;
        let lines = stmt
            .query_map([], map_line_row)?
            .collect::<Result<Vec<Line>, _>>()?;
        Ok(lines)
    }

    /// 查询某产线的历史周期快照（按 period_end 倒序）
    pub fn list_archived_by_parent(&self, parent_line_id: &str) -> RepositoryResult<Vec<Line>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {} FROM production_line
               WHERE is_archived = 1 AND parent_line_id = ?
               ORDER BY period_end DESC"#,
            LINE_COLUMNS
        ))?;
        let lines = stmt
            .query_map(params![parent_line_id], map_line_row)?
            .collect::<Result<Vec<Line>, _>>()?;
        Ok(lines)
    }

    /// 更新排班（调用方负责校验）
    pub fn update_schedule(
        &self,
        line_id: &str,
        schedule: &LineSchedule,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE production_line
               SET start_time = ?, end_time = ?, break_windows_json = ?, updated_at = ?
               WHERE line_id = ? AND is_archived = 0"#,
            params![
                fmt_hm(schedule.start_time),
                fmt_hm(schedule.end_time),
                serde_json::to_string(&schedule.break_windows)?,
                fmt_ts(now),
                line_id,
            ],
        )?;
        ensure_line_touched(rows, line_id)
    }

    /// 写回滚动指标（产线 + 设备，同一事务）
    pub fn save_rollup(
        &self,
        line_id: &str,
        rollup: &AggregateRollup,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let c = &rollup.line;
        let rows = tx.execute(
            r#"UPDATE production_line
               SET total_operation_hours = ?, total_repair_hours = ?, total_failures = ?,
                   average_mttr = ?, average_mtbf = ?, updated_at = ?
               WHERE line_id = ? AND is_archived = 0"#,
            params![
                c.total_operation_hours,
                c.total_repair_hours,
                c.total_failures,
                c.average_mttr,
                c.average_mtbf,
                fmt_ts(now),
                line_id,
            ],
        )?;
        ensure_line_touched(rows, line_id)?;

        for (machine_id, mc) in &rollup.machines {
            tx.execute(
                r#"UPDATE line_machine
                   SET total_operation_hours = ?, total_repair_hours = ?, total_failures = ?,
                       average_mttr = ?, average_mtbf = ?
                   WHERE machine_id = ? AND line_id = ? AND is_archived = 0"#,
                params![
                    mc.total_operation_hours,
                    mc.total_repair_hours,
                    mc.total_failures,
                    mc.average_mttr,
                    mc.average_mtbf,
                    machine_id,
                    line_id,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 周期归档: 快照产线与设备 → 清零实时计数 → 开启新周期
    ///
    /// # 错误
    /// - `VersionConflict`: 产线存在 RUNNING/PAUSED 会话（须先停止运行）
    /// - `NotFound`: 产线不存在或已是归档行
    pub fn archive_period(
        &self,
        line_id: &str,
        reason: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<Line> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let live = match find_line(&tx, line_id)? {
            Some(line) if !line.is_archived => line,
            _ => {
                return Err(RepositoryError::NotFound {
                    entity: "Line".to_string(),
                    id: line_id.to_string(),
                })
            }
        };

        let active_sessions: i64 = tx.query_row(
            r#"SELECT COUNT(*) FROM operation_session
               WHERE line_id = ? AND status IN ('RUNNING', 'PAUSED')"#,
            params![line_id],
            |row| row.get(0),
        )?;
        if active_sessions > 0 {
            return Err(RepositoryError::VersionConflict {
                message: format!("产线 {} 仍在运行，请先停止运行再重置周期", live.line_code),
            });
        }

        // (a) 产线快照
        let period_start = live.effective_period_start();
        let mut archived = live.clone();
        archived.line_id = uuid::Uuid::new_v4().to_string();
        archived.status = LineStatus::Stopped;
        archived.line_stopped_at = None;
        archived.is_archived = true;
        archived.current_period_start = None;
        archived.period_start = Some(period_start);
        archived.period_end = Some(now);
        archived.parent_line_id = Some(live.line_id.clone());
        archived.description = Some(match live.description.as_deref() {
            Some(desc) if !desc.is_empty() => format!("{}\n[周期归档] {}", desc, reason),
            _ => format!("[周期归档] {}", reason),
        });
        archived.created_at = now;
        archived.updated_at = now;
        insert_line(&tx, &archived)?;

        // (b) 设备快照
        for machine in list_machines(&tx, line_id, false)? {
            let snapshot = Machine {
                machine_id: uuid::Uuid::new_v4().to_string(),
                line_id: archived.line_id.clone(),
                is_archived: true,
                period_start: Some(period_start),
                period_end: Some(now),
                parent_machine_id: Some(machine.machine_id.clone()),
                created_at: now,
                ..machine
            };
            insert_machine(&tx, &snapshot)?;
        }

        // (c) 清零实时计数
        tx.execute(
            r#"UPDATE production_line
               SET total_operation_hours = 0, total_repair_hours = 0, total_failures = 0,
                   average_mttr = 0, average_mtbf = 0,
                   current_period_start = ?, updated_at = ?
               WHERE line_id = ?"#,
            params![fmt_ts(now), fmt_ts(now), line_id],
        )?;
        tx.execute(
            r#"UPDATE line_machine
               SET total_operation_hours = 0, total_repair_hours = 0, total_failures = 0,
                   average_mttr = 0, average_mtbf = 0
               WHERE line_id = ? AND is_archived = 0"#,
            params![line_id],
        )?;

        tx.commit()?;
        Ok(archived)
    }

    // ==========================================
    // 设备
    // ==========================================

    pub fn insert_machine(&self, machine: &Machine) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        insert_machine(&conn, machine)?;
        Ok(machine.machine_id.clone())
    }

    pub fn find_machine(&self, machine_id: &str) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;
        let machine = conn
            .query_row(
                &format!("SELECT {} FROM line_machine WHERE machine_id = ?", MACHINE_COLUMNS),
                params![machine_id],
                map_machine_row,
            )
            .optional()?;
        Ok(machine)
    }

    /// 查询产线的未归档设备
    pub fn list_live_machines(&self, line_id: &str) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        list_machines(&conn, line_id, false)
    }

    /// 查询挂在归档产线下的设备快照
    pub fn list_archived_machines(&self, archived_line_id: &str) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        list_machines(&conn, archived_line_id, true)
    }
}

// ==========================================
// 行映射 / 共享 SQL（事务内外复用）
// ==========================================

fn ensure_line_touched(rows: usize, line_id: &str) -> RepositoryResult<()> {
    if rows == 0 {
        return Err(RepositoryError::NotFound {
            entity: "Line".to_string(),
            id: line_id.to_string(),
        });
    }
    Ok(())
}

fn find_line(conn: &Connection, line_id: &str) -> RepositoryResult<Option<Line>> {
    let line = conn
        .query_row(
            &format!("SELECT {} FROM production_line WHERE line_id = ?", LINE_COLUMNS),
            params![line_id],
            map_line_row,
        )
        .optional()?;
    Ok(line)
}

fn insert_line(conn: &Connection, line: &Line) -> RepositoryResult<()> {
    let c = &line.counters;
    conn.execute(
        &format!(
            "INSERT INTO production_line ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            LINE_COLUMNS
        ),
        params![
            line.line_id,
            line.line_code,
            line.line_name,
            line.plant,
            line.description,
            line.status.to_db_str(),
            line.counter_device_id,
            fmt_hm(line.schedule.start_time),
            fmt_hm(line.schedule.end_time),
            serde_json::to_string(&line.schedule.break_windows)?,
            fmt_opt_ts(line.line_stopped_at),
            c.total_operation_hours,
            c.total_repair_hours,
            c.total_failures,
            c.average_mttr,
            c.average_mtbf,
            line.is_archived,
            fmt_opt_ts(line.current_period_start),
            fmt_opt_ts(line.period_start),
            fmt_opt_ts(line.period_end),
            line.parent_line_id,
            fmt_ts(line.created_at),
            fmt_ts(line.updated_at),
        ],
    )?;
    Ok(())
}

fn insert_machine(conn: &Connection, machine: &Machine) -> RepositoryResult<()> {
    let c = &machine.counters;
    conn.execute(
        &format!(
            "INSERT INTO line_machine ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            MACHINE_COLUMNS
        ),
        params![
            machine.machine_id,
            machine.line_id,
            machine.machine_code,
            machine.machine_name,
            c.total_operation_hours,
            c.total_repair_hours,
            c.total_failures,
            c.average_mttr,
            c.average_mtbf,
            machine.is_archived,
            fmt_opt_ts(machine.period_start),
            fmt_opt_ts(machine.period_end),
            machine.parent_machine_id,
            fmt_ts(machine.created_at),
        ],
    )?;
    Ok(())
}

fn list_machines(conn: &Connection, line_id: &str, archived: bool) -> RepositoryResult<Vec<Machine>> {
    let mut stmt = conn.prepare(&format!(
        r#"SELECT {} FROM line_machine
           WHERE line_id = ? AND is_archived = ?
           ORDER BY machine_code"#,
        MACHINE_COLUMNS
    ))?;
    let machines = stmt
        .query_map(params![line_id, archived], map_machine_row)?
        .collect::<Result<Vec<Machine>, _>>()?;
    Ok(machines)
}

fn map_line_row(row: &rusqlite::Row) -> rusqlite::Result<Line> {
    let status: String = row.get(5)?;
    Ok(Line {
        line_id: row.get(0)?,
        line_code: row.get(1)?,
        line_name: row.get(2)?,
        plant: row.get(3)?,
        description: row.get(4)?,
        status: LineStatus::from_db_str(&status),
        counter_device_id: row.get(6)?,
        schedule: LineSchedule {
            start_time: get_hm(row, 7)?,
            end_time: get_hm(row, 8)?,
            break_windows: get_json(row, 9)?,
        },
        line_stopped_at: get_opt_ts(row, 10)?,
        counters: RollingCounters {
            total_operation_hours: row.get(11)?,
            total_repair_hours: row.get(12)?,
            total_failures: row.get(13)?,
            average_mttr: row.get(14)?,
            average_mtbf: row.get(15)?,
        },
        is_archived: row.get(16)?,
        current_period_start: get_opt_ts(row, 17)?,
        period_start: get_opt_ts(row, 18)?,
        period_end: get_opt_ts(row, 19)?,
        parent_line_id: row.get(20)?,
        created_at: get_ts(row, 21)?,
        updated_at: get_ts(row, 22)?,
    })
}

fn map_machine_row(row: &rusqlite::Row) -> rusqlite::Result<Machine> {
    Ok(Machine {
        machine_id: row.get(0)?,
        line_id: row.get(1)?,
        machine_code: row.get(2)?,
        machine_name: row.get(3)?,
        counters: RollingCounters {
            total_operation_hours: row.get(4)?,
            total_repair_hours: row.get(5)?,
            total_failures: row.get(6)?,
            average_mttr: row.get(7)?,
            average_mtbf: row.get(8)?,
        },
        is_archived: row.get(9)?,
        period_start: get_opt_ts(row, 10)?,
        period_end: get_opt_ts(row, 11)?,
        parent_machine_id: row.get(12)?,
        created_at: get_ts(row, 13)?,
    })
}

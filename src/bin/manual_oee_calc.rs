// Small dev utility: compute daily OEE for every live line and print the records.
//
// Usage:
//   cargo run --bin manual_oee_calc -- [db_path] [YYYY-MM-DD]
//
// The date defaults to the previous business day. Does not start the schedule loop.

use chrono::{Duration, NaiveDate};
use line_ops_engine::app::AppState;
use line_ops_engine::engine::ShiftClock;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    line_ops_engine::logging::init();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| "line_ops.db".to_string());

    let date = match args
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?,
        None => {
            ShiftClock::effective_date(chrono::Local::now().naive_local()) - Duration::days(1)
        }
    };

    let state = AppState::new(db_path)?;
    let records = state.oee_service.calculate_daily_all_lines(date)?;

    if records.is_empty() {
        println!("date={} no OEE records (no production history in window)", date);
        return Ok(());
    }

    for r in &records {
        println!(
            "line_id={} date={} shift={} availability={:.2} performance={:.2} quality={:.2} oee={:.2}",
            r.line_id, r.period_date, r.shift, r.availability, r.performance, r.quality, r.oee
        );
    }
    Ok(())
}

// ==========================================
// 产线运行引擎 - 宿主进程入口
// ==========================================
// 职责: 初始化日志与数据库，按固定周期驱动排班控制循环，
//       业务日切换时计算前一业务日的日 OEE
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use line_ops_engine::app::{get_default_db_path, AppState};
use line_ops_engine::config::EngineConfigReader;
use line_ops_engine::engine::ShiftClock;

#[tokio::main]
async fn main() {
    line_ops_engine::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} - 系统版本: {}", line_ops_engine::APP_NAME, line_ops_engine::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = Arc::new(AppState::new(db_path).expect("无法初始化AppState"));

    let tick_secs = state
        .config_manager
        .get_schedule_tick_interval_secs()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("读取调度周期失败，使用默认值: {}", e);
            line_ops_engine::config::config_manager::DEFAULT_SCHEDULE_TICK_INTERVAL_SECS
        });
    tracing::info!(tick_secs, "排班控制循环启动");

    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
    let mut business_date = ShiftClock::effective_date(chrono::Local::now().naive_local());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_tick(&state).await;

                let today = ShiftClock::effective_date(chrono::Local::now().naive_local());
                if today != business_date {
                    let finished = business_date;
                    business_date = today;
                    run_daily_oee(&state, finished).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("收到退出信号，停止排班控制循环");
                break;
            }
        }
    }
}

async fn run_tick(state: &Arc<AppState>) {
    let controller = state.schedule_controller.clone();
    match tokio::task::spawn_blocking(move || controller.tick()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!("排班控制周期失败: {}", e),
        Err(e) => tracing::error!("排班控制任务异常退出: {}", e),
    }
}

async fn run_daily_oee(state: &Arc<AppState>, date: chrono::NaiveDate) {
    let enabled = state
        .config_manager
        .is_oee_auto_daily_enabled()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("读取日 OEE 开关失败，按开启处理: {}", e);
            true
        });
    if !enabled {
        tracing::info!(%date, "日 OEE 自动计算已关闭，跳过");
        return;
    }

    let service = state.oee_service.clone();
    match tokio::task::spawn_blocking(move || service.calculate_daily_all_lines(date)).await {
        Ok(Ok(records)) => tracing::info!(%date, count = records.len(), "业务日切换，日 OEE 已计算"),
        Ok(Err(e)) => tracing::error!(%date, "日 OEE 计算失败: {}", e),
        Err(e) => tracing::error!("日 OEE 任务异常退出: {}", e),
    }
}

// ==========================================
// 产线运行引擎 - 班次时钟
// ==========================================
// 职责: 时间戳 → 业务日期 / 班次号；统计周期窗口
// 规则:
// - 07:00 之前归属前一业务日（跨零点的 2/3 班计入前一天）
// - 07:00–15:59 → 1 班；21:00–04:59 → 2 班；其余 → 3 班
// ==========================================

use crate::domain::types::OeePeriodType;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// 业务日起始小时
pub const BUSINESS_DAY_START_HOUR: u32 = 7;

/// 班次时钟（无状态）
pub struct ShiftClock;

impl ShiftClock {
    /// 业务日期
    pub fn effective_date(t: NaiveDateTime) -> NaiveDate {
        if t.hour() < BUSINESS_DAY_START_HOUR {
            t.date() - Duration::days(1)
        } else {
            t.date()
        }
    }

    /// 当前班次
    pub fn current_shift(t: NaiveDateTime) -> u8 {
        match t.hour() {
            7..=15 => 1,
            h if h >= 21 || h < 5 => 2,
            _ => 3,
        }
    }

    /// 业务日窗口 [date 07:00, date+1 07:00)
    pub fn business_day_window(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(Self::day_start());
        (start, start + Duration::days(1))
    }

    /// 班次窗口（按业务日）
    ///
    /// 1 班 07:00–16:00；3 班 16:00–21:00；2 班 21:00–次日 05:00
    /// 05:00–07:00 的尾段不计入任何班次窗口
    pub fn shift_window(date: NaiveDate, shift: u8) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let hm = |d: NaiveDate, h: u32| d.and_hms_opt(h, 0, 0);
        match shift {
            1 => Some((hm(date, 7)?, hm(date, 16)?)),
            3 => Some((hm(date, 16)?, hm(date, 21)?)),
            2 => Some((hm(date, 21)?, hm(date + Duration::days(1), 5)?)),
            _ => None,
        }
    }

    /// 统计周期窗口
    ///
    /// - Daily: 业务日
    /// - Weekly: 所在周周一 07:00 起 7 天
    /// - Monthly: 当月 1 日 07:00 至次月 1 日 07:00
    pub fn period_window(period_type: OeePeriodType, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        match period_type {
            OeePeriodType::Daily => Self::business_day_window(date),
            OeePeriodType::Weekly => {
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                let start = monday.and_time(Self::day_start());
                (start, start + Duration::days(7))
            }
            OeePeriodType::Monthly => {
                let first = date.with_day(1).unwrap_or(date);
                let next_first = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                }
                .unwrap_or(first + Duration::days(31));
                (
                    first.and_time(Self::day_start()),
                    next_first.and_time(Self::day_start()),
                )
            }
        }
    }

    fn day_start() -> NaiveTime {
        NaiveTime::from_hms_opt(BUSINESS_DAY_START_HOUR, 0, 0).unwrap_or_default()
    }
}

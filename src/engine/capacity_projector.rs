// ==========================================
// 计划对账引擎 - 产能日历投影
// ==========================================
// 职责: 期间产能 → 周产能
// 输入: CapacityBook + 可选日历 + 计划中出现的周
// 输出: WeeklyCapacity (创建后只读)
// ==========================================
// 规则:
// 1) 日历覆盖的期间: C * ratio 分配到日历周
// 2) 其余期间: C 按推断周数均分
//    - "YYYY-MM": max(回退周数, 月内 ISO 周数)
//    - "M{n}": 每第三期多 1 周 (近似 4-4-5 日历)
//    - 其他: 回退周数
// 3) 未登记产能的周为 0
// ==========================================

use crate::domain::capacity::{CapacityBook, WeeklyCapacity};
use crate::domain::types::{PeriodKey, WeekKey};
use crate::engine::calendar::{iso_weeks_in_month, parse_year_month, CalendarResolver};
use std::collections::BTreeMap;
use tracing::instrument;

// ==========================================
// CapacityCalendarProjector - 产能投影器
// ==========================================
#[derive(Debug, Clone)]
pub struct CapacityCalendarProjector {
    fallback_weeks: usize,
}

impl Default for CapacityCalendarProjector {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FALLBACK_WEEKS)
    }
}

impl CapacityCalendarProjector {
    pub fn new(fallback_weeks: usize) -> Self {
        Self {
            fallback_weeks: fallback_weeks.max(1),
        }
    }

    /// 期间产能投影到周
    ///
    /// # 参数
    /// - `book`: 期间产能汇总
    /// - `calendar`: 可选日历
    /// - `observed`: 计划中各期间出现的周（升序）
    ///
    /// # 返回
    /// 周产能; 无日历且期间无观测周时使用合成标签 "{period}-W{i}"
    #[instrument(skip(self, book, calendar, observed), fields(periods = book.iter().count()))]
    pub fn project(
        &self,
        book: &CapacityBook,
        calendar: Option<&dyn CalendarResolver>,
        observed: &BTreeMap<PeriodKey, Vec<WeekKey>>,
    ) -> WeeklyCapacity {
        let mut by_week: BTreeMap<WeekKey, f64> = BTreeMap::new();

        for (period, capacity) in book.iter() {
            if let Some(dist) = calendar.and_then(|cal| cal.distribution(period)) {
                for share in dist {
                    *by_week.entry(share.week.clone()).or_insert(0.0) += capacity * share.ratio;
                }
                continue;
            }

            let inferred = self.infer_week_count(period);
            let weeks: Vec<WeekKey> = match observed.get(period) {
                Some(weeks) if !weeks.is_empty() => weeks.clone(),
                _ => (1..=inferred)
                    .map(|i| WeekKey::new(format!("{}-W{}", period, i)))
                    .collect(),
            };
            let divisor = inferred.max(weeks.len()) as f64;
            for week in weeks {
                *by_week.entry(week).or_insert(0.0) += capacity / divisor;
            }
        }

        tracing::debug!(weeks = by_week.len(), "周产能投影完成");
        WeeklyCapacity::from_map(by_week)
    }

    /// 推断期间包含的周数
    pub fn infer_week_count(&self, period: &PeriodKey) -> usize {
        let label = period.as_str();
        if let Some((year, month)) = parse_year_month(label) {
            return self.fallback_weeks.max(iso_weeks_in_month(year, month));
        }
        if let Some(n) = label
            .strip_prefix('M')
            .and_then(|rest| rest.parse::<u32>().ok())
        {
            if n > 0 && n % 3 == 0 {
                return self.fallback_weeks + 1;
            }
        }
        self.fallback_weeks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capacity::{CapacityBucket, CapacityLookup};
    use crate::engine::calendar::{CalendarLookup, PlanningCalendar};

    #[test]
    fn test_infer_week_count() {
        let p = CapacityCalendarProjector::new(4);
        assert_eq!(p.infer_week_count(&PeriodKey::from("2025-01")), 5);
        assert_eq!(p.infer_week_count(&PeriodKey::from("2025-02")), 4);
        assert_eq!(p.infer_week_count(&PeriodKey::from("M3")), 5);
        assert_eq!(p.infer_week_count(&PeriodKey::from("M4")), 4);
        assert_eq!(p.infer_week_count(&PeriodKey::from("Q1")), 4);
    }

    #[test]
    fn test_equal_split_over_observed_weeks() {
        let book = CapacityBook::from_buckets(&[CapacityBucket::new("WC1", "2025-02", 40.0)]);
        let mut observed = BTreeMap::new();
        observed.insert(
            PeriodKey::from("2025-02"),
            (1..=4).map(|i| WeekKey::new(format!("2025-02-Wk{}", i))).collect(),
        );
        let weekly = CapacityCalendarProjector::new(4).project(&book, None, &observed);
        assert_eq!(weekly.len(), 4);
        assert!((weekly.capacity_of(&WeekKey::from("2025-02-Wk2")) - 10.0).abs() < 1e-9);
        assert_eq!(weekly.capacity_of(&WeekKey::from("2025-03-Wk1")), 0.0);
    }

    #[test]
    fn test_synthetic_weeks_without_observation() {
        let book = CapacityBook::from_buckets(&[CapacityBucket::new("WC1", "M6", 50.0)]);
        let weekly = CapacityCalendarProjector::new(4).project(&book, None, &BTreeMap::new());
        assert_eq!(weekly.len(), 5);
        assert!((weekly.capacity_of(&WeekKey::from("M6-W5")) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_calendar_ratio_split() {
        let cal: PlanningCalendar = serde_json::from_str(
            r#"{"periods":[{"period":"2025-01","weeks":[
                {"week_code":"A","weight":3,"sequence":1},
                {"week_code":"B","weight":1,"sequence":2}]}]}"#,
        )
        .unwrap();
        let lookup = CalendarLookup::from_calendar(&cal);
        let book = CapacityBook::from_buckets(&[CapacityBucket::new("WC1", "2025-01", 100.0)]);
        let weekly = CapacityCalendarProjector::default().project(
            &book,
            Some(&lookup as &dyn CalendarResolver),
            &BTreeMap::new(),
        );
        assert!((weekly.capacity_of(&WeekKey::from("A")) - 75.0).abs() < 1e-9);
        assert!((weekly.total() - 100.0).abs() < 1e-9);
    }
}

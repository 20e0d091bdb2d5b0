// ==========================================
// 计划对账引擎 - 计划日历
// ==========================================
// 职责: 期间 → 周配比 / 周 → 期间 / 周排序
// 说明: 日历由外部提供 (PlanningCalendar JSON), 缺失时按标签结构推断
// ==========================================
// 支持的标签:
// - 期间: "YYYY-MM" / "YYYY-Www" / 任意不透明标签 (如 "M3")
// - 周: "YYYY-MM-WkN" / "YYYY-Www" / 任意不透明标签
// ==========================================

use crate::domain::types::{CalendarMode, PeriodKey, WeekKey};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// PlanningCalendar - 日历文档
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningCalendar {
    #[serde(default)]
    pub periods: Vec<CalendarPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarPeriod {
    pub period: PeriodKey,
    #[serde(default)]
    pub weeks: Vec<CalendarWeek>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarWeek {
    pub week_code: WeekKey,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// 期间内单周配比（同一期间 ratio 之和为 1）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekShare {
    pub week: WeekKey,
    pub ratio: f64,
}

// ==========================================
// Trait: CalendarResolver
// ==========================================
// 用途: 引擎只通过该接口读取日历, 不关心来源
pub trait CalendarResolver {
    /// 期间的周配比; 日历未覆盖该期间时返回 None
    fn distribution(&self, period: &PeriodKey) -> Option<&[WeekShare]>;

    /// 周所属期间; 日历未覆盖该周时返回 None
    fn period_of(&self, week: &WeekKey) -> Option<PeriodKey>;

    /// 日历定义的全局周顺序
    fn week_order(&self) -> &[WeekKey];
}

// ==========================================
// CalendarLookup - 日历索引
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CalendarLookup {
    distributions: BTreeMap<PeriodKey, Vec<WeekShare>>,
    week_to_period: BTreeMap<WeekKey, PeriodKey>,
    week_order: Vec<WeekKey>,
}

impl CalendarLookup {
    /// 从日历文档构建索引
    ///
    /// 期间内按 (sequence, start_date, week_code) 排序;
    /// 权重全部非正时退化为均分
    pub fn from_calendar(calendar: &PlanningCalendar) -> Self {
        let mut lookup = CalendarLookup::default();
        let mut seen: BTreeSet<WeekKey> = BTreeSet::new();

        for period in &calendar.periods {
            if period.weeks.is_empty() {
                continue;
            }
            let mut weeks: Vec<&CalendarWeek> = period.weeks.iter().collect();
            weeks.sort_by(|a, b| {
                (a.sequence, a.start_date, &a.week_code).cmp(&(b.sequence, b.start_date, &b.week_code))
            });

            let weights: Vec<f64> = weeks.iter().map(|w| w.weight.max(0.0)).collect();
            let total: f64 = weights.iter().sum();
            let n = weeks.len() as f64;

            let shares: Vec<WeekShare> = weeks
                .iter()
                .zip(weights.iter())
                .map(|(w, weight)| WeekShare {
                    week: w.week_code.clone(),
                    ratio: if total > 0.0 { weight / total } else { 1.0 / n },
                })
                .collect();

            for w in &weeks {
                if seen.insert(w.week_code.clone()) {
                    lookup.week_order.push(w.week_code.clone());
                }
                lookup
                    .week_to_period
                    .insert(w.week_code.clone(), period.period.clone());
            }
            lookup.distributions.insert(period.period.clone(), shares);
        }

        tracing::debug!(
            periods = lookup.distributions.len(),
            weeks = lookup.week_order.len(),
            "日历索引构建完成"
        );
        lookup
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

impl CalendarResolver for CalendarLookup {
    fn distribution(&self, period: &PeriodKey) -> Option<&[WeekShare]> {
        self.distributions.get(period).map(|v| v.as_slice())
    }

    fn period_of(&self, week: &WeekKey) -> Option<PeriodKey> {
        self.week_to_period.get(week).cloned()
    }

    fn week_order(&self) -> &[WeekKey] {
        &self.week_order
    }
}

// ==========================================
// 周排序 / 周 → 期间
// ==========================================

/// 周标签去重并排序: 日历顺序优先, 其余按字符串升序追加
pub fn ordered_weeks<'a, I>(weeks: I, calendar: Option<&dyn CalendarResolver>) -> Vec<WeekKey>
where
    I: IntoIterator<Item = &'a WeekKey>,
{
    let unique: BTreeSet<&WeekKey> = weeks.into_iter().filter(|w| !w.is_empty()).collect();

    let mut ordered: Vec<WeekKey> = Vec::with_capacity(unique.len());
    let mut placed: BTreeSet<&WeekKey> = BTreeSet::new();
    if let Some(cal) = calendar {
        for week in cal.week_order() {
            if let Some(w) = unique.get(week) {
                if placed.insert(*w) {
                    ordered.push((*w).clone());
                }
            }
        }
    }
    for w in &unique {
        if !placed.contains(*w) {
            ordered.push((*w).clone());
        }
    }
    ordered
}

/// 推断周所属期间
///
/// 顺序: 日历 → ISO 周 "YYYY-Www" (周四所在月) → "YYYY-MM" 前缀 → 标签本身
pub fn resolve_period_for_week(week: &WeekKey, calendar: Option<&dyn CalendarResolver>) -> PeriodKey {
    let label = week.as_str();
    if label.is_empty() {
        return PeriodKey::new("");
    }
    if let Some(period) = calendar.and_then(|cal| cal.period_of(week)) {
        return period;
    }
    if label.len() >= 7 && label.as_bytes()[4] == b'-' {
        if let Some((year, wk)) = parse_iso_week(label) {
            if let Some(thursday) = NaiveDate::from_isoywd_opt(year, wk, Weekday::Thu) {
                return PeriodKey::new(format!("{:04}-{:02}", thursday.year(), thursday.month()));
            }
        }
        if let Some(prefix) = label.get(..7) {
            return PeriodKey::new(prefix);
        }
    }
    PeriodKey::new(label)
}

/// 期间前后移动 step 个单位 ("YYYY-MM" 按月, "YYYY-Www" 按 ISO 周)
///
/// 无法识别的标签返回 None
pub fn period_add(period: &PeriodKey, step: i64) -> Option<PeriodKey> {
    let label = period.as_str();

    if let Some((year, wk)) = parse_iso_week(label) {
        let monday = NaiveDate::from_isoywd_opt(year, wk, Weekday::Mon)?;
        let moved = monday.checked_add_signed(Duration::weeks(step))?;
        let iso = moved.iso_week();
        return Some(PeriodKey::new(format!("{:04}-W{:02}", iso.year(), iso.week())));
    }

    let (year, month) = parse_year_month(label)?;
    let index = year as i64 * 12 + (month as i64 - 1) + step;
    let y2 = index.div_euclid(12);
    let m2 = index.rem_euclid(12) + 1;
    Some(PeriodKey::new(format!("{:04}-{:02}", y2, m2)))
}

// ==========================================
// 月份 / ISO 周计算
// ==========================================

/// 月份天数
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 30,
    }
}

/// 月内 ISO 周数（周四落在该月的周）
pub fn iso_weeks_in_month(year: i32, month: u32) -> usize {
    (1..=days_in_month(year, month))
        .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .filter(|d| d.weekday() == Weekday::Thu)
        .count()
}

/// 解析 "YYYY-MM" 标签
pub fn parse_year_month(label: &str) -> Option<(i32, u32)> {
    let year: i32 = label.get(..4)?.parse().ok()?;
    if label.as_bytes().get(4) != Some(&b'-') {
        return None;
    }
    let month: u32 = label.get(5..7)?.parse().ok()?;
    if (1..=12).contains(&month) && label.len() == 7 {
        Some((year, month))
    } else {
        None
    }
}

/// 解析 "YYYY-Www" 标签
fn parse_iso_week(label: &str) -> Option<(i32, u32)> {
    let bytes = label.as_bytes();
    if bytes.len() < 7 || bytes[4] != b'-' || !bytes[5].eq_ignore_ascii_case(&b'W') {
        return None;
    }
    let year: i32 = label.get(..4)?.parse().ok()?;
    let digits: String = label.get(6..)?.chars().take_while(|c| c.is_ascii_digit()).take(2).collect();
    let week: u32 = digits.parse().ok()?;
    if week == 0 {
        return None;
    }
    Some((year, week))
}

/// 解析周标签中的 "WkN" 序号
pub fn parse_wk_number(label: &str) -> Option<u32> {
    let (_, tail) = label.rsplit_once("Wk")?;
    let digits: String = tail.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// ==========================================
// 切换周位置估算
// ==========================================

/// 估算切换日在期间内的行位置 (0..n-1)
///
/// # 参数
/// - `weeks`: 期间内周标签（已升序）
/// - `cutover`: 切换日期
/// - `mode`: simple 按 (日+6)/7; iso 按月内位置比例映射到 n 个离散点
///
/// # 返回
/// 标签序号精确命中优先, 否则取最近序号; 空序列返回 0
pub fn estimate_cutover_index(weeks: &[WeekKey], cutover: Option<NaiveDate>, mode: CalendarMode) -> usize {
    let n = weeks.len();
    if n == 0 {
        return 0;
    }
    let numbers: Vec<i64> = weeks
        .iter()
        .enumerate()
        .map(|(i, w)| parse_wk_number(w.as_str()).map(i64::from).unwrap_or(i as i64 + 1))
        .collect();

    let estimate = cutover.map(|date| {
        let day = date.day() as i64;
        match mode {
            CalendarMode::Iso => {
                let mdays = days_in_month(date.year(), date.month()) as i64;
                let frac = ((day - 1) as f64 / (mdays - 1).max(1) as f64).clamp(0.0, 1.0);
                (frac * (n as f64 - 1.0).max(0.0)).round() as i64 + 1
            }
            CalendarMode::Simple => ((day + 6) / 7).clamp(1, n as i64),
        }
    });

    match estimate {
        Some(est) => match numbers.iter().position(|x| *x == est) {
            Some(pos) => pos,
            None => numbers
                .iter()
                .enumerate()
                .min_by_key(|(_, x)| (*x - est).abs())
                .map(|(i, _)| i)
                .unwrap_or(0),
        },
        None => (n - 1) / 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> PlanningCalendar {
        serde_json::from_str(
            r#"{"periods":[
                {"period":"2025-01","weeks":[
                    {"week_code":"2025-W02","weight":2,"sequence":2},
                    {"week_code":"2025-W01","weight":1,"sequence":1},
                    {"week_code":"2025-W03","weight":1,"sequence":3}]},
                {"period":"2025-02","weeks":[
                    {"week_code":"2025-W05","weight":0,"sequence":1},
                    {"week_code":"2025-W06","weight":0,"sequence":2}]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_distribution_and_order() {
        let lookup = CalendarLookup::from_calendar(&calendar());
        let dist = lookup.distribution(&PeriodKey::from("2025-01")).unwrap();
        assert_eq!(dist[0].week, WeekKey::from("2025-W01"));
        assert!((dist[1].ratio - 0.5).abs() < 1e-12);

        // 权重全零 → 均分
        let dist = lookup.distribution(&PeriodKey::from("2025-02")).unwrap();
        assert!((dist[0].ratio - 0.5).abs() < 1e-12);
        assert_eq!(lookup.week_order().len(), 5);
    }

    #[test]
    fn test_ordered_weeks_calendar_first() {
        let lookup = CalendarLookup::from_calendar(&calendar());
        let weeks = vec![
            WeekKey::from("2025-W02"),
            WeekKey::from("2024-W52"),
            WeekKey::from("2025-W01"),
            WeekKey::from("2025-W02"),
        ];
        let ordered = ordered_weeks(weeks.iter(), Some(&lookup as &dyn CalendarResolver));
        let labels: Vec<&str> = ordered.iter().map(|w| w.as_str()).collect();
        assert_eq!(labels, vec!["2025-W01", "2025-W02", "2024-W52"]);

        let plain = ordered_weeks(weeks.iter(), None);
        assert_eq!(plain[0].as_str(), "2024-W52");
    }

    #[test]
    fn test_resolve_period() {
        assert_eq!(resolve_period_for_week(&WeekKey::from("2025-01-Wk3"), None).as_str(), "2025-01");
        // 2025-W05 的周四是 1 月 30 日
        assert_eq!(resolve_period_for_week(&WeekKey::from("2025-W05"), None).as_str(), "2025-01");
        assert_eq!(resolve_period_for_week(&WeekKey::from("2025-W06"), None).as_str(), "2025-02");
        assert_eq!(resolve_period_for_week(&WeekKey::from("M3-W1"), None).as_str(), "M3-W1");
    }

    #[test]
    fn test_period_add() {
        assert_eq!(period_add(&PeriodKey::from("2025-01"), -1).unwrap().as_str(), "2024-12");
        assert_eq!(period_add(&PeriodKey::from("2025-12"), 1).unwrap().as_str(), "2026-01");
        assert_eq!(period_add(&PeriodKey::from("2025-W01"), -1).unwrap().as_str(), "2024-W52");
        assert!(period_add(&PeriodKey::from("M3"), 1).is_none());
    }

    #[test]
    fn test_iso_weeks_in_month() {
        // 2025-01: 周四 2,9,16,23,30
        assert_eq!(iso_weeks_in_month(2025, 1), 5);
        assert_eq!(iso_weeks_in_month(2025, 2), 4);
        assert_eq!(days_in_month(2024, 2), 29);
    }

    #[test]
    fn test_estimate_cutover_index() {
        let weeks: Vec<WeekKey> = (1..=4).map(|i| WeekKey::new(format!("2025-01-Wk{}", i))).collect();
        let d = NaiveDate::from_ymd_opt(2025, 1, 15);
        assert_eq!(estimate_cutover_index(&weeks, d, CalendarMode::Simple), 2);
        // iso: (15-1)/30 * 3 = 1.4 → 第 2 周
        assert_eq!(estimate_cutover_index(&weeks, d, CalendarMode::Iso), 1);
        assert_eq!(estimate_cutover_index(&weeks, None, CalendarMode::Simple), 1);

        // 标签不连续时取最近序号
        let sparse = vec![WeekKey::from("2025-01-Wk1"), WeekKey::from("2025-01-Wk4")];
        assert_eq!(estimate_cutover_index(&sparse, d, CalendarMode::Simple), 0);
    }
}

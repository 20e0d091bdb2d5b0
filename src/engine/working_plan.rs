// ==========================================
// 计划对账引擎 - 工作计划
// ==========================================
// WorkingPlan: 明细行 + 当前指标值, 以 (family, period) 建立行索引
// AggregateIndex: 聚合目标按 (family, period) 索引
// ==========================================
// 说明: 行只按下标访问, 再分配与结转都只改写 current
// ==========================================

use crate::domain::plan::{AggregateRow, DetailRow};
use crate::domain::types::{Metric, MetricTriple, PeriodKey, WeekKey};
use crate::engine::calendar::{resolve_period_for_week, CalendarResolver};
use std::collections::BTreeMap;

/// 分组键 (family, period)
pub type GroupKey = (String, PeriodKey);

// ==========================================
// AggregateIndex - 聚合目标索引
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateIndex {
    targets: BTreeMap<GroupKey, MetricTriple>,
}

impl AggregateIndex {
    /// 建立索引; 重复的 (family, period) 累加并告警
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let mut targets: BTreeMap<GroupKey, MetricTriple> = BTreeMap::new();
        for row in rows {
            let key = (row.family.clone(), row.period.clone());
            match targets.get_mut(&key) {
                Some(existing) => {
                    tracing::warn!(family = %row.family, period = %row.period, "聚合行重复, 已累加");
                    for m in Metric::ALL {
                        existing.add(m, row.metrics().get(m));
                    }
                }
                None => {
                    targets.insert(key, row.metrics());
                }
            }
        }
        Self { targets }
    }

    pub fn get(&self, family: &str, period: &PeriodKey) -> Option<MetricTriple> {
        self.targets
            .get(&(family.to_string(), period.clone()))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &MetricTriple)> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// ==========================================
// WorkingPlan - 工作计划
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct WorkingPlan {
    rows: Vec<DetailRow>,
    periods: Vec<PeriodKey>,
    current: Vec<MetricTriple>,
    groups: BTreeMap<GroupKey, Vec<usize>>,
}

impl WorkingPlan {
    /// 构建工作计划
    ///
    /// 行期间: 显式 period 优先, 否则由周标签推断;
    /// 组内行按 (week, sku, 输入顺序) 排序
    pub fn build(rows: Vec<DetailRow>, calendar: Option<&dyn CalendarResolver>) -> Self {
        let periods: Vec<PeriodKey> = rows
            .iter()
            .map(|r| match &r.period {
                Some(p) if !p.is_empty() => p.clone(),
                _ => resolve_period_for_week(&r.week, calendar),
            })
            .collect();
        let current: Vec<MetricTriple> = rows.iter().map(|r| r.metrics()).collect();

        let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
        for (idx, row) in rows.iter().enumerate() {
            let family = row.family_key().unwrap_or_default().to_string();
            groups
                .entry((family, periods[idx].clone()))
                .or_default()
                .push(idx);
        }
        for idxs in groups.values_mut() {
            idxs.sort_by(|a, b| (&rows[*a].week, &rows[*a].sku, *a).cmp(&(&rows[*b].week, &rows[*b].sku, *b)));
        }

        Self {
            rows,
            periods,
            current,
            groups,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DetailRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &DetailRow {
        &self.rows[idx]
    }

    pub fn period_of(&self, idx: usize) -> &PeriodKey {
        &self.periods[idx]
    }

    pub fn week_of(&self, idx: usize) -> &WeekKey {
        &self.rows[idx].week
    }

    /// 组内行下标（按周升序）; 不存在的组为空
    pub fn group(&self, family: &str, period: &PeriodKey) -> &[usize] {
        self.groups
            .get(&(family.to_string(), period.clone()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn group_keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    pub fn current(&self, idx: usize) -> MetricTriple {
        self.current[idx]
    }

    pub fn set_current(&mut self, idx: usize, metric: Metric, value: f64) {
        self.current[idx].set(metric, value);
    }

    pub fn sum_current(&self, idxs: &[usize]) -> MetricTriple {
        let mut total = MetricTriple::default();
        for &idx in idxs {
            for m in Metric::ALL {
                total.add(m, self.current[idx].get(m));
            }
        }
        total
    }

    pub fn sum_original(&self, idxs: &[usize]) -> MetricTriple {
        let mut total = MetricTriple::default();
        for &idx in idxs {
            for m in Metric::ALL {
                total.add(m, self.rows[idx].metrics().get(m));
            }
        }
        total
    }

    /// 拆解为 (明细行, 当前值, 行期间)
    pub fn into_parts(self) -> (Vec<DetailRow>, Vec<MetricTriple>, Vec<PeriodKey>) {
        (self.rows, self.current, self.periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_sorted_by_week() {
        let rows = vec![
            DetailRow::new("F1", "A", "2025-01-Wk3", 1.0, 0.0, 0.0),
            DetailRow::new("F1", "A", "2025-01-Wk1", 2.0, 0.0, 0.0),
            DetailRow::new("F1", "B", "2025-02-Wk1", 3.0, 0.0, 0.0),
        ];
        let plan = WorkingPlan::build(rows, None);
        let g = plan.group("F1", &PeriodKey::from("2025-01"));
        assert_eq!(g, &[1, 0]);
        assert_eq!(plan.sum_current(g).demand, 3.0);
        assert!(plan.group("F2", &PeriodKey::from("2025-01")).is_empty());
    }

    #[test]
    fn test_aggregate_duplicates_are_summed() {
        let idx = AggregateIndex::from_rows(&[
            AggregateRow::new("F1", "2025-01", 10.0, 5.0, 0.0),
            AggregateRow::new("F1", "2025-01", 1.0, 1.0, 1.0),
        ]);
        assert_eq!(idx.len(), 1);
        assert_eq!(
            idx.get("F1", &PeriodKey::from("2025-01")),
            Some(MetricTriple::new(11.0, 6.0, 1.0))
        );
    }

    #[test]
    fn test_empty_family_groups_under_item() {
        let raw = r#"{"family":"","item":"F1","sku":"A","week":"2025-01-Wk1","demand":30}"#;
        let row: DetailRow = serde_json::from_str(raw).unwrap();
        assert_eq!(row.family_key(), Some("F1"));

        let plan = WorkingPlan::build(vec![row], None);
        let g = plan.group("F1", &PeriodKey::from("2025-01"));
        assert_eq!(g, &[0]);
        assert_eq!(plan.sum_current(g).demand, 30.0);
    }

    #[test]
    fn test_row_without_week_has_no_period() {
        let raw = r#"[{"family":"F1","sku":"A","demand":5},
                      {"family":"F1","sku":"B","week":"2025-01-Wk2","demand":7}]"#;
        let rows: Vec<DetailRow> = serde_json::from_str(raw).unwrap();
        assert!(rows[0].week.is_empty());

        let plan = WorkingPlan::build(rows, None);
        assert_eq!(plan.len(), 2);
        assert!(plan.period_of(0).is_empty());
        assert_eq!(plan.group("F1", &PeriodKey::from("2025-01")), &[1]);
    }
}

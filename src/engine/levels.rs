// ==========================================
// 计划对账引擎 - 层级差异报告
// ==========================================
// 职责: 明细汇总到 (family, period) 后与聚合计划比对
// 口径: delta = det - agg, rel = |delta| / max(|agg|, |det|, 1)
//       ok = |delta| <= tol_abs 或 rel <= tol_rel (逐指标)
// 边界: 切换月 (YYYY-MM) 或其 ISO 周标签 (YYYY-Www) 标记为 boundary
// ==========================================

use crate::domain::types::{Metric, MetricTriple, PeriodKey};
use crate::engine::rounding::round6;
use crate::engine::working_plan::{AggregateIndex, GroupKey, WorkingPlan};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// 边界明细展示条数
pub const BOUNDARY_TOP_N: usize = 10;

/// 逐指标判定
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricFlags {
    pub demand: bool,
    pub supply: bool,
    pub backlog: bool,
}

impl MetricFlags {
    fn set(&mut self, metric: Metric, value: bool) {
        match metric {
            Metric::Demand => self.demand = value,
            Metric::Supply => self.supply = value,
            Metric::Backlog => self.backlog = value,
        }
    }
}

/// (family, period) 差异行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDelta {
    pub family: String,
    pub period: PeriodKey,
    pub agg: MetricTriple,
    pub det: MetricTriple,
    pub delta: MetricTriple,
    pub rel: MetricTriple,
    pub ok_metrics: MetricFlags,
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub boundary_period: bool,
}

impl LevelDelta {
    pub fn max_abs_delta(&self) -> f64 {
        self.delta.max_abs()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundarySummary {
    pub period: Option<PeriodKey>,
    pub violations: usize,
    pub max_abs_delta: MetricTriple,
    pub top: Vec<LevelDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelSummary {
    pub rows: usize,
    pub tol_violations: usize,
    pub max_abs_delta: MetricTriple,
    pub boundary: BoundarySummary,
}

/// 层级差异报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelReport {
    pub summary: LevelSummary,
    pub deltas: Vec<LevelDelta>,
}

// ==========================================
// LevelComparer - 层级比对器
// ==========================================
#[derive(Debug, Clone)]
pub struct LevelComparer {
    tol_abs: f64,
    tol_rel: f64,
    boundary_month: Option<PeriodKey>,
    boundary_iso_week: Option<PeriodKey>,
}

impl LevelComparer {
    pub fn new(tol_abs: f64, tol_rel: f64, cutover_date: Option<NaiveDate>) -> Self {
        let boundary_month = cutover_date.map(|d| PeriodKey::new(d.format("%Y-%m").to_string()));
        let boundary_iso_week = cutover_date.map(|d| {
            let iso = d.iso_week();
            PeriodKey::new(format!("{:04}-W{:02}", iso.year(), iso.week()))
        });
        Self {
            tol_abs,
            tol_rel,
            boundary_month,
            boundary_iso_week,
        }
    }

    /// 明细汇总（use_current = true 取调整后值, 否则取原值）; 无 family 或无期间的行不参与
    pub fn rollup(plan: &WorkingPlan, use_current: bool) -> BTreeMap<GroupKey, MetricTriple> {
        plan.group_keys()
            .filter(|(family, period)| !family.is_empty() && !period.is_empty())
            .map(|(family, period)| {
                let idxs = plan.group(family, period);
                let sum = if use_current {
                    plan.sum_current(idxs)
                } else {
                    plan.sum_original(idxs)
                };
                ((family.clone(), period.clone()), sum)
            })
            .collect()
    }

    fn is_boundary(&self, period: &PeriodKey) -> bool {
        self.boundary_month.as_ref() == Some(period) || self.boundary_iso_week.as_ref() == Some(period)
    }

    /// 比对聚合目标与明细汇总
    pub fn compare(
        &self,
        targets: &AggregateIndex,
        rollup: &BTreeMap<GroupKey, MetricTriple>,
    ) -> LevelReport {
        let keys: BTreeSet<GroupKey> = targets
            .iter()
            .map(|(k, _)| k.clone())
            .chain(rollup.keys().cloned())
            .collect();

        let mut report = LevelReport::default();
        for (family, period) in keys {
            let agg = targets.get(&family, &period).unwrap_or_default();
            let det = rollup
                .get(&(family.clone(), period.clone()))
                .copied()
                .unwrap_or_default();

            let mut row = LevelDelta {
                boundary_period: self.is_boundary(&period),
                family,
                period,
                agg: round_triple(&agg),
                det: round_triple(&det),
                delta: MetricTriple::default(),
                rel: MetricTriple::default(),
                ok_metrics: MetricFlags::default(),
                ok: true,
            };

            for m in Metric::ALL {
                let (a, d) = (agg.get(m), det.get(m));
                let delta = d - a;
                let denom = a.abs().max(d.abs()).max(1.0);
                let rel = delta.abs() / denom;
                let ok = delta.abs() <= self.tol_abs || rel <= self.tol_rel;
                if !ok {
                    row.ok = false;
                    report.summary.tol_violations += 1;
                }
                let max = report.summary.max_abs_delta.get(m).max(delta.abs());
                report.summary.max_abs_delta.set(m, max);
                row.delta.set(m, round6(delta));
                row.rel.set(m, round6(rel));
                row.ok_metrics.set(m, ok);
            }
            report.deltas.push(row);
        }

        report.summary.rows = report.deltas.len();
        report.summary.max_abs_delta = round_triple(&report.summary.max_abs_delta);
        report.summary.boundary = self.boundary_summary(&report.deltas);
        report
    }

    fn boundary_summary(&self, deltas: &[LevelDelta]) -> BoundarySummary {
        let rows: Vec<&LevelDelta> = deltas.iter().filter(|r| r.boundary_period).collect();
        let mut summary = BoundarySummary {
            period: self.boundary_month.clone(),
            violations: rows.iter().filter(|r| !r.ok).count(),
            ..BoundarySummary::default()
        };
        for r in &rows {
            for m in Metric::ALL {
                let max = summary.max_abs_delta.get(m).max(r.delta.get(m).abs());
                summary.max_abs_delta.set(m, max);
            }
        }
        let mut top: Vec<LevelDelta> = rows.into_iter().cloned().collect();
        // 稳定排序: 差异相同保持 (family, period) 顺序
        top.sort_by(|a, b| b.max_abs_delta().total_cmp(&a.max_abs_delta()));
        top.truncate(BOUNDARY_TOP_N);
        summary.top = top;
        summary
    }
}

fn round_triple(t: &MetricTriple) -> MetricTriple {
    MetricTriple::new(round6(t.demand), round6(t.supply), round6(t.backlog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{AggregateRow, DetailRow};

    #[test]
    fn test_compare_flags_boundary_and_violations() {
        let targets = AggregateIndex::from_rows(&[
            AggregateRow::new("F1", "2025-01", 120.0, 100.0, 20.0),
            AggregateRow::new("F1", "2025-02", 50.0, 50.0, 0.0),
        ]);
        let plan = WorkingPlan::build(
            vec![
                DetailRow::new("F1", "A", "2025-01-Wk1", 100.0, 80.0, 20.0),
                DetailRow::new("F1", "A", "2025-02-Wk1", 50.0, 50.0, 0.0),
                DetailRow::new("F2", "B", "2025-02-Wk1", 5.0, 0.0, 0.0),
            ],
            None,
        );
        let comparer = LevelComparer::new(1e-6, 1e-6, NaiveDate::from_ymd_opt(2025, 1, 15));
        let report = comparer.compare(&targets, &LevelComparer::rollup(&plan, false));

        assert_eq!(report.summary.rows, 3);
        // F1/2025-01 两项 + F2/2025-02 一项
        assert_eq!(report.summary.tol_violations, 3);
        assert_eq!(report.summary.max_abs_delta.demand, 20.0);
        assert_eq!(report.summary.boundary.violations, 1);
        assert_eq!(report.summary.boundary.top.len(), 1);
        assert_eq!(report.summary.boundary.top[0].delta.demand, -20.0);
        assert!(report.deltas[1].ok);
    }

    #[test]
    fn test_rollup_skips_rows_without_family_or_period() {
        let mut no_week = DetailRow::new("F1", "A", "", 9.0, 0.0, 0.0);
        no_week.family = Some(String::new());
        let plan = WorkingPlan::build(
            vec![
                DetailRow::new("F1", "A", "2025-01-Wk1", 4.0, 0.0, 0.0),
                DetailRow::new("F1", "B", "", 7.0, 0.0, 0.0),
                no_week,
            ],
            None,
        );
        let rollup = LevelComparer::rollup(&plan, false);
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup[&("F1".to_string(), PeriodKey::from("2025-01"))].demand, 4.0);
    }
}

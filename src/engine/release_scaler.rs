// ==========================================
// 计划对账引擎 - 下达/到货量缩放
// ==========================================
// 职责: 平准后的周负荷回写到明细行的 planned_order_release / receipt
// 规则:
// 1) 周负荷 = Σ planned_order_release
// 2) release_adj = release × adjusted(w) / original(w);
//    原周负荷为 0 时按该周有下达量的行均分 adjusted(w)
// 3) receipt_adj = receipt × 提前期 lt_weeks 之前那一周的缩放系数 (越界取 1)
// 4) 无下达行承接的调整后负荷计为 unallocated
// 5) int 取整按周最大余数分配, 保持周合计
// ==========================================

use crate::domain::types::{RoundMode, WeekKey};
use crate::engine::rounding::{distribute_int, round_quantity};
use crate::engine::working_plan::WorkingPlan;
use std::collections::BTreeMap;

const EPS: f64 = 1e-12;

/// 缩放结果（与 WorkingPlan 行同序）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaledFigures {
    pub release: Vec<Option<f64>>,
    pub receipt: Vec<Option<f64>>,
    pub unallocated_load: f64,
}

/// 周下达负荷
pub fn weekly_release_load(plan: &WorkingPlan) -> BTreeMap<WeekKey, f64> {
    let mut load: BTreeMap<WeekKey, f64> = BTreeMap::new();
    for row in plan.rows() {
        if let Some(release) = row.planned_order_release {
            *load.entry(row.week.clone()).or_insert(0.0) += release;
        }
    }
    load
}

/// 周缩放系数; 原负荷为 0 时为 None
fn factor(original: &BTreeMap<WeekKey, f64>, adjusted: &BTreeMap<WeekKey, f64>, week: &WeekKey) -> Option<f64> {
    let orig = original.get(week).copied().unwrap_or(0.0);
    if orig.abs() <= EPS {
        return None;
    }
    let adj = adjusted.get(week).copied().unwrap_or(orig);
    Some(adj / orig)
}

/// 按平准结果缩放明细行下达/到货量
///
/// # 参数
/// - `plan`: 工作计划
/// - `weeks`: 全局周顺序（提前期回溯用）
/// - `original`: 平准前周负荷
/// - `adjusted`: 平准后周负荷
/// - `round_mode`: 取整方式
pub fn scale(
    plan: &WorkingPlan,
    weeks: &[WeekKey],
    original: &BTreeMap<WeekKey, f64>,
    adjusted: &BTreeMap<WeekKey, f64>,
    round_mode: RoundMode,
) -> ScaledFigures {
    let n = plan.len();
    let mut raw_release: Vec<Option<f64>> = vec![None; n];

    let mut rows_by_week: BTreeMap<&WeekKey, Vec<usize>> = BTreeMap::new();
    for (idx, row) in plan.rows().iter().enumerate() {
        if row.planned_order_release.is_some() {
            rows_by_week.entry(&row.week).or_default().push(idx);
        }
    }

    for (week, idxs) in &rows_by_week {
        let target = adjusted.get(*week).copied().unwrap_or(0.0);
        match factor(original, adjusted, week) {
            Some(f) => {
                for &idx in idxs {
                    raw_release[idx] = plan.row(idx).planned_order_release.map(|r| r * f);
                }
            }
            None => {
                let each = target / idxs.len() as f64;
                for &idx in idxs {
                    raw_release[idx] = Some(each);
                }
            }
        }
    }

    let unallocated_load: f64 = adjusted
        .iter()
        .filter(|(w, _)| !rows_by_week.contains_key(w))
        .map(|(_, v)| v.max(0.0))
        .sum();
    if unallocated_load > EPS {
        tracing::warn!(unallocated_load, "部分周的调整后负荷无下达行承接");
    }

    let release = match round_mode {
        RoundMode::Int => {
            let mut out: Vec<Option<f64>> = vec![None; n];
            for idxs in rows_by_week.values() {
                let values: Vec<f64> = idxs.iter().map(|i| raw_release[*i].unwrap_or(0.0)).collect();
                let ints = distribute_int(&values, values.iter().sum());
                for (pos, &idx) in idxs.iter().enumerate() {
                    out[idx] = Some(ints[pos] as f64);
                }
            }
            out
        }
        mode => raw_release
            .iter()
            .map(|v| v.map(|x| round_quantity(x, mode)))
            .collect(),
    };

    let position: BTreeMap<&WeekKey, usize> = weeks.iter().enumerate().map(|(i, w)| (w, i)).collect();
    let receipt: Vec<Option<f64>> = plan
        .rows()
        .iter()
        .map(|row| {
            row.planned_order_receipt.map(|receipt| {
                let lt = row.lead_time_weeks();
                let f = position
                    .get(&row.week)
                    .filter(|pos| **pos >= lt)
                    .and_then(|pos| factor(original, adjusted, &weeks[*pos - lt]))
                    .unwrap_or(1.0);
                round_quantity(receipt * f, round_mode)
            })
        })
        .collect();

    ScaledFigures {
        release,
        receipt,
        unallocated_load,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::DetailRow;

    fn weeks() -> Vec<WeekKey> {
        (1..=3).map(|i| WeekKey::new(format!("2025-01-Wk{}", i))).collect()
    }

    #[test]
    fn test_release_and_receipt_follow_week_factor() {
        let plan = WorkingPlan::build(
            vec![
                DetailRow::new("F1", "A", "2025-01-Wk1", 0.0, 0.0, 0.0).with_release(10.0, None, None),
                DetailRow::new("F1", "A", "2025-01-Wk2", 0.0, 0.0, 0.0).with_release(20.0, Some(8.0), Some(1.0)),
                DetailRow::new("F1", "B", "2025-01-Wk2", 0.0, 0.0, 0.0).with_release(20.0, None, None),
            ],
            None,
        );
        let w = weeks();
        let original = weekly_release_load(&plan);
        assert_eq!(original[&w[1]], 40.0);

        let adjusted: BTreeMap<WeekKey, f64> =
            [(w[0].clone(), 5.0), (w[1].clone(), 30.0), (w[2].clone(), 15.0)].into_iter().collect();
        let scaled = scale(&plan, &w, &original, &adjusted, RoundMode::None);

        assert_eq!(scaled.release, vec![Some(5.0), Some(15.0), Some(15.0)]);
        // 到货回溯 1 周: Wk1 系数 0.5
        assert_eq!(scaled.receipt[1], Some(4.0));
        assert_eq!(scaled.receipt[0], None);
        assert_eq!(scaled.unallocated_load, 15.0);
    }

    #[test]
    fn test_int_rounding_preserves_week_total() {
        let plan = WorkingPlan::build(
            vec![
                DetailRow::new("F1", "A", "2025-01-Wk1", 0.0, 0.0, 0.0).with_release(1.0, None, None),
                DetailRow::new("F1", "B", "2025-01-Wk1", 0.0, 0.0, 0.0).with_release(1.0, None, None),
                DetailRow::new("F1", "C", "2025-01-Wk1", 0.0, 0.0, 0.0).with_release(1.0, None, None),
            ],
            None,
        );
        let w = weeks();
        let original = weekly_release_load(&plan);
        let adjusted: BTreeMap<WeekKey, f64> = [(w[0].clone(), 4.0)].into_iter().collect();
        let scaled = scale(&plan, &w, &original, &adjusted, RoundMode::Int);
        let total: f64 = scaled.release.iter().flatten().sum();
        assert_eq!(total, 4.0);
    }
}

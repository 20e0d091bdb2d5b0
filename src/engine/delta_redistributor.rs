// ==========================================
// 计划对账引擎 - 锚点差额再分配
// ==========================================
// 职责: 切换期间内每个 (family, period), 使明细合计对齐聚合目标
// ==========================================
// 步骤:
// 1) delta = target - current (逐指标)
// 2) 容差判定: 所有指标满足 |d| <= tol_abs 或 |d| / base_denom <= tol_rel 则跳过
//    base_denom = max(|target.demand|, |cur.demand|, |target.supply|, |cur.supply|, 1)
// 3) 按锚定策略生成周权重
// 4) 首轮: add = share * delta, 受 max_adjust_ratio 行上限约束
//    (基值为 0 时上限取 |delta|)
// 5) 次轮: 残差按剩余上限比例分配; 无有限上限时在无上限行均分; 仍剩余的计入未消解
// 6) 结果保留 6 位小数
// ==========================================

use crate::config::ReconConfig;
use crate::domain::policy::AnchorPolicy;
use crate::domain::types::{CalendarMode, Metric, MetricTriple, PeriodKey, WeekKey};
use crate::engine::calendar::estimate_cutover_index;
use crate::engine::rounding::round6;
use crate::engine::working_plan::WorkingPlan;
use chrono::NaiveDate;
use serde::Serialize;

/// 残差判零阈值
pub const RESIDUAL_EPS: f64 = 1e-9;

// ==========================================
// RowCap - 行调整上限
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowCap {
    Capped(f64),
    Uncapped,
}

impl RowCap {
    /// 按比例计算上限; 基值为 0 时退化为 |delta|
    pub fn for_base(base: f64, ratio: Option<f64>, delta: f64) -> Self {
        match ratio {
            None => RowCap::Uncapped,
            Some(r) => {
                let lim = base.abs() * r;
                if lim > 0.0 {
                    RowCap::Capped(lim)
                } else {
                    RowCap::Capped(delta.abs())
                }
            }
        }
    }

    pub fn clamp(&self, add: f64) -> f64 {
        match self {
            RowCap::Capped(lim) => add.clamp(-lim, *lim),
            RowCap::Uncapped => add,
        }
    }

    /// 在 sign 方向上的剩余空间; 无上限返回 None
    pub fn headroom(&self, applied: f64, sign: f64) -> Option<f64> {
        match self {
            RowCap::Capped(lim) => Some((lim - sign * applied).max(0.0)),
            RowCap::Uncapped => None,
        }
    }
}

/// 单指标分配结果
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDistribution {
    /// 逐行加算量（与输入行同序）
    pub applied: Vec<f64>,
    /// 未能落地的残差
    pub unresolved: f64,
}

/// 单个 (family, period) 的调整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAdjustment {
    pub family: String,
    pub period: PeriodKey,
    pub target: MetricTriple,
    pub before: MetricTriple,
    pub delta: MetricTriple,
    pub skipped: bool,
    pub rows: usize,
    pub cutover_index: usize,
    pub unresolved: MetricTriple,
}

// ==========================================
// DeltaRedistributor - 差额再分配器
// ==========================================
#[derive(Debug, Clone)]
pub struct DeltaRedistributor {
    policy: AnchorPolicy,
    window_weeks: Option<usize>,
    max_adjust_ratio: Option<f64>,
    tol_abs: f64,
    tol_rel: f64,
    calendar_mode: CalendarMode,
    cutover_date: Option<NaiveDate>,
}

impl Default for DeltaRedistributor {
    fn default() -> Self {
        Self::from_config(&ReconConfig::default())
    }
}

impl DeltaRedistributor {
    pub fn from_config(config: &ReconConfig) -> Self {
        Self {
            policy: config.anchor_policy,
            window_weeks: config.window_weeks(),
            max_adjust_ratio: config.max_adjust_ratio,
            tol_abs: config.tol_abs,
            tol_rel: config.tol_rel,
            calendar_mode: config.calendar_mode,
            cutover_date: config.cutover_date,
        }
    }

    pub fn max_adjust_ratio(&self) -> Option<f64> {
        self.max_adjust_ratio
    }

    /// 所有指标均在容差内
    pub fn within_tolerance(&self, target: &MetricTriple, current: &MetricTriple) -> bool {
        let base_denom = [
            target.demand.abs(),
            current.demand.abs(),
            target.supply.abs(),
            current.supply.abs(),
            1.0,
        ]
        .into_iter()
        .fold(0.0, f64::max);

        Metric::ALL.iter().all(|m| {
            let d = (target.get(*m) - current.get(*m)).abs();
            d <= self.tol_abs || d / base_denom <= self.tol_rel
        })
    }

    /// 期间内周权重（未归一化）及切换周位置
    pub fn weights_for(&self, weeks: &[WeekKey]) -> (Vec<f64>, usize) {
        let cutover_index = estimate_cutover_index(weeks, self.cutover_date, self.calendar_mode);
        (
            self.policy
                .anchor_weights(weeks.len(), cutover_index, self.window_weeks),
            cutover_index,
        )
    }

    /// 对齐单个 (family, period)
    ///
    /// # 参数
    /// - `plan`: 工作计划（就地改写当前值）
    /// - `family` / `period`: 分组键
    /// - `target`: 聚合目标
    ///
    /// # 返回
    /// GroupAdjustment; 跳过时 skipped = true 且行不变
    pub fn redistribute_group(
        &self,
        plan: &mut WorkingPlan,
        family: &str,
        period: &PeriodKey,
        target: MetricTriple,
    ) -> GroupAdjustment {
        let idxs: Vec<usize> = plan.group(family, period).to_vec();
        let before = plan.sum_current(&idxs);
        let delta = target.minus(&before);

        let mut adjustment = GroupAdjustment {
            family: family.to_string(),
            period: period.clone(),
            target,
            before,
            delta,
            skipped: true,
            rows: idxs.len(),
            cutover_index: 0,
            unresolved: MetricTriple::default(),
        };

        if idxs.is_empty() || self.within_tolerance(&target, &before) {
            tracing::debug!(family, period = %period, "差额在容差内或无明细行, 跳过");
            return adjustment;
        }

        let weeks: Vec<WeekKey> = idxs.iter().map(|i| plan.week_of(*i).clone()).collect();
        let (weights, cutover_index) = self.weights_for(&weeks);
        adjustment.skipped = false;
        adjustment.cutover_index = cutover_index;
        adjustment.unresolved = self.apply(plan, &idxs, &weights, &delta);

        tracing::debug!(
            family,
            period = %period,
            rows = idxs.len(),
            cutover_index,
            delta_demand = delta.demand,
            delta_supply = delta.supply,
            delta_backlog = delta.backlog,
            "差额再分配完成"
        );
        adjustment
    }

    /// 将 delta 按权重写入行（两轮分配 + 取整）
    ///
    /// # 返回
    /// 逐指标未消解残差
    pub fn apply(
        &self,
        plan: &mut WorkingPlan,
        idxs: &[usize],
        weights: &[f64],
        delta: &MetricTriple,
    ) -> MetricTriple {
        let mut unresolved = MetricTriple::default();
        for m in Metric::ALL {
            let d = delta.get(m);
            if d.abs() <= RESIDUAL_EPS {
                continue;
            }
            let bases: Vec<f64> = idxs.iter().map(|i| plan.current(*i).get(m)).collect();
            let dist = self.distribute(&bases, weights, d);
            for (pos, idx) in idxs.iter().enumerate() {
                plan.set_current(*idx, m, round6(bases[pos] + dist.applied[pos]));
            }
            unresolved.set(m, round6(dist.unresolved));
        }
        unresolved
    }

    /// 单指标两轮分配
    ///
    /// # 参数
    /// - `bases`: 各行当前值
    /// - `weights`: 各行权重（全零时按均匀处理）
    /// - `delta`: 待分配量
    pub fn distribute(&self, bases: &[f64], weights: &[f64], delta: f64) -> MetricDistribution {
        let n = bases.len();
        if n == 0 {
            return MetricDistribution {
                applied: Vec::new(),
                unresolved: delta,
            };
        }
        let wsum: f64 = weights.iter().take(n).sum();
        let shares: Vec<f64> = if wsum > 0.0 && weights.len() >= n {
            weights.iter().take(n).map(|w| w / wsum).collect()
        } else {
            vec![1.0 / n as f64; n]
        };

        // 首轮
        let caps: Vec<RowCap> = bases
            .iter()
            .map(|b| RowCap::for_base(*b, self.max_adjust_ratio, delta))
            .collect();
        let mut applied: Vec<f64> = shares
            .iter()
            .zip(caps.iter())
            .map(|(s, cap)| cap.clamp(s * delta))
            .collect();

        // 次轮
        let resid = delta - applied.iter().sum::<f64>();
        if resid.abs() <= RESIDUAL_EPS {
            return MetricDistribution {
                applied,
                unresolved: 0.0,
            };
        }
        let sign = resid.signum();
        let headroom: Vec<Option<f64>> = caps
            .iter()
            .zip(applied.iter())
            .map(|(cap, a)| cap.headroom(*a, sign))
            .collect();

        let total_finite: f64 = headroom
            .iter()
            .flatten()
            .filter(|h| **h > RESIDUAL_EPS)
            .sum();
        let mut remaining = resid;
        if total_finite > RESIDUAL_EPS {
            let take = resid.abs().min(total_finite);
            for (pos, h) in headroom.iter().enumerate() {
                if let Some(h) = h.filter(|h| *h > RESIDUAL_EPS) {
                    applied[pos] += sign * take * h / total_finite;
                }
            }
            remaining = resid - sign * take;
        }

        let uncapped: Vec<usize> = headroom
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_none())
            .map(|(pos, _)| pos)
            .collect();
        if remaining.abs() > RESIDUAL_EPS && !uncapped.is_empty() {
            let each = remaining / uncapped.len() as f64;
            for pos in &uncapped {
                applied[*pos] += each;
            }
            remaining = 0.0;
        }

        MetricDistribution {
            applied,
            unresolved: if remaining.abs() > RESIDUAL_EPS { remaining } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redistributor(ratio: Option<f64>) -> DeltaRedistributor {
        let cfg = ReconConfig {
            anchor_policy: AnchorPolicy::DetNear { window_weeks: None },
            max_adjust_ratio: ratio,
            ..ReconConfig::default()
        };
        DeltaRedistributor::from_config(&cfg)
    }

    #[test]
    fn test_uncapped_distribution_follows_weights() {
        let dist = redistributor(None).distribute(&[10.0, 10.0, 10.0], &[1.0, 2.0, 3.0], 12.0);
        for (a, e) in dist.applied.iter().zip([2.0, 4.0, 6.0]) {
            assert!((a - e).abs() < 1e-9);
        }
        assert_eq!(dist.unresolved, 0.0);
    }

    #[test]
    fn test_cap_spills_to_headroom() {
        // 上限 10%: 每行 ±1, 首轮 [0.5, 1.0(截断), 1.0(截断)]
        let dist = redistributor(Some(0.1)).distribute(&[10.0, 10.0, 10.0], &[1.0, 2.0, 3.0], 3.0);
        for a in &dist.applied {
            assert!(a.abs() <= 1.0 + 1e-9);
        }
        assert!((dist.applied.iter().sum::<f64>() - 3.0).abs() < 1e-9);
        assert_eq!(dist.unresolved, 0.0);
    }

    #[test]
    fn test_cap_exhausted_leaves_unresolved() {
        let dist = redistributor(Some(0.1)).distribute(&[10.0, 10.0], &[1.0, 1.0], 5.0);
        assert!((dist.applied.iter().sum::<f64>() - 2.0).abs() < 1e-9);
        assert!((dist.unresolved - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_base_falls_back_to_delta_cap() {
        let dist = redistributor(Some(0.1)).distribute(&[0.0, 0.0], &[1.0, 1.0], 4.0);
        assert!((dist.applied[0] - 2.0).abs() < 1e-9);
        assert_eq!(dist.unresolved, 0.0);
    }

    #[test]
    fn test_tolerance_uses_shared_denominator() {
        let r = redistributor(None);
        let target = MetricTriple::new(1000.0, 1000.0, 0.5);
        // backlog 差 0.0005, 相对 base_denom=1000 满足 tol_rel
        let current = MetricTriple::new(1000.0, 1000.0, 0.4995);
        assert!(r.within_tolerance(&target, &current));
        let current = MetricTriple::new(990.0, 1000.0, 0.5);
        assert!(!r.within_tolerance(&target, &current));
    }

    #[test]
    fn test_forward_weights_confined_to_recon_window() {
        let weeks: Vec<WeekKey> = (1..=5)
            .map(|i| WeekKey::from(format!("2025-01-Wk{}", i).as_str()))
            .collect();
        let cfg = ReconConfig {
            recon_window_days: Some(21),
            ..ReconConfig::default()
        };
        let (weights, cutover_index) = DeltaRedistributor::from_config(&cfg).weights_for(&weeks);
        assert_eq!(cutover_index, 2);
        assert_eq!(weights, vec![0.0, 1.0, 2.0, 1.0, 0.0]);

        let (weights, _) = DeltaRedistributor::default().weights_for(&weeks);
        assert_eq!(weights, vec![3.0, 4.0, 5.0, 4.0, 3.0]);
    }
}

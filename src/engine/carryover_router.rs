// ==========================================
// 计划对账引擎 - 残差结转路由
// ==========================================
// 职责: 期间内无法消解的残差结转到相邻期间
// ==========================================
// 方向:
// - prev / next: 固定方向
// - auto: 比较前后期间余量, 取较大者 (相等取 next); 均为 0 时按策略默认方向
// - both: 按 carryover_split 拆分 (未配置时 DET_near/blend 0.8 next, 其余 0.2)
// 余量 = Σ 残差方向上的 (target - current) 正部
//        × (1 + w_cap·cap_norm) × (1 + w_in·inbound_norm) × (1 + w_score·score_norm)
//        ÷ (1 + w_cost·cost_norm)
// 落地: 目标期间全部行均匀权重, 复用 DeltaRedistributor 两轮分配
// ==========================================

use crate::config::{HeadroomWeights, ReconConfig};
use crate::domain::adjustment::CarryoverLogEntry;
use crate::domain::capacity::CapacityBook;
use crate::domain::policy::AnchorPolicy;
use crate::domain::types::{CarryoverMode, Metric, MetricTriple, PeriodKey};
use crate::engine::calendar::period_add;
use crate::engine::delta_redistributor::{DeltaRedistributor, RESIDUAL_EPS};
use crate::engine::rounding::round6;
use crate::engine::working_plan::{AggregateIndex, WorkingPlan};
use std::collections::BTreeMap;

// ==========================================
// PeriodSignal - 期间辅助信号
// ==========================================
// 归一化: max(0, v / max|v|); 期间缺失或最大值非正时不参与加权
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodSignal {
    values: BTreeMap<PeriodKey, f64>,
    max_abs: f64,
}

impl PeriodSignal {
    pub fn new(values: BTreeMap<PeriodKey, f64>) -> Self {
        let max_abs = values.values().map(|v| v.abs()).fold(0.0, f64::max);
        Self { values, max_abs }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn normalized(&self, period: &PeriodKey) -> Option<f64> {
        match self.values.get(period) {
            Some(v) if self.max_abs > 0.0 => Some((v / self.max_abs).max(0.0)),
            _ => None,
        }
    }
}

/// 结转余量偏置信号
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadroomSignals {
    pub capacity: PeriodSignal,
    pub inbound: PeriodSignal,
    pub score: PeriodSignal,
    pub cost: PeriodSignal,
}

impl HeadroomSignals {
    pub fn new(
        capacity: &CapacityBook,
        inbound: BTreeMap<PeriodKey, f64>,
        score: BTreeMap<PeriodKey, f64>,
        cost: BTreeMap<PeriodKey, f64>,
    ) -> Self {
        let capacity_totals: BTreeMap<PeriodKey, f64> =
            capacity.iter().map(|(p, c)| (p.clone(), c)).collect();
        Self {
            capacity: PeriodSignal::new(capacity_totals),
            inbound: PeriodSignal::new(inbound),
            score: PeriodSignal::new(score),
            cost: PeriodSignal::new(cost),
        }
    }

    /// 产能归一化值（缺失为 0）
    pub fn cap_norm(&self, period: &PeriodKey) -> f64 {
        self.capacity.normalized(period).unwrap_or(0.0)
    }
}

/// 单次结转结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarryoverOutcome {
    pub entries: Vec<CarryoverLogEntry>,
    /// 结转后仍未落地的残差
    pub unresolved: MetricTriple,
}

// ==========================================
// CarryoverRouter - 结转路由器
// ==========================================
#[derive(Debug, Clone)]
pub struct CarryoverRouter {
    mode: CarryoverMode,
    split: Option<f64>,
    policy: AnchorPolicy,
    weights: HeadroomWeights,
}

impl CarryoverRouter {
    pub fn from_config(config: &ReconConfig) -> Self {
        Self {
            mode: config.carryover,
            split: config.carryover_split,
            policy: config.anchor_policy,
            weights: config.headroom,
        }
    }

    pub fn mode(&self) -> CarryoverMode {
        self.mode
    }

    /// both 模式下流向 next 的比例
    pub fn next_share(&self) -> f64 {
        match self.split {
            Some(v) => v.clamp(0.0, 1.0),
            None => self.policy.default_next_share(),
        }
    }

    /// 估算期间吸收残差的余量
    pub fn headroom(
        &self,
        plan: &WorkingPlan,
        targets: &AggregateIndex,
        family: &str,
        period: &PeriodKey,
        residual: &MetricTriple,
        signals: &HeadroomSignals,
    ) -> f64 {
        let target = targets.get(family, period).unwrap_or_default();
        let current = plan.sum_current(plan.group(family, period));

        let mut total = 0.0;
        for m in Metric::ALL {
            let r = residual.get(m);
            if r.abs() <= RESIDUAL_EPS {
                continue;
            }
            let diff = target.get(m) - current.get(m);
            let room = if r > 0.0 { diff } else { -diff };
            if room > 0.0 {
                total += room;
            }
        }

        let boost = |signal: &PeriodSignal, weight: f64| match signal.normalized(period) {
            Some(norm) if weight > 0.0 => 1.0 + weight * norm,
            _ => 1.0,
        };
        total *= boost(&signals.capacity, self.weights.capacity);
        total *= boost(&signals.inbound, self.weights.inbound);
        total *= boost(&signals.score, self.weights.score);
        total /= boost(&signals.cost, self.weights.cost);
        total
    }

    /// 路由单个 (family, period) 的残差
    ///
    /// # 参数
    /// - `plan`: 工作计划（目标期间行被就地改写）
    /// - `targets`: 聚合目标（auto 余量估算用）
    /// - `family` / `from`: 残差来源
    /// - `residual`: 逐指标未消解残差
    /// - `signals`: 余量偏置信号
    /// - `redistributor`: 提供两轮分配与行上限
    #[allow(clippy::too_many_arguments)]
    pub fn route(
        &self,
        plan: &mut WorkingPlan,
        targets: &AggregateIndex,
        family: &str,
        from: &PeriodKey,
        residual: MetricTriple,
        signals: &HeadroomSignals,
        redistributor: &DeltaRedistributor,
    ) -> CarryoverOutcome {
        if self.mode == CarryoverMode::None || residual.is_negligible(RESIDUAL_EPS) {
            return CarryoverOutcome {
                entries: Vec::new(),
                unresolved: residual,
            };
        }

        let prev = period_add(from, -1);
        let next = period_add(from, 1);
        let mut outcome = CarryoverOutcome::default();

        match self.mode {
            CarryoverMode::None => {}
            CarryoverMode::Prev | CarryoverMode::Next => {
                let to = if self.mode == CarryoverMode::Prev { prev } else { next };
                self.push_entry(&mut outcome, plan, family, from, to, residual, redistributor);
            }
            CarryoverMode::Auto => {
                let h_prev = prev
                    .as_ref()
                    .map(|p| self.headroom(plan, targets, family, p, &residual, signals))
                    .unwrap_or(0.0);
                let h_next = next
                    .as_ref()
                    .map(|p| self.headroom(plan, targets, family, p, &residual, signals))
                    .unwrap_or(0.0);
                let go_next = if h_prev == 0.0 && h_next == 0.0 {
                    self.policy.prefers_next()
                } else {
                    h_next >= h_prev
                };
                tracing::debug!(family, from = %from, h_prev, h_next, go_next, "auto 结转方向");

                let cap_prev = prev.as_ref().map(|p| round6(signals.cap_norm(p)));
                let cap_next = next.as_ref().map(|p| round6(signals.cap_norm(p)));
                let to = if go_next { next } else { prev };
                if let Some(entry) =
                    self.push_entry(&mut outcome, plan, family, from, to, residual, redistributor)
                {
                    entry.headroom_prev = Some(round6(h_prev));
                    entry.headroom_next = Some(round6(h_next));
                    entry.cap_norm_prev = cap_prev;
                    entry.cap_norm_next = cap_next;
                }
            }
            CarryoverMode::Both => {
                let share_next = self.next_share();
                let to_prev = residual.scaled(1.0 - share_next);
                let to_next = residual.minus(&to_prev);
                for (to, amount) in [(prev, to_prev), (next, to_next)] {
                    let cap_norm = to.as_ref().map(|p| round6(signals.cap_norm(p)));
                    if let Some(entry) =
                        self.push_entry(&mut outcome, plan, family, from, to, amount, redistributor)
                    {
                        entry.cap_norm = cap_norm;
                    }
                }
            }
        }

        tracing::info!(
            family,
            from = %from,
            entries = outcome.entries.len(),
            unresolved = outcome.unresolved.max_abs(),
            "残差结转完成"
        );
        outcome
    }

    /// 将 amount 落到目标期间并追加日志; 目标期间无法解析时整体计入未消解
    #[allow(clippy::too_many_arguments)]
    fn push_entry<'o>(
        &self,
        outcome: &'o mut CarryoverOutcome,
        plan: &mut WorkingPlan,
        family: &str,
        from: &PeriodKey,
        to: Option<PeriodKey>,
        amount: MetricTriple,
        redistributor: &DeltaRedistributor,
    ) -> Option<&'o mut CarryoverLogEntry> {
        let to = match to {
            Some(p) => p,
            None => {
                tracing::warn!(family, from = %from, "相邻期间无法推算, 残差保留");
                add_into(&mut outcome.unresolved, &amount);
                return None;
            }
        };

        let idxs: Vec<usize> = plan.group(family, &to).to_vec();
        let unabsorbed = if idxs.is_empty() {
            amount
        } else {
            let uniform = vec![1.0; idxs.len()];
            redistributor.apply(plan, &idxs, &uniform, &amount)
        };
        add_into(&mut outcome.unresolved, &unabsorbed);

        outcome.entries.push(CarryoverLogEntry {
            family: family.to_string(),
            from_period: from.clone(),
            to_period: to,
            metrics: rounded(&amount),
            unabsorbed: rounded(&unabsorbed),
            headroom_prev: None,
            headroom_next: None,
            cap_norm_prev: None,
            cap_norm_next: None,
            cap_norm: None,
        });
        outcome.entries.last_mut()
    }
}

fn add_into(total: &mut MetricTriple, amount: &MetricTriple) {
    for m in Metric::ALL {
        total.add(m, amount.get(m));
    }
}

fn rounded(t: &MetricTriple) -> MetricTriple {
    MetricTriple::new(round6(t.demand), round6(t.supply), round6(t.backlog))
}

// ==========================================
// 计划对账引擎 - 引擎编排器
// ==========================================
// 用途: 协调各引擎的执行顺序, 产出单个对账结果文档
// 流程:
// 1) 构建工作计划 + 对账前层级报告
// 2) 周负荷 (Σ planned_order_release) 按策略平准, 回写下达/到货量
// 3) 切换期间 (family, period) 差额再分配
// 4) 未消解残差按 carryover 结转到相邻期间
// 5) 对账后层级报告 + 区段汇总 + 说明文本
// ==========================================
// 红线: 纯计算, 不做文件 I/O; 相同输入产生逐位相同的输出
// ==========================================

use crate::config::ReconConfig;
use crate::domain::adjustment::{AdjustmentRecord, CarryoverLogEntry, UnresolvedResidual};
use crate::domain::capacity::{CapacityBook, CapacityBucket};
use crate::domain::plan::{AdjustedDetailRow, AggregateRow, DetailRow};
use crate::domain::policy::AnchorPolicy;
use crate::domain::types::{PeriodKey, WeekKey};
use crate::engine::calendar::{
    ordered_weeks, resolve_period_for_week, CalendarLookup, CalendarResolver, PlanningCalendar,
};
use crate::engine::capacity_projector::CapacityCalendarProjector;
use crate::engine::carryover_router::{CarryoverRouter, HeadroomSignals};
use crate::engine::delta_redistributor::{DeltaRedistributor, GroupAdjustment, RESIDUAL_EPS};
use crate::engine::levels::{BoundarySummary, LevelComparer, LevelReport};
use crate::engine::release_scaler::{scale, weekly_release_load};
use crate::engine::rounding::round6;
use crate::engine::segment_policy::{SegmentOutcome, SegmentPolicyEngine, Segments, WeekLayout};
use crate::engine::spill_check::{summarize, ZoneSummary};
use crate::engine::working_plan::{AggregateIndex, GroupKey, WorkingPlan};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

/// 明细未声明 schema_version 时的默认值
pub const DEFAULT_SCHEMA_VERSION: &str = "agg-1.0";

// ==========================================
// ReconInput - 对账输入
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub schema_version: Option<String>,
    pub aggregate: Vec<AggregateRow>,
    pub detail: Vec<DetailRow>,
    pub capacity: Vec<CapacityBucket>,
    pub calendar: Option<PlanningCalendar>,
    /// 在途订单量（按期间）
    pub inbound: BTreeMap<PeriodKey, f64>,
    pub period_score: BTreeMap<PeriodKey, f64>,
    pub period_cost: BTreeMap<PeriodKey, f64>,
}

// ==========================================
// ReconOutput - 对账结果文档
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct CutoverInfo {
    pub cutover_date: Option<NaiveDate>,
    pub anchor_policy: AnchorPolicy,
    pub recon_window_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CarryoverSummary {
    pub count: usize,
    pub prev: usize,
    pub next: usize,
    pub carryover_split_next: Option<f64>,
    pub headroom_capacity_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconOutput {
    pub schema_version: String,
    pub note: String,
    pub cutover: CutoverInfo,
    pub rows: Vec<AdjustedDetailRow>,
    pub weekly_summary: Vec<AdjustmentRecord>,
    pub boundary_summary: BoundarySummary,
    pub zone_summary: ZoneSummary,
    pub carryover: Vec<CarryoverLogEntry>,
    pub carryover_summary: CarryoverSummary,
    pub levels_before: LevelReport,
    pub levels_after: LevelReport,
    pub unresolved: Vec<UnresolvedResidual>,
    #[serde(skip)]
    pub adjustments: Vec<GroupAdjustment>,
    #[serde(skip)]
    pub end_spill: f64,
}

impl ReconOutput {
    /// 按 (family, sku, week) 查找调整后的行
    pub fn find_row(&self, family: &str, sku: &str, week: &str) -> Option<&AdjustedDetailRow> {
        self.rows.iter().find(|r| {
            r.row.family_key() == Some(family) && r.row.sku == sku && r.row.week.as_str() == week
        })
    }
}

// ==========================================
// ReconciliationEngine - 引擎编排器
// ==========================================
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    config: ReconConfig,
    projector: CapacityCalendarProjector,
    segments: SegmentPolicyEngine,
    redistributor: DeltaRedistributor,
    router: CarryoverRouter,
    comparer: LevelComparer,
}

impl ReconciliationEngine {
    pub fn new(config: ReconConfig) -> Self {
        Self {
            projector: CapacityCalendarProjector::new(config.fallback_weeks),
            segments: SegmentPolicyEngine::from_config(&config),
            redistributor: DeltaRedistributor::from_config(&config),
            router: CarryoverRouter::from_config(&config),
            comparer: LevelComparer::new(config.tol_abs, config.tol_rel, config.cutover_date),
            config,
        }
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    /// 执行一次完整对账
    ///
    /// # 参数
    /// - `input`: 聚合/明细计划与辅助表
    ///
    /// # 返回
    /// 完整结果文档; 引擎本身不失败, 降级输入仅记录告警
    #[instrument(skip(self, input), fields(
        policy = %self.config.anchor_policy,
        aggregate = input.aggregate.len(),
        detail = input.detail.len()
    ))]
    pub fn run(&self, input: ReconInput) -> ReconOutput {
        let ReconInput {
            schema_version,
            aggregate,
            detail,
            capacity,
            calendar,
            inbound,
            period_score,
            period_cost,
        } = input;

        let lookup = calendar.as_ref().map(CalendarLookup::from_calendar);
        let cal: Option<&dyn CalendarResolver> = lookup.as_ref().map(|l| l as &dyn CalendarResolver);

        let targets = AggregateIndex::from_rows(&aggregate);
        let mut plan = WorkingPlan::build(detail, cal);
        let levels_before = self
            .comparer
            .compare(&targets, &LevelComparer::rollup(&plan, false));

        // ===== 周负荷平准 =====
        let book = CapacityBook::from_buckets(&capacity);
        let weeks = ordered_weeks(plan.rows().iter().map(|r| &r.week), cal);
        let week_period = week_periods(&plan, cal);
        let leveling = self.level(&plan, &weeks, &week_period, &book, cal);

        let original_load = weekly_release_load(&plan);
        let scaled = scale(
            &plan,
            &weeks,
            &original_load,
            &leveling.adjusted,
            self.config.round_mode,
        );

        // ===== 切换期间差额再分配 + 结转 =====
        let signals = HeadroomSignals::new(&book, inbound, period_score, period_cost);
        let (adjustments, carryover, unresolved) = self.anchor_pass(&mut plan, &targets, &signals);

        let levels_after = self
            .comparer
            .compare(&targets, &LevelComparer::rollup(&plan, true));
        let segmented = self.config.cutover_date.is_some()
            && self.config.anchor_policy != AnchorPolicy::Forward;
        let zone_summary = summarize(&leveling.records, segmented);

        let carryover_summary = CarryoverSummary {
            count: carryover.len(),
            prev: carryover.iter().filter(|e| e.is_backward()).count(),
            next: carryover.iter().filter(|e| e.is_forward()).count(),
            carryover_split_next: self.config.carryover_split,
            headroom_capacity_weight: self.config.headroom.capacity,
        };
        let note = build_note(&carryover_summary, scaled.unallocated_load);

        let (rows, current, _) = plan.into_parts();
        let rows: Vec<AdjustedDetailRow> = rows
            .into_iter()
            .zip(current)
            .enumerate()
            .map(|(idx, (row, cur))| AdjustedDetailRow {
                row,
                demand_adj: round6(cur.demand),
                supply_adj: round6(cur.supply),
                backlog_adj: round6(cur.backlog),
                planned_order_release_adj: scaled.release[idx],
                planned_order_receipt_adj: scaled.receipt[idx],
            })
            .collect();

        tracing::info!(
            rows = rows.len(),
            weeks = leveling.records.len(),
            adjusted_groups = adjustments.iter().filter(|a| !a.skipped).count(),
            carryover = carryover.len(),
            unresolved = unresolved.len(),
            violations_after = levels_after.summary.tol_violations,
            "对账完成"
        );

        ReconOutput {
            schema_version: schema_version.unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string()),
            note,
            cutover: CutoverInfo {
                cutover_date: self.config.cutover_date,
                anchor_policy: self.config.anchor_policy,
                recon_window_days: self.config.recon_window_days,
            },
            rows,
            weekly_summary: leveling.records,
            boundary_summary: levels_after.summary.boundary.clone(),
            zone_summary,
            carryover,
            carryover_summary,
            levels_before,
            levels_after,
            unresolved,
            adjustments,
            end_spill: leveling.end_spill,
        }
    }

    /// 周负荷平准; 有切换日期时按 pre/at/post 三段执行
    fn level(
        &self,
        plan: &WorkingPlan,
        weeks: &[WeekKey],
        week_period: &BTreeMap<WeekKey, PeriodKey>,
        book: &CapacityBook,
        cal: Option<&dyn CalendarResolver>,
    ) -> SegmentOutcome {
        let mut observed: BTreeMap<PeriodKey, Vec<WeekKey>> = BTreeMap::new();
        for week in weeks {
            if let Some(period) = week_period.get(week) {
                observed.entry(period.clone()).or_default().push(week.clone());
            }
        }
        let capacity = self.projector.project(book, cal, &observed);

        let layout = match self.config.cutover_period() {
            Some(cutover) => {
                let cutover = PeriodKey::new(cutover);
                WeekLayout::Split(Segments::partition(
                    weeks,
                    |w| {
                        week_period
                            .get(w)
                            .cloned()
                            .unwrap_or_else(|| resolve_period_for_week(w, cal))
                    },
                    &cutover,
                ))
            }
            None => WeekLayout::Whole(weeks.to_vec()),
        };

        let load = weekly_release_load(plan);
        self.segments.run(&layout, &load, &capacity)
    }

    /// 切换期间各 family 对齐聚合目标, 残差交给结转路由
    fn anchor_pass(
        &self,
        plan: &mut WorkingPlan,
        targets: &AggregateIndex,
        signals: &HeadroomSignals,
    ) -> (Vec<GroupAdjustment>, Vec<CarryoverLogEntry>, Vec<UnresolvedResidual>) {
        let mut adjustments = Vec::new();
        let mut carryover = Vec::new();
        let mut unresolved = Vec::new();

        let cutover = match self.config.cutover_period() {
            Some(p) => PeriodKey::new(p),
            None => {
                tracing::debug!("未设置 cutover_date, 跳过锚点调整");
                return (adjustments, carryover, unresolved);
            }
        };

        let keys: Vec<GroupKey> = plan
            .group_keys()
            .filter(|(family, period)| !family.is_empty() && *period == cutover)
            .cloned()
            .collect();

        for (family, period) in keys {
            let target = match targets.get(&family, &period) {
                Some(t) => t,
                None => {
                    tracing::debug!(family = %family, period = %period, "无聚合目标, 跳过");
                    continue;
                }
            };
            let adjustment = self
                .redistributor
                .redistribute_group(plan, &family, &period, target);

            if !adjustment.skipped && !adjustment.unresolved.is_negligible(RESIDUAL_EPS) {
                let routed = self.router.route(
                    plan,
                    targets,
                    &family,
                    &period,
                    adjustment.unresolved,
                    signals,
                    &self.redistributor,
                );
                carryover.extend(routed.entries);
                if !routed.unresolved.is_negligible(RESIDUAL_EPS) {
                    tracing::warn!(family = %family, period = %period, "残差未能完全消解");
                    unresolved.push(UnresolvedResidual {
                        family: family.clone(),
                        period: period.clone(),
                        residual: routed.unresolved,
                    });
                }
            }
            adjustments.push(adjustment);
        }

        (adjustments, carryover, unresolved)
    }
}

/// 每周所属期间（取计划中该周首行的期间）
fn week_periods(plan: &WorkingPlan, cal: Option<&dyn CalendarResolver>) -> BTreeMap<WeekKey, PeriodKey> {
    let mut out: BTreeMap<WeekKey, PeriodKey> = BTreeMap::new();
    for idx in 0..plan.len() {
        let week = plan.week_of(idx);
        if !out.contains_key(week) {
            let period = plan.period_of(idx);
            let period = if period.is_empty() {
                resolve_period_for_week(week, cal)
            } else {
                period.clone()
            };
            out.insert(week.clone(), period);
        }
    }
    out
}

fn build_note(summary: &CarryoverSummary, unallocated_load: f64) -> String {
    let mut parts = vec![format!(
        "anchor adjust: cutover period detail reweighted; carryover={} (prev={}, next={})",
        summary.count, summary.prev, summary.next
    )];
    if let Some(split) = summary.carryover_split_next {
        parts.push(format!("split(next)={:.2}", split));
    }
    if summary.headroom_capacity_weight > 0.0 {
        parts.push(format!("cap_w={:.2}", summary.headroom_capacity_weight));
    }
    if unallocated_load > RESIDUAL_EPS {
        parts.push(format!("unallocated_load={}", round6(unallocated_load)));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CarryoverMode;

    fn config(cutover: Option<&str>, policy: AnchorPolicy) -> ReconConfig {
        ReconConfig {
            cutover_date: cutover.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            anchor_policy: policy,
            ..ReconConfig::default()
        }
    }

    fn input() -> ReconInput {
        ReconInput {
            aggregate: vec![AggregateRow::new("F1", "2025-01", 120.0, 100.0, 20.0)],
            detail: vec![
                DetailRow::new("F1", "A", "2025-01-Wk1", 30.0, 20.0, 5.0),
                DetailRow::new("F1", "A", "2025-01-Wk2", 30.0, 30.0, 5.0),
                DetailRow::new("F1", "A", "2025-01-Wk3", 40.0, 30.0, 10.0),
            ],
            ..ReconInput::default()
        }
    }

    #[test]
    fn test_det_near_aligns_cutover_period() {
        let engine = ReconciliationEngine::new(config(
            Some("2025-01-15"),
            AnchorPolicy::DetNear { window_weeks: None },
        ));
        let out = engine.run(input());

        let demand: f64 = out.rows.iter().map(|r| r.demand_adj).sum();
        let supply: f64 = out.rows.iter().map(|r| r.supply_adj).sum();
        assert!((demand - 120.0).abs() < 1e-9);
        assert!((supply - 100.0).abs() < 1e-9);
        assert_eq!(out.find_row("F1", "A", "2025-01-Wk3").map(|r| r.demand_adj), Some(50.0));
        assert_eq!(out.levels_after.summary.tol_violations, 0);
        assert!(out.unresolved.is_empty());
        assert!(out.note.starts_with("anchor adjust: cutover period detail reweighted; carryover=0"));
    }

    #[test]
    fn test_without_cutover_rows_unchanged() {
        let engine = ReconciliationEngine::new(config(None, AnchorPolicy::Forward));
        let out = engine.run(input());
        for r in &out.rows {
            assert_eq!(r.demand_adj, r.row.demand);
            assert_eq!(r.supply_adj, r.row.supply);
        }
        assert!(out.adjustments.is_empty());
        assert_eq!(out.levels_before, out.levels_after);
    }

    #[test]
    fn test_capped_residual_routed_to_next_period() {
        let mut cfg = config(Some("2025-01-15"), AnchorPolicy::DetNear { window_weeks: None });
        cfg.max_adjust_ratio = Some(0.1);
        cfg.carryover = CarryoverMode::Next;
        let mut inp = input();
        inp.detail
            .push(DetailRow::new("F1", "A", "2025-02-Wk1", 200.0, 200.0, 0.0));
        let out = ReconciliationEngine::new(cfg).run(inp);

        assert_eq!(out.carryover.len(), 1);
        assert_eq!(out.carryover[0].to_period.as_str(), "2025-02");
        assert_eq!(out.carryover_summary.next, 1);
        // 首轮上限合计 demand 10 / supply 8, 其余结转到 2025-02
        let feb = out.find_row("F1", "A", "2025-02-Wk1").expect("feb row");
        assert!((feb.demand_adj - 210.0).abs() < 1e-6);
        assert!((feb.supply_adj - 212.0).abs() < 1e-6);
        assert!(out.unresolved.is_empty());
    }
}

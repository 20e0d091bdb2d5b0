// ==========================================
// 计划对账引擎 - 负荷平准
// ==========================================
// 职责: 单方向逐周平准 (纯函数, 无状态)
// 输入: 有序周序列 + 周负荷 + 周产能 + 起始松弛/溢出 + 模式
// 输出: 调整后负荷 + 逐周记录 + 期末松弛/溢出
// ==========================================
// 逐周规则:
// 1) demand = load(w) + spill_in
// 2) effective = capacity(w) + slack_in
// 3) demand <= effective: adjusted = demand, spill_out = 0,
//    slack_out = max(0, effective - load(w))
// 4) 否则: adjusted = effective, spill_out = demand - effective, slack_out = 0
// 5) forward 模式 spill_out 进入下一周;
//    其他模式区段内不结转溢出, 全部累计为 end_spill 交由调用方路由
// ==========================================
// 红线: adjusted(w) <= capacity(w) + slack_in(w)
// ==========================================

use crate::domain::adjustment::AdjustmentRecord;
use crate::domain::capacity::CapacityLookup;
use crate::domain::types::{WeekKey, Zone};
use std::collections::BTreeMap;
use std::fmt;

/// 平准模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelMode {
    #[default]
    Forward,
    DetNear,
    AggFar,
    Blend,
}

impl LevelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelMode::Forward => "forward",
            LevelMode::DetNear => "det_near",
            LevelMode::AggFar => "agg_far",
            LevelMode::Blend => "blend",
        }
    }

    /// 是否在区段内逐周结转溢出
    pub fn carries_spill(&self) -> bool {
        matches!(self, LevelMode::Forward)
    }
}

impl fmt::Display for LevelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次平准结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelOutcome {
    pub adjusted: BTreeMap<WeekKey, f64>,
    pub records: Vec<AdjustmentRecord>,
    pub end_slack: f64,
    pub end_spill: f64,
}

impl LevelOutcome {
    pub fn total_adjusted(&self) -> f64 {
        self.records.iter().map(|r| r.adjusted_load).sum()
    }

    pub fn total_spill_out(&self) -> f64 {
        self.records.iter().map(|r| r.spill_out).sum()
    }
}

// ==========================================
// LoadLeveler - 负荷平准器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct LoadLeveler {}

impl LoadLeveler {
    pub fn new() -> Self {
        Self {}
    }

    /// 逐周平准
    ///
    /// # 参数
    /// - `weeks`: 有序周序列
    /// - `load`: 周负荷（缺失为 0）
    /// - `capacity`: 周产能
    /// - `start_slack`: 起始结转松弛
    /// - `start_spill`: 起始溢出（仅进入首周）
    /// - `mode`: 平准模式
    ///
    /// # 返回
    /// LevelOutcome; 记录的 zone 统一为 All, 由区段编排重新标注
    pub fn level(
        &self,
        weeks: &[WeekKey],
        load: &BTreeMap<WeekKey, f64>,
        capacity: &dyn CapacityLookup,
        start_slack: f64,
        start_spill: f64,
        mode: LevelMode,
    ) -> LevelOutcome {
        let mut outcome = LevelOutcome::default();
        let mut slack_in = start_slack.max(0.0);
        let mut spill_in = start_spill.max(0.0);
        let mut accumulated_spill = 0.0;

        for week in weeks {
            let original = load.get(week).copied().unwrap_or(0.0);
            let cap = capacity.capacity_of(week);
            let demand = original + spill_in;
            let effective = cap + slack_in;

            let (adjusted, spill_out, slack_out) = if demand <= effective {
                (demand, 0.0, (effective - original).max(0.0))
            } else {
                (effective.max(0.0), demand - effective.max(0.0), 0.0)
            };

            outcome.adjusted.insert(week.clone(), adjusted);
            outcome.records.push(AdjustmentRecord {
                week: week.clone(),
                capacity: cap,
                original_load: original,
                carried_slack_in: slack_in,
                spill_in,
                adjusted_load: adjusted,
                spill_out,
                slack_carry_out: slack_out,
                zone: Zone::All,
                boundary_index: None,
                boundary_size: None,
                in_window_pre: None,
                in_window_post: None,
            });

            slack_in = slack_out;
            accumulated_spill += spill_out;
            spill_in = if mode.carries_spill() { spill_out } else { 0.0 };
        }

        outcome.end_slack = slack_in;
        outcome.end_spill = if weeks.is_empty() {
            // 空区段: 起始溢出原样透传
            start_spill.max(0.0)
        } else if mode.carries_spill() {
            spill_in
        } else {
            accumulated_spill
        };

        tracing::debug!(
            mode = %mode,
            weeks = weeks.len(),
            end_slack = outcome.end_slack,
            end_spill = outcome.end_spill,
            "平准完成"
        );
        outcome
    }
}

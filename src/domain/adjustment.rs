// ==========================================
// 计划对账引擎 - 调整记录
// ==========================================
// AdjustmentRecord: 逐周平准记录 (weekly_summary)
// CarryoverLogEntry: 残差结转审计记录 (只追加)
// ==========================================

use crate::domain::types::{MetricTriple, PeriodKey, WeekKey, Zone};
use serde::Serialize;

// ==========================================
// AdjustmentRecord - 周平准记录
// ==========================================
// 每次平准调用逐周创建, 创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentRecord {
    pub week: WeekKey,
    pub capacity: f64,
    pub original_load: f64,
    pub carried_slack_in: f64,
    pub spill_in: f64,
    pub adjusted_load: f64,
    pub spill_out: f64,
    pub slack_carry_out: f64,
    pub zone: Zone,

    // ===== 切换期间标记 (仅 at 区段) =====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_window_pre: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_window_post: Option<bool>,
}

impl AdjustmentRecord {
    /// 可用上限 = 产能 + 结转松弛
    pub fn effective_capacity(&self) -> f64 {
        self.capacity + self.carried_slack_in
    }
}

// ==========================================
// CarryoverLogEntry - 结转记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarryoverLogEntry {
    pub family: String,
    pub from_period: PeriodKey,
    pub to_period: PeriodKey,
    /// 路由到目标期间的量（逐指标）
    pub metrics: MetricTriple,
    /// 目标期间无法吸收的量（无明细行 / 行上限耗尽）
    pub unabsorbed: MetricTriple,

    // ===== 产能归一化诊断 =====
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headroom_prev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headroom_next: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_norm_prev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_norm_next: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_norm: Option<f64>,
}

impl CarryoverLogEntry {
    pub fn is_backward(&self) -> bool {
        self.to_period < self.from_period
    }

    pub fn is_forward(&self) -> bool {
        self.to_period > self.from_period
    }
}

// ==========================================
// UnresolvedResidual - 未消解残差
// ==========================================
// 期间内再分配与结转后仍无法落地的量
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedResidual {
    pub family: String,
    pub period: PeriodKey,
    pub residual: MetricTriple,
}

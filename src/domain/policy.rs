// ==========================================
// 计划对账引擎 - 锚定策略
// ==========================================
// 锚定策略决定切换期间溢出量由哪一侧吸收
// forward: 全序列单向前推 (默认)
// DET_near: 保护近期明细, 调整量压向期间后半
// AGG_far: 保护远期聚合, 调整量压向期间前半
// blend: 以切换周为中心的三角权重
// ==========================================

use crate::domain::types::BlendWeightMode;
use serde::{Serialize, Serializer};
use std::fmt;

/// 锚定策略（运行期一次选定）
///
/// `window_weeks` 为整合窗口周数（由 recon_window_days 换算, 未配置为 None）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorPolicy {
    #[default]
    Forward,
    DetNear {
        window_weeks: Option<usize>,
    },
    AggFar {
        window_weeks: Option<usize>,
    },
    Blend {
        weight_mode: BlendWeightMode,
        window_weeks: Option<usize>,
    },
}

impl AnchorPolicy {
    /// 策略标签（与配置值一致）
    pub fn label(&self) -> &'static str {
        match self {
            AnchorPolicy::Forward => "forward",
            AnchorPolicy::DetNear { .. } => "DET_near",
            AnchorPolicy::AggFar { .. } => "AGG_far",
            AnchorPolicy::Blend { .. } => "blend",
        }
    }

    pub fn window_weeks(&self) -> Option<usize> {
        match self {
            AnchorPolicy::Forward => None,
            AnchorPolicy::DetNear { window_weeks }
            | AnchorPolicy::AggFar { window_weeks }
            | AnchorPolicy::Blend { window_weeks, .. } => *window_weeks,
        }
    }

    /// 残差默认流向 next 侧的比例（carryover=both 且未显式配置 split 时）
    pub fn default_next_share(&self) -> f64 {
        match self {
            AnchorPolicy::DetNear { .. } | AnchorPolicy::Blend { .. } => 0.8,
            AnchorPolicy::AggFar { .. } | AnchorPolicy::Forward => 0.2,
        }
    }

    /// 是否默认向后 (next) 结转
    pub fn prefers_next(&self) -> bool {
        matches!(
            self,
            AnchorPolicy::DetNear { .. } | AnchorPolicy::Blend { .. }
        )
    }

    /// 期间内位置权重向量
    ///
    /// # 参数
    /// - `n`: 期间内明细行数（按周升序）
    /// - `cutover_index`: 切换周所在位置（0..n-1, 仅三角权重使用）
    ///
    /// # 返回
    /// 长度为 n 的非负权重; 全零时退化为均匀权重
    pub fn weights(&self, n: usize, cutover_index: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }

        let raw: Vec<f64> = match self {
            AnchorPolicy::DetNear { window_weeks } => match clamp_window(*window_weeks, n) {
                // 窗口内后段递增, 窗口外为 0
                Some(nw) => {
                    let pad = n - nw;
                    (0..n)
                        .map(|j| if j < pad { 0.0 } else { (j - pad + 1) as f64 })
                        .collect()
                }
                None => (1..=n).map(|v| v as f64).collect(),
            },
            AnchorPolicy::AggFar { window_weeks } => match clamp_window(*window_weeks, n) {
                // DET_near 的镜像: 窗口内前段递减
                Some(nw) => (0..n)
                    .map(|j| if j < nw { (nw - j) as f64 } else { 0.0 })
                    .collect(),
                None => (1..=n).rev().map(|v| v as f64).collect(),
            },
            AnchorPolicy::Blend { window_weeks, .. } => {
                triangular(n, cutover_index, *window_weeks)
            }
            AnchorPolicy::Forward => triangular(n, cutover_index, None),
        };

        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return vec![1.0; n];
        }
        raw
    }

    /// 锚定对齐用的权重
    ///
    /// forward 自身不带窗口, 对齐时按三角权重处理并沿用配置的整合窗口
    pub fn anchor_weights(&self, n: usize, cutover_index: usize, window_weeks: Option<usize>) -> Vec<f64> {
        match self {
            AnchorPolicy::Forward => AnchorPolicy::Blend {
                weight_mode: BlendWeightMode::Tri,
                window_weeks,
            }
            .weights(n, cutover_index),
            _ => self.weights(n, cutover_index),
        }
    }
}

/// 窗口周数收敛到 [1, n]
fn clamp_window(window_weeks: Option<usize>, n: usize) -> Option<usize> {
    window_weeks.map(|w| w.clamp(1, n))
}

/// 以 center 为中心的三角权重
///
/// 有窗口时半径 r = (nw-1)/2, 权重 max(0, r-|j-c|+1)
/// 无窗口时覆盖全域, 权重 max(1, n-|j-c|)
fn triangular(n: usize, center: usize, window_weeks: Option<usize>) -> Vec<f64> {
    let center = center.min(n.saturating_sub(1)) as i64;
    match clamp_window(window_weeks, n) {
        Some(nw) => {
            let r = ((nw as i64) - 1) / 2;
            (0..n as i64)
                .map(|j| (r - (j - center).abs() + 1).max(0) as f64)
                .collect()
        }
        None => (0..n as i64)
            .map(|j| ((n as i64) - (j - center).abs()).max(1) as f64)
            .collect(),
    }
}

impl fmt::Display for AnchorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AnchorPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

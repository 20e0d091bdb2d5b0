// ==========================================
// 计划对账引擎 - 混合策略溢出分配
// ==========================================
// 职责: blend 策略下将切换期间溢出拆分为 to_pre / to_post 两部分
// 权重: tri / lin = max(0, window - distance), quad = tri^2
// 比例: share_next = next / (next + prev), 截断到 [0.05, 0.95]
// 回退: 无溢出时 0.5; 显式覆盖值直接使用 (截断到 [0, 1])
// ==========================================

use crate::config::window_days_to_weeks;
use crate::domain::types::BlendWeightMode;
use serde::Serialize;

/// share_next 截断下限
pub const MIN_SHARE_NEXT: f64 = 0.05;
/// share_next 截断上限
pub const MAX_SHARE_NEXT: f64 = 0.95;

const EPS: f64 = 1e-12;

/// 溢出拆分结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlendSplit {
    pub window: usize,
    pub prev_weighted: f64,
    pub next_weighted: f64,
    pub share_next: f64,
    pub to_pre: f64,
    pub to_post: f64,
}

// ==========================================
// BlendWeightEstimator - 混合权重估计器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BlendWeightEstimator {
    weight_mode: BlendWeightMode,
    window_days: Option<u32>,
    split_override: Option<f64>,
}

impl BlendWeightEstimator {
    pub fn new(weight_mode: BlendWeightMode, window_days: Option<u32>) -> Self {
        Self {
            weight_mode,
            window_days,
            split_override: None,
        }
    }

    /// 设置显式 next 比例（跳过距离加权计算）
    pub fn with_override(mut self, share_next: Option<f64>) -> Self {
        self.split_override = share_next.map(|v| v.clamp(0.0, 1.0));
        self
    }

    /// 窗口周数: 配置天数向上取整到周, 未配置时取区段长度一半
    pub fn window_for(&self, n: usize) -> usize {
        match self.window_days {
            Some(days) => window_days_to_weeks(days),
            None => ((n + 1) / 2).max(1),
        }
    }

    fn weight(&self, window: usize, distance: usize) -> f64 {
        let tri = window.saturating_sub(distance) as f64;
        match self.weight_mode {
            BlendWeightMode::Tri | BlendWeightMode::Lin => tri,
            BlendWeightMode::Quad => tri * tri,
        }
    }

    /// 计算溢出拆分
    ///
    /// # 参数
    /// - `spills`: 切换期间逐周 spill_out（按区段内位置）
    ///
    /// # 返回
    /// BlendSplit; to_pre + to_post 等于溢出合计
    pub fn estimate(&self, spills: &[f64]) -> BlendSplit {
        let n = spills.len();
        let window = self.window_for(n);
        let total: f64 = spills.iter().map(|s| s.max(0.0)).sum();

        let mut prev_weighted = 0.0;
        let mut next_weighted = 0.0;
        for (i, spill) in spills.iter().enumerate() {
            let spill = spill.max(0.0);
            prev_weighted += spill * self.weight(window, i);
            next_weighted += spill * self.weight(window, n - 1 - i);
        }

        let share_next = match self.split_override {
            Some(v) => v,
            None if total <= EPS || prev_weighted + next_weighted <= EPS => 0.5,
            None => (next_weighted / (next_weighted + prev_weighted))
                .clamp(MIN_SHARE_NEXT, MAX_SHARE_NEXT),
        };

        let to_post = total * share_next;
        let split = BlendSplit {
            window,
            prev_weighted,
            next_weighted,
            share_next,
            to_pre: total - to_post,
            to_post,
        };
        tracing::debug!(
            window,
            total,
            share_next,
            mode = %self.weight_mode,
            "blend 溢出拆分"
        );
        split
    }
}

// ==========================================
// 计划对账引擎 - 区段策略编排
// ==========================================
// 职责: 按切换期间拆分 pre / at / post 区段, 按锚定策略编排平准调用
// ==========================================
// forward:  全序列单次 forward 平准
// DET_near: pre(forward) → at(det_near, 承接 pre 期末) → post(forward, 承接 at 期末松弛+溢出)
//           切换期间溢出严格向后推
// AGG_far:  pre(forward) → at(agg_far) → pre 以 at 溢出为起始重算 → post 仅承接 at 松弛
//           切换期间溢出向前吸收
// blend:    pre(forward) → at(blend) → 按 BlendWeightEstimator 拆分溢出
//           → pre 以 to_pre 重算 → post 承接 at 松弛 + to_post
// ==========================================
// 切换期间各周附加 boundary_index / boundary_size,
// 配置整合窗口时附加 in_window_pre / in_window_post
// ==========================================

use crate::config::ReconConfig;
use crate::domain::adjustment::AdjustmentRecord;
use crate::domain::capacity::CapacityLookup;
use crate::domain::policy::AnchorPolicy;
use crate::domain::types::{PeriodKey, WeekKey, Zone};
use crate::engine::blend_weight::{BlendSplit, BlendWeightEstimator};
use crate::engine::load_leveler::{LevelMode, LevelOutcome, LoadLeveler};
use std::collections::BTreeMap;
use tracing::instrument;

// ==========================================
// Segments - 区段划分
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub pre: Vec<WeekKey>,
    pub at: Vec<WeekKey>,
    pub post: Vec<WeekKey>,
}

impl Segments {
    /// 按周所属期间与切换期间的先后关系划分（保持输入顺序）
    pub fn partition<F>(weeks: &[WeekKey], period_of: F, cutover: &PeriodKey) -> Self
    where
        F: Fn(&WeekKey) -> PeriodKey,
    {
        let mut segments = Segments::default();
        for week in weeks {
            let period = period_of(week);
            if &period < cutover {
                segments.pre.push(week.clone());
            } else if &period == cutover {
                segments.at.push(week.clone());
            } else {
                segments.post.push(week.clone());
            }
        }
        segments
    }

    pub fn len(&self) -> usize {
        self.pre.len() + self.at.len() + self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 三段按序拼接
    pub fn all_weeks(&self) -> Vec<WeekKey> {
        self.pre
            .iter()
            .chain(self.at.iter())
            .chain(self.post.iter())
            .cloned()
            .collect()
    }

    fn zone_of(&self, week: &WeekKey) -> Zone {
        if self.at.contains(week) {
            Zone::At
        } else if self.pre.contains(week) {
            Zone::Pre
        } else {
            Zone::Post
        }
    }
}

/// 周序列布局: 未配置切换日期时整段处理
#[derive(Debug, Clone, PartialEq)]
pub enum WeekLayout {
    Whole(Vec<WeekKey>),
    Split(Segments),
}

/// 区段编排结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentOutcome {
    pub adjusted: BTreeMap<WeekKey, f64>,
    /// 按 pre / at / post 顺序排列的最终逐周记录
    pub records: Vec<AdjustmentRecord>,
    pub end_slack: f64,
    /// 未被任何区段吸收的溢出
    pub end_spill: f64,
    /// AGG_far / blend 回灌 pre 后仍未吸收的部分
    pub unabsorbed_backward: f64,
    pub blend_split: Option<BlendSplit>,
}

// ==========================================
// SegmentPolicyEngine - 区段策略引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SegmentPolicyEngine {
    leveler: LoadLeveler,
    policy: AnchorPolicy,
    window_weeks: Option<usize>,
    blend: BlendWeightEstimator,
}

impl SegmentPolicyEngine {
    pub fn new(policy: AnchorPolicy, window_weeks: Option<usize>, blend: BlendWeightEstimator) -> Self {
        Self {
            leveler: LoadLeveler::new(),
            policy,
            window_weeks,
            blend,
        }
    }

    pub fn from_config(config: &ReconConfig) -> Self {
        let blend = BlendWeightEstimator::new(config.blend_weight_mode, config.recon_window_days)
            .with_override(config.blend_split_next);
        Self::new(config.anchor_policy, config.window_weeks(), blend)
    }

    pub fn policy(&self) -> AnchorPolicy {
        self.policy
    }

    /// 按策略平准整个周序列
    ///
    /// # 参数
    /// - `layout`: 周序列布局（整段 / 三段）
    /// - `load`: 周负荷
    /// - `capacity`: 周产能
    #[instrument(skip(self, layout, load, capacity), fields(policy = %self.policy))]
    pub fn run(
        &self,
        layout: &WeekLayout,
        load: &BTreeMap<WeekKey, f64>,
        capacity: &dyn CapacityLookup,
    ) -> SegmentOutcome {
        let segments = match layout {
            WeekLayout::Whole(weeks) => {
                let out = self.leveler.level(weeks, load, capacity, 0.0, 0.0, LevelMode::Forward);
                return SegmentOutcome {
                    adjusted: out.adjusted,
                    records: out.records,
                    end_slack: out.end_slack,
                    end_spill: out.end_spill,
                    unabsorbed_backward: 0.0,
                    blend_split: None,
                };
            }
            WeekLayout::Split(segments) => segments,
        };

        let mut outcome = match self.policy {
            AnchorPolicy::Forward => self.run_forward(segments, load, capacity),
            AnchorPolicy::DetNear { .. } => self.run_det_near(segments, load, capacity),
            AnchorPolicy::AggFar { .. } => self.run_backward(segments, load, capacity, None),
            AnchorPolicy::Blend { .. } => {
                self.run_backward(segments, load, capacity, Some(&self.blend))
            }
        };
        self.tag_zones(segments, &mut outcome.records);

        tracing::info!(
            pre = segments.pre.len(),
            at = segments.at.len(),
            post = segments.post.len(),
            end_spill = outcome.end_spill,
            unabsorbed_backward = outcome.unabsorbed_backward,
            "区段平准完成"
        );
        outcome
    }

    fn run_forward(
        &self,
        segments: &Segments,
        load: &BTreeMap<WeekKey, f64>,
        capacity: &dyn CapacityLookup,
    ) -> SegmentOutcome {
        let out = self
            .leveler
            .level(&segments.all_weeks(), load, capacity, 0.0, 0.0, LevelMode::Forward);
        let (end_slack, end_spill) = (out.end_slack, out.end_spill);
        assemble(vec![out], end_slack, end_spill, 0.0, None)
    }

    fn run_det_near(
        &self,
        segments: &Segments,
        load: &BTreeMap<WeekKey, f64>,
        capacity: &dyn CapacityLookup,
    ) -> SegmentOutcome {
        let pre = self
            .leveler
            .level(&segments.pre, load, capacity, 0.0, 0.0, LevelMode::Forward);
        let at = self.leveler.level(
            &segments.at,
            load,
            capacity,
            pre.end_slack,
            pre.end_spill,
            LevelMode::DetNear,
        );
        let post = self.leveler.level(
            &segments.post,
            load,
            capacity,
            at.end_slack,
            at.end_spill,
            LevelMode::Forward,
        );
        let (end_slack, end_spill) = (post.end_slack, post.end_spill);
        assemble(vec![pre, at, post], end_slack, end_spill, 0.0, None)
    }

    /// AGG_far / blend: 切换期间溢出（全部或 to_pre 部分）回灌 pre 重算
    fn run_backward(
        &self,
        segments: &Segments,
        load: &BTreeMap<WeekKey, f64>,
        capacity: &dyn CapacityLookup,
        blend: Option<&BlendWeightEstimator>,
    ) -> SegmentOutcome {
        let mode = if blend.is_some() {
            LevelMode::Blend
        } else {
            LevelMode::AggFar
        };

        let pre_first = self
            .leveler
            .level(&segments.pre, load, capacity, 0.0, 0.0, LevelMode::Forward);
        let at = self.leveler.level(
            &segments.at,
            load,
            capacity,
            pre_first.end_slack,
            pre_first.end_spill,
            mode,
        );

        let split = blend.map(|est| {
            let spills: Vec<f64> = at.records.iter().map(|r| r.spill_out).collect();
            est.estimate(&spills)
        });
        let (to_pre, to_post) = match split {
            Some(s) => (s.to_pre, s.to_post),
            None => (at.end_spill, 0.0),
        };

        let pre_second = self
            .leveler
            .level(&segments.pre, load, capacity, 0.0, to_pre, LevelMode::Forward);
        let post = self.leveler.level(
            &segments.post,
            load,
            capacity,
            at.end_slack,
            to_post,
            LevelMode::Forward,
        );

        let unabsorbed = (pre_second.end_spill - pre_first.end_spill).max(0.0);
        if unabsorbed > 0.0 {
            tracing::warn!(unabsorbed, policy = %self.policy, "切换期间溢出未被 pre 区段完全吸收");
        }
        let (end_slack, post_spill) = (post.end_slack, post.end_spill);
        assemble(
            vec![pre_second, at, post],
            end_slack,
            unabsorbed + post_spill,
            unabsorbed,
            split,
        )
    }

    fn tag_zones(&self, segments: &Segments, records: &mut [AdjustmentRecord]) {
        let size = segments.at.len();
        for record in records.iter_mut() {
            record.zone = segments.zone_of(&record.week);
            if record.zone != Zone::At {
                continue;
            }
            let idx = segments
                .at
                .iter()
                .position(|w| w == &record.week)
                .unwrap_or(0);
            record.boundary_index = Some(idx);
            record.boundary_size = Some(size);
            if let Some(nw) = self.window_weeks {
                record.in_window_pre = Some(idx < nw);
                record.in_window_post = Some(idx >= size.saturating_sub(nw));
            }
        }
    }
}

fn assemble(
    parts: Vec<LevelOutcome>,
    end_slack: f64,
    end_spill: f64,
    unabsorbed_backward: f64,
    blend_split: Option<BlendSplit>,
) -> SegmentOutcome {
    let mut outcome = SegmentOutcome {
        end_slack,
        end_spill,
        unabsorbed_backward,
        blend_split,
        ..SegmentOutcome::default()
    };
    for part in parts {
        outcome.adjusted.extend(part.adjusted);
        outcome.records.extend(part.records);
    }
    outcome
}

// ==========================================
// LoadLeveler / SegmentPolicyEngine 集成测试
// ==========================================
// 测试目标: 验证周负荷平准与区段策略编排
// 覆盖范围: 产能约束、守恒、溢出回灌、混合拆分
// ==========================================

use plan_recon::domain::types::{PeriodKey, WeekKey, Zone};
use plan_recon::engine::blend_weight::BlendWeightEstimator;
use plan_recon::engine::{LevelMode, LoadLeveler, SegmentPolicyEngine, Segments, WeekLayout};
use plan_recon::{AnchorPolicy, BlendWeightMode};
use std::collections::BTreeMap;

// ==========================================
// 测试辅助函数
// ==========================================

fn weeks(labels: &[&str]) -> Vec<WeekKey> {
    labels.iter().map(|l| WeekKey::from(*l)).collect()
}

fn series(weeks: &[WeekKey], values: &[f64]) -> BTreeMap<WeekKey, f64> {
    weeks.iter().cloned().zip(values.iter().copied()).collect()
}

fn period_of(week: &WeekKey) -> PeriodKey {
    PeriodKey::new(&week.as_str()[..7])
}

/// 12 月 1 周 + 1 月 3 周 + 2 月 1 周
fn five_weeks() -> Vec<WeekKey> {
    weeks(&[
        "2024-12-Wk4",
        "2025-01-Wk1",
        "2025-01-Wk2",
        "2025-01-Wk3",
        "2025-02-Wk1",
    ])
}

fn split_layout(w: &[WeekKey]) -> WeekLayout {
    WeekLayout::Split(Segments::partition(w, period_of, &PeriodKey::from("2025-01")))
}

// ==========================================
// 测试用例: 前向平准
// ==========================================

#[test]
fn test_forward_example_matches_expected_table() {
    let w = weeks(&["W1", "W2", "W3"]);
    let load = series(&w, &[5.0, 20.0, 5.0]);
    let cap = series(&w, &[10.0, 10.0, 10.0]);

    let out = LoadLeveler::new().level(&w, &load, &cap, 0.0, 0.0, LevelMode::Forward);

    let adjusted: Vec<f64> = out.records.iter().map(|r| r.adjusted_load).collect();
    let spill: Vec<f64> = out.records.iter().map(|r| r.spill_out).collect();
    let slack: Vec<f64> = out.records.iter().map(|r| r.slack_carry_out).collect();
    println!("adjusted={:?} spill={:?} slack={:?}", adjusted, spill, slack);

    assert_eq!(adjusted, vec![5.0, 15.0, 10.0]);
    assert_eq!(spill, vec![0.0, 5.0, 0.0]);
    assert_eq!(slack, vec![5.0, 0.0, 5.0]);
}

#[test]
fn test_capacity_bound_and_conservation() {
    let w = weeks(&["W1", "W2", "W3", "W4"]);
    let load = series(&w, &[12.0, 3.0, 25.0, 9.0]);
    let cap = series(&w, &[10.0, 8.0, 10.0, 10.0]);
    let start_spill = 4.0;

    for mode in [LevelMode::Forward, LevelMode::DetNear, LevelMode::AggFar] {
        let out = LoadLeveler::new().level(&w, &load, &cap, 0.0, start_spill, mode);
        for r in &out.records {
            assert!(
                r.adjusted_load <= r.capacity + r.carried_slack_in + 1e-9,
                "mode={} week={} 超出可用上限",
                mode,
                r.week
            );
        }
        if mode == LevelMode::Forward {
            assert!(out.total_spill_out() >= out.end_spill);
        } else {
            assert!((out.total_spill_out() - out.end_spill).abs() < 1e-9);
        }
        let original: f64 = load.values().sum();
        assert!(
            (out.total_adjusted() + out.end_spill - original - start_spill).abs() < 1e-9,
            "mode={} 不守恒",
            mode
        );
    }
}

// ==========================================
// 测试用例: 区段策略
// ==========================================

#[test]
fn test_det_near_pushes_spill_into_post() {
    let w = five_weeks();
    let load = series(&w, &[10.0, 10.0, 20.0, 5.0, 5.0]);
    let cap = series(&w, &[10.0; 5]);
    let engine = SegmentPolicyEngine::new(
        AnchorPolicy::DetNear { window_weeks: None },
        None,
        BlendWeightEstimator::default(),
    );

    let out = engine.run(&split_layout(&w), &load, &cap);

    assert_eq!(out.adjusted[&WeekKey::from("2025-01-Wk2")], 10.0);
    assert_eq!(out.adjusted[&WeekKey::from("2025-02-Wk1")], 15.0);
    assert_eq!(out.end_spill, 0.0);
    let zones: Vec<Zone> = out.records.iter().map(|r| r.zone).collect();
    assert_eq!(
        zones,
        vec![Zone::Pre, Zone::At, Zone::At, Zone::At, Zone::Post]
    );
    assert_eq!(out.records[1].boundary_index, Some(0));
    assert_eq!(out.records[3].boundary_size, Some(3));
}

#[test]
fn test_agg_far_feeds_spill_back_into_pre() {
    let w = weeks(&["2024-12-Wk3", "2024-12-Wk4", "2025-01-Wk1", "2025-02-Wk1"]);
    // pre 末周满载, 松弛不流入切换期间
    let load = series(&w, &[2.0, 18.0, 16.0, 10.0]);
    let cap = series(&w, &[10.0, 10.0, 10.0, 10.0]);
    let engine = SegmentPolicyEngine::new(
        AnchorPolicy::AggFar { window_weeks: None },
        None,
        BlendWeightEstimator::default(),
    );

    let out = engine.run(&split_layout(&w), &load, &cap);
    println!("records={:#?}", out.records);

    // 切换期间溢出 6 回灌到 pre 首周
    assert_eq!(out.adjusted[&WeekKey::from("2024-12-Wk3")], 8.0);
    assert_eq!(out.adjusted[&WeekKey::from("2025-02-Wk1")], 10.0);
    assert_eq!(out.unabsorbed_backward, 0.0);
    assert!(out.blend_split.is_none());
}

#[test]
fn test_blend_splits_spill_between_pre_and_post() {
    let w = weeks(&[
        "2024-12-Wk3",
        "2024-12-Wk4",
        "2025-01-Wk1",
        "2025-01-Wk2",
        "2025-02-Wk1",
    ]);
    let load = series(&w, &[0.0, 20.0, 14.0, 10.0, 0.0]);
    let cap = series(&w, &[10.0; 5]);
    let blend = BlendWeightEstimator::new(BlendWeightMode::Tri, None).with_override(Some(0.25));
    let engine = SegmentPolicyEngine::new(
        AnchorPolicy::Blend {
            weight_mode: BlendWeightMode::Tri,
            window_weeks: None,
        },
        None,
        blend,
    );

    let out = engine.run(&split_layout(&w), &load, &cap);
    let split = out.blend_split.expect("blend split");

    assert!((split.to_pre + split.to_post - 4.0).abs() < 1e-9);
    assert!((split.to_post - 1.0).abs() < 1e-9);
    assert!((out.adjusted[&WeekKey::from("2024-12-Wk3")] - 3.0).abs() < 1e-9);
    assert_eq!(out.unabsorbed_backward, 0.0);
    assert!((out.adjusted[&WeekKey::from("2025-02-Wk1")] - 1.0).abs() < 1e-9);
}

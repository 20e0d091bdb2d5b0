// ==========================================
// ReconConfig 配置解析测试
// ==========================================
// 测试目标: 验证键值解析、预设、策略解析与取值校验
// ==========================================

use chrono::NaiveDate;
use plan_recon::config::{config_keys, ConfigError, ReconConfig};
use plan_recon::{AnchorPolicy, BlendWeightMode, CarryoverMode, RoundMode};
use std::collections::BTreeMap;

fn kv(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_defaults_when_empty() {
    let cfg = ReconConfig::from_kv(&BTreeMap::new()).unwrap();
    assert_eq!(cfg.anchor_policy, AnchorPolicy::Forward);
    assert_eq!(cfg.carryover, CarryoverMode::None);
    assert_eq!(cfg.round_mode, RoundMode::None);
    assert!(cfg.cutover_date.is_none());
    assert!((cfg.tol_abs - 1e-6).abs() < 1e-15);
    assert!((cfg.headroom.capacity - 0.5).abs() < 1e-12);
}

#[test]
fn test_full_key_set() {
    let cfg = ReconConfig::from_kv(&kv(&[
        (config_keys::CUTOVER_DATE, "2025-01-15"),
        (config_keys::ANCHOR_POLICY, "det-near"),
        (config_keys::RECON_WINDOW_DAYS, "10"),
        (config_keys::MAX_ADJUST_RATIO, "0.25"),
        (config_keys::CARRYOVER, "both"),
        (config_keys::CARRYOVER_SPLIT, "0.4"),
        (config_keys::ROUND_MODE, "int"),
    ]))
    .unwrap();

    assert_eq!(cfg.cutover_date, NaiveDate::from_ymd_opt(2025, 1, 15));
    assert_eq!(
        cfg.anchor_policy,
        AnchorPolicy::DetNear {
            window_weeks: Some(2)
        }
    );
    assert_eq!(cfg.max_adjust_ratio, Some(0.25));
    assert_eq!(cfg.carryover, CarryoverMode::Both);
    assert_eq!(cfg.carryover_split, Some(0.4));
    assert_eq!(cfg.round_mode, RoundMode::Int);
    assert_eq!(cfg.cutover_period().as_deref(), Some("2025-01"));
}

#[test]
fn test_blend_preset_fills_unset_keys() {
    let cfg = ReconConfig::from_kv(&kv(&[(config_keys::PRESET, "blend")])).unwrap();
    assert_eq!(
        cfg.anchor_policy,
        AnchorPolicy::Blend {
            weight_mode: BlendWeightMode::Tri,
            window_weeks: Some(2)
        }
    );
    assert_eq!(cfg.recon_window_days, Some(14));

    // 显式值优先于预设
    let cfg = ReconConfig::from_kv(&kv(&[
        (config_keys::PRESET, "det_near"),
        (config_keys::RECON_WINDOW_DAYS, "21"),
    ]))
    .unwrap();
    assert_eq!(cfg.window_weeks(), Some(3));
}

#[test]
fn test_unknown_policy_rejected_unless_lenient() {
    let err = ReconConfig::from_kv(&kv(&[(config_keys::ANCHOR_POLICY, "sideways")])).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedPolicy(_)));

    let cfg = ReconConfig::from_kv(&kv(&[
        (config_keys::ANCHOR_POLICY, "sideways"),
        (config_keys::LENIENT_POLICY, "true"),
    ]))
    .unwrap();
    assert_eq!(cfg.anchor_policy, AnchorPolicy::Forward);
}

#[test]
fn test_out_of_range_split_rejected() {
    let err = ReconConfig::from_kv(&kv(&[(config_keys::CARRYOVER_SPLIT, "1.5")])).unwrap_err();
    assert!(matches!(err, ConfigError::OutOfRange { .. }));
}

#[test]
fn test_invalid_values_reported() {
    let err = ReconConfig::from_kv(&kv(&[(config_keys::CUTOVER_DATE, "2025/01/15")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDate { .. }));

    let err = ReconConfig::from_kv(&kv(&[(config_keys::TOL_ABS, "tiny")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));

    let err = ReconConfig::from_kv(&kv(&[(config_keys::PRESET, "fastest")])).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownPreset(_)));
}

#[test]
fn test_json_file_merged_with_overrides() {
    let json = r#"{"cutover_date": "2025-03-03", "anchor_policy": "AGG_far", "max_adjust_ratio": 0.3, "carryover_split": null}"#;
    let overrides = kv(&[(config_keys::MAX_ADJUST_RATIO, "0.1")]);

    let cfg = ReconConfig::from_sources(Some(json), &overrides).unwrap();
    assert_eq!(cfg.anchor_policy, AnchorPolicy::AggFar { window_weeks: None });
    assert_eq!(cfg.max_adjust_ratio, Some(0.1));
    assert!(cfg.carryover_split.is_none());
}

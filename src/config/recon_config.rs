// ==========================================
// 计划对账引擎 - 对账配置
// ==========================================
// 来源: 扁平 key-value (CLI --set / JSON 配置文件)
// 预设: det_near / agg_far / blend (仅填充未设置的项)
// ==========================================
// 职责: 解析、校验、解析锚定策略
// 红线: 范围外的比例在此拒绝, 不进入引擎
// ==========================================

use crate::config::error::ConfigError;
use crate::domain::policy::AnchorPolicy;
use crate::domain::types::{BlendWeightMode, CalendarMode, CarryoverMode, RoundMode};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const CUTOVER_DATE: &str = "cutover_date";
    pub const ANCHOR_POLICY: &str = "anchor_policy";
    pub const RECON_WINDOW_DAYS: &str = "recon_window_days";
    pub const MAX_ADJUST_RATIO: &str = "max_adjust_ratio";
    pub const TOL_ABS: &str = "tol_abs";
    pub const TOL_REL: &str = "tol_rel";
    pub const CARRYOVER: &str = "carryover";
    pub const CARRYOVER_SPLIT: &str = "carryover_split";
    pub const BLEND_WEIGHT_MODE: &str = "blend_weight_mode";
    pub const BLEND_SPLIT_NEXT: &str = "blend_split_next";
    pub const ROUND_MODE: &str = "round_mode";
    pub const CALENDAR_MODE: &str = "calendar_mode";
    pub const FALLBACK_WEEKS: &str = "fallback_weeks";
    pub const HEADROOM_CAPACITY_WEIGHT: &str = "headroom_capacity_weight";
    pub const HEADROOM_INBOUND_WEIGHT: &str = "headroom_inbound_weight";
    pub const HEADROOM_SCORE_WEIGHT: &str = "headroom_score_weight";
    pub const HEADROOM_COST_WEIGHT: &str = "headroom_cost_weight";
    pub const LENIENT_POLICY: &str = "lenient_policy";
    pub const PRESET: &str = "preset";

    pub const ALL: [&str; 19] = [
        CUTOVER_DATE,
        ANCHOR_POLICY,
        RECON_WINDOW_DAYS,
        MAX_ADJUST_RATIO,
        TOL_ABS,
        TOL_REL,
        CARRYOVER,
        CARRYOVER_SPLIT,
        BLEND_WEIGHT_MODE,
        BLEND_SPLIT_NEXT,
        ROUND_MODE,
        CALENDAR_MODE,
        FALLBACK_WEEKS,
        HEADROOM_CAPACITY_WEIGHT,
        HEADROOM_INBOUND_WEIGHT,
        HEADROOM_SCORE_WEIGHT,
        HEADROOM_COST_WEIGHT,
        LENIENT_POLICY,
        PRESET,
    ];
}

use config_keys as keys;

/// 默认容差
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// 默认回退周数（无日历时每期间周数）
pub const DEFAULT_FALLBACK_WEEKS: usize = 4;

// ==========================================
// HeadroomWeights - 结转余量偏置系数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadroomWeights {
    pub capacity: f64,
    pub inbound: f64,
    pub score: f64,
    pub cost: f64,
}

impl Default for HeadroomWeights {
    fn default() -> Self {
        Self {
            capacity: 0.5,
            inbound: 0.0,
            score: 0.0,
            cost: 0.0,
        }
    }
}

// ==========================================
// ReconConfig - 对账配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconConfig {
    pub cutover_date: Option<NaiveDate>,
    pub anchor_policy: AnchorPolicy,
    pub recon_window_days: Option<u32>,
    pub max_adjust_ratio: Option<f64>,
    pub tol_abs: f64,
    pub tol_rel: f64,
    pub carryover: CarryoverMode,
    pub carryover_split: Option<f64>,
    pub blend_weight_mode: BlendWeightMode,
    pub blend_split_next: Option<f64>,
    pub round_mode: RoundMode,
    pub calendar_mode: CalendarMode,
    pub fallback_weeks: usize,
    pub headroom: HeadroomWeights,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            cutover_date: None,
            anchor_policy: AnchorPolicy::Forward,
            recon_window_days: None,
            max_adjust_ratio: None,
            tol_abs: DEFAULT_TOLERANCE,
            tol_rel: DEFAULT_TOLERANCE,
            carryover: CarryoverMode::None,
            carryover_split: None,
            blend_weight_mode: BlendWeightMode::Tri,
            blend_split_next: None,
            round_mode: RoundMode::None,
            calendar_mode: CalendarMode::Simple,
            fallback_weeks: DEFAULT_FALLBACK_WEEKS,
            headroom: HeadroomWeights::default(),
        }
    }
}

impl ReconConfig {
    /// 从扁平 key-value 构建配置
    ///
    /// # 参数
    /// - kv: 配置键 → 原始字符串值（未出现的键取默认值）
    ///
    /// # 返回
    /// - Ok(ReconConfig): 已校验的配置
    /// - Err(ConfigError): 值无法解析 / 超出范围 / 策略不支持
    pub fn from_kv(kv: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut kv = kv.clone();
        if let Some(preset) = kv.get(keys::PRESET).cloned() {
            apply_preset(&mut kv, &preset)?;
        }

        for key in kv.keys() {
            if !keys::ALL.contains(&key.as_str()) {
                tracing::warn!("忽略未知配置项: {}", key);
            }
        }

        let mut cfg = ReconConfig::default();

        cfg.cutover_date = match non_empty(&kv, keys::CUTOVER_DATE) {
            Some(raw) => Some(parse_date(keys::CUTOVER_DATE, raw)?),
            None => None,
        };
        cfg.recon_window_days = parse_opt::<u32>(&kv, keys::RECON_WINDOW_DAYS)?;
        cfg.max_adjust_ratio = parse_opt::<f64>(&kv, keys::MAX_ADJUST_RATIO)?;
        cfg.tol_abs = parse_opt::<f64>(&kv, keys::TOL_ABS)?.unwrap_or(DEFAULT_TOLERANCE);
        cfg.tol_rel = parse_opt::<f64>(&kv, keys::TOL_REL)?.unwrap_or(DEFAULT_TOLERANCE);
        cfg.carryover = parse_enum(&kv, keys::CARRYOVER)?.unwrap_or_default();
        cfg.carryover_split = parse_opt::<f64>(&kv, keys::CARRYOVER_SPLIT)?;
        cfg.blend_weight_mode = parse_enum(&kv, keys::BLEND_WEIGHT_MODE)?.unwrap_or_default();
        cfg.blend_split_next = parse_opt::<f64>(&kv, keys::BLEND_SPLIT_NEXT)?;
        cfg.round_mode = parse_enum(&kv, keys::ROUND_MODE)?.unwrap_or_default();
        cfg.calendar_mode = parse_enum(&kv, keys::CALENDAR_MODE)?.unwrap_or_default();
        cfg.fallback_weeks = parse_opt::<usize>(&kv, keys::FALLBACK_WEEKS)?
            .unwrap_or(DEFAULT_FALLBACK_WEEKS)
            .max(1);

        let defaults = HeadroomWeights::default();
        cfg.headroom = HeadroomWeights {
            capacity: parse_opt::<f64>(&kv, keys::HEADROOM_CAPACITY_WEIGHT)?
                .unwrap_or(defaults.capacity),
            inbound: parse_opt::<f64>(&kv, keys::HEADROOM_INBOUND_WEIGHT)?
                .unwrap_or(defaults.inbound),
            score: parse_opt::<f64>(&kv, keys::HEADROOM_SCORE_WEIGHT)?.unwrap_or(defaults.score),
            cost: parse_opt::<f64>(&kv, keys::HEADROOM_COST_WEIGHT)?.unwrap_or(defaults.cost),
        };

        let lenient = parse_bool(&kv, keys::LENIENT_POLICY)?.unwrap_or(false);
        let window_weeks = cfg.recon_window_days.map(window_days_to_weeks);
        cfg.anchor_policy = match non_empty(&kv, keys::ANCHOR_POLICY) {
            Some(raw) => resolve_policy(raw, window_weeks, cfg.blend_weight_mode, lenient)?,
            None => AnchorPolicy::Forward,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 JSON 对象构建配置（值可为字符串/数字/布尔, null 视为未设置）
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let kv = json_to_kv(raw)?;
        Self::from_kv(&kv)
    }

    /// 合并配置文件与命令行覆盖项（覆盖项优先）
    pub fn from_sources(
        json: Option<&str>,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut kv = match json {
            Some(raw) => json_to_kv(raw)?,
            None => BTreeMap::new(),
        };
        for (key, value) in overrides {
            kv.insert(key.clone(), value.clone());
        }
        Self::from_kv(&kv)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range(keys::CARRYOVER_SPLIT, self.carryover_split)?;
        check_unit_range(keys::BLEND_SPLIT_NEXT, self.blend_split_next)?;
        check_non_negative(keys::MAX_ADJUST_RATIO, self.max_adjust_ratio)?;
        check_non_negative(keys::TOL_ABS, Some(self.tol_abs))?;
        check_non_negative(keys::TOL_REL, Some(self.tol_rel))?;
        check_non_negative(keys::HEADROOM_CAPACITY_WEIGHT, Some(self.headroom.capacity))?;
        check_non_negative(keys::HEADROOM_INBOUND_WEIGHT, Some(self.headroom.inbound))?;
        check_non_negative(keys::HEADROOM_SCORE_WEIGHT, Some(self.headroom.score))?;
        check_non_negative(keys::HEADROOM_COST_WEIGHT, Some(self.headroom.cost))?;
        Ok(())
    }

    /// 整合窗口周数（天数向上取整到周, 最少 1 周）
    pub fn window_weeks(&self) -> Option<usize> {
        self.recon_window_days.map(window_days_to_weeks)
    }

    /// 切换期间标签 (YYYY-MM)
    pub fn cutover_period(&self) -> Option<String> {
        self.cutover_date.map(|d| d.format("%Y-%m").to_string())
    }
}

/// 天数 → 周数（向上取整, 至少 1）
pub fn window_days_to_weeks(days: u32) -> usize {
    (((days as usize) + 6) / 7).max(1)
}

/// 解析锚定策略标签
///
/// 未识别的标签: 宽松模式下回退 forward 并告警, 否则拒绝
pub fn resolve_policy(
    raw: &str,
    window_weeks: Option<usize>,
    weight_mode: BlendWeightMode,
    lenient: bool,
) -> Result<AnchorPolicy, ConfigError> {
    let label = raw.trim().to_uppercase().replace('-', "_");
    match label.as_str() {
        "FORWARD" => Ok(AnchorPolicy::Forward),
        "DET_NEAR" => Ok(AnchorPolicy::DetNear { window_weeks }),
        "AGG_FAR" => Ok(AnchorPolicy::AggFar { window_weeks }),
        "BLEND" => Ok(AnchorPolicy::Blend {
            weight_mode,
            window_weeks,
        }),
        _ if lenient => {
            tracing::warn!("未知锚定策略 {}, 按 forward 处理", raw);
            Ok(AnchorPolicy::Forward)
        }
        _ => Err(ConfigError::UnsupportedPolicy(raw.to_string())),
    }
}

// ==========================================
// 辅助函数
// ==========================================

fn apply_preset(kv: &mut BTreeMap<String, String>, preset: &str) -> Result<(), ConfigError> {
    let (policy, window, weight_mode) = match preset.trim().to_lowercase().as_str() {
        "" => return Ok(()),
        "det_near" => ("DET_near", "7", None),
        "agg_far" => ("AGG_far", "7", None),
        "blend" => ("blend", "14", Some("tri")),
        other => return Err(ConfigError::UnknownPreset(other.to_string())),
    };
    kv.entry(keys::ANCHOR_POLICY.to_string())
        .or_insert_with(|| policy.to_string());
    kv.entry(keys::RECON_WINDOW_DAYS.to_string())
        .or_insert_with(|| window.to_string());
    if let Some(mode) = weight_mode {
        kv.entry(keys::BLEND_WEIGHT_MODE.to_string())
            .or_insert_with(|| mode.to_string());
    }
    Ok(())
}

fn json_to_kv(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "<root>".to_string(),
                value: other.to_string(),
                message: "配置文件必须是 JSON 对象".to_string(),
            })
        }
    };

    let mut kv = BTreeMap::new();
    for (key, v) in obj {
        let text = match v {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        kv.insert(key, text);
    }
    Ok(kv)
}

fn non_empty<'a>(kv: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn parse_opt<T: std::str::FromStr>(
    kv: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(kv, key) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            message: "无法解析为数值".to_string(),
        }),
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(
    kv: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(kv, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|message| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                message,
            }),
    }
}

fn parse_bool(kv: &BTreeMap<String, String>, key: &str) -> Result<Option<bool>, ConfigError> {
    match non_empty(kv, key) {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "n" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                message: "期望布尔值".to_string(),
            }),
        },
    }
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn check_unit_range(key: &str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: v,
            min: 0.0,
            max: 1.0,
        }),
        _ => Ok(()),
    }
}

fn check_non_negative(key: &str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(v >= 0.0) || !v.is_finite() => Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: v,
            min: 0.0,
            max: f64::INFINITY,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = ReconConfig::from_kv(&BTreeMap::new()).unwrap();
        assert_eq!(cfg.anchor_policy, AnchorPolicy::Forward);
        assert_eq!(cfg.carryover, CarryoverMode::None);
        assert_eq!(cfg.tol_abs, DEFAULT_TOLERANCE);
        assert_eq!(cfg.fallback_weeks, 4);
        assert_eq!(cfg.headroom.capacity, 0.5);
    }

    #[test]
    fn test_policy_carries_window() {
        let cfg = ReconConfig::from_kv(&kv(&[
            ("anchor_policy", "DET_near"),
            ("recon_window_days", "10"),
            ("cutover_date", "2025-01-15"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.anchor_policy,
            AnchorPolicy::DetNear {
                window_weeks: Some(2)
            }
        );
        assert_eq!(cfg.cutover_period().as_deref(), Some("2025-01"));
    }

    #[test]
    fn test_unknown_policy_rejected_unless_lenient() {
        let err = ReconConfig::from_kv(&kv(&[("anchor_policy", "sideways")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedPolicy(_)));

        let cfg = ReconConfig::from_kv(&kv(&[
            ("anchor_policy", "sideways"),
            ("lenient_policy", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.anchor_policy, AnchorPolicy::Forward);
    }

    #[test]
    fn test_split_out_of_range_rejected() {
        let err = ReconConfig::from_kv(&kv(&[("carryover_split", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_preset_fills_only_unset_values() {
        let cfg = ReconConfig::from_kv(&kv(&[("preset", "blend"), ("recon_window_days", "7")]))
            .unwrap();
        assert_eq!(
            cfg.anchor_policy,
            AnchorPolicy::Blend {
                weight_mode: BlendWeightMode::Tri,
                window_weeks: Some(1)
            }
        );
        assert_eq!(cfg.recon_window_days, Some(7));
    }

    #[test]
    fn test_json_config() {
        let cfg = ReconConfig::from_json_str(
            r#"{"anchor_policy":"AGG_far","max_adjust_ratio":0.2,"carryover":"both","round_mode":"dec2","tol_abs":null}"#,
        )
        .unwrap();
        assert_eq!(cfg.anchor_policy, AnchorPolicy::AggFar { window_weeks: None });
        assert_eq!(cfg.max_adjust_ratio, Some(0.2));
        assert_eq!(cfg.carryover, CarryoverMode::Both);
        assert_eq!(cfg.round_mode, RoundMode::Dec(2));
        assert_eq!(cfg.tol_abs, DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_bad_date_rejected() {
        let err = ReconConfig::from_kv(&kv(&[("cutover_date", "2025/01/15")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate { .. }));
    }
}

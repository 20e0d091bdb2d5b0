// ==========================================
// 计划对账引擎 - 领域类型定义
// ==========================================
// 时间桶键 / 指标 / 区段 / 模式枚举
// 序列化格式: 与输入输出 JSON 一致 (snake_case / 原始标签)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// WeekKey - 周时间桶键
// ==========================================
// 不透明标签 (例如 "2025-01-Wk1" / "2025-W03"), 按字符串全序比较
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekKey(String);

impl WeekKey {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WeekKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ==========================================
// PeriodKey - 期间时间桶键
// ==========================================
// 粗粒度桶 (例如 "2025-01" / "M3"), 包含一个或多个 WeekKey
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ==========================================
// Metric - 对账指标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Demand,
    Supply,
    Backlog,
}

impl Metric {
    /// 固定处理顺序 (保证输出可复现)
    pub const ALL: [Metric; 3] = [Metric::Demand, Metric::Supply, Metric::Backlog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Demand => "demand",
            Metric::Supply => "supply",
            Metric::Backlog => "backlog",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// MetricTriple - demand/supply/backlog 三元组
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTriple {
    pub demand: f64,
    pub supply: f64,
    pub backlog: f64,
}

impl MetricTriple {
    pub fn new(demand: f64, supply: f64, backlog: f64) -> Self {
        Self {
            demand,
            supply,
            backlog,
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Demand => self.demand,
            Metric::Supply => self.supply,
            Metric::Backlog => self.backlog,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Demand => self.demand = value,
            Metric::Supply => self.supply = value,
            Metric::Backlog => self.backlog = value,
        }
    }

    pub fn add(&mut self, metric: Metric, value: f64) {
        let current = self.get(metric);
        self.set(metric, current + value);
    }

    /// 逐指标相减 (self - other)
    pub fn minus(&self, other: &MetricTriple) -> MetricTriple {
        MetricTriple::new(
            self.demand - other.demand,
            self.supply - other.supply,
            self.backlog - other.backlog,
        )
    }

    pub fn scaled(&self, factor: f64) -> MetricTriple {
        MetricTriple::new(
            self.demand * factor,
            self.supply * factor,
            self.backlog * factor,
        )
    }

    /// 所有指标绝对值均不超过 eps
    pub fn is_negligible(&self, eps: f64) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).abs() <= eps)
    }

    pub fn max_abs(&self) -> f64 {
        Metric::ALL
            .iter()
            .map(|m| self.get(*m).abs())
            .fold(0.0, f64::max)
    }
}

// ==========================================
// Zone - 周所在区段
// ==========================================
// pre: 切换期间之前 / at: 切换期间 / post: 切换期间之后
// all: 未配置切换日期时的整段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Pre,
    At,
    Post,
    All,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Pre => "pre",
            Zone::At => "at",
            Zone::Post => "post",
            Zone::All => "all",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// CarryoverMode - 残差结转方向
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CarryoverMode {
    #[default]
    None,
    Prev,
    Next,
    Both,
    Auto,
}

impl CarryoverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarryoverMode::None => "none",
            CarryoverMode::Prev => "prev",
            CarryoverMode::Next => "next",
            CarryoverMode::Both => "both",
            CarryoverMode::Auto => "auto",
        }
    }
}

impl fmt::Display for CarryoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarryoverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(CarryoverMode::None),
            "prev" => Ok(CarryoverMode::Prev),
            "next" => Ok(CarryoverMode::Next),
            "both" => Ok(CarryoverMode::Both),
            "auto" => Ok(CarryoverMode::Auto),
            other => Err(format!("未知结转模式: {}", other)),
        }
    }
}

// ==========================================
// BlendWeightMode - 混合策略距离权重
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlendWeightMode {
    #[default]
    Tri,
    Lin,
    Quad,
}

impl BlendWeightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendWeightMode::Tri => "tri",
            BlendWeightMode::Lin => "lin",
            BlendWeightMode::Quad => "quad",
        }
    }
}

impl fmt::Display for BlendWeightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendWeightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tri" | "triangular" => Ok(BlendWeightMode::Tri),
            "lin" | "linear" => Ok(BlendWeightMode::Lin),
            "quad" | "quadratic" => Ok(BlendWeightMode::Quad),
            other => Err(format!("未知混合权重模式: {}", other)),
        }
    }
}

// ==========================================
// RoundMode - 输出数量取整方式
// ==========================================
// none: 保留 6 位小数 / int: 整数 / decN: N 位小数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundMode {
    #[default]
    None,
    Int,
    Dec(u32),
}

impl fmt::Display for RoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundMode::None => write!(f, "none"),
            RoundMode::Int => write!(f, "int"),
            RoundMode::Dec(d) => write!(f, "dec{}", d),
        }
    }
}

impl FromStr for RoundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "" | "none" => Ok(RoundMode::None),
            "int" => Ok(RoundMode::Int),
            _ => match s.strip_prefix("dec") {
                Some(digits) => digits
                    .parse::<u32>()
                    .map(RoundMode::Dec)
                    .map_err(|_| format!("未知取整模式: {}", s)),
                None => Err(format!("未知取整模式: {}", s)),
            },
        }
    }
}

impl Serialize for RoundMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoundMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==========================================
// CalendarMode - 切换周估算方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalendarMode {
    #[default]
    Simple,
    Iso,
}

impl FromStr for CalendarMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "simple" => Ok(CalendarMode::Simple),
            "iso" => Ok(CalendarMode::Iso),
            other => Err(format!("未知日历模式: {}", other)),
        }
    }
}

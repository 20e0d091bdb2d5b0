// ==========================================
// 计划对账引擎 - 产能领域模型
// ==========================================
// CapacityBucket: (resource, period) → 产能
// CapacityBook: 期间产能汇总 (同期间多资源求和, v0 不做分资源约束)
// WeeklyCapacity: 周产能映射 (投影后只读)
// ==========================================

use crate::domain::types::{PeriodKey, WeekKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// CapacityBucket - 产能桶
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityBucket {
    pub resource: String,
    pub period: PeriodKey,
    pub capacity: f64,
}

impl CapacityBucket {
    pub fn new(resource: &str, period: &str, capacity: f64) -> Self {
        Self {
            resource: resource.to_string(),
            period: PeriodKey::from(period),
            capacity,
        }
    }
}

// ==========================================
// CapacityBook - 期间产能汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapacityBook {
    by_period: BTreeMap<PeriodKey, f64>,
}

impl CapacityBook {
    /// 汇总产能桶（同期间求和）
    pub fn from_buckets(buckets: &[CapacityBucket]) -> Self {
        let mut by_period: BTreeMap<PeriodKey, f64> = BTreeMap::new();
        for bucket in buckets {
            *by_period.entry(bucket.period.clone()).or_insert(0.0) += bucket.capacity;
        }
        Self { by_period }
    }

    pub fn from_totals(totals: BTreeMap<PeriodKey, f64>) -> Self {
        Self { by_period: totals }
    }

    pub fn get(&self, period: &PeriodKey) -> Option<f64> {
        self.by_period.get(period).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeriodKey, f64)> {
        self.by_period.iter().map(|(p, c)| (p, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.by_period.is_empty()
    }

    /// 最大期间产能（用于归一化, 空表为 0）
    pub fn max_capacity(&self) -> f64 {
        self.by_period.values().copied().fold(0.0, f64::max)
    }

    /// 期间产能归一化到 [0, 1]; 期间缺失或最大值非正时为 0
    pub fn normalized(&self, period: &PeriodKey) -> f64 {
        let max = self.max_capacity();
        match self.by_period.get(period) {
            Some(v) if max > 0.0 => (v / max).max(0.0),
            _ => 0.0,
        }
    }
}

// ==========================================
// Trait: CapacityLookup
// ==========================================
// 用途: LoadLeveler 逐周读取产能
pub trait CapacityLookup {
    /// 周产能; 未登记的周为 0
    fn capacity_of(&self, week: &WeekKey) -> f64;
}

// ==========================================
// WeeklyCapacity - 周产能
// ==========================================
// 由 CapacityCalendarProjector 创建, 创建后不再修改
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklyCapacity {
    by_week: BTreeMap<WeekKey, f64>,
}

impl WeeklyCapacity {
    pub(crate) fn from_map(by_week: BTreeMap<WeekKey, f64>) -> Self {
        Self { by_week }
    }

    pub fn len(&self) -> usize {
        self.by_week.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_week.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WeekKey, f64)> {
        self.by_week.iter().map(|(w, c)| (w, *c))
    }

    pub fn total(&self) -> f64 {
        self.by_week.values().sum()
    }
}

impl CapacityLookup for WeeklyCapacity {
    fn capacity_of(&self, week: &WeekKey) -> f64 {
        self.by_week.get(week).copied().unwrap_or(0.0)
    }
}

impl CapacityLookup for BTreeMap<WeekKey, f64> {
    fn capacity_of(&self, week: &WeekKey) -> f64 {
        self.get(week).copied().unwrap_or(0.0)
    }
}

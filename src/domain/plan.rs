// ==========================================
// 计划对账引擎 - 计划行领域模型
// ==========================================
// AggregateRow: 聚合计划 (family × period), 自上而下的权威目标
// DetailRow: 明细计划 (sku × week), 自下而上的计划
// AdjustedDetailRow: 明细行 + *_adj 调整结果
// ==========================================
// 数值字段解析失败按 0.0 处理 (MalformedValue 不中断)
// ==========================================

use crate::domain::types::{MetricTriple, PeriodKey, WeekKey};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ==========================================
// AggregateRow - 聚合计划行
// ==========================================
// 不变量: (family, period) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub family: String,
    pub period: PeriodKey,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub demand: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub supply: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub backlog: f64,
}

impl AggregateRow {
    pub fn new(family: &str, period: &str, demand: f64, supply: f64, backlog: f64) -> Self {
        Self {
            family: family.to_string(),
            period: PeriodKey::from(period),
            demand,
            supply,
            backlog,
        }
    }

    pub fn metrics(&self) -> MetricTriple {
        MetricTriple::new(self.demand, self.supply, self.backlog)
    }
}

// ==========================================
// DetailRow - 明细计划行
// ==========================================
// 不变量: (sku, week) 唯一
// 未识别字段原样保留在 extra 中, 输出时回写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sku: String,
    #[serde(default)]
    pub week: WeekKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<PeriodKey>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub demand: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub supply: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub backlog: f64,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub planned_order_release: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub planned_order_receipt: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub lt_weeks: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DetailRow {
    pub fn new(family: &str, sku: &str, week: &str, demand: f64, supply: f64, backlog: f64) -> Self {
        Self {
            family: Some(family.to_string()),
            item: None,
            sku: sku.to_string(),
            week: WeekKey::from(week),
            period: None,
            demand,
            supply,
            backlog,
            planned_order_release: None,
            planned_order_receipt: None,
            lt_weeks: None,
            extra: Map::new(),
        }
    }

    pub fn with_period(mut self, period: &str) -> Self {
        self.period = Some(PeriodKey::from(period));
        self
    }

    pub fn with_release(mut self, release: f64, receipt: Option<f64>, lt_weeks: Option<f64>) -> Self {
        self.planned_order_release = Some(release);
        self.planned_order_receipt = receipt;
        self.lt_weeks = lt_weeks;
        self
    }

    /// 分组键: 非空 family 优先, 其次非空 item
    pub fn family_key(&self) -> Option<&str> {
        self.family
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.item.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn metrics(&self) -> MetricTriple {
        MetricTriple::new(self.demand, self.supply, self.backlog)
    }

    /// 提前期（周）, 负值与非有限值视为 0
    pub fn lead_time_weeks(&self) -> usize {
        match self.lt_weeks {
            Some(v) if v.is_finite() && v > 0.0 => v.round() as usize,
            _ => 0,
        }
    }
}

// ==========================================
// AdjustedDetailRow - 调整后的明细行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustedDetailRow {
    #[serde(flatten)]
    pub row: DetailRow,
    pub demand_adj: f64,
    pub supply_adj: f64,
    pub backlog_adj: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_order_release_adj: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_order_receipt_adj: Option<f64>,
}

impl AdjustedDetailRow {
    pub fn adjusted_metrics(&self) -> MetricTriple {
        MetricTriple::new(self.demand_adj, self.supply_adj, self.backlog_adj)
    }
}

// ==========================================
// 宽松数值解析
// ==========================================

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match (&value, value_to_f64(&value)) {
        (_, Some(v)) if v.is_finite() => Ok(v),
        (Value::Null, _) => Ok(0.0),
        (Value::String(s), _) if s.trim().is_empty() => Ok(0.0),
        _ => {
            tracing::warn!("数值字段解析失败, 按 0.0 处理: {}", value);
            Ok(0.0)
        }
    }
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match (&value, value_to_f64(&value)) {
        (Value::Null, _) => Ok(None),
        (_, Some(v)) if v.is_finite() => Ok(Some(v)),
        (Value::String(s), _) if s.trim().is_empty() => Ok(None),
        _ => {
            tracing::warn!("数值字段解析失败, 按 0.0 处理: {}", value);
            Ok(Some(0.0))
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_row_malformed_numbers_default_to_zero() {
        let raw = r#"{"family":"F1","sku":"S1","week":"2025-01-Wk1",
                      "demand":"12.5","supply":"abc","backlog":null,"note":"keep"}"#;
        let row: DetailRow = serde_json::from_str(raw).unwrap();
        assert_eq!(row.demand, 12.5);
        assert_eq!(row.supply, 0.0);
        assert_eq!(row.backlog, 0.0);
        assert_eq!(row.extra.get("note"), Some(&Value::String("keep".to_string())));
    }

    #[test]
    fn test_family_key_falls_back_to_item() {
        let raw = r#"{"item":"IT9","sku":"S1","week":"2025-01-Wk1"}"#;
        let row: DetailRow = serde_json::from_str(raw).unwrap();
        assert_eq!(row.family_key(), Some("IT9"));
    }

    #[test]
    fn test_aggregate_numeric_family_label() {
        let raw = r#"{"family":101,"period":"2025-01","demand":5}"#;
        let row: AggregateRow = serde_json::from_str(raw).unwrap();
        assert_eq!(row.family, "101");
        assert_eq!(row.supply, 0.0);
    }

    #[test]
    fn test_adjusted_row_serializes_flat() {
        let row = DetailRow::new("F1", "S1", "2025-01-Wk1", 1.0, 2.0, 0.0);
        let adj = AdjustedDetailRow {
            row,
            demand_adj: 1.5,
            supply_adj: 2.0,
            backlog_adj: 0.0,
            planned_order_release_adj: None,
            planned_order_receipt_adj: None,
        };
        let v = serde_json::to_value(&adj).unwrap();
        assert_eq!(v["demand"], 1.0);
        assert_eq!(v["demand_adj"], 1.5);
        assert!(v.get("planned_order_release_adj").is_none());
    }
}

// ==========================================
// 计划对账引擎 - 计划文件与辅助表加载
// ==========================================
// 主输入: 聚合/明细计划 JSON ({schema_version?, rows: [...]}), 必须存在
// 可选输入: 日历 JSON, 辅助表 (capacity / open_po / period_score / period_cost)
// 规则:
// - 辅助表文件缺失 -> 空表 + 告警
// - 数值单元格无法解析 -> 0.0 + 告警
// - capacity / open_po 同期间累加; period_score / period_cost 同期间后者覆盖
// ==========================================

use crate::domain::capacity::CapacityBucket;
use crate::domain::plan::{AggregateRow, DetailRow};
use crate::domain::types::PeriodKey;
use crate::engine::calendar::PlanningCalendar;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{RawRecord, UniversalFileParser};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// 输入目录下的约定文件名
pub const CAPACITY_FILE: &str = "capacity.csv";
pub const OPEN_PO_FILE: &str = "open_po.csv";
pub const PERIOD_SCORE_FILE: &str = "period_score.csv";
pub const PERIOD_COST_FILE: &str = "period_cost.csv";

// ==========================================
// PlanDocument - 计划 JSON 文档
// ==========================================
#[derive(Debug, Clone, Deserialize)]
pub struct PlanDocument<T> {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ImportResult<T> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| ImportError::JsonParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// 读取聚合计划
pub fn load_aggregate(path: &Path) -> ImportResult<PlanDocument<AggregateRow>> {
    let doc: PlanDocument<AggregateRow> = read_json(path)?;
    tracing::info!(path = %path.display(), rows = doc.rows.len(), "聚合计划已加载");
    Ok(doc)
}

/// 读取明细计划
pub fn load_detail(path: &Path) -> ImportResult<PlanDocument<DetailRow>> {
    let doc: PlanDocument<DetailRow> = read_json(path)?;
    tracing::info!(path = %path.display(), rows = doc.rows.len(), "明细计划已加载");
    Ok(doc)
}

/// 读取计划日历
pub fn load_calendar(path: &Path) -> ImportResult<PlanningCalendar> {
    read_json(path)
}

// ==========================================
// 辅助表
// ==========================================

/// 辅助表路径; 显式路径优先, 否则取输入目录下的约定文件
#[derive(Debug, Clone, Default)]
pub struct SideTablePaths {
    pub input_dir: Option<PathBuf>,
    pub capacity: Option<PathBuf>,
    pub open_po: Option<PathBuf>,
    pub period_score: Option<PathBuf>,
    pub period_cost: Option<PathBuf>,
}

impl SideTablePaths {
    fn resolve(&self, explicit: &Option<PathBuf>, file_name: &str) -> Option<PathBuf> {
        explicit
            .clone()
            .or_else(|| self.input_dir.as_ref().map(|dir| dir.join(file_name)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTables {
    pub capacity: Vec<CapacityBucket>,
    /// 在途订单量（按期间累加）
    pub open_po: BTreeMap<PeriodKey, f64>,
    pub period_score: BTreeMap<PeriodKey, f64>,
    pub period_cost: BTreeMap<PeriodKey, f64>,
}

// ==========================================
// SideTableLoader - 辅助表加载器
// ==========================================
pub struct SideTableLoader {
    parser: UniversalFileParser,
}

impl Default for SideTableLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SideTableLoader {
    pub fn new() -> Self {
        Self {
            parser: UniversalFileParser,
        }
    }

    /// 加载全部辅助表
    #[instrument(skip(self, paths), fields(input_dir = ?paths.input_dir))]
    pub fn load(&self, paths: &SideTablePaths) -> ImportResult<SideTables> {
        let capacity = self
            .records(paths.resolve(&paths.capacity, CAPACITY_FILE), &["period", "capacity"])?
            .map(|records| parse_capacity(&records))
            .unwrap_or_default();
        let open_po = self
            .records(paths.resolve(&paths.open_po, OPEN_PO_FILE), &["due", "qty"])?
            .map(|records| parse_open_po(&records))
            .unwrap_or_default();
        let period_score = self
            .records(paths.resolve(&paths.period_score, PERIOD_SCORE_FILE), &["period", "score"])?
            .map(|records| parse_period_values(&records, "score"))
            .unwrap_or_default();
        let period_cost = self
            .records(paths.resolve(&paths.period_cost, PERIOD_COST_FILE), &["period", "cost"])?
            .map(|records| parse_period_values(&records, "cost"))
            .unwrap_or_default();

        tracing::info!(
            capacity = capacity.len(),
            open_po = open_po.len(),
            period_score = period_score.len(),
            period_cost = period_cost.len(),
            "辅助表加载完成"
        );
        Ok(SideTables {
            capacity,
            open_po,
            period_score,
            period_cost,
        })
    }

    /// 文件不存在返回 None（降级为空表）; 有数据行但缺少必需列时报错
    fn records(&self, path: Option<PathBuf>, required: &[&str]) -> ImportResult<Option<Vec<RawRecord>>> {
        let path = match path {
            Some(p) => p,
            None => return Ok(None),
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "辅助表不存在, 按空表处理");
            return Ok(None);
        }
        let records = self.parser.parse(&path)?;
        if let Some(first) = records.first() {
            if let Some(column) = required.iter().find(|c| !first.contains_key(**c)) {
                return Err(ImportError::MissingColumn {
                    file: path.display().to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(Some(records))
    }
}

/// 宽松数值解析; 空串为 0, 无法解析记录告警后为 0
fn parse_number(record: &RawRecord, column: &str) -> f64 {
    let raw = record.get(column).map(|s| s.trim()).unwrap_or("");
    if raw.is_empty() {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            tracing::warn!(column, value = raw, "数值无法解析, 按 0 处理");
            0.0
        }
    }
}

/// capacity 表: resource|workcenter, period, capacity
pub fn parse_capacity(records: &[RawRecord]) -> Vec<CapacityBucket> {
    records
        .iter()
        .filter_map(|r| {
            let period = r.get("period").map(|s| s.trim()).unwrap_or("");
            if period.is_empty() {
                return None;
            }
            let resource = r
                .get("resource")
                .or_else(|| r.get("workcenter"))
                .map(|s| s.as_str())
                .unwrap_or("");
            Some(CapacityBucket::new(resource, period, parse_number(r, "capacity")))
        })
        .collect()
}

/// open_po 表: due, qty; 期间取 due 的 YYYY-MM
pub fn parse_open_po(records: &[RawRecord]) -> BTreeMap<PeriodKey, f64> {
    let mut out: BTreeMap<PeriodKey, f64> = BTreeMap::new();
    for r in records {
        let due = r.get("due").map(|s| s.trim()).unwrap_or("");
        let period = match due.get(..7) {
            Some(month) if due.as_bytes().get(4) == Some(&b'-') => month,
            _ => due,
        };
        *out.entry(PeriodKey::new(period)).or_insert(0.0) += parse_number(r, "qty");
    }
    out
}

/// period, <column> 两列表
pub fn parse_period_values(records: &[RawRecord], column: &str) -> BTreeMap<PeriodKey, f64> {
    records
        .iter()
        .map(|r| {
            let period = r.get("period").map(|s| s.trim()).unwrap_or("");
            (PeriodKey::new(period), parse_number(r, column))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_open_po_groups_by_month() {
        let records = vec![
            record(&[("due", "2025-01-10"), ("qty", "5")]),
            record(&[("due", "2025-01-28"), ("qty", "abc")]),
            record(&[("due", "2025-02-03"), ("qty", "7")]),
        ];
        let map = parse_open_po(&records);
        assert_eq!(map[&PeriodKey::from("2025-01")], 5.0);
        assert_eq!(map[&PeriodKey::from("2025-02")], 7.0);
    }

    #[test]
    fn test_capacity_accepts_workcenter_column() {
        let records = vec![
            record(&[("workcenter", "WC1"), ("period", "2025-01"), ("capacity", "40")]),
            record(&[("workcenter", "WC2"), ("period", ""), ("capacity", "10")]),
        ];
        let buckets = parse_capacity(&records);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].resource, "WC1");
        assert_eq!(buckets[0].capacity, 40.0);
    }

    #[test]
    fn test_period_values_last_wins() {
        let records = vec![
            record(&[("period", "2025-01"), ("cost", "3")]),
            record(&[("period", "2025-01"), ("cost", "4")]),
        ];
        let map = parse_period_values(&records, "cost");
        assert_eq!(map[&PeriodKey::from("2025-01")], 4.0);
    }
}

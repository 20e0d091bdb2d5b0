// ==========================================
// 计划对账引擎 - 溢出分布检查
// ==========================================
// 职责: 按区段汇总周平准记录, 统计 spill_in 周数
// 规则: 区段策略下同一区段 spill_in > eps 的周超过 1 个视为违规
//       (溢出只应从区段首周流入)
// ==========================================

use crate::domain::adjustment::AdjustmentRecord;
use crate::domain::types::Zone;
use crate::engine::rounding::round6;
use serde::Serialize;
use std::collections::BTreeMap;

pub const SPILL_EPS: f64 = 1e-9;

/// 单区段汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneTotals {
    pub weeks: usize,
    pub capacity: f64,
    pub original_load: f64,
    pub adjusted_load: f64,
    pub spill_in: f64,
    pub spill_out: f64,
    pub spill_in_weeks: usize,
}

/// 区段汇总报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub zones: BTreeMap<Zone, ZoneTotals>,
    pub violations: Vec<Zone>,
}

impl ZoneSummary {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// 汇总逐周记录
///
/// # 参数
/// - `records`: 区段编排输出的周记录
/// - `segmented`: 是否为区段策略 (false 时不判定违规)
pub fn summarize(records: &[AdjustmentRecord], segmented: bool) -> ZoneSummary {
    let mut summary = ZoneSummary::default();
    for r in records {
        let totals = summary.zones.entry(r.zone).or_default();
        totals.weeks += 1;
        totals.capacity += r.capacity;
        totals.original_load += r.original_load;
        totals.adjusted_load += r.adjusted_load;
        totals.spill_in += r.spill_in;
        totals.spill_out += r.spill_out;
        if r.spill_in.abs() > SPILL_EPS {
            totals.spill_in_weeks += 1;
        }
    }

    for (zone, totals) in summary.zones.iter_mut() {
        totals.capacity = round6(totals.capacity);
        totals.original_load = round6(totals.original_load);
        totals.adjusted_load = round6(totals.adjusted_load);
        totals.spill_in = round6(totals.spill_in);
        totals.spill_out = round6(totals.spill_out);
        if segmented && *zone != Zone::All && totals.spill_in_weeks > 1 {
            summary.violations.push(*zone);
        }
    }

    if !summary.violations.is_empty() {
        tracing::warn!(violations = ?summary.violations, "区段内多周出现 spill_in");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WeekKey;

    fn record(week: &str, zone: Zone, spill_in: f64) -> AdjustmentRecord {
        AdjustmentRecord {
            week: WeekKey::from(week),
            capacity: 10.0,
            original_load: 5.0,
            carried_slack_in: 0.0,
            spill_in,
            adjusted_load: 5.0 + spill_in,
            spill_out: 0.0,
            slack_carry_out: 0.0,
            zone,
            boundary_index: None,
            boundary_size: None,
            in_window_pre: None,
            in_window_post: None,
        }
    }

    #[test]
    fn test_multiple_spill_in_weeks_flagged() {
        let records = vec![
            record("W1", Zone::Pre, 0.0),
            record("W2", Zone::At, 1.0),
            record("W3", Zone::Post, 2.0),
            record("W4", Zone::Post, 1.0),
        ];
        let summary = summarize(&records, true);
        assert_eq!(summary.violations, vec![Zone::Post]);
        assert_eq!(summary.zones[&Zone::Post].spill_in, 3.0);
        assert_eq!(summary.zones[&Zone::At].spill_in_weeks, 1);

        assert!(summarize(&records, false).is_clean());
    }
}

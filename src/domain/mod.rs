// ==========================================
// 计划对账引擎 - 领域模型层
// ==========================================
// 职责: 定义计划行、产能、调整记录与策略类型
// 红线: 不含文件读取逻辑, 不含引擎逻辑
// ==========================================

pub mod adjustment;
pub mod capacity;
pub mod plan;
pub mod policy;
pub mod types;

// 重导出核心类型
pub use adjustment::{AdjustmentRecord, CarryoverLogEntry, UnresolvedResidual};
pub use capacity::{CapacityBook, CapacityBucket, CapacityLookup, WeeklyCapacity};
pub use plan::{AdjustedDetailRow, AggregateRow, DetailRow};
pub use policy::AnchorPolicy;
pub use types::{
    BlendWeightMode, CalendarMode, CarryoverMode, Metric, MetricTriple, PeriodKey, RoundMode,
    WeekKey, Zone,
};

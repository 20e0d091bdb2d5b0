// ==========================================
// 计划对账引擎 - 引擎层
// ==========================================
// 职责: 产能投影 / 负荷平准 / 区段策略 / 差额再分配 / 残差结转
// 红线: 引擎不读写文件, 降级输入只记录告警不报错
// ==========================================

pub mod blend_weight;
pub mod calendar;
pub mod capacity_projector;
pub mod carryover_router;
pub mod delta_redistributor;
pub mod levels;
pub mod load_leveler;
pub mod orchestrator;
pub mod release_scaler;
pub mod rounding;
pub mod segment_policy;
pub mod spill_check;
pub mod working_plan;

// 重导出核心引擎
pub use blend_weight::{BlendSplit, BlendWeightEstimator};
pub use calendar::{CalendarLookup, CalendarResolver, PlanningCalendar};
pub use capacity_projector::CapacityCalendarProjector;
pub use carryover_router::{CarryoverOutcome, CarryoverRouter, HeadroomSignals};
pub use delta_redistributor::{DeltaRedistributor, GroupAdjustment, RowCap};
pub use levels::{LevelComparer, LevelReport};
pub use load_leveler::{LevelMode, LevelOutcome, LoadLeveler};
pub use orchestrator::{ReconInput, ReconOutput, ReconciliationEngine};
pub use segment_policy::{SegmentOutcome, SegmentPolicyEngine, Segments, WeekLayout};
pub use spill_check::ZoneSummary;
pub use working_plan::{AggregateIndex, WorkingPlan};

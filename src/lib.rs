// ==========================================
// 计划对账引擎 - 核心库
// ==========================================
// 用途: 聚合计划 (family × period) 与明细计划 (sku × week) 的整合
// 能力: 周负荷平准 / 切换期间锚点调整 / 残差跨期间结转
// 定位: 纯计算库, 单次调用产出完整结果
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 计划行与类型
pub mod domain;

// 配置层 - 对账参数
pub mod config;

// 引擎层 - 平准与调整
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    BlendWeightMode, CalendarMode, CarryoverMode, Metric, MetricTriple, PeriodKey, RoundMode,
    WeekKey, Zone,
};

// 领域实体
pub use domain::{
    AdjustedDetailRow, AdjustmentRecord, AggregateRow, AnchorPolicy, CapacityBucket,
    CarryoverLogEntry, DetailRow,
};

// 配置
pub use config::{ConfigError, ReconConfig};

// 引擎
pub use engine::{
    CapacityCalendarProjector, CarryoverRouter, DeltaRedistributor, LoadLeveler, ReconInput,
    ReconOutput, ReconciliationEngine, SegmentPolicyEngine,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "计划对账引擎";

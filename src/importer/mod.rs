// ==========================================
// 计划对账引擎 - 导入层
// ==========================================
// 职责: 读取计划 JSON / 日历 / 辅助表, 生成引擎输入
// 支持: JSON, Excel, CSV
// ==========================================

pub mod error;
pub mod file_parser;
pub mod plan_loader;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRecord, UniversalFileParser};
pub use plan_loader::{
    load_aggregate, load_calendar, load_detail, PlanDocument, SideTableLoader, SideTablePaths,
    SideTables,
};

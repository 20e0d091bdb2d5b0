// ==========================================
// 计划对账引擎 - 配置层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 配置错误在进入引擎前拒绝, 引擎本身不报错
// ==========================================

use thiserror::Error;

/// 配置层错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置值无效 (key={key}): {value} ({message})")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("配置值超出范围 (key={key}): 值 {value} 超出范围 [{min}, {max}]")]
    OutOfRange {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("不支持的锚定策略: {0}（可选 forward / DET_near / AGG_far / blend）")]
    UnsupportedPolicy(String),

    #[error("未知预设: {0}（可选 det_near / agg_far / blend）")]
    UnknownPreset(String),

    #[error("日期格式错误 (key={key}): 期望 YYYY-MM-DD，实际 {value}")]
    InvalidDate { key: String, value: String },

    #[error("配置文件解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

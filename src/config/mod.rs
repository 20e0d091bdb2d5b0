// ==========================================
// 计划对账引擎 - 配置层
// ==========================================
// 来源: 扁平 key-value / JSON 配置文件 / 预设
// ==========================================
// 职责: 解析与校验对账配置, 拒绝非法值
// ==========================================

pub mod error;
pub mod recon_config;

pub use error::ConfigError;
pub use recon_config::{
    config_keys, resolve_policy, window_days_to_weeks, HeadroomWeights, ReconConfig,
    DEFAULT_FALLBACK_WEEKS, DEFAULT_TOLERANCE,
};

// ==========================================
// 计划对账引擎 - 数量取整
// ==========================================
// round_quantity: 按 RoundMode 取整 (none 保留 6 位小数)
// distribute_int: 最大余数法整数分配, 保证合计等于目标
// ==========================================

use crate::domain::types::RoundMode;

/// 默认精度（抑制浮点噪声）
pub const DEFAULT_DECIMALS: u32 = 6;

/// 四舍五入到指定小数位
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    // 消除 -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn round6(value: f64) -> f64 {
    round_to(value, DEFAULT_DECIMALS)
}

/// 按取整模式处理数量
pub fn round_quantity(value: f64, mode: RoundMode) -> f64 {
    match mode {
        RoundMode::None => round6(value),
        RoundMode::Int => round_to(value, 0),
        RoundMode::Dec(digits) => round_to(value, digits),
    }
}

/// 最大余数法整数分配
///
/// # 参数
/// - `values`: 原始非负数量（负值按 0 处理）
/// - `target`: 目标合计（四舍五入到整数, 负值按 0）
///
/// # 返回
/// 与 values 等长的整数列表, 合计等于目标;
/// 补足时小数部分大者优先, 扣减时小数部分小者优先, 同值按位置
pub fn distribute_int(values: &[f64], target: f64) -> Vec<i64> {
    if values.is_empty() {
        return Vec::new();
    }
    let target = round_to(target, 0).max(0.0) as i64;
    let cleaned: Vec<f64> = values
        .iter()
        .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
        .collect();

    let mut ints: Vec<i64> = cleaned.iter().map(|v| v.floor() as i64).collect();
    let mut diff = target - ints.iter().sum::<i64>();
    let frac = |i: usize| cleaned[i] - cleaned[i].floor();

    let mut order: Vec<usize> = (0..values.len()).collect();
    if diff > 0 {
        order.sort_by(|a, b| frac(*b).total_cmp(&frac(*a)));
        // 余数不足时循环补足
        while diff > 0 {
            for &i in &order {
                if diff == 0 {
                    break;
                }
                ints[i] += 1;
                diff -= 1;
            }
        }
    } else if diff < 0 {
        order.sort_by(|a, b| frac(*a).total_cmp(&frac(*b)));
        for &i in &order {
            while diff < 0 && ints[i] > 0 {
                ints[i] -= 1;
                diff += 1;
            }
            if diff == 0 {
                break;
            }
        }
    }
    ints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_quantity_modes() {
        assert_eq!(round_quantity(1.23456789, RoundMode::None), 1.234568);
        assert_eq!(round_quantity(2.5, RoundMode::Int), 3.0);
        assert_eq!(round_quantity(1.256, RoundMode::Dec(2)), 1.26);
        assert_eq!(round_quantity(-0.0000001, RoundMode::None), 0.0);
    }

    #[test]
    fn test_distribute_int_preserves_target() {
        let out = distribute_int(&[1.4, 1.4, 1.2], 4.0);
        assert_eq!(out.iter().sum::<i64>(), 4);
        assert_eq!(out, vec![2, 1, 1]);

        let out = distribute_int(&[2.6, 2.6], 4.0);
        assert_eq!(out.iter().sum::<i64>(), 4);
    }

    #[test]
    fn test_distribute_int_empty() {
        assert!(distribute_int(&[], 5.0).is_empty());
        assert_eq!(distribute_int(&[0.0, 0.0], 3.0).iter().sum::<i64>(), 3);
    }
}

use super::DURATION_EPSILON;

/// 至少需要的点数（少于此数返回 0）
pub const MIN_CADENCE_POINTS: usize = 9;

/// 基于加速度模长峰值计数的粗略步频估计（步/分钟）
///
/// 阈值 = 均值 + 0.5 × 总体标准差；只统计严格局部极大值且超过阈值的点。
/// 实时 5 秒窗口和整段试验共用此函数。
pub fn estimate_cadence_spm(times: &[f64], values: &[f64]) -> f64 {
    if times.len() < MIN_CADENCE_POINTS || values.len() != times.len() {
        return 0.0;
    }

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let threshold = mean + 0.5 * variance.sqrt();

    let peaks = values
        .windows(3)
        .filter(|w| w[1] > threshold && w[1] > w[0] && w[1] > w[2])
        .count();

    let duration = (times[n - 1] - times[0]).max(DURATION_EPSILON);
    peaks as f64 / duration * 60.0
}

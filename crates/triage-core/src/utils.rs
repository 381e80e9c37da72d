//! 通用工具函数

use chrono::Duration;

/// 将时长格式化为 "1h05m" / "12m" / "45s" 形式，用于日志和看板
pub fn format_wait(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h{:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// 归一化主诉文本：去除首尾空白并合并连续空白
pub fn normalize_complaint(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

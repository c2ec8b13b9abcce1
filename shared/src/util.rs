/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a store counter value as a human-facing order number.
///
/// Counters start at 1, numbers at `ORD100001`.
pub fn format_order_number(count: u64) -> String {
    format!("ORD{}", 100_000 + count)
}

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Local, TimeZone};

// 最近一次发出的会话编号对应的毫秒时间戳
static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

/// 生成会话编号，精确到毫秒；同一毫秒内的多次调用顺延到下一毫秒，保证进程内不重复
pub fn generate_session_id() -> String {
    let now = Local::now();
    let now_ms = now.timestamp_millis();
    let mut last = LAST_ISSUED_MS.load(Ordering::Relaxed);
    let issued = loop {
        let next = now_ms.max(last + 1);
        match LAST_ISSUED_MS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break next,
            Err(actual) => last = actual,
        }
    };
    let stamp = Local.timestamp_millis_opt(issued).single().unwrap_or(now);
    format!("session_{}", stamp.format("%Y%m%d_%H%M%S_%3f"))
}

/// 将秒数格式化为 MM:SS.s
pub fn format_elapsed(seconds: f64) -> String {
    // 先取整到 0.1 秒再拆分，避免出现 00:60.0
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    let minutes = tenths / 600;
    let rest = (tenths % 600) as f64 / 10.0;
    format!("{:02}:{:04.1}", minutes, rest)
}

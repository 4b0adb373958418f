//! 杂项：调用栈采集与日志行格式

use chrono::Utc;
use std::any::Any;
use std::backtrace::Backtrace;

/// 截取的发起方栈帧数
const ORIGIN_FRAMES: usize = 4;

/// 采集发起方调用栈片段，尽力而为，仅用于诊断。
/// 符号无法解析时返回空列表。
pub(crate) fn origin() -> Vec<String> {
    let bt = Backtrace::force_capture().to_string();
    let mut frames = Vec::with_capacity(ORIGIN_FRAMES);
    for line in bt.lines() {
        let line = line.trim_start();
        if line.starts_with("at ") {
            continue;
        }
        // 符号行形如 "12: crate::module::function"
        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if !index.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let symbol = symbol.trim();
        if symbol.is_empty()
            || symbol.starts_with("std::")
            || symbol.starts_with("core::")
            || symbol.starts_with("tokio::")
            || symbol.contains("::util::origin")
        {
            continue;
        }
        frames.push(symbol.to_string());
        if frames.len() >= ORIGIN_FRAMES {
            break;
        }
    }
    frames
}

/// 完整调用栈文本
pub(crate) fn full_stack() -> String {
    Backtrace::force_capture().to_string()
}

/// 统一日志行格式
pub(crate) fn log_line(msg: impl AsRef<str>) -> String {
    format!("[pathbus] {} {}", Utc::now().format("%H:%M:%S"), msg.as_ref())
}

/// 从 panic 载荷提取可读消息
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_carries_prefix_and_message() {
        let line = log_line("hello");
        assert!(line.starts_with("[pathbus] "));
        assert!(line.ends_with(" hello"));
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(
            panic_message(Box::new(42_u8)),
            "handler panicked with a non-string payload"
        );
    }
}

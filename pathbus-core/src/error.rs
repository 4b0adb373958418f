//! 引擎统一错误定义
//!
//! 聚焦解码、路由命中、协作方调用等最小必要集合，
//! 便于队列/存储实现层统一转换为 `EngineError`。
//!
use thiserror::Error;

/// 统一错误类型（调度核心最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    // --- 序列化 ---
    #[error("decode error: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },

    // --- 路由 ---
    #[error("no handler matched: path={path}")]
    NoRoute { path: String },

    // --- 协作方 ---
    #[error("publish error: {reason}")]
    Publish { reason: String },
    #[error("storage error: {reason}")]
    Storage { reason: String },
    #[error("read error: {reason}")]
    Read { reason: String },

    // --- 上下文 ---
    #[error("context is not bound to a dispatch")]
    Unbound,
}

impl EngineError {
    pub fn no_route(path: impl Into<String>) -> Self {
        Self::NoRoute { path: path.into() }
    }

    pub fn publish(reason: impl Into<String>) -> Self {
        Self::Publish {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    pub fn read(reason: impl Into<String>) -> Self {
        Self::Read {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

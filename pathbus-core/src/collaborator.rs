//! 协作方协议（collaborator）
//!
//! 调度核心唯一的外部边界：
//! - `ClientHandler`：发布侧协作方，队列入列、长延时持久化与链路/日志/告警钩子；
//! - `EngineHandler`：引擎侧协作方，在发布侧之上增加对账读取与 HTTP 观测。
//!
//! 本模块仅定义协议，不绑定具体队列或存储实现，可对接任意消息系统、
//! 数据库或内存实现；协作方自行保证内部状态的并发安全。
//!
use crate::error::EngineResult;
use crate::event::Trace;
use crate::http::HttpTrace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// 单条持久化的延时事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// 序列化后的事件原文
    pub raw: String,
    /// 绝对到期时间
    pub at: DateTime<Utc>,
}

/// 发布侧协作方
#[async_trait]
pub trait ClientHandler: Send + Sync {
    /// 事件入列，延时超过约一分钟后队列不保证可靠
    async fn publish(&self, raw: &str, delay: Duration) -> EngineResult<()>;

    /// 长延时事件持久化，由对账循环负责到期提升
    async fn save(&self, id: Uuid, raw: &str, delay: Duration) -> EngineResult<()>;

    /// 链路记录。fire-and-forget，不得显著阻塞调度路径
    async fn trace(&self, trace: Trace);

    /// 自由文本诊断行
    async fn log(&self, line: String);

    /// 失败告警，独立于链路记录，供告警管线消费
    async fn fail(&self, id: Uuid, raw: &str, error: String, stack: String);
}

/// 引擎侧协作方
#[async_trait]
pub trait EngineHandler: ClientHandler {
    /// 读出下一对账窗口内到期且尚未入列的事件
    async fn read_due(&self) -> EngineResult<Vec<Row>>;

    /// HTTP 调用观测
    async fn http_trace(&self, ht: HttpTrace);
}

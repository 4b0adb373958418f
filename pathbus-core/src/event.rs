//! 事件与链路模型
//!
//! 定义一次工作单元（`Event`）与其执行记录（`Trace`）的线格式：
//! - 事件携带因果标识（transaction_id / id / parent_id）、路径与不透明负载；
//! - 链路按 emit / exec_begin / exec_end / error 四个阶段逐条上报，
//!   每条记录独立生成，交付链路汇后不再修改。
//!
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::util;

/// 队列可靠延时的上限：超过该阈值的延时事件转入持久化存储，
/// 由对账循环在到期前重新入列。
pub const DEFER_THRESHOLD: Duration = Duration::from_secs(60);

/// 一次工作单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// 因果链根标识，整条重发链上保持不变
    pub transaction_id: Uuid,
    /// 本次发布的唯一标识
    pub id: Uuid,
    /// 触发本事件的父事件，仅作引用，无生命周期关联
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// 请求的延时时长，零表示立即执行
    #[serde(default)]
    pub delay: Duration,
    /// 点分路由路径
    pub path: String,
    /// 不透明负载，仅由命中的处理链解释
    pub body: Value,
    /// 创建时间
    pub create_at: DateTime<Utc>,
    /// 发起方调用栈片段，仅用于诊断
    #[serde(default)]
    pub origin: Vec<String>,
}

impl Event {
    /// 根事件：transaction_id 与 id 相同，无父事件
    pub fn root(path: impl Into<String>, body: Value, delay: Duration) -> Self {
        let id = Uuid::new_v4();
        Self {
            transaction_id: id,
            id,
            parent_id: None,
            delay,
            path: path.into(),
            body,
            create_at: Utc::now(),
            origin: util::origin(),
        }
    }

    /// 子事件：沿用因果链的 transaction_id，父指向在执行事件
    pub fn child_of(parent: &Event, path: impl Into<String>, body: Value, delay: Duration) -> Self {
        Self {
            transaction_id: parent.transaction_id,
            id: Uuid::new_v4(),
            parent_id: Some(parent.id),
            delay,
            path: path.into(),
            body,
            create_at: Utc::now(),
            origin: util::origin(),
        }
    }
}

// 池中闲置上下文持有的零值事件
impl Default for Event {
    fn default() -> Self {
        Self {
            transaction_id: Uuid::nil(),
            id: Uuid::nil(),
            parent_id: None,
            delay: Duration::ZERO,
            path: String::new(),
            body: Value::Null,
            create_at: DateTime::<Utc>::MIN_UTC,
            origin: Vec::new(),
        }
    }
}

/// 事件链路阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// 发布
    Emit,
    /// 错误
    Error,
    /// 开始执行
    ExecBegin,
    /// 执行结束
    ExecEnd,
}

/// 一次调度尝试的执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// 单次调度尝试的唯一标识；同一事件被重复投递时各自独立。
    /// emit 阶段尚未进入调度，无此标识。
    #[serde(default)]
    pub exec_id: Option<Uuid>,
    pub status: TraceStatus,
    #[serde(flatten)]
    pub event: Event,
    pub begin_at: DateTime<Utc>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

impl Trace {
    /// emit 阶段的链路记录
    pub fn emit(event: Event) -> Self {
        Self {
            exec_id: None,
            status: TraceStatus::Emit,
            event,
            begin_at: Utc::now(),
            end_at: None,
            error: None,
            stack: None,
        }
    }
}

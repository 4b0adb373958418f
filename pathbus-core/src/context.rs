//! 调度上下文（Context）
//!
//! 单次处理链执行的专属可变状态：游标推进、错误记录、中止标记、
//! 子事件发布与 HTTP 观测入口。实例从池中取出使用，同一时刻只归
//! 一个任务所有，归还后重置再复用。
//!
//! 链式执行语义：`next` 不因处理函数返回错误而中断，最终结果为
//! 最后一个被执行函数的返回值；`abort` 只阻止尚未执行的函数。
//!
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::event::Event;
use crate::http::HttpClient;
use crate::router::Chain;
use crate::util;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub struct Context {
    evt: Event,
    engine: Option<Arc<Engine>>,
    handlers: Chain,
    cursor: i64,
    aborted: bool,
    err: Option<String>,
    stack: Option<String>,
    last_handler: Option<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            evt: Event::default(),
            engine: None,
            handlers: Chain::default(),
            cursor: -1,
            aborted: false,
            err: None,
            stack: None,
            last_handler: None,
        }
    }
}

impl Context {
    pub(crate) fn reset(&mut self) {
        self.evt = Event::default();
        self.engine = None;
        self.handlers = Chain::default();
        self.cursor = -1;
        self.aborted = false;
        self.err = None;
        self.stack = None;
        self.last_handler = None;
    }

    pub(crate) fn bind_dispatch(&mut self, evt: Event, handlers: Chain, engine: Arc<Engine>) {
        self.evt = evt;
        self.handlers = handlers;
        self.engine = Some(engine);
    }

    /// 在执行事件
    pub fn event(&self) -> &Event {
        &self.evt
    }

    /// 反序列化事件负载到调用方给定的结构
    pub fn bind<T: DeserializeOwned>(&self) -> EngineResult<T> {
        Ok(serde_json::from_value(self.evt.body.clone())?)
    }

    /// 顺序执行后续处理函数
    ///
    /// 链上任一函数返回错误不会中断执行，后写覆盖先写，
    /// 返回值为最后一个被执行函数的结果；仅 `abort` 或链尾会停止推进。
    pub async fn next(&mut self) -> anyhow::Result<()> {
        let mut result = Ok(());
        self.cursor += 1;
        while !self.aborted {
            let Some(handler) = self.handlers.get(self.cursor as usize).cloned() else {
                break;
            };
            self.last_handler = Some(handler.name().to_string());
            result = handler.call(self).await;
            self.cursor += 1;
        }
        result
    }

    /// 中止链上尚未执行的函数；不回滚已执行部分，本身不构成错误
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// 记录错误消息与调用栈供链路上报，原样返回便于 `return Err(c.error(e))`
    pub fn error(&mut self, err: anyhow::Error) -> anyhow::Error {
        self.err = Some(err.to_string());
        self.stack = Some(util::full_stack());
        err
    }

    /// 最近一次 `error` 记录的消息，供后续中间件或链路上报读取
    pub fn recorded_error(&self) -> Option<&str> {
        self.err.as_deref()
    }

    /// 最近一次 `error` 记录的调用栈
    pub fn recorded_stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// 最近被调起的处理器名称
    pub fn last_handler(&self) -> Option<&str> {
        self.last_handler.as_deref()
    }

    fn engine(&self) -> EngineResult<&Arc<Engine>> {
        self.engine.as_ref().ok_or(EngineError::Unbound)
    }

    /// 发布子事件：沿用 transaction_id，父指向在执行事件，新任务中异步执行
    pub async fn emit(&self, path: &str, body: &impl Serialize) -> EngineResult<()> {
        let engine = self.engine()?.clone();
        let evt = Event::child_of(&self.evt, path, serde_json::to_value(body)?, Duration::ZERO);
        engine.dispatch_event(evt).await
    }

    /// 发布延时子事件，阈值判定与引擎顶层操作一致
    pub async fn emit_defer(
        &self,
        path: &str,
        body: &impl Serialize,
        delay: Duration,
    ) -> EngineResult<()> {
        if delay.is_zero() {
            return self.emit(path, body).await;
        }
        let engine = self.engine()?.clone();
        let evt = Event::child_of(&self.evt, path, serde_json::to_value(body)?, delay);
        engine.defer_event(evt, delay).await
    }

    /// 绑定在执行事件的 HTTP 观测客户端
    pub fn http(&self) -> EngineResult<HttpClient> {
        Ok(self.engine()?.http_for(self.evt.id))
    }
}

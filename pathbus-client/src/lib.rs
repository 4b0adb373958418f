//! pathbus 发布端（pathbus-client）
//!
//! 仅发布事件的轻量门面：不含路由、池化与对账，适用于只产生事件、
//! 不承载处理函数的进程。事件与链路的线格式与引擎完全一致，
//! 发布与持久化同样委托给外部注入的协作方。
//!
use pathbus_core::{ClientHandler, DEFER_THRESHOLD, EngineResult, Event, Trace};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// 发布端门面
pub struct Client {
    name: String,
    handler: Arc<dyn ClientHandler>,
}

impl Client {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    /// 发布端名称，仅用于诊断
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 发根事件并立即入列
    pub async fn emit(&self, path: &str, body: &impl Serialize) -> EngineResult<()> {
        self.emit_defer(path, body, Duration::ZERO).await
    }

    /// 依延时长短选择入列或持久化，阈值与引擎一致
    pub async fn emit_defer(
        &self,
        path: &str,
        body: &impl Serialize,
        delay: Duration,
    ) -> EngineResult<()> {
        let evt = Event::root(path, serde_json::to_value(body)?, delay);
        let raw = serde_json::to_string(&evt)?;
        self.handler.trace(Trace::emit(evt.clone())).await;

        if delay > DEFER_THRESHOLD {
            self.handler.save(evt.id, &raw, delay).await
        } else {
            self.handler.publish(&raw, delay).await
        }
    }
}

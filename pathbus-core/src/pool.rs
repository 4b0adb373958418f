//! 上下文对象池
//!
//! 以复用换分配：取出即重置，归还即清空。守卫在析构时归还，
//! 保证包括闪退恢复在内的所有出口都会把上下文放回池中。
//!
use crate::context::Context;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct ContextPool {
    idle: Mutex<Vec<Context>>,
}

impl ContextPool {
    pub(crate) fn acquire(self: &Arc<Self>) -> PooledContext {
        let mut ctx = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default();
        ctx.reset();
        PooledContext {
            ctx: Some(ctx),
            pool: Arc::clone(self),
        }
    }

    fn checkin(&self, mut ctx: Context) {
        // 清空引擎引用与事件负载，闲置期间不保留任何调度状态
        ctx.reset();
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).push(ctx);
    }
}

/// 池化上下文守卫
pub(crate) struct PooledContext {
    ctx: Option<Context>,
    pool: Arc<ContextPool>,
}

impl Deref for PooledContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx.as_ref().expect("pooled context already released")
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_mut().expect("pooled context already released")
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.checkin(ctx);
        }
    }
}

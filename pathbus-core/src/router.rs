//! 路由（Router）
//!
//! 以点分路径组织有序处理链：中间件前缀 + 末端业务函数。
//! 注册期通过共享并发表组合作用域，构建引擎时冻结为只读快照，
//! 因此调度热路径上的路由查表无需加锁，注册也不可能晚于启动。
//!
use crate::context::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// 路由处理函数：处理链上的一环
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// 处理器名称（用于错误日志与告警）
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 处理在执行事件
    async fn call(&self, c: &mut Context) -> anyhow::Result<()>;
}

/// 处理链：中间件前缀 + 末端函数，注册后只读
pub type Chain = Arc<Vec<Arc<dyn Handler>>>;

/// path 到处理链的只读快照
pub type RouteTable = HashMap<String, Chain>;

/// 处理函数返回的装箱 Future
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// 类型擦除后的处理闭包
pub type HandlerFn = Arc<dyn for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync>;

struct FnHandler {
    name: String,
    f: HandlerFn,
}

#[async_trait]
impl Handler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, c: &mut Context) -> anyhow::Result<()> {
        (self.f)(c).await
    }
}

/// 以命名闭包构造处理器
pub fn fn_handler(name: impl Into<String>, f: HandlerFn) -> Arc<dyn Handler> {
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// 注册期路由作用域
///
/// `group` 产生的子作用域按调用时刻的值继承中间件前缀，
/// 父作用域之后的 `middleware` 调用不回溯影响已创建的子作用域。
#[derive(Clone, Default)]
pub struct Router {
    functions: Vec<Arc<dyn Handler>>,
    base_path: String,
    table: Arc<DashMap<String, Chain>>,
}

impl Router {
    /// 根作用域
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换当前作用域的中间件前缀（整组覆盖，不叠加）
    pub fn middleware(&mut self, handlers: Vec<Arc<dyn Handler>>) -> &mut Self {
        self.functions = handlers;
        self
    }

    /// 子作用域
    pub fn group(&self, name: &str) -> Router {
        Router {
            functions: self.functions.clone(),
            base_path: self.combine(name),
            table: self.table.clone(),
        }
    }

    /// 注册业务函数，覆盖同路径的既有注册，返回以该路径为根的新作用域
    pub fn item(&self, name: &str, handler: Arc<dyn Handler>) -> Router {
        let path = self.combine(name);
        let mut chain = self.functions.clone();
        chain.push(handler);
        tracing::info!(path = %path, functions = chain.len(), "route registered");
        self.table.insert(path.clone(), Arc::new(chain));
        Router {
            functions: self.functions.clone(),
            base_path: path,
            table: self.table.clone(),
        }
    }

    fn combine(&self, name: &str) -> String {
        if self.base_path.is_empty() {
            name.to_string()
        } else if name.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}.{}", self.base_path, name)
        }
    }

    pub(crate) fn into_table(self) -> RouteTable {
        self.table
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn call(&self, _c: &mut Context) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noop() -> Arc<dyn Handler> {
        Arc::new(NoopHandler)
    }

    #[test]
    fn item_registers_under_combined_path() {
        let root = Router::new();
        root.group("user").group("profile").item("update", noop());
        root.item("ping", noop());

        let table = root.into_table();
        assert!(table.contains_key("user.profile.update"));
        assert!(table.contains_key("ping"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn item_returns_scope_rooted_at_registered_path() {
        let root = Router::new();
        root.item("order", noop()).item("paid", noop());

        let table = root.into_table();
        assert!(table.contains_key("order"));
        assert!(table.contains_key("order.paid"));
    }

    #[test]
    fn group_inherits_middleware_by_value_at_call_time() {
        let mut root = Router::new();
        root.middleware(vec![noop()]);
        let early = root.group("early");
        root.middleware(vec![noop(), noop()]);
        let late = root.group("late");

        early.item("run", noop());
        late.item("run", noop());

        let table = root.into_table();
        assert_eq!(table["early.run"].len(), 2);
        assert_eq!(table["late.run"].len(), 3);
    }

    #[test]
    fn middleware_replaces_instead_of_appending() {
        let mut root = Router::new();
        root.middleware(vec![noop(), noop()]);
        root.middleware(vec![noop()]);
        root.item("run", noop());

        let table = root.into_table();
        assert_eq!(table["run"].len(), 2);
    }

    #[test]
    fn item_overwrites_previous_registration() {
        let mut root = Router::new();
        root.item("run", noop());
        root.middleware(vec![noop()]);
        root.item("run", noop());

        let table = root.into_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table["run"].len(), 2);
    }

    #[test]
    fn handler_names_default_to_type_and_fn_handlers_keep_given_name() {
        assert!(noop().name().contains("NoopHandler"));

        let f: HandlerFn = Arc::new(|_c| Box::pin(async { Ok(()) }));
        assert_eq!(fn_handler("custom", f).name(), "custom");
    }
}

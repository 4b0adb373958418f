//! 调度引擎（Engine）
//!
//! 统一编排“发布 → 路由 → 处理链执行 → 链路上报”的核心：
//! - `emit` 即时发布，新任务中异步调度；
//! - `emit_defer` 依延时长短选择入列或持久化（阈值见配置）；
//! - `handle` 为调度入口，解码、查表、执行并隔离处理函数的错误与闪退；
//! - 对账循环周期读出到期的持久化事件，过期的就地调度，未到期的重新入列；
//! - 提供关闭与排水的 `EngineHandle`。
//!
use crate::collaborator::EngineHandler;
use crate::error::{EngineError, EngineResult};
use crate::event::{DEFER_THRESHOLD, Event, Trace, TraceStatus};
use crate::http::HttpClient;
use crate::pool::ContextPool;
use crate::router::{RouteTable, Router};
use crate::util;
use bon::Builder;
use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::engine_builder::{IsUnset, SetRoutes, State as BuilderState};

/// Engine：
/// - 持有冻结后的路由表、上下文池与协作方；
/// - 对外暴露 emit / emit_defer / emit_raw / handle；
/// - `start` 启动对账循环并返回运行句柄。
#[derive(Builder)]
pub struct Engine {
    handler: Arc<dyn EngineHandler>,
    #[builder(setters(vis = "pub(crate)"))]
    routes: RouteTable,
    #[builder(default)]
    config: EngineConfig,
    /// 观测客户端共用的底层传输，可注入自定义 reqwest 配置
    #[builder(default)]
    http_client: reqwest::Client,
    #[builder(setters(vis = "pub(crate)"), default = Arc::new(ContextPool::default()))]
    pool: Arc<ContextPool>,
    #[builder(setters(vis = "pub(crate)"), default = TaskTracker::new())]
    tracker: TaskTracker,
}

impl<S: BuilderState> EngineBuilder<S> {
    /// 接收注册完成的路由，冻结为只读快照后设入 routes 字段。
    /// 引擎构建后路由表不再可写，调度读表无需加锁。
    pub fn router(self, router: Router) -> EngineBuilder<SetRoutes<S>>
    where
        <S as BuilderState>::Routes: IsUnset,
    {
        self.routes(router.into_table())
    }
}

impl Engine {
    /// 启动对账循环，返回用于关闭与排水的句柄
    pub fn start(self: Arc<Self>) -> EngineHandle {
        let token = CancellationToken::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(1);

        // reconcile worker（周期任务）
        {
            let engine = self.clone();
            let interval = self.config.reconcile_interval;

            tasks.push(Self::spawn_periodic(token.clone(), interval, move || {
                let engine = engine.clone();
                async move {
                    engine.reconcile_once().await;
                }
            }));
        }

        EngineHandle {
            token,
            tasks,
            tracker: self.tracker.clone(),
        }
    }

    fn spawn_periodic<F, Fut>(token: CancellationToken, interval: Duration, mut f: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => f().await,
                }
            }
        })
    }

    /// 发根事件并异步调度；仅序列化失败会同步返回错误
    pub async fn emit(self: &Arc<Self>, path: &str, body: &impl Serialize) -> EngineResult<()> {
        let evt = Event::root(path, serde_json::to_value(body)?, Duration::ZERO);
        self.dispatch_event(evt).await
    }

    /// 依延时长短选择 立即调度 / 入列 / 持久化
    ///
    /// 协作方失败会记日志并触发告警钩子，同时原样返回给本次同步调用方；
    /// 引擎不做重试。
    pub async fn emit_defer(
        self: &Arc<Self>,
        path: &str,
        body: &impl Serialize,
        delay: Duration,
    ) -> EngineResult<()> {
        if delay.is_zero() {
            return self.emit(path, body).await;
        }
        let evt = Event::root(path, serde_json::to_value(body)?, delay);
        self.defer_event(evt, delay).await
    }

    /// 原样发布一条已序列化事件（队列外的回投入口）
    pub async fn emit_raw(self: &Arc<Self>, raw: String) -> EngineResult<()> {
        let evt: Event = match serde_json::from_str(&raw) {
            Ok(evt) => evt,
            Err(err) => {
                self.handler
                    .log(util::log_line(format!("raw event decode failed: {err}")))
                    .await;
                return Err(err.into());
            }
        };
        self.handler.trace(Trace::emit(evt)).await;
        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            engine.handle(&raw).await;
        });
        Ok(())
    }

    /// 上报 emit 链路后在新任务中调度
    pub(crate) async fn dispatch_event(self: &Arc<Self>, evt: Event) -> EngineResult<()> {
        let raw = serde_json::to_string(&evt)?;
        self.handler.trace(Trace::emit(evt)).await;
        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            engine.handle(&raw).await;
        });
        Ok(())
    }

    /// 上报 emit 链路后按阈值入列或持久化
    pub(crate) async fn defer_event(&self, evt: Event, delay: Duration) -> EngineResult<()> {
        let raw = serde_json::to_string(&evt)?;
        self.handler.trace(Trace::emit(evt.clone())).await;

        let persisted = delay > self.config.defer_threshold;
        let result = if persisted {
            self.handler.save(evt.id, &raw, delay).await
        } else {
            self.handler.publish(&raw, delay).await
        };
        if let Err(err) = &result {
            let kind = if persisted { "save" } else { "publish" };
            self.handler
                .log(util::log_line(format!(
                    "event {kind} failed: path={} err={err}",
                    evt.path
                )))
                .await;
            self.handler
                .fail(evt.id, &raw, err.to_string(), util::full_stack())
                .await;
        }
        result
    }

    /// 调度入口：新发事件、队列回投与对账循环均经由此处执行
    pub async fn handle(self: &Arc<Self>, raw: &str) {
        let evt: Event = match serde_json::from_str(raw) {
            Ok(evt) => evt,
            Err(err) => {
                // 事件身份不明，只能丢弃，无法产生链路记录
                tracing::warn!(error = %err, "event decode failed");
                self.handler
                    .log(util::log_line(format!("event decode failed: {err}")))
                    .await;
                return;
            }
        };

        let exec_id = Uuid::new_v4();
        let begin_at = Utc::now();

        let Some(chain) = self.routes.get(&evt.path).cloned() else {
            let reason = EngineError::no_route(&evt.path).to_string();
            self.handler
                .trace(Trace {
                    exec_id: Some(exec_id),
                    status: TraceStatus::Error,
                    event: evt.clone(),
                    begin_at,
                    end_at: None,
                    error: Some(reason.clone()),
                    stack: None,
                })
                .await;
            self.handler
                .log(util::log_line(format!("[error] [{}] --> nil : {reason}", evt.path)))
                .await;
            return;
        };

        self.handler
            .trace(Trace {
                exec_id: Some(exec_id),
                status: TraceStatus::ExecBegin,
                event: evt.clone(),
                begin_at,
                end_at: None,
                error: None,
                stack: None,
            })
            .await;

        let mut ctx = self.pool.acquire();
        ctx.bind_dispatch(evt.clone(), chain, Arc::clone(self));

        // 闪退捕获：处理函数 panic 在此边界截获，当前调度就此终止
        let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
        let end_at = Utc::now();

        match outcome {
            Err(payload) => {
                let reason = util::panic_message(payload);
                let stack = util::full_stack();
                let name = ctx.last_handler().unwrap_or("nil").to_string();
                self.handler
                    .trace(Trace {
                        exec_id: Some(exec_id),
                        status: TraceStatus::Error,
                        event: evt.clone(),
                        begin_at,
                        end_at: Some(end_at),
                        error: Some(reason.clone()),
                        stack: Some(stack.clone()),
                    })
                    .await;
                self.handler.fail(evt.id, raw, reason.clone(), stack).await;
                self.handler
                    .log(util::log_line(format!(
                        "[panic] [{}] --> {name} : {reason}",
                        evt.path
                    )))
                    .await;
            }
            Ok(Err(err)) => {
                let stack = ctx.recorded_stack().map(str::to_string);
                let name = ctx.last_handler().unwrap_or("nil").to_string();
                self.handler
                    .trace(Trace {
                        exec_id: Some(exec_id),
                        status: TraceStatus::Error,
                        event: evt.clone(),
                        begin_at,
                        end_at: Some(end_at),
                        error: Some(err.to_string()),
                        stack: stack.clone(),
                    })
                    .await;
                self.handler
                    .fail(evt.id, raw, err.to_string(), stack.unwrap_or_default())
                    .await;
                self.handler
                    .log(util::log_line(format!(
                        "[error] [{}] --> {name} : {err}",
                        evt.path
                    )))
                    .await;
            }
            Ok(Ok(())) => {
                self.handler
                    .trace(Trace {
                        exec_id: Some(exec_id),
                        status: TraceStatus::ExecEnd,
                        event: evt,
                        begin_at,
                        end_at: Some(end_at),
                        error: None,
                        stack: None,
                    })
                    .await;
            }
        }
        // ctx 守卫析构时归还池
    }

    /// 对账一轮：过期的就地调度，未到期的按剩余延时重新入列
    async fn reconcile_once(self: &Arc<Self>) {
        let rows = match self.handler.read_due().await {
            Ok(rows) => rows,
            Err(err) => {
                self.handler
                    .log(util::log_line(format!("deferred read failed: {err}")))
                    .await;
                return;
            }
        };

        let now = Utc::now();
        for row in rows {
            let remaining = (row.at - now).to_std().unwrap_or_default();
            if remaining.is_zero() {
                self.handle(&row.raw).await;
            } else if let Err(err) = self.handler.publish(&row.raw, remaining).await {
                self.handler
                    .log(util::log_line(format!("requeue failed: {err}")))
                    .await;
            }
        }
    }

    pub(crate) fn http_for(&self, evt_id: Uuid) -> HttpClient {
        HttpClient::new(self.http_client.clone(), self.handler.clone(), evt_id)
    }
}

/// 引擎配置
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// 入列延时上限，超过则转持久化存储
    pub defer_threshold: Duration,
    /// 对账循环间隔
    pub reconcile_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defer_threshold: DEFER_THRESHOLD,
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

/// 引擎运行句柄：用于协同关闭与在途调度排水
///
/// `shutdown` 只表达停止意图：取消对账循环的下一轮，不打断在途调度；
/// 排水由 `join` 完成。
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    tracker: TaskTracker,
}

impl EngineHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// 等待在途调度与后台任务结束
    pub async fn join(mut self) {
        self.tracker.close();
        self.tracker.wait().await;

        let tasks = std::mem::take(&mut self.tasks);
        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

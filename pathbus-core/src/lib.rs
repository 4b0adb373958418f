//! pathbus 调度核心（pathbus-core）
//!
//! 面向路径寻址异步事件的微服务调度核心，提供：
//! - 事件/链路模型（`event`）与协作方协议（`collaborator`）
//! - 点分路径路由与处理链组合（`router`）
//! - 单次调度上下文与对象池（`context`）
//! - 调度引擎、延时阈值判定与对账循环（`engine`）
//! - 出站 HTTP 观测（`http`）
//!
//! 本 crate 不绑定具体队列或存储实现，仅通过 `collaborator` 中的
//! trait 与外部系统交互；交付保证（至少/至多一次）由协作方负责。
//!
//! 典型用法：
//! 1. 实现 `EngineHandler`，接入队列、存储与链路/日志/告警汇；
//! 2. 用 `Router` 注册中间件前缀与各路径的业务函数；
//! 3. `Engine::builder()` 构建引擎并 `start`，队列回投统一走 `handle`；
//! 4. 只发事件的进程改用 `pathbus-client` 中的门面。
//!
pub mod collaborator;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod http;
mod pool;
pub mod router;
mod util;

pub use collaborator::{ClientHandler, EngineHandler, Row};
pub use context::Context;
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::{EngineError, EngineResult};
pub use event::{DEFER_THRESHOLD, Event, Trace, TraceStatus};
pub use http::{HttpClient, HttpTrace};
pub use router::{Chain, Handler, HandlerFn, HandlerFuture, RouteTable, Router, fn_handler};

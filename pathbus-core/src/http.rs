//! HTTP 观测
//!
//! 包装处理函数内发起的出站 HTTP 调用，记录时延与状态并关联到触发事件。
//! 3xx 跳转视为传输内部行为，不上报；传输层错误原样返回调用方，不产生记录。
//!
use crate::collaborator::EngineHandler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 单次 HTTP 调用的性能记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTrace {
    /// 触发调用的事件标识
    pub evt_id: Uuid,
    pub method: String,
    pub url: String,
    pub begin_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// 请求体字节数，流式请求体无法统计
    pub req_content_length: Option<u64>,
    pub res_status: u16,
}

/// 绑定触发事件的 HTTP 客户端
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    handler: Arc<dyn EngineHandler>,
    evt_id: Uuid,
}

impl HttpClient {
    pub(crate) fn new(inner: reqwest::Client, handler: Arc<dyn EngineHandler>, evt_id: Uuid) -> Self {
        Self {
            inner,
            handler,
            evt_id,
        }
    }

    pub fn get(&self, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.inner.get(url)
    }

    pub fn post(&self, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.inner.post(url)
    }

    pub fn request(&self, method: reqwest::Method, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.inner.request(method, url)
    }

    /// 构建并执行请求，经由观测管线
    pub async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, reqwest::Error> {
        let req = builder.build()?;
        self.execute(req).await
    }

    /// 执行请求并上报观测记录
    pub async fn execute(&self, req: reqwest::Request) -> Result<reqwest::Response, reqwest::Error> {
        let method = req.method().to_string();
        let url = req.url().to_string();
        let req_content_length = req.body().and_then(|b| b.as_bytes()).map(|b| b.len() as u64);
        let begin_at = Utc::now();

        let res = self.inner.execute(req).await?;

        let status = res.status();
        // 忽略跳转跟踪
        if !status.is_redirection() {
            self.handler
                .http_trace(HttpTrace {
                    evt_id: self.evt_id,
                    method,
                    url,
                    begin_at,
                    end_at: Utc::now(),
                    req_content_length,
                    res_status: status.as_u16(),
                })
                .await;
        }
        Ok(res)
    }
}

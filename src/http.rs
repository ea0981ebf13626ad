//! HTTP 传输层抽象。
//!
//! 所有音源、链接探测与地区探测都只通过 [`HttpTransport`] 发出请求，
//! 生产环境使用 [`ReqwestTransport`]，测试中可以替换为脚本化的实现。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{EngineError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
const USER_AGENT: &str = "song-source-engine/0.1.0";

/// 请求方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// HEAD，只取响应头，不下载内容。
    Head,
}

/// 一次 HTTP 请求的描述。
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// 请求方法。
    pub method: HttpMethod,
    /// 不含查询串的地址（也可以自带查询串）。
    pub url: String,
    /// 查询参数，按顺序追加。
    pub query: Vec<(String, String)>,
    /// 请求头。
    pub headers: Vec<(String, String)>,
    /// 超时。
    pub timeout: Duration,
}

impl HttpRequest {
    /// 创建一个 GET 请求。
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 创建一个 HEAD 请求。
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Head,
            ..Self::get(url)
        }
    }

    /// 追加一个查询参数。
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// 仅当值存在时追加查询参数。
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    /// 追加多个请求头。
    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// 设置超时。
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 查询参数的值。
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 一次 HTTP 响应的摘要。
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// 状态码。
    pub status: u16,
    /// 跟随重定向之后的最终地址。
    pub final_url: String,
    /// `Content-Type`。
    pub content_type: Option<String>,
    /// `Content-Length`。
    pub content_length: Option<u64>,
    /// 响应正文，HEAD 请求时为空。
    pub body: String,
}

impl HttpResponse {
    /// 是否为 2xx。
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 将正文反序列化为指定类型。
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// 发送 HTTP 请求的统一接口。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 执行请求。网络错误与超时返回 `EngineError::Transport`，
    /// 非 2xx 状态不视为错误，由调用方判断。
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// 基于 `reqwest` 的传输实现，内部共享同一个连接池。
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    /// 创建一个新的传输实例。
    pub fn new() -> Result<Self> {
        let http_client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
        };

        let mut builder = self
            .http_client
            .request(method, &request.url)
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = if request.method == HttpMethod::Head {
            String::new()
        } else {
            response.text().await.map_err(map_transport_error)?
        };

        trace!("[HTTP] {} {} -> {}: {}", method_name(request.method), request.url, status, body);

        Ok(HttpResponse {
            status,
            final_url,
            content_type,
            content_length,
            body,
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Transport(format!("请求超时: {e}"))
    } else {
        EngineError::Transport(e.to_string())
    }
}

fn method_name(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Head => "HEAD",
    }
}

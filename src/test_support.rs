//! 测试用的脚本化传输层。

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{EngineConfig, MusicSource, RegionMode, SourceRegistry},
    error::{EngineError, Result},
    geo::GeoDetector,
    health::HealthTracker,
    http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport},
    lyrics::{LyricsResolver, amll::TtmlDatabase},
    providers::ProviderSet,
    resolve::UrlResolver,
    search::SearchOrchestrator,
    validator::LinkValidator,
};

#[derive(Clone)]
enum Reply {
    Response(HttpResponse),
    Transport(String),
}

/// 按 URL 片段匹配、返回预设响应的传输实现，并记录所有请求。
///
/// 多个片段都能匹配时，取最长的那个。
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<Vec<(String, Reply)>>,
    requests: Mutex<Vec<HttpRequest>>,
    cancel_on_call: Mutex<Option<CancellationToken>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, fragment: &str, response: HttpResponse) {
        self.routes
            .lock()
            .unwrap()
            .push((fragment.to_string(), Reply::Response(response)));
    }

    pub(crate) fn on_json(&self, fragment: &str, body: Value) {
        self.on(fragment, json_response(200, body));
    }

    pub(crate) fn fail(&self, fragment: &str) {
        self.routes
            .lock()
            .unwrap()
            .push((fragment.to_string(), Reply::Transport("连接被拒绝".into())));
    }

    /// 收到任意请求时取消该令牌，模拟调用方在尝试进行中取消。
    pub(crate) fn cancel_on_call(&self, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some(token);
    }

    /// 所有请求的完整地址（含查询串），按发出顺序。
    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(full_url).collect()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn count_matching(&self, fragment: &str) -> usize {
        self.urls().iter().filter(|u| u.contains(fragment)).count()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = full_url(&request);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(token) = self.cancel_on_call.lock().unwrap().as_ref() {
            token.cancel();
        }

        let reply = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|(fragment, _)| url.contains(fragment.as_str()))
            .max_by_key(|(fragment, _)| fragment.len())
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Response(mut response)) => {
                if response.final_url.is_empty() {
                    response.final_url = request.url.clone();
                }
                if request.method == HttpMethod::Head {
                    response.body.clear();
                }
                Ok(response)
            }
            Some(Reply::Transport(message)) => Err(EngineError::Transport(message)),
            None => Err(EngineError::Transport(format!("没有匹配的路由: {url}"))),
        }
    }
}

pub(crate) fn full_url(request: &HttpRequest) -> String {
    if request.query.is_empty() {
        return request.url.clone();
    }
    let query = request
        .query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", request.url, query)
}

pub(crate) fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        content_type: Some("application/json".into()),
        body: body.to_string(),
        ..Default::default()
    }
}

/// 一个可以通过校验的音频响应：audio/mpeg，约 4 分钟。
pub(crate) fn audio_response() -> HttpResponse {
    HttpResponse {
        status: 200,
        content_type: Some("audio/mpeg".into()),
        content_length: Some(4_000_000),
        ..Default::default()
    }
}

pub(crate) fn source(id: &str) -> MusicSource {
    MusicSource::new(id, id, &format!("http://{id}.test"))
}

/// 引擎内部组件的测试装配：所有组件共享同一个 [`FakeTransport`]。
pub(crate) struct Harness {
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) config: EngineConfig,
    pub(crate) registry: SourceRegistry,
    pub(crate) providers: ProviderSet,
    pub(crate) health: HealthTracker,
    pub(crate) geo: GeoDetector,
    pub(crate) validator: LinkValidator,
    pub(crate) ttml_db: TtmlDatabase,
}

impl Harness {
    /// 以 `http://{id}.test` 为根地址创建这些音源。
    pub(crate) fn new(ids: &[&str], region: RegionMode) -> Self {
        Self::with_sources(ids.iter().map(|id| source(id)).collect(), region)
    }

    pub(crate) fn with_sources(sources: Vec<MusicSource>, region: RegionMode) -> Self {
        let transport = FakeTransport::new();
        let config = EngineConfig {
            sources: sources.clone(),
            region,
            geo_probe_url: "http://geo.test/json".into(),
            ttml_database_url: "http://ttml.test".into(),
            ..Default::default()
        };
        let registry = SourceRegistry::new(sources).unwrap();
        let providers = ProviderSet::new(transport.clone(), &registry);
        let health = HealthTracker::new(registry.all().iter().map(|s| s.id.clone()).collect());
        let geo = GeoDetector::new(transport.clone(), region, config.geo_probe_url.clone());
        let validator = LinkValidator::new(transport.clone(), Duration::from_secs(5));
        let ttml_db = TtmlDatabase::new(transport.clone(), &config.ttml_database_url);
        Self {
            transport,
            config,
            registry,
            providers,
            health,
            geo,
            validator,
            ttml_db,
        }
    }

    pub(crate) fn orchestrator(&self) -> SearchOrchestrator<'_> {
        SearchOrchestrator::new(&self.registry, &self.providers, &self.health, &self.geo)
    }

    pub(crate) fn resolver(&self) -> UrlResolver<'_> {
        UrlResolver::new(
            &self.config,
            &self.registry,
            &self.providers,
            &self.health,
            &self.validator,
        )
    }

    pub(crate) fn lyrics(&self) -> LyricsResolver<'_> {
        LyricsResolver::new(&self.config, &self.registry, &self.providers, &self.ttml_db)
    }
}

pub(crate) fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,song_source_engine=debug"));
    let _ = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

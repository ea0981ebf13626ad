//! 播放链接校验。
//!
//! 只发送 HEAD 请求，不下载内容。根据状态码、`Content-Type` 与 `Content-Length`
//! 判断链接是否可用：非 2xx、非音视频类型、估算时长不足 5 秒都视为不可用。

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, warn};

use crate::http::{HttpRequest, HttpResponse, HttpTransport};

/// 估算时长时假定的码率：128 kbps。
pub const ASSUMED_BYTES_PER_SEC: f64 = 16_000.0;

/// 短于此时长的文件视为占位或错误文件。
pub const MIN_DURATION_SEC: f64 = 5.0;

/// 一次校验的结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// 是否可用。
    pub valid: bool,
    /// 估算时长（秒）。
    pub estimated_duration_sec: Option<f64>,
    /// 不可用的原因。
    pub error: Option<String>,
}

impl ValidationResult {
    fn ok(estimated_duration_sec: Option<f64>) -> Self {
        Self {
            valid: true,
            estimated_duration_sec,
            error: None,
        }
    }

    fn rejected(error: impl Into<String>, estimated_duration_sec: Option<f64>) -> Self {
        Self {
            valid: false,
            estimated_duration_sec,
            error: Some(error.into()),
        }
    }
}

const HTTP_SCHEME: &str = "http://";

/// 将 `http://` 升级为 `https://`（协议名不区分大小写），其他链接原样返回。重复调用结果不变。
pub fn upgrade_to_https(url: &str) -> String {
    match url.get(..HTTP_SCHEME.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(HTTP_SCHEME) => {
            format!("https://{}", &url[HTTP_SCHEME.len()..])
        }
        _ => url.to_string(),
    }
}

/// 根据探测响应判断链接是否可用。
pub fn evaluate(response: &HttpResponse) -> ValidationResult {
    if !response.is_success() {
        return ValidationResult::rejected(format!("HTTP 状态码 {}", response.status), None);
    }

    // 缺少 Content-Type 时放行
    if let Some(content_type) = &response.content_type {
        let mime = content_type.to_ascii_lowercase();
        if !mime.starts_with("audio/") && !mime.starts_with("video/") {
            return ValidationResult::rejected(format!("不是音视频内容: {content_type}"), None);
        }
    }

    let estimated = response
        .content_length
        .map(|len| len as f64 / ASSUMED_BYTES_PER_SEC);
    match estimated {
        Some(secs) if secs < MIN_DURATION_SEC => ValidationResult::rejected(
            format!("文件过小，估算时长仅 {secs:.1} 秒"),
            Some(secs),
        ),
        _ => ValidationResult::ok(estimated),
    }
}

/// 播放链接校验器。
pub struct LinkValidator {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl LinkValidator {
    /// 创建校验器。
    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// 校验链接。网络错误不会返回 `Err`，而是以 `valid: false` 报告。
    ///
    /// `headers` 为提供该链接的音源的请求头，部分 CDN 校验 `Referer`。
    pub async fn validate(&self, url: &str, headers: &HashMap<String, String>) -> ValidationResult {
        let request = HttpRequest::head(url).timeout(self.timeout).headers(headers);
        let result = match self.transport.execute(request).await {
            Ok(response) => evaluate(&response),
            Err(e) => ValidationResult::rejected(e.to_string(), None),
        };

        match &result.error {
            None => debug!("[Validator] 链接可用: {} (约 {:?} 秒)", url, result.estimated_duration_sec),
            Some(error) => warn!("[Validator] 链接不可用: {} ({})", url, error),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeTransport, audio_response};

    fn response(status: u16, content_type: Option<&str>, content_length: Option<u64>) -> HttpResponse {
        HttpResponse {
            status,
            content_type: content_type.map(str::to_string),
            content_length,
            ..Default::default()
        }
    }

    #[test]
    fn https_upgrade_is_idempotent() {
        for url in ["http://a/b.mp3", "https://a/b.mp3", "ftp://x", ""] {
            let once = upgrade_to_https(url);
            assert_eq!(upgrade_to_https(&once), once);
        }
        assert_eq!(upgrade_to_https("http://m7.music.126.net/a.mp3"), "https://m7.music.126.net/a.mp3");
    }

    #[test]
    fn https_upgrade_ignores_scheme_case() {
        assert_eq!(upgrade_to_https("HTTP://a/B.mp3"), "https://a/B.mp3");
        assert_eq!(upgrade_to_https("Http://a/b.mp3"), "https://a/b.mp3");
        assert_eq!(upgrade_to_https("HTTPS://a/b.mp3"), "HTTPS://a/b.mp3");
        assert_eq!(upgrade_to_https("http:/"), "http:/");
        for url in ["HTTP://a/b.mp3", "hTtP://a", "HTTPS://a", "ht"] {
            let once = upgrade_to_https(url);
            assert_eq!(upgrade_to_https(&once), once);
        }
    }

    #[test]
    fn rejects_non_success_status() {
        let result = evaluate(&response(403, Some("audio/mpeg"), Some(4_000_000)));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("403"));
    }

    #[test]
    fn rejects_non_media_content() {
        let result = evaluate(&response(200, Some("text/html; charset=utf-8"), Some(4_000_000)));
        assert!(!result.valid);
    }

    #[test]
    fn rejects_too_short_files() {
        // 64000 字节约 4 秒
        let result = evaluate(&response(200, Some("audio/mpeg"), Some(64_000)));
        assert!(!result.valid);
        assert_eq!(result.estimated_duration_sec, Some(4.0));
    }

    #[test]
    fn accepts_plausible_audio() {
        let result = evaluate(&response(200, Some("audio/mpeg"), Some(3_840_000)));
        assert!(result.valid);
        assert_eq!(result.estimated_duration_sec, Some(240.0));

        let no_headers = evaluate(&response(200, None, None));
        assert!(no_headers.valid);
        assert_eq!(no_headers.estimated_duration_sec, None);
    }

    #[tokio::test]
    async fn unreachable_link_is_reported_not_thrown() {
        let transport = FakeTransport::new();
        transport.fail("dead.example");
        let validator = LinkValidator::new(transport, Duration::from_secs(5));

        let result = validator
            .validate("https://dead.example/a.mp3", &HashMap::new())
            .await;
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn head_request_uses_short_timeout() {
        let transport = FakeTransport::new();
        transport.on("cdn.example", audio_response());
        let validator = LinkValidator::new(transport.clone(), Duration::from_secs(5));

        assert!(
            validator
                .validate("https://cdn.example/a.mp3", &HashMap::new())
                .await
                .valid
        );
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, crate::http::HttpMethod::Head);
        assert_eq!(sent.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn head_request_carries_source_headers() {
        let transport = FakeTransport::new();
        transport.on("cdn.example", audio_response());
        let validator = LinkValidator::new(transport.clone(), Duration::from_secs(5));
        let headers = HashMap::from([("Referer".to_string(), "https://music.163.com/".to_string())]);

        validator.validate("https://cdn.example/a.mp3", &headers).await;

        let sent = &transport.requests()[0];
        assert!(
            sent.headers
                .contains(&("Referer".to_string(), "https://music.163.com/".to_string()))
        );
    }
}

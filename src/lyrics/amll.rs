//! 社区 TTML 歌词库 (AMLL TTML Database)。
//!
//! 仓库按平台与歌曲 ID 存放 TTML 文件，直接按路径取原始文件即可，无需索引。

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::Platform,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// 平台在仓库中的目录名。
fn folder(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Netease | Platform::NeteasePodcast => Some("ncm-lyrics"),
        Platform::Tencent => Some("qq-lyrics"),
        Platform::Bilibili => None,
    }
}

/// TTML 歌词库客户端。
pub struct TtmlDatabase {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl TtmlDatabase {
    /// 以原始文件的根地址创建。
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 歌曲对应的 TTML 文件地址。该平台不在库中时返回 `None`。
    pub fn file_url(&self, platform: Platform, song_id: &str) -> Option<String> {
        folder(platform).map(|dir| format!("{}/{dir}/{song_id}.ttml", self.base_url))
    }

    /// 下载 TTML。库中没有这首歌时返回空字符串。
    pub async fn fetch(&self, platform: Platform, song_id: &str) -> Result<String> {
        let Some(url) = self.file_url(platform, song_id) else {
            return Ok(String::new());
        };
        debug!("[AMLL] 下载 TTML: {}", url);

        let response = self
            .transport
            .execute(HttpRequest::get(url).timeout(FETCH_TIMEOUT))
            .await?;
        match response.status {
            404 => Ok(String::new()),
            status if !response.is_success() => Err(EngineError::upstream(
                "amll-ttml-db",
                format!("HTTP 状态码 {status}"),
            )),
            _ => {
                let ttml = response.body.trim();
                if ttml.starts_with('<') {
                    info!("[AMLL] 找到 {} 的 TTML 歌词", song_id);
                    Ok(ttml.to_string())
                } else {
                    Ok(String::new())
                }
            }
        }
    }
}

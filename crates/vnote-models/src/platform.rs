//! Video platform detection and URL reconstruction.
//!
//! These heuristics are used when a task has to be rebuilt from
//! artifacts that only carry partial information about the original
//! submission (a bare video id, a download path, a page URL).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Supported video platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Bilibili,
    Douyin,
    Youtube,
    Kuaishou,
    BaiduPan,
    Local,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bilibili => "bilibili",
            Platform::Douyin => "douyin",
            Platform::Youtube => "youtube",
            Platform::Kuaishou => "kuaishou",
            Platform::BaiduPan => "baidu_pan",
            Platform::Local => "local",
        }
    }

    /// Identify the platform a URL belongs to from its host.
    ///
    /// Falls back to a substring match when the URL does not parse, since
    /// artifacts sometimes store scheme-less links.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_else(|| url.to_ascii_lowercase());

        if host_matches(&host, &["bilibili.com", "b23.tv"]) {
            Some(Platform::Bilibili)
        } else if host_matches(&host, &["douyin.com", "iesdouyin.com"]) {
            Some(Platform::Douyin)
        } else if host_matches(&host, &["youtube.com", "youtu.be"]) {
            Some(Platform::Youtube)
        } else if host_matches(&host, &["kuaishou.com"]) {
            Some(Platform::Kuaishou)
        } else if host_matches(&host, &["pan.baidu.com"]) {
            Some(Platform::BaiduPan)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn host_matches(host: &str, domains: &[&str]) -> bool {
    domains.iter().any(|d| host.contains(d))
}

/// Platform name for a URL, `"unknown"` when no rule matches.
pub fn infer_platform_name(url: &str) -> String {
    Platform::from_url(url)
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check whether a string looks like an http(s) link.
pub fn is_http_url(s: &str) -> bool {
    let s = s.trim();
    s.starts_with("http://") || s.starts_with("https://")
}

/// Rebuild a Bilibili page URL from a `BV…` video id.
///
/// Multi-part videos are stored as `BVxxxx_p<N>`; the page number is
/// restored as a `?p=N` query. An unparseable page suffix is dropped.
pub fn bilibili_url_from_video_id(video_id: &str) -> Option<String> {
    let video_id = video_id.trim();
    if !video_id.starts_with("BV") {
        return None;
    }

    match video_id.split_once("_p") {
        Some((base, page)) => match page.parse::<u32>() {
            Ok(p) => Some(format!("https://www.bilibili.com/video/{}?p={}", base, p)),
            Err(_) => Some(format!("https://www.bilibili.com/video/{}", base)),
        },
        None => Some(format!("https://www.bilibili.com/video/{}", video_id)),
    }
}

/// Extract a `BV…` id from a downloaded file path such as
/// `/data/BV1pwj2zxEL9.mp3`.
pub fn bilibili_id_from_path(path: &str) -> Option<String> {
    let file_name = path.rsplit(&['/', '\\'][..]).next()?;
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    stem.starts_with("BV").then(|| stem.to_string())
}

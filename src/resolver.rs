use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{redirect, Client};
use tracing::{debug, warn};
use url::Url;

use crate::config::BridgeConfig;

const MAX_REDIRECTS: usize = 10;
/// Landing paths for series, films and paid courses; these get no reply at all.
const LONG_FORM_MARKERS: &[&str] = &["/bangumi/", "/cheese/"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    VideoId(String),
    LongFormMedia,
    Unresolved,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VideoId(_) => "video",
            Self::LongFormMedia => "long_form",
            Self::Unresolved => "unresolved",
        }
    }
}

#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Never fails: transport problems come back as [`Resolution::Unresolved`].
    async fn resolve(&self, url: &str) -> Resolution;
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/video/(BV[0-9A-Za-z]+)").expect("valid regex"))
}

/// Classifies the URL a short link finally landed on.
pub fn classify_landing_url(landing: &Url) -> Resolution {
    let path = landing.path();
    if LONG_FORM_MARKERS.iter().any(|marker| path.contains(marker)) {
        return Resolution::LongFormMedia;
    }
    match video_id_regex().captures(landing.as_str()) {
        Some(captures) => Resolution::VideoId(captures[1].to_owned()),
        None => Resolution::Unresolved,
    }
}

#[derive(Debug, Clone)]
pub struct HttpLinkResolver {
    http: Client,
    user_agent: String,
}

impl HttpLinkResolver {
    pub fn new(settings: &BridgeConfig) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.resolve_timeout_ms))
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| format!("failed building resolver http client: {err}"))?;
        Ok(Self {
            http,
            user_agent: settings.user_agent.clone(),
        })
    }

    async fn fetch_landing_url(&self, url: &str) -> Result<Url, String> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    format!("request timed out: {err}")
                } else {
                    format!("request failed: {err}")
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "landing page {} returned status {}",
                response.url(),
                status.as_u16()
            ));
        }
        Ok(response.url().clone())
    }
}

#[async_trait]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(&self, url: &str) -> Resolution {
        match self.fetch_landing_url(url).await {
            Ok(landing) => {
                let resolution = classify_landing_url(&landing);
                debug!(
                    "resolved {} -> {} ({})",
                    url,
                    landing,
                    resolution.label()
                );
                resolution
            }
            Err(err) => {
                warn!("short link resolution failed for {url}: {err}");
                Resolution::Unresolved
            }
        }
    }
}

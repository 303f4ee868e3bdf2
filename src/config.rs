use std::collections::HashSet;
use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub bilibili: BilibiliConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            access_token: None,
        }
    }
}

impl GatewayConfig {
    /// Token to send as a bearer header, if one is configured and non-blank.
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilibiliConfig {
    #[serde(default = "default_true")]
    pub enable_share_text_parser: bool,
    #[serde(default = "default_true")]
    pub enable_bv_mode: bool,
    #[serde(default = "default_text_share_reply_mode")]
    pub text_share_reply_mode: TextShareReplyMode,
    #[serde(default = "default_reply_prefix")]
    pub reply_prefix: String,
    /// `{bv}` is replaced with the resolved id. BV-only replies trim the
    /// result, so a leading separator such as `\n` never leaks into them.
    #[serde(default = "default_bv_append_format")]
    pub bv_append_format: String,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            enable_share_text_parser: true,
            enable_bv_mode: true,
            text_share_reply_mode: default_text_share_reply_mode(),
            reply_prefix: default_reply_prefix(),
            bv_append_format: default_bv_append_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextShareReplyMode {
    BvOnly,
    LinkWithBv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reply_delay_min_ms")]
    pub reply_delay_min_ms: u64,
    #[serde(default = "default_reply_delay_max_ms")]
    pub reply_delay_max_ms: u64,
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reply_delay_min_ms: default_reply_delay_min_ms(),
            reply_delay_max_ms: default_reply_delay_max_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            user_agent: default_user_agent(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Config {
    /// Reads the file (defaults when it is absent) and applies env overrides.
    /// Validation is left to the caller so CLI overrides are applied first.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading config file {}", path.display()))?;
            Self::from_toml(&text)
                .with_context(|| format!("failed parsing TOML config {}", path.display()))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(text)?)
    }

    pub fn apply_cli_overrides(
        &mut self,
        gateway_url: Option<&str>,
        gateway_token: Option<&str>,
    ) {
        if let Some(url) = gateway_url {
            self.gateway.url = url.to_owned();
        }
        if let Some(token) = gateway_token {
            self.gateway.access_token = Some(token.to_owned());
        }
    }

    /// Group ids as a set, trimmed; this is the first gate every message passes.
    pub fn enabled_groups(&self) -> HashSet<String> {
        self.groups
            .iter()
            .map(|group| group.trim())
            .filter(|group| !group.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("BILI_BRIDGE_GATEWAY_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                self.gateway.url = trimmed.to_owned();
            }
        }
        if let Ok(v) = env::var("BILI_BRIDGE_GATEWAY_TOKEN") {
            let trimmed = v.trim();
            self.gateway.access_token = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            };
        }
        if let Ok(v) = env::var("BILI_BRIDGE_GROUPS") {
            self.groups = split_csv(&v);
        }
        if let Ok(v) = env::var("BILI_BRIDGE_SHARE_TEXT_PARSER") {
            self.bilibili.enable_share_text_parser = parse_bool(&v);
        }
        if let Ok(v) = env::var("BILI_BRIDGE_BV_MODE") {
            self.bilibili.enable_bv_mode = parse_bool(&v);
        }
        if let Ok(v) = env::var("BILI_BRIDGE_TEXT_SHARE_REPLY_MODE") {
            if let Some(mode) = parse_text_share_reply_mode(&v) {
                self.bilibili.text_share_reply_mode = mode;
            }
        }
        if let Ok(v) = env::var("BILI_BRIDGE_RECONNECT_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.bridge.reconnect_delay_ms = n.max(100);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.gateway.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            anyhow::bail!("gateway.url must start with ws:// or wss:// (got {url:?})");
        }
        if self.bridge.reconnect_delay_ms == 0 {
            anyhow::bail!("bridge.reconnect_delay_ms must be > 0");
        }
        if self.bridge.resolve_timeout_ms == 0 {
            anyhow::bail!("bridge.resolve_timeout_ms must be > 0");
        }
        if self.bridge.reply_delay_min_ms >= self.bridge.reply_delay_max_ms {
            anyhow::bail!(
                "bridge.reply_delay_min_ms must be lower than bridge.reply_delay_max_ms"
            );
        }
        if self.bridge.event_queue_capacity == 0 {
            anyhow::bail!("bridge.event_queue_capacity must be > 0");
        }
        Ok(())
    }
}

fn split_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_text_share_reply_mode(s: &str) -> Option<TextShareReplyMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bv_only" | "bv-only" | "bv" => Some(TextShareReplyMode::BvOnly),
        "link_with_bv" | "link-with-bv" | "link" => Some(TextShareReplyMode::LinkWithBv),
        _ => None,
    }
}

fn default_true() -> bool {
    true
}

fn default_gateway_url() -> String {
    "ws://localhost:3001/ws".to_owned()
}

fn default_text_share_reply_mode() -> TextShareReplyMode {
    TextShareReplyMode::BvOnly
}

fn default_reply_prefix() -> String {
    "链接：".to_owned()
}

fn default_bv_append_format() -> String {
    "\n视频BV号：{bv}".to_owned()
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_reply_delay_min_ms() -> u64 {
    1_000
}

fn default_reply_delay_max_ms() -> u64 {
    1_500
}

fn default_resolve_timeout_ms() -> u64 {
    5_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_owned()
}

fn default_event_queue_capacity() -> usize {
    64
}

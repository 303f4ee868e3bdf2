use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::compose::compose;
use crate::config::{BilibiliConfig, Config};
use crate::extractor::{accepted_group, extract, ExtractParams};
use crate::normalize::normalize;
use crate::protocol::{InboundMessage, OutboundReply};
use crate::resolver::{LinkResolver, Resolution};

/// Extractor → normalizer → resolver → composer for a single inbound message.
pub struct LinkPipeline {
    enabled_groups: HashSet<String>,
    settings: BilibiliConfig,
    resolver: Arc<dyn LinkResolver>,
}

impl LinkPipeline {
    pub fn new(config: &Config, resolver: Arc<dyn LinkResolver>) -> Self {
        Self {
            enabled_groups: config.enabled_groups(),
            settings: config.bilibili.clone(),
            resolver,
        }
    }

    fn params(&self) -> ExtractParams<'_> {
        ExtractParams {
            enabled_groups: &self.enabled_groups,
            share_text_enabled: self.settings.enable_share_text_parser,
        }
    }

    pub async fn process(&self, message: &InboundMessage) -> Option<OutboundReply> {
        let Some(group_id) = accepted_group(message, self.params()) else {
            debug!(
                "ignoring {} message from group {}",
                message.message_type,
                message.group_id.as_deref().unwrap_or("<none>")
            );
            return None;
        };
        let candidate = extract(message, self.params())?;
        let url = if candidate.needs_normalization {
            normalize(&candidate.raw_url)
        } else {
            candidate.raw_url.clone()
        };
        if url.is_empty() {
            debug!(
                "[group {group_id}] {} link {:?} has nothing left after normalization",
                candidate.source_kind.as_str(),
                candidate.raw_url
            );
            return None;
        }
        info!(
            "[group {}] detected bilibili {} link: {}",
            group_id,
            candidate.source_kind.as_str(),
            url
        );

        let resolution = if self.settings.enable_bv_mode {
            self.resolver.resolve(&url).await
        } else {
            Resolution::Unresolved
        };
        if resolution == Resolution::LongFormMedia {
            info!("[group {group_id}] {url} is long-form media, not replying");
        }

        let text = compose(&candidate, &resolution, &url, &self.settings)?;
        Some(OutboundReply {
            group_id: group_id.to_owned(),
            text,
        })
    }
}

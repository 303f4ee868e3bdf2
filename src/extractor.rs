use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::protocol::{CardPayload, InboundMessage, Segment};

/// QQ mini-program id of the Bilibili app card.
pub const BILIBILI_APP_ID: &str = "1109937557";
/// Present in the text of every "share to QQ" blurb the Bilibili app produces.
pub const SHARE_TEXT_MARKER: &str = "哔哩哔哩";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    AppCard,
    ShareText,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppCard => "app_card",
            Self::ShareText => "share_text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub raw_url: String,
    pub source_kind: SourceKind,
    pub needs_normalization: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractParams<'a> {
    pub enabled_groups: &'a HashSet<String>,
    pub share_text_enabled: bool,
}

fn short_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https://b23\.tv/[A-Za-z0-9]+").expect("valid regex"))
}

/// Group id of `message` if it is a group message from an enabled group.
pub fn accepted_group<'m>(
    message: &'m InboundMessage,
    params: ExtractParams<'_>,
) -> Option<&'m str> {
    if message.post_type != "message" || message.message_type != "group" {
        return None;
    }
    let group_id = message.group_id.as_deref()?;
    params.enabled_groups.contains(group_id).then_some(group_id)
}

pub fn extract(message: &InboundMessage, params: ExtractParams<'_>) -> Option<LinkCandidate> {
    accepted_group(message, params)?;

    if let Some(candidate) = extract_app_card(message) {
        return Some(candidate);
    }
    if params.share_text_enabled {
        return extract_share_text(message);
    }
    None
}

fn extract_app_card(message: &InboundMessage) -> Option<LinkCandidate> {
    let raw = message.segments.iter().find_map(|segment| match segment {
        Segment::Json(raw) => Some(raw),
        Segment::Text(_) | Segment::Other { .. } => None,
    })?;
    let card = match raw.decode() {
        CardPayload::Card(card) => card,
        CardPayload::Malformed(reason) => {
            debug!("skipping malformed card segment: {reason}");
            return None;
        }
    };
    if card.app_id.as_deref() != Some(BILIBILI_APP_ID) {
        return None;
    }
    let raw_url = card.doc_url?;
    Some(LinkCandidate {
        raw_url,
        source_kind: SourceKind::AppCard,
        needs_normalization: true,
    })
}

fn extract_share_text(message: &InboundMessage) -> Option<LinkCandidate> {
    let text: String = message
        .segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text(text) => Some(text.as_str()),
            Segment::Json(_) | Segment::Other { .. } => None,
        })
        .collect();
    if !text.contains(SHARE_TEXT_MARKER) {
        return None;
    }
    let found = short_link_regex().find(&text)?;
    Some(LinkCandidate {
        raw_url: found.as_str().to_owned(),
        source_kind: SourceKind::ShareText,
        needs_normalization: false,
    })
}

use crate::config::{BilibiliConfig, TextShareReplyMode};
use crate::extractor::{LinkCandidate, SourceKind};
use crate::resolver::Resolution;

pub const BV_PLACEHOLDER: &str = "{bv}";

/// Builds the reply text, or `None` when the link must go unanswered.
///
/// `resolution` is ignored when BV mode is off. BV-only replies are trimmed,
/// so a template without a leading separator is simply left as is.
pub fn compose(
    candidate: &LinkCandidate,
    resolution: &Resolution,
    normalized_url: &str,
    settings: &BilibiliConfig,
) -> Option<String> {
    let link_reply = || format!("{}{}", settings.reply_prefix, normalized_url);
    if !settings.enable_bv_mode {
        return Some(link_reply());
    }

    match resolution {
        Resolution::LongFormMedia => None,
        Resolution::Unresolved => Some(link_reply()),
        Resolution::VideoId(bv) => {
            let bv_text = settings.bv_append_format.replace(BV_PLACEHOLDER, bv);
            let bv_only = candidate.source_kind == SourceKind::ShareText
                && settings.text_share_reply_mode == TextShareReplyMode::BvOnly;
            if bv_only {
                Some(bv_text.trim().to_owned())
            } else {
                Some(format!("{}{}", link_reply(), bv_text))
            }
        }
    }
}

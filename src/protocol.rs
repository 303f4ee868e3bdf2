//! OneBot v11 frames as seen on the NapCat websocket.
//!
//! Inbound JSON is validated once here and turned into closed types; nothing
//! downstream probes raw `serde_json::Value` fields. The one deferred part is
//! the card payload inside a `json` segment, which stays undecoded until the
//! message has passed the group gate.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(InboundMessage),
    /// Reply to an action we sent, e.g. `send_group_msg`.
    ActionResponse {
        status: String,
        retcode: i64,
        echo: Option<String>,
        message: Option<String>,
    },
    /// `meta_event`, `notice`, `request` and anything else with a `post_type`.
    Event { post_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub post_type: String,
    pub message_type: String,
    pub group_id: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Json(RawCard),
    Text(String),
    Other { kind: String },
}

/// `data.data` of a `json` segment, as received.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCard(Option<Value>);

impl RawCard {
    pub fn new(raw: Option<Value>) -> Self {
        Self(raw)
    }

    pub fn decode(&self) -> CardPayload {
        parse_card_payload(self.0.as_ref())
    }
}

#[cfg(test)]
impl RawCard {
    pub fn for_card(app_id: &str, doc_url: Option<&str>) -> Self {
        let mut detail = serde_json::Map::new();
        detail.insert("appid".to_owned(), Value::from(app_id));
        if let Some(url) = doc_url {
            detail.insert("qqdocurl".to_owned(), Value::from(url));
        }
        let card = serde_json::json!({ "meta": { "detail_1": detail } });
        Self(Some(Value::String(card.to_string())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardPayload {
    Card(AppCard),
    Malformed(String),
}

/// Fields of a QQ mini-program card under `meta.detail_1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppCard {
    pub app_id: Option<String>,
    pub doc_url: Option<String>,
}

pub fn parse_frame(text: &str) -> Result<InboundFrame, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| format!("invalid JSON frame: {err}"))?;
    let Some(object) = value.as_object() else {
        return Err("frame must be a JSON object".to_owned());
    };

    let Some(post_type) = object.get("post_type").and_then(Value::as_str) else {
        if object.contains_key("retcode") || object.contains_key("status") {
            return Ok(InboundFrame::ActionResponse {
                status: object
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned(),
                retcode: object.get("retcode").and_then(Value::as_i64).unwrap_or(0),
                echo: object.get("echo").and_then(scalar_to_string),
                message: object
                    .get("message")
                    .or_else(|| object.get("wording"))
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned),
            });
        }
        return Err("frame has neither post_type nor retcode".to_owned());
    };

    if post_type != "message" {
        return Ok(InboundFrame::Event {
            post_type: post_type.to_owned(),
        });
    }

    let message_type = object
        .get("message_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let group_id = object.get("group_id").and_then(scalar_to_string);
    let segments = match object.get("message") {
        Some(Value::Array(items)) => items.iter().map(parse_segment).collect(),
        Some(Value::String(text)) => vec![Segment::Text(text.clone())],
        Some(other) => {
            return Err(format!(
                "message field must be an array or string, got {}",
                value_kind(other)
            ))
        }
        None => return Err("message event is missing the message field".to_owned()),
    };

    Ok(InboundFrame::Message(InboundMessage {
        post_type: post_type.to_owned(),
        message_type,
        group_id,
        segments,
    }))
}

fn parse_segment(raw: &Value) -> Segment {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    let data = raw.get("data");
    match kind {
        "text" => Segment::Text(
            data.and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        ),
        "json" => Segment::Json(RawCard::new(
            data.and_then(|d| d.get("data")).cloned(),
        )),
        other => Segment::Other {
            kind: other.to_owned(),
        },
    }
}

fn parse_card_payload(raw: Option<&Value>) -> CardPayload {
    let parsed = match raw {
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(err) => return CardPayload::Malformed(format!("card JSON: {err}")),
        },
        Some(value @ Value::Object(_)) => value.clone(),
        Some(other) => {
            return CardPayload::Malformed(format!("card data is {}", value_kind(other)))
        }
        None => return CardPayload::Malformed("card data missing".to_owned()),
    };
    let Some(detail) = parsed.pointer("/meta/detail_1") else {
        return CardPayload::Card(AppCard::default());
    };
    CardPayload::Card(AppCard {
        app_id: detail.get("appid").and_then(scalar_to_string),
        doc_url: detail
            .get("qqdocurl")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned),
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub group_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
struct SendGroupMsg<'a> {
    action: &'static str,
    params: SendGroupMsgParams<'a>,
    echo: &'a str,
}

#[derive(Debug, Serialize)]
struct SendGroupMsgParams<'a> {
    group_id: GroupIdRef<'a>,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GroupIdRef<'a> {
    Number(u64),
    Text(&'a str),
}

impl OutboundReply {
    /// `send_group_msg` action frame. Numeric group ids go out as numbers,
    /// which is what NapCat itself emits.
    pub fn to_frame(&self, echo: &str) -> String {
        let group_id = match self.group_id.parse::<u64>() {
            Ok(n) => GroupIdRef::Number(n),
            Err(_) => GroupIdRef::Text(&self.group_id),
        };
        let frame = SendGroupMsg {
            action: "send_group_msg",
            params: SendGroupMsgParams {
                group_id,
                message: &self.text,
            },
            echo,
        };
        serde_json::to_string(&frame).unwrap_or_default()
    }
}

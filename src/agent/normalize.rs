use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::{AgentError, AgentReply};

/// Text used for both parts when the gateway returned nothing usable
pub const NO_REPLY: &str = "(no reply)";

const GENERIC_FAILURE: &str = "Channel request failed";

/// Every field any gateway version has sent
#[derive(Debug, Default, Deserialize)]
struct WireResponse {
    text: Option<String>,
    read: Option<String>,
    reply: Option<String>,
    error: Option<String>,
}

/// `{text, read}` embedded as a JSON string inside the legacy `reply` field
#[derive(Debug, Deserialize)]
struct EmbeddedReply {
    text: String,
    read: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Turn an HTTP status and body into a reply or an error
///
/// # Errors
/// Returns [`AgentError::Gateway`] for any non-2xx status
pub fn normalize_response(status: u16, body: &[u8]) -> Result<AgentReply, AgentError> {
    let decoded: Option<WireResponse> = serde_json::from_slice(body).ok();

    if !(200..300).contains(&status) {
        let message = decoded
            .as_ref()
            .and_then(|d| non_empty(d.error.as_deref()))
            .map(str::to_owned)
            .or_else(|| {
                let raw = String::from_utf8_lossy(body);
                non_empty(Some(raw.as_ref())).map(str::to_owned)
            })
            .unwrap_or_else(|| GENERIC_FAILURE.to_owned());
        return Err(AgentError::Gateway { status, message });
    }

    let wire = decoded.unwrap_or_else(|| {
        warn!(bytes = body.len(), "gateway body is not JSON, using placeholder");
        WireResponse::default()
    });
    Ok(normalize(&wire))
}

fn normalize(wire: &WireResponse) -> AgentReply {
    if let (Some(text), Some(read)) = (
        non_empty(wire.text.as_deref()),
        non_empty(wire.read.as_deref()),
    ) {
        return AgentReply::new(text, read);
    }

    // Older bridges return the model's raw output, which may itself be {text, read}.
    if let Some(raw) = non_empty(wire.reply.as_deref()) {
        if let Ok(inner) = serde_json::from_str::<EmbeddedReply>(raw) {
            if let (Some(text), Some(read)) = (
                non_empty(Some(inner.text.as_str())),
                non_empty(Some(inner.read.as_str())),
            ) {
                debug!("reply field carried embedded structured reply");
                return AgentReply::new(text, read);
            }
        }
    }

    let plain = non_empty(wire.reply.as_deref())
        .or_else(|| non_empty(wire.text.as_deref()))
        .unwrap_or(NO_REPLY);
    AgentReply::new(plain, plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(body: &str) -> AgentReply {
        normalize_response(200, body.as_bytes()).unwrap()
    }

    #[test]
    fn test_structured_fields() {
        assert_eq!(ok(r#"{"text":"Hi","read":"Hi"}"#), AgentReply::new("Hi", "Hi"));
    }

    #[test]
    fn test_structured_fields_are_trimmed() {
        assert_eq!(
            ok(r#"{"text":"  Full answer.\n","read":" Short. "}"#),
            AgentReply::new("Full answer.", "Short.")
        );
    }

    #[test]
    fn test_embedded_json_in_reply() {
        assert_eq!(
            ok(r#"{"reply":"{\"text\":\"Hi there\",\"read\":\"Hi\"}"}"#),
            AgentReply::new("Hi there", "Hi")
        );
    }

    #[test]
    fn test_embedded_json_with_empty_read_falls_back_to_raw() {
        let raw = r#"{"text":"Hi there","read":""}"#;
        let body = serde_json::json!({ "reply": raw }).to_string();
        assert_eq!(ok(&body), AgentReply::new(raw, raw));
    }

    #[test]
    fn test_plain_reply() {
        assert_eq!(
            ok(r#"{"reply":"plain text"}"#),
            AgentReply::new("plain text", "plain text")
        );
    }

    #[test]
    fn test_text_without_read_used_for_both() {
        assert_eq!(ok(r#"{"text":"only text"}"#), AgentReply::new("only text", "only text"));
    }

    #[test]
    fn test_empty_shapes_yield_placeholder() {
        let placeholder = AgentReply::new(NO_REPLY, NO_REPLY);
        assert_eq!(ok("{}"), placeholder);
        assert_eq!(ok(r#"{"text":"","read":"","reply":"  "}"#), placeholder);
        assert_eq!(ok("not json at all"), placeholder);
        assert_eq!(ok(""), placeholder);
    }

    #[test]
    fn test_error_uses_structured_error_field() {
        let err = normalize_response(401, br#"{"error":"bad token"}"#).unwrap_err();
        assert!(matches!(
            err,
            AgentError::Gateway { status: 401, ref message } if message == "bad token"
        ));
    }

    #[test]
    fn test_error_falls_back_to_raw_body() {
        let err = normalize_response(502, b"upstream timed out").unwrap_err();
        assert!(matches!(
            err,
            AgentError::Gateway { status: 502, ref message } if message == "upstream timed out"
        ));
    }

    #[test]
    fn test_error_with_empty_body_is_generic() {
        let err = normalize_response(500, b"").unwrap_err();
        assert!(matches!(
            err,
            AgentError::Gateway { status: 500, ref message } if message == "Channel request failed"
        ));
        assert_eq!(err.to_string(), "Channel request failed (HTTP 500)");
    }

    #[test]
    fn test_any_2xx_is_success() {
        assert_eq!(
            normalize_response(204, br#"{"reply":"ok"}"#).unwrap(),
            AgentReply::new("ok", "ok")
        );
    }
}

//! Callback-data parsing and prompt formatting.
//!
//! Pure helpers, separated from the teloxide plumbing so they can be
//! tested without a bot.

use chrono::{DateTime, Utc};
use gatehouse_messenger::ApprovalPrompt;

/// Prefix for approval callback data.
const CALLBACK_PREFIX: &str = "apr";

/// The guardian's tap, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackAction {
    /// The Allow button.
    Allow,
    /// The Deny button.
    Deny,
}

/// Render the callback data for a prompt button.
pub(crate) fn encode_callback(request_id: &str, action: CallbackAction) -> String {
    let action = match action {
        CallbackAction::Allow => "allow",
        CallbackAction::Deny => "deny",
    };
    format!("{CALLBACK_PREFIX}:{request_id}:{action}")
}

/// Decode callback data into `(request_id, action)`.
///
/// Returns `None` for anything that is not an approval callback — the
/// dispatcher ignores those updates.
pub(crate) fn decode_callback(data: &str) -> Option<(String, CallbackAction)> {
    let rest = data.strip_prefix("apr:")?;
    // The action is the suffix after the *last* colon; request ids are
    // opaque and may themselves contain colons.
    let (request_id, action) = rest.rsplit_once(':')?;
    if request_id.is_empty() {
        return None;
    }
    let action = match action {
        "allow" => CallbackAction::Allow,
        "deny" => CallbackAction::Deny,
        _ => return None,
    };
    Some((request_id.to_string(), action))
}

/// The message text for an approval prompt.
pub(crate) fn prompt_text(prompt: &ApprovalPrompt) -> String {
    format!(
        "Approval required\n\n{}\n\nTool: {}\nExpires: {}",
        prompt.signature,
        prompt.tool_name,
        format_expiry(prompt.expires_at),
    )
}

fn format_expiry(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// A message reference: `"{chat_id}:{message_id}"`.
pub(crate) fn encode_message_ref(chat_id: i64, message_id: i32) -> String {
    format!("{chat_id}:{message_id}")
}

/// Decode a message reference produced by [`encode_message_ref`].
pub(crate) fn decode_message_ref(message_ref: &str) -> Option<(i64, i32)> {
    let (chat, message) = message_ref.split_once(':')?;
    Some((chat.parse().ok()?, message.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::ToolArgs;

    #[test]
    fn callback_round_trip() {
        let data = encode_callback("req-123", CallbackAction::Allow);
        assert_eq!(data, "apr:req-123:allow");
        assert_eq!(
            decode_callback(&data),
            Some(("req-123".to_string(), CallbackAction::Allow))
        );
    }

    #[test]
    fn request_ids_may_contain_colons() {
        let data = encode_callback("sess:42:req:7", CallbackAction::Deny);
        assert_eq!(
            decode_callback(&data),
            Some(("sess:42:req:7".to_string(), CallbackAction::Deny))
        );
    }

    #[test]
    fn foreign_callbacks_are_ignored() {
        assert!(decode_callback("something_else").is_none());
        assert!(decode_callback("apr:req-1:maybe").is_none());
        assert!(decode_callback("apr::allow").is_none());
        assert!(decode_callback("apr:req-1").is_none());
    }

    #[test]
    fn prompt_text_shows_the_signature() {
        let prompt = ApprovalPrompt {
            request_id: "r-1".into(),
            tool_name: "ha_call_service".into(),
            signature: "ha_call_service(light.turn_on, light.bedroom)".into(),
            args: ToolArgs::new(),
            expires_at: chrono::Utc::now(),
        };
        let text = prompt_text(&prompt);
        assert!(text.contains("ha_call_service(light.turn_on, light.bedroom)"));
        assert!(text.contains("Tool: ha_call_service"));
    }

    #[test]
    fn message_ref_round_trip() {
        let message_ref = encode_message_ref(-100123, 456);
        assert_eq!(decode_message_ref(&message_ref), Some((-100123, 456)));
        assert!(decode_message_ref("garbage").is_none());
    }
}

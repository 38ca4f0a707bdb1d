//! Email parsing helpers: raw RFC 822 bytes into an `InboundMessage`.

use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::PerMessageError;
use crate::pipeline::types::InboundMessage;

/// Subject used when a message has none.
pub const NO_SUBJECT: &str = "(no subject)";

/// Parse a fetched message.
///
/// Only an unparseable message is an error. A missing sender yields an empty
/// address, a missing subject yields `NO_SUBJECT`, and a body that cannot be
/// extracted yields an empty string.
pub fn parse_inbound(id: &str, raw: &[u8]) -> Result<InboundMessage, PerMessageError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(PerMessageError::Malformed("empty message".into()));
    }
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| PerMessageError::Malformed("not an RFC 822 message".into()))?;

    let sender_address = extract_sender(parsed.from());
    let subject = parsed
        .subject()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_SUBJECT)
        .to_string();
    let body = first_plain_text(&parsed).unwrap_or_else(|| {
        tracing::debug!(id, "No readable text/plain part; using empty body");
        String::new()
    });

    Ok(InboundMessage {
        id: id.to_string(),
        sender_address,
        subject,
        body,
    })
}

/// First address in a From header, or empty when there is none.
pub fn extract_sender(addr: Option<&mail_parser::Address>) -> String {
    let Some(addr) = addr else {
        return String::new();
    };
    let first = match addr {
        mail_parser::Address::List(addrs) => addrs.iter().find_map(|a| a.address.as_deref()),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .find_map(|a| a.address.as_deref()),
    };
    first.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Text of the first `text/plain` part, walking parts in document order.
///
/// Parts without a content type count as `text/plain`. HTML-only messages
/// have no plain part and return `None`.
pub fn first_plain_text(parsed: &mail_parser::Message) -> Option<String> {
    parsed.parts.iter().find_map(|part| {
        let PartType::Text(text) = &part.body else {
            return None;
        };
        let is_plain = match MimeHeaders::content_type(part) {
            Some(ct) => {
                ct.ctype().eq_ignore_ascii_case("text")
                    && ct.subtype().is_none_or(|s| s.eq_ignore_ascii_case("plain"))
            }
            None => true,
        };
        is_plain.then(|| text.to_string())
    })
}

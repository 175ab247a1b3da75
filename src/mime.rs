//! Message marshalling helpers — reply composition, base64url, address parsing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{Address, Message};
use mail_parser::MessageParser;

use crate::error::CommitError;

/// Subject line for a reply to `subject`.
pub fn reply_subject(subject: &str) -> String {
    format!("Re: {subject}")
}

/// Build a plain-text RFC 2822 reply.
///
/// `to` is the original From header verbatim, so display names survive.
pub fn compose_reply(from: &str, to: &str, subject: &str, body: &str) -> Result<Vec<u8>, CommitError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| CommitError::Compose(format!("invalid from address {from:?}: {e}")))?;
    let to = reply_recipient(to)
        .ok_or_else(|| CommitError::Compose(format!("no usable recipient in {to:?}")))?;

    let email = Message::builder()
        .from(from)
        .to(to)
        .subject(subject.replace(['\r', '\n'], " "))
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| CommitError::Compose(e.to_string()))?;

    Ok(email.formatted())
}

/// Whether `header` is a single mailbox usable as a From header.
pub fn is_valid_mailbox(header: &str) -> bool {
    header.parse::<Mailbox>().is_ok()
}

/// Recipient for a reply to `header`.
///
/// A single well-formed mailbox is used as is. Otherwise (comment-style
/// names, address lists) the first address mail-parser finds is used.
fn reply_recipient(header: &str) -> Option<Mailbox> {
    if let Ok(mailbox) = header.parse::<Mailbox>() {
        return Some(mailbox);
    }
    let (name, address) = first_address(header)?;
    let email: Address = address.parse().ok()?;
    Some(Mailbox::new(name, email))
}

/// Encode raw message bytes for the mailbox `raw` field.
pub fn encode_raw(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url data, tolerating trailing padding. Invalid input yields `None`.
pub fn decode_base64url(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Extract the address part of a From header.
///
/// `Spammer <spammer@mail.com>` → `spammer@mail.com`. Anything that does not
/// parse to an address gives an empty string, which no allow-list contains.
pub fn parse_address(header: &str) -> String {
    first_address(header)
        .map(|(_, address)| address)
        .unwrap_or_default()
}

/// Display name and address of the first mailbox in a From header.
fn first_address(header: &str) -> Option<(Option<String>, String)> {
    if header.contains(['\r', '\n']) {
        return None;
    }
    let raw = format!("From: {header}\r\n\r\n");
    let parsed = MessageParser::default().parse(raw.as_bytes())?;
    let first = parsed.from()?.first()?;
    let address = first.address()?.trim().to_string();
    if address.is_empty() {
        return None;
    }
    let name = first
        .name()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    Some((name, address))
}

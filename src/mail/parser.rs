//! Full MIME decoding of RFC 822 source into a structured message.

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::{Error, Result};
use crate::mail::address::split_display_address;
use crate::types::Address;

/// Subject used when a message has none.
pub const NO_SUBJECT: &str = "(no subject)";

/// A decoded attachment part, bytes included.
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub size: u64,
    pub content_id: Option<String>,
}

/// Structured view of one raw message.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<ParsedAttachment>,
}

/// Decode raw RFC 822 bytes.
///
/// Robust to missing headers: a missing subject becomes `(no subject)` and
/// a missing or unparseable date becomes "now". Only a message the MIME
/// parser cannot read at all is an error.
pub fn parse(raw: &[u8]) -> Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("unreadable MIME message".into()))?;

    let message_id = message.message_id().map(|s| s.to_string());

    let in_reply_to = match message.in_reply_to() {
        mail_parser::HeaderValue::Text(t) => Some(strip_brackets(t)),
        mail_parser::HeaderValue::TextList(list) => list.first().map(|t| strip_brackets(t)),
        _ => None,
    };

    let references = match message.references() {
        mail_parser::HeaderValue::Text(t) => t
            .split_whitespace()
            .map(strip_brackets)
            .filter(|s| !s.is_empty())
            .collect(),
        mail_parser::HeaderValue::TextList(list) => list
            .iter()
            .map(|t| strip_brackets(t))
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let from = first_address(message.from())
        .filter(|a| a.email.contains('@'))
        .or_else(|| from_header_fallback(raw))
        .unwrap_or_else(|| Address::new("", None));
    let to = all_addresses(message.to());
    let cc = all_addresses(message.cc());

    let subject = message
        .subject()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let date = message
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single())
        .unwrap_or_else(Utc::now);

    // mail-parser will happily synthesize text from an HTML-only message;
    // only report a text body when an actual text/plain part exists so the
    // cleaning pipeline keeps control of HTML conversion.
    let has_plain_part = message
        .parts
        .iter()
        .any(|p| matches!(&p.body, mail_parser::PartType::Text(_)));
    let text_body = if has_plain_part {
        message
            .body_text(0)
            .map(|s| s.into_owned())
            .filter(|s| !s.trim().is_empty())
    } else {
        None
    };
    let html_body = message
        .body_html(0)
        .map(|s| s.into_owned())
        .filter(|s| !s.trim().is_empty());

    let attachments = message
        .attachments()
        .enumerate()
        .map(|(idx, part)| {
            let filename = part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{}", idx));

            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let bytes = part.contents().to_vec();
            let size = bytes.len() as u64;

            ParsedAttachment {
                filename,
                content_type,
                bytes,
                size,
                content_id: part.content_id().map(String::from),
            }
        })
        .collect();

    Ok(ParsedMessage {
        message_id,
        in_reply_to,
        references,
        from,
        to,
        cc,
        subject,
        date,
        text_body,
        html_body,
        attachments,
    })
}

fn strip_brackets(value: &str) -> String {
    value.trim().trim_matches(|c| c == '<' || c == '>').to_string()
}

/// Last-resort sender extraction when the MIME parser yields no usable
/// `From` mailbox (group syntax, mangled encodings): scan the raw header
/// block and split the display form by hand.
fn from_header_fallback(raw: &[u8]) -> Option<Address> {
    let head = String::from_utf8_lossy(&raw[..raw.len().min(8 * 1024)]);
    for line in head.lines() {
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("from") {
            continue;
        }
        let (name, mailbox) = split_display_address(value);
        if mailbox.contains('@') {
            return Some(Address::new(mailbox, name));
        }
    }
    None
}

fn first_address(addr: Option<&mail_parser::Address<'_>>) -> Option<Address> {
    let first = addr?.first()?;
    let email = first.address.as_ref()?.to_string();
    let name = first.name.as_ref().map(|n| n.to_string());
    Some(Address::new(email.to_lowercase(), name))
}

fn all_addresses(addr: Option<&mail_parser::Address<'_>>) -> Vec<Address> {
    match addr {
        Some(list) => list
            .iter()
            .filter_map(|a| {
                let email = a.address.as_ref()?.to_string();
                let name = a.name.as_ref().map(|n| n.to_string());
                Some(Address::new(email.to_lowercase(), name))
            })
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Vec<u8> {
        b"Message-ID: <msg1@mail.example.com>\r\n\
In-Reply-To: <msg0@mail.example.com>\r\n\
References: <root@mail.example.com> <msg0@mail.example.com>\r\n\
From: Alice Example <Alice@Example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Cc: dave@example.com\r\n\
Subject: Quarterly numbers\r\n\
Date: Tue, 17 Feb 2026 09:30:00 +0000\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
\r\n\
The numbers look good.\r\n"
            .to_vec()
    }

    #[test]
    fn test_parse_headers() {
        let parsed = parse(&sample_message()).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("msg1@mail.example.com"));
        assert_eq!(parsed.in_reply_to.as_deref(), Some("msg0@mail.example.com"));
        assert_eq!(
            parsed.references,
            vec!["root@mail.example.com", "msg0@mail.example.com"]
        );
        assert_eq!(parsed.from.email, "alice@example.com");
        assert_eq!(parsed.from.name.as_deref(), Some("Alice Example"));
        assert_eq!(parsed.to.len(), 2);
        assert_eq!(parsed.cc.len(), 1);
        assert_eq!(parsed.subject, "Quarterly numbers");
        assert_eq!(parsed.date.to_rfc3339(), "2026-02-17T09:30:00+00:00");
    }

    #[test]
    fn test_parse_body_prefers_plain_text() {
        let parsed = parse(&sample_message()).unwrap();
        assert!(parsed.text_body.unwrap().contains("The numbers look good."));
        assert!(parsed.html_body.is_none());
    }

    #[test]
    fn test_from_header_fallback() {
        let raw = b"To: me@gmail.com\r\n\
From: Billing Robot <robots@pay.example.com>\r\n\
Subject: invoice\r\n\
\r\n\
Message-ID in the body is ignored\r\n";
        let addr = from_header_fallback(raw).unwrap();
        assert_eq!(addr.email, "robots@pay.example.com");
        assert_eq!(addr.name.as_deref(), Some("Billing Robot"));

        assert!(from_header_fallback(b"Subject: no sender\r\n\r\nbody\r\n").is_none());
        // A From value with no mailbox in it is not good enough.
        assert!(from_header_fallback(b"From: undisclosed-recipients:;\r\n\r\n").is_none());
    }

    #[test]
    fn test_missing_subject_becomes_placeholder() {
        let raw = b"From: a@b.com\r\nDate: Tue, 17 Feb 2026 09:30:00 +0000\r\n\r\nhello\r\n";
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed.subject, NO_SUBJECT);
    }

    #[test]
    fn test_multipart_with_attachment() {
        let raw = b"From: a@b.com\r\n\
Subject: with attachment\r\n\
Date: Tue, 17 Feb 2026 09:30:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
\r\n\
See attached.\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ--\r\n";

        let parsed = parse(raw).unwrap();
        assert!(parsed.text_body.unwrap().contains("See attached."));
        assert_eq!(parsed.attachments.len(), 1);
        let att = &parsed.attachments[0];
        assert_eq!(att.filename, "report.pdf");
        assert_eq!(att.content_type, "application/pdf");
        assert!(!att.bytes.is_empty());
    }

    #[test]
    fn test_html_only_message() {
        let raw = b"From: a@b.com\r\n\
Subject: html\r\n\
Date: Tue, 17 Feb 2026 09:30:00 +0000\r\n\
Content-Type: text/html; charset=UTF-8\r\n\
\r\n\
<p>Hello <b>there</b></p>\r\n";

        let parsed = parse(raw).unwrap();
        assert!(parsed.html_body.is_some());
        assert!(parsed.text_body.is_none());
    }
}

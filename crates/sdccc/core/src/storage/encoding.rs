//! Charset and MIME type checks for recorded messages
//!
//! A message may declare its charset in three places: the HTTP
//! `Content-Type` parameter, a byte order mark and the XML declaration.
//! All present declarations must agree and the effective charset must be
//! UTF-8.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static HEADER_CHARSET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*"?([^";\s]+)"?"#).ok());

static XML_DECLARATION_ENCODING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"^<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).ok()
});

/// MIME types accepted for SOAP traffic
pub const ALLOWED_MIME_TYPES: [&str; 2] = ["application/soap+xml", "application/xml"];

/// Where a charset declaration was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    HttpHeader,
    ByteOrderMark,
    XmlDeclaration,
}

impl fmt::Display for CharsetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CharsetSource::HttpHeader => "HTTP header",
            CharsetSource::ByteOrderMark => "byte order mark",
            CharsetSource::XmlDeclaration => "XML declaration",
        };
        f.write_str(name)
    }
}

/// A problem with the charset of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingIssue {
    /// Declarations disagree with each other
    Inconsistent(Vec<(CharsetSource, String)>),
    /// Declared charset is not UTF-8
    NotUtf8(String),
    /// Declared UTF-8 but the bytes are not valid UTF-8
    MalformedUtf8,
}

impl fmt::Display for EncodingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingIssue::Inconsistent(declarations) => {
                let parts: Vec<String> = declarations
                    .iter()
                    .map(|(source, charset)| format!("{} declares {}", source, charset))
                    .collect();
                write!(f, "inconsistent charset declarations ({})", parts.join(", "))
            }
            EncodingIssue::NotUtf8(charset) => write!(f, "charset {} is not UTF-8", charset),
            EncodingIssue::MalformedUtf8 => f.write_str("body is not valid UTF-8"),
        }
    }
}

/// Charset parameter of a `Content-Type` value
pub fn header_charset(content_type: &str) -> Option<String> {
    HEADER_CHARSET
        .as_ref()?
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Charset implied by a byte order mark
pub fn bom_charset(body: &[u8]) -> Option<&'static str> {
    if body.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some("UTF-8")
    } else if body.starts_with(&[0xFE, 0xFF]) {
        Some("UTF-16BE")
    } else if body.starts_with(&[0xFF, 0xFE]) {
        Some("UTF-16LE")
    } else {
        None
    }
}

/// `encoding` pseudo-attribute of the XML declaration
pub fn xml_declaration_encoding(body: &[u8]) -> Option<String> {
    let prefix = declaration_prefix(body);
    XML_DECLARATION_ENCODING
        .as_ref()?
        .captures(&prefix)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// Decodes enough of the body to read the XML declaration, whatever the BOM says.
fn declaration_prefix(body: &[u8]) -> String {
    const PREFIX_LEN: usize = 256;
    let utf16 = |bytes: &[u8], big_endian: bool| -> String {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .take(PREFIX_LEN)
            .map(|pair| {
                if big_endian {
                    u16::from_be_bytes([pair[0], pair[1]])
                } else {
                    u16::from_le_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
    };
    match bom_charset(body) {
        Some("UTF-16BE") => utf16(&body[2..], true),
        Some("UTF-16LE") => utf16(&body[2..], false),
        Some(_) => String::from_utf8_lossy(&body[3..body.len().min(3 + PREFIX_LEN)]).into_owned(),
        None => String::from_utf8_lossy(&body[..body.len().min(PREFIX_LEN)]).into_owned(),
    }
}

fn normalize(charset: &str) -> String {
    charset
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Verify the charset declarations of a message
pub fn check_encoding(content_type: Option<&str>, body: &[u8]) -> Result<(), EncodingIssue> {
    let mut declarations = Vec::new();
    if let Some(charset) = content_type.and_then(header_charset) {
        declarations.push((CharsetSource::HttpHeader, charset));
    }
    if let Some(charset) = bom_charset(body) {
        declarations.push((CharsetSource::ByteOrderMark, charset.to_string()));
    }
    if let Some(charset) = xml_declaration_encoding(body) {
        declarations.push((CharsetSource::XmlDeclaration, charset));
    }

    if let Some((_, first)) = declarations.first() {
        let expected = normalize(first);
        if declarations.iter().any(|(_, c)| normalize(c) != expected) {
            return Err(EncodingIssue::Inconsistent(declarations));
        }
        if expected != "utf8" {
            return Err(EncodingIssue::NotUtf8(first.clone()));
        }
    }

    let payload = body.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(body);
    if std::str::from_utf8(payload).is_err() {
        return Err(EncodingIssue::MalformedUtf8);
    }
    Ok(())
}

/// Verify the MIME type of an HTTP message
pub fn check_mime_type(content_type: Option<&str>) -> Result<(), String> {
    let content_type = content_type.ok_or_else(|| "missing Content-Type".to_string())?;
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(format!("unexpected MIME type {}", mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECL_UTF8: &str = r#"<?xml version="1.0" encoding="UTF-8"?><a/>"#;
    const DECL_LATIN1: &str = r#"<?xml version='1.0' encoding='ISO-8859-1'?><a/>"#;

    #[test]
    fn test_header_charset() {
        assert_eq!(
            header_charset("application/soap+xml; charset=utf-8").as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            header_charset("application/soap+xml;CHARSET=\"UTF-8\"").as_deref(),
            Some("UTF-8")
        );
        assert_eq!(header_charset("application/soap+xml"), None);
    }

    #[test]
    fn test_xml_declaration_encoding() {
        assert_eq!(xml_declaration_encoding(DECL_UTF8.as_bytes()).as_deref(), Some("UTF-8"));
        assert_eq!(
            xml_declaration_encoding(DECL_LATIN1.as_bytes()).as_deref(),
            Some("ISO-8859-1")
        );
        assert_eq!(xml_declaration_encoding(b"<a/>"), None);

        let mut utf16: Vec<u8> = vec![0xFF, 0xFE];
        for unit in r#"<?xml version="1.0" encoding="UTF-16"?>"#.encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(xml_declaration_encoding(&utf16).as_deref(), Some("UTF-16"));
    }

    #[test]
    fn test_consistent_utf8_passes() {
        assert!(check_encoding(Some("application/soap+xml; charset=UTF-8"), DECL_UTF8.as_bytes()).is_ok());
        assert!(check_encoding(None, b"<a/>").is_ok());

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(DECL_UTF8.as_bytes());
        assert!(check_encoding(Some("application/xml; charset=utf8"), &with_bom).is_ok());
    }

    #[test]
    fn test_inconsistent_declarations_fail() {
        let issue = check_encoding(
            Some("application/soap+xml; charset=UTF-8"),
            DECL_LATIN1.as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(issue, EncodingIssue::Inconsistent(ref d) if d.len() == 2));
        assert!(issue.to_string().contains("ISO-8859-1"));
    }

    #[test]
    fn test_non_utf8_charset_fails() {
        let issue = check_encoding(None, DECL_LATIN1.as_bytes()).unwrap_err();
        assert_eq!(issue, EncodingIssue::NotUtf8("ISO-8859-1".into()));
    }

    #[test]
    fn test_malformed_bytes_fail() {
        let issue = check_encoding(Some("application/soap+xml"), &[b'<', 0xC3, 0x28, b'>']).unwrap_err();
        assert_eq!(issue, EncodingIssue::MalformedUtf8);
    }

    #[test]
    fn test_mime_type() {
        assert!(check_mime_type(Some("application/soap+xml; charset=utf-8")).is_ok());
        assert!(check_mime_type(Some("Application/XML")).is_ok());
        assert!(check_mime_type(Some("text/xml")).unwrap_err().contains("text/xml"));
        assert!(check_mime_type(None).is_err());
    }
}

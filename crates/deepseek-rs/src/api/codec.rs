//! Wire encoding for the chat-completions exchange.
//!
//! The request body is produced by hand with a minimal string escaper, and the
//! reply text is pulled out of the response with a textual scan for the
//! `"content":"` marker. Neither direction goes through a general JSON parser:
//! the only field the client ever reads is the assistant's `content`.

use std::fmt;

/// Literal key sequence that locates the reply text in a response body.
pub const CONTENT_MARKER: &str = "\"content\":\"";

/// Escape `text` for embedding inside a JSON string literal.
///
/// Only backslash, double-quote, newline, carriage return and tab are
/// rewritten. Backslash is handled first, so the backslashes introduced by the
/// other substitutions are never escaped a second time.
pub fn escape_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_json`].
///
/// Resolves `\n`, `\r`, `\t`, `\"` and `\\` in one left-to-right pass, so a
/// backslash produced by `\\` is never re-read as the start of another
/// sequence. Any other escape is kept verbatim.
pub fn unescape_json(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Why a `200 OK` body could not be turned into reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The body carries no `"content":"` marker. Holds the raw body.
    MissingMarker { body: String },
    /// The content value has no unescaped closing quote.
    Unterminated,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingMarker { body } => {
                write!(f, "Unexpected response format from the API: {body}")
            }
            DecodeError::Unterminated => {
                write!(f, "Incomplete response from the API. Please try again.")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Extract and unescape the first `content` string value in `body`.
///
/// # Example
///
/// ```
/// use deepseek_rs::api::codec::decode_content;
///
/// let body = r#"{"choices":[{"message":{"role":"assistant","content":"a\"b\\c"}}]}"#;
/// assert_eq!(decode_content(body).unwrap(), "a\"b\\c");
/// ```
pub fn decode_content(body: &str) -> Result<String, DecodeError> {
    let Some(marker_at) = body.find(CONTENT_MARKER) else {
        return Err(DecodeError::MissingMarker {
            body: body.to_string(),
        });
    };
    let value = &body[marker_at + CONTENT_MARKER.len()..];

    let mut escaped = false;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Ok(unescape_json(&value[..i])),
            _ => {}
        }
    }
    Err(DecodeError::Unterminated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_rewrites_the_five_specials() {
        assert_eq!(
            escape_json("a\\b\"c\nd\re\tf"),
            "a\\\\b\\\"c\\nd\\re\\tf"
        );
    }

    #[test]
    fn escape_does_not_double_escape() {
        // A quote next to a backslash must yield exactly three backslashes.
        assert_eq!(escape_json("\\\""), "\\\\\\\"");
    }

    #[test]
    fn escape_leaves_other_text_alone() {
        assert_eq!(escape_json("olá, 世界 {}"), "olá, 世界 {}");
    }

    #[test]
    fn unescape_reverses_escape_for_special_mixes() {
        let alphabet = ['\\', '"', '\n', '\r', '\t', 'x'];
        // Every string of length <= 4 over the alphabet.
        let mut samples = vec![String::new()];
        let mut frontier = vec![String::new()];
        for _ in 0..4 {
            frontier = frontier
                .iter()
                .flat_map(|s| alphabet.iter().map(move |c| format!("{s}{c}")))
                .collect();
            samples.extend(frontier.iter().cloned());
        }
        for s in &samples {
            assert_eq!(&unescape_json(&escape_json(s)), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn unescape_keeps_escaped_backslash_before_letter() {
        // `C:\new` arrives as `C:\\new`; the `\n` inside must not become a newline.
        assert_eq!(unescape_json("C:\\\\new"), "C:\\new");
    }

    #[test]
    fn unescape_passes_unknown_escapes_through() {
        assert_eq!(unescape_json("a\\/b\\u0041"), "a\\/b\\u0041");
        assert_eq!(unescape_json("trailing\\"), "trailing\\");
    }

    #[test]
    fn decode_handles_escaped_quote_and_backslash() {
        let body = r#"{"content":"a\"b\\c"}"#;
        assert_eq!(decode_content(body).unwrap(), "a\"b\\c");
    }

    #[test]
    fn decode_reads_nested_completion_shape() {
        let body = concat!(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","#,
            r#""content":"Hello!\nHow can I help?"},"finish_reason":"stop"}]}"#
        );
        assert_eq!(decode_content(body).unwrap(), "Hello!\nHow can I help?");
    }

    #[test]
    fn decode_stops_at_first_unescaped_quote() {
        let body = r#"{"content":"one","other":"two"}"#;
        assert_eq!(decode_content(body).unwrap(), "one");
    }

    #[test]
    fn decode_handles_value_ending_in_escaped_backslash() {
        let body = r#"{"content":"path\\"}"#;
        assert_eq!(decode_content(body).unwrap(), "path\\");
    }

    #[test]
    fn decode_empty_content() {
        assert_eq!(decode_content(r#"{"content":""}"#).unwrap(), "");
    }

    #[test]
    fn decode_missing_marker_keeps_body_verbatim() {
        let body = r#"{"error":{"message":"model overloaded"}}"#;
        let err = decode_content(body).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingMarker {
                body: body.to_string()
            }
        );
        assert!(err.to_string().contains(body));
    }

    #[test]
    fn decode_content_null_is_a_format_mismatch() {
        // `"content":null` has no opening quote, so the marker is absent.
        let body = r#"{"content":null}"#;
        assert!(matches!(
            decode_content(body),
            Err(DecodeError::MissingMarker { .. })
        ));
    }

    #[test]
    fn decode_truncated_value_is_incomplete() {
        assert_eq!(
            decode_content(r#"{"content":"cut off"#),
            Err(DecodeError::Unterminated)
        );
        assert_eq!(
            decode_content(r#"{"content":"ends on escape\""#),
            Err(DecodeError::Unterminated)
        );
        assert_eq!(decode_content(CONTENT_MARKER), Err(DecodeError::Unterminated));
    }

    #[test]
    fn decode_multibyte_text() {
        let body = "{\"content\":\"Olá · ação \\\"ok\\\"\"}";
        assert_eq!(decode_content(body).unwrap(), "Olá · ação \"ok\"");
    }
}

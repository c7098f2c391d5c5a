//! Archive entry path sanitization.
//!
//! Entry names arrive '/'-separated and possibly URL-encoded. Each segment is
//! decoded, reduced to a conservative character set and re-joined with the
//! local separator. The result is always relative and never climbs above the
//! extraction root.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::domain::{AppError, Result};

/// Characters kept as-is in a path segment besides ASCII alphanumerics.
const ALLOWED_PUNCTUATION: &str = "_.~[]()& -";

/// Decode a query-escaped segment: `+` is a space, `%XY` a byte.
///
/// Decoded bytes that are not UTF-8 become U+FFFD, which sanitizing turns
/// into '-'.
///
/// # Errors
/// Returns error on a truncated or non-hex escape.
pub fn decode_segment(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    for (i, _) in segment.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(AppError::invalid_path(segment, "invalid percent escape"));
        }
    }

    let spaced = segment.replace('+', " ");
    Ok(percent_decode_str(&spaced).decode_utf8_lossy().into_owned())
}

/// Replace disallowed characters with '-', collapse dashes and trim them.
///
/// Idempotent: a sanitized segment is returned unchanged.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());

    for c in segment.chars() {
        let c = if c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(c) {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    out.trim_matches('-').to_string()
}

/// Turn a stored entry name into a relative destination path.
///
/// Segments that end up empty, and `.`, are dropped; `..` removes the
/// previous segment but never escapes the root. The result may be empty.
///
/// # Errors
/// Returns error if a segment cannot be decoded.
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf> {
    let mut segments: Vec<String> = Vec::new();

    for raw in name.split('/') {
        let segment = sanitize_segment(&decode_segment(raw)?);
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    Ok(segments.iter().collect())
}

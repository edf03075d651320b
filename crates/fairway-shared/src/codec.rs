//! Share codes: a profile snapshot as a copy/paste-able ASCII token.
//!
//! `snapshot -> JSON -> UTF-8 bytes -> base64url (no padding)`. The JSON
//! keeps the `{id, name, rounds}` shape so codes remain readable by older
//! installations once base64-decoded.
//!
//! Decoding is lenient about what surrounds the token (full links, chat
//! messages, stray punctuation) and strict about what is inside it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;

use crate::constants::{MIN_EMBEDDED_CODE_LEN, SHARE_CODE_PARAM};
use crate::error::ShareCodeError;
use crate::types::{ProfileSnapshot, RawSnapshot};

/// Encode a snapshot as a share code.
pub fn encode_share_code(snapshot: &ProfileSnapshot) -> Result<String, ShareCodeError> {
    let json = serde_json::to_vec(snapshot).map_err(|e| ShareCodeError::Json(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a share code out of arbitrary user input.
///
/// Accepts a bare code, a link carrying `?code=<token>`, or text with the
/// code somewhere inside it. Codes in the standard base64 alphabet
/// (`+`, `/`, `=` padding) are accepted as well.
pub fn decode_share_code(raw: &str) -> Result<ProfileSnapshot, ShareCodeError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(ShareCodeError::Empty);
    }

    let token = code_from_links(input)
        .or_else(|| longest_code_run(input).map(str::to_string))
        .unwrap_or_else(|| input.to_string());

    let cleaned = normalize_token(&token);
    if cleaned.is_empty() {
        return Err(ShareCodeError::Empty);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(cleaned.as_bytes())
        .map_err(|_| ShareCodeError::Base64)?;
    let text = String::from_utf8(bytes).map_err(|_| ShareCodeError::Utf8)?;
    let raw: RawSnapshot =
        serde_json::from_str(&text).map_err(|e| ShareCodeError::Json(e.to_string()))?;

    Ok(ProfileSnapshot::try_from(raw)?)
}

/// Build `<base>?code=<token>`, keeping any query the base already has.
pub fn share_link(base: &Url, code: &str) -> Url {
    let mut link = base.clone();
    link.query_pairs_mut().append_pair(SHARE_CODE_PARAM, code);
    link
}

/// The `code` query parameter of a link, if present.
pub fn code_param(link: &Url) -> Option<String> {
    link.query_pairs()
        .find(|(key, _)| key == SHARE_CODE_PARAM)
        // form-urlencoding turns a literal '+' into a space
        .map(|(_, value)| value.replace(' ', "+"))
        .filter(|value| !value.is_empty())
}

/// Remove the `code` parameter from a link, leaving everything else intact.
pub fn strip_code_param(link: &Url) -> Url {
    let kept: Vec<(String, String)> = link
        .query_pairs()
        .filter(|(key, _)| key != SHARE_CODE_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = link.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

fn code_from_links(input: &str) -> Option<String> {
    input
        .split_whitespace()
        .filter_map(|word| Url::parse(word).ok())
        .find_map(|link| code_param(&link))
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_')
}

/// Longest run of base64 characters, if one is long enough to be a code.
fn longest_code_run(input: &str) -> Option<&str> {
    input
        .split(|c: char| !is_code_char(c))
        .filter(|run| run.len() >= MIN_EMBEDDED_CODE_LEN)
        .fold(None, |best: Option<&str>, run| match best {
            Some(b) if b.len() >= run.len() => Some(b),
            _ => Some(run),
        })
}

/// Drop everything outside the alphabet and map standard base64 onto the
/// URL-safe alphabet.
fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| is_code_char(*c))
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

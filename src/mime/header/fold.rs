//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Swallow.
//
// Swallow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Swallow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Swallow. If not, see <http://www.gnu.org/licenses/>.

//! Tokenisation, RFC 2047 encoding and line folding shared by every header
//! kind.

use super::super::grammar;
use crate::encoder::HeaderEncoder;

/// Settings that determine how words are encoded.
pub(super) struct WordEncoding<'a> {
    pub field_name: &'a str,
    pub charset: &'a str,
    pub language: Option<&'a str>,
    pub encoder: HeaderEncoder,
}

/// Split `s` before each space or tab, and around each CRLF, keeping the CRLF
/// as a token of its own.
pub(super) fn tokenize(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in split_before_whitespace(s) {
        tokens.extend(split_lines(word));
    }
    tokens
}

/// Split `s` at each CRLF, keeping the CRLFs as separate tokens.
pub(super) fn split_lines(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = s;
    while let Some(ix) = rest.find("\r\n") {
        tokens.push(rest[..ix].to_owned());
        tokens.push("\r\n".to_owned());
        rest = &rest[ix + 2..];
    }
    tokens.push(rest.to_owned());
    tokens
}

fn split_before_whitespace(s: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    for (ix, ch) in s.char_indices() {
        if ix > 0 && (' ' == ch || '\t' == ch) {
            words.push(&s[start..ix]);
            start = ix;
        }
    }
    words.push(&s[start..]);
    words
}

/// Join `tokens` into the complete header, folding whenever a line would
/// exceed `max_line_length` or a token is a bare CRLF.
///
/// Folds are placed before a token, so the token's leading whitespace begins
/// the continuation line. The result ends with CRLF.
pub(super) fn fold(
    name: &str,
    tokens: &[String],
    max_line_length: usize,
) -> String {
    let mut lines = vec![format!("{}: ", name)];
    for (ix, token) in tokens.iter().enumerate() {
        let current_len = lines.last().map_or(0, String::len);
        let too_long = ix > 0
            && current_len > 0
            && current_len + token.len() > max_line_length;
        if "\r\n" == token || too_long {
            lines.push(String::new());
        }

        if "\r\n" != token {
            if let Some(line) = lines.last_mut() {
                line.push_str(token);
            }
        }
    }

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Whether `token` contains anything that cannot appear literally in a
/// header.
pub(super) fn needs_encoding(token: &str) -> bool {
    token.chars().any(|ch| {
        let c = ch as u32;
        '\r' == ch || '\n' == ch || (c < 0x20 && '\t' != ch) || c >= 0x7F
    })
}

/// Group `s` into tokens, merging adjacent tokens which need encoding so that
/// they become a single run of encoded words.
fn encodable_tokens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending = String::new();
    for word in split_before_whitespace(s) {
        if needs_encoding(word) {
            pending.push_str(word);
        } else {
            if !pending.is_empty() {
                tokens.push(std::mem::take(&mut pending));
            }
            tokens.push(word.to_owned());
        }
    }

    if !pending.is_empty() {
        tokens.push(pending);
    }
    tokens
}

/// Replace every run of words in `input` that cannot appear literally with
/// RFC 2047 encoded words.
///
/// `used_length` is the length of the line before the first encoded word;
/// if `None`, it is taken to be the header name plus whatever precedes the
/// word. Returns the text and whether anything was encoded.
pub(super) fn encode_words(
    input: &str,
    used_length: Option<usize>,
    enc: &WordEncoding<'_>,
) -> (String, bool) {
    let mut value = String::with_capacity(input.len());
    let mut used_length = used_length;
    let mut encoded = false;

    for token in encodable_tokens(input) {
        if !needs_encoding(&token) {
            value.push_str(&token);
            continue;
        }

        // Leading whitespace separates the encoded word from its
        // predecessor and is not itself encoded.
        let mut token = &token[..];
        if token.starts_with(' ') || token.starts_with('\t') {
            value.push_str(&token[..1]);
            token = &token[1..];
        }

        let offset = *used_length
            .get_or_insert_with(|| enc.field_name.len() + 2 + value.len());
        value.push_str(&enc.encoder.encoded_words(
            enc.charset,
            enc.language,
            token,
            offset,
        ));
        encoded = true;
    }

    (value, encoded)
}

/// Render a display name, quoting or encoding it as needed.
///
/// `first` indicates the name is at the start of the field body, in which
/// case the space taken by the header name is accounted for.
pub(super) fn phrase(
    name: &str,
    first: bool,
    enc: &WordEncoding<'_>,
) -> (String, bool) {
    if grammar::is_phrase(name) {
        (name.to_owned(), false)
    } else if grammar::is_text(name) {
        (format!("\"{}\"", grammar::escape_quoted(name)), false)
    } else {
        let used = if first { enc.field_name.len() + 2 } else { 0 };
        encode_words(name, Some(used), enc)
    }
}

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

//! The parts of the RFC 2822 and RFC 2045 grammars needed to validate and
//! quote values before they are put into headers.

use lazy_static::lazy_static;
use regex::Regex;

// RFC 2822 3.2.4 "atext", without the RFC 6532 extension since anything
// non-ASCII gets encoded
const ATEXT: &str = r"[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]";
// RFC 2822 3.2.2 "quoted-pair", restricted to ASCII
const QUOTED_PAIR: &str = r"\\[\x00-\x7F]";
// RFC 2822 3.2.5 "qtext"
const QTEXT: &str = r"[\x21\x23-\x5B\x5D-\x7E]";
// RFC 2822 3.4.1 "dtext"
const DTEXT: &str = r"[\x21-\x5A\x5E-\x7E]";

lazy_static! {
    static ref DOT_ATOM_TEXT: String = format!(r"{a}+(?:\.{a}+)*", a = ATEXT);
    static ref QUOTED_STRING: String = format!(
        r#""(?:[ \t]*(?:{q}|{p}))*[ \t]*""#,
        q = QTEXT,
        p = QUOTED_PAIR
    );
    static ref DOMAIN_LITERAL: String = format!(
        r"\[(?:[ \t]*(?:{d}|{p}))*[ \t]*\]",
        d = DTEXT,
        p = QUOTED_PAIR
    );

    static ref ADDR_SPEC: Regex = Regex::new(&format!(
        "^(?:{dot}|{qs})@(?:{dot}|{dl})$",
        dot = *DOT_ATOM_TEXT,
        qs = *QUOTED_STRING,
        dl = *DOMAIN_LITERAL,
    ))
    .unwrap();

    // RFC 2822 3.6.4 "msg-id" contents, without the obsolete forms
    static ref MSG_ID: Regex = Regex::new(&format!(
        r#"^(?:{dot}|"(?:{q}|{p})*")@(?:{dot}|\[(?:{d}|{p})*\])$"#,
        dot = *DOT_ATOM_TEXT,
        q = QTEXT,
        d = DTEXT,
        p = QUOTED_PAIR,
    ))
    .unwrap();

    // RFC 2822 3.2.6 "phrase", including the obsolete form which allows
    // periods, since "J. Random Hacker" is common
    static ref PHRASE: Regex = Regex::new(&format!(
        r"^[ \t]*(?:{a}+|{qs})(?:[ \t]*(?:{a}+|{qs}|\.))*[ \t]*$",
        a = ATEXT,
        qs = *QUOTED_STRING,
    ))
    .unwrap();

    // RFC 2822 3.2.1 "text"
    static ref TEXT: Regex =
        Regex::new(r"^[\x00-\x09\x0B\x0C\x0E-\x7F]*$").unwrap();

    // RFC 2046 5.1.1 "boundary"
    static ref BOUNDARY: Regex = Regex::new(
        r"(?i)^[a-z0-9'()+_,./:=? -]{0,69}[a-z0-9'()+_,./:=?]$"
    )
    .unwrap();

    // RFC 2045 5.1 "token"
    static ref TOKEN: Regex = Regex::new(
        r"^[\x21\x23-\x27\x2A\x2B\x2D\x2E\x30-\x39\x41-\x5A\x5E-\x7E]+$"
    )
    .unwrap();
}

/// Whether `address` is an RFC 2822 `addr-spec`, i.e., `local-part@domain`.
pub fn is_addr_spec(address: &str) -> bool {
    ADDR_SPEC.is_match(address)
}

/// Whether `id` is valid between the angle brackets of a `msg-id`.
pub fn is_msg_id(id: &str) -> bool {
    MSG_ID.is_match(id)
}

/// Whether `s` can be used as a display name as-is.
pub fn is_phrase(s: &str) -> bool {
    PHRASE.is_match(s)
}

/// Whether `s` is entirely ASCII text without line breaks.
pub fn is_text(s: &str) -> bool {
    TEXT.is_match(s)
}

pub fn is_boundary(s: &str) -> bool {
    BOUNDARY.is_match(s)
}

/// Whether `s` can be a MIME parameter value without quoting.
pub fn is_token(s: &str) -> bool {
    TOKEN.is_match(s)
}

/// Whether `s` is a valid `dot-atom-text`, such as a host name.
pub fn is_dot_atom_text(s: &str) -> bool {
    lazy_static! {
        static ref DOT_ATOM: Regex =
            Regex::new(&format!("^{}$", *DOT_ATOM_TEXT)).unwrap();
    }
    DOT_ATOM.is_match(s)
}

/// Escape `"` and `\` so that `s` can be placed within a quoted-string.
pub fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        if '"' == ch || '\\' == ch {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn addr_specs() {
        assert!(is_addr_spec("foo@example.com"));
        assert!(is_addr_spec("first.last+tag@sub.example.com"));
        assert!(is_addr_spec("\"odd local\"@example.com"));
        assert!(is_addr_spec("x@[192.168.0.1]"));
        assert!(!is_addr_spec("example.com"));
        assert!(!is_addr_spec("foo@"));
        assert!(!is_addr_spec("@example.com"));
        assert!(!is_addr_spec("foo bar@example.com"));
        assert!(!is_addr_spec("foo..bar@example.com"));
        assert!(!is_addr_spec("foo@bar@example.com"));
        assert!(!is_addr_spec("fö@example.com"));
        assert!(!is_addr_spec("foo@example.com\r\nBcc: x@y"));
    }

    #[test]
    fn msg_ids() {
        assert!(is_msg_id("1234.abcd@example.com"));
        assert!(is_msg_id("a@[literal]"));
        assert!(!is_msg_id("no-at-sign"));
        assert!(!is_msg_id("<a@b>"));
        assert!(!is_msg_id("a b@c"));
    }

    #[test]
    fn phrases() {
        assert!(is_phrase("John Smith"));
        assert!(is_phrase("J. Random Hacker"));
        assert!(is_phrase("\"Smith, John\""));
        assert!(!is_phrase("Smith, John"));
        assert!(!is_phrase("Jöhn"));
        assert!(!is_phrase(""));
        assert!(is_text("Smith, John"));
        assert!(!is_text("Jöhn"));
        assert!(!is_text("a\r\nb"));
    }

    #[test]
    fn tokens() {
        assert!(is_token("utf-8"));
        assert!(is_token("file.txt"));
        assert!(!is_token("my file.txt"));
        assert!(!is_token("a;b"));
        assert!(!is_token(""));
    }

    #[test]
    fn escaping() {
        assert_eq!(r#"say \"hi\" \\o/"#, escape_quoted(r#"say "hi" \o/"#));
    }

    #[test]
    fn boundaries() {
        assert!(is_boundary("simple"));
        assert!(is_boundary("_=_swallow_1234_abcdef_=_"));
        assert!(is_boundary("with space.x"));
        assert!(!is_boundary(""));
        assert!(!is_boundary("trailing space "));
        assert!(!is_boundary("trailing-dash-"));
        assert!(!is_boundary("semi;colon"));
        assert!(!is_boundary(&"x".repeat(71)));
        assert!(is_boundary(&"x".repeat(70)));
    }

    proptest! {
        #[test]
        fn boundary_validator_matches_rule(s in "[a-zA-Z0-9'()+_,./:=? ;\"-]{0,75}") {
            const CHARS: &str = "'()+_,./:=? -";
            let valid_char =
                |c: char| c.is_ascii_alphanumeric() || CHARS.contains(c);
            let expected = !s.is_empty()
                && s.len() <= 70
                && s.chars().all(valid_char)
                && !s.ends_with(' ')
                && !s.ends_with('-');
            prop_assert_eq!(expected, is_boundary(&s));
        }
    }
}

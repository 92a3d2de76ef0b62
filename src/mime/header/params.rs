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

//! Rendering of MIME header parameters (`name=value`), with RFC 2231
//! continuations for values too long or too foreign for a plain token.

use super::super::grammar;
use super::fold::WordEncoding;
use crate::encoder::{transcode, Rfc2231Encoder};

pub(super) struct ParamContext<'a> {
    pub words: WordEncoding<'a>,
    pub max_line_length: usize,
    pub rfc2231: Option<&'a Rfc2231Encoder>,
}

/// Render one parameter, possibly as several `name*N*=` continuations joined
/// by `;` and folding whitespace.
pub(super) fn render_parameter(
    name: &str,
    value: &str,
    cx: &ParamContext<'_>,
) -> String {
    let language = cx.words.language.unwrap_or("");
    let mut charset = cx.words.charset.to_owned();
    let mut encoded = false;
    let mut first_line_offset = 0;
    // Room for the name, an index, `=`, quotes and the `;`
    let mut max_value_len = cx
        .max_line_length
        .saturating_sub(name.len() + "=*N\"\";".len() + 1);

    if !grammar::is_token(value) && !grammar::is_text(value) {
        encoded = true;
        max_value_len = cx
            .max_line_length
            .saturating_sub(name.len() + "*N*=\"\";".len() + 1);
        first_line_offset = charset.len() + language.len() + 2;
    }

    let lines = if encoded || value.len() > max_value_len {
        match cx.rfc2231 {
            Some(rfc2231) => {
                let (label, bytes) = transcode(&charset, value);
                charset = label;
                let mut rfc2231 = rfc2231.clone();
                rfc2231.set_charset(&charset);
                rfc2231
                    .encode_string(&bytes, first_line_offset, max_value_len)
                    .split("\r\n")
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            }

            // Not strictly permitted, but what most clients expect in
            // Content-Type
            None => {
                encoded = false;
                // The words start after `name="`
                vec![cx.words.encoder.encoded_words(
                    cx.words.charset,
                    cx.words.language,
                    value,
                    name.len() + 2,
                )]
            }
        }
    } else {
        vec![value.to_owned()]
    };

    let end = |line: &str, encoded: bool, first: bool| {
        let line = if grammar::is_token(line) {
            line.to_owned()
        } else {
            format!("\"{}\"", line)
        };

        match (encoded, first) {
            (false, _) => format!("={}", line),
            (true, false) => format!("*={}", line),
            (true, true) => format!("*={}'{}'{}", charset, language, line),
        }
    };

    if lines.len() > 1 {
        lines
            .iter()
            .enumerate()
            .map(|(ix, line)| format!("{}*{}{}", name, ix, end(line, true, 0 == ix)))
            .collect::<Vec<_>>()
            .join(";\r\n ")
    } else {
        let line = lines.first().map_or("", String::as_str);
        format!("{}{}", name, end(line, encoded, true))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::HeaderEncoder;

    fn cx<'a>(rfc2231: Option<&'a Rfc2231Encoder>) -> ParamContext<'a> {
        ParamContext {
            words: WordEncoding {
                field_name: "Content-Disposition",
                charset: "utf-8",
                language: None,
                encoder: HeaderEncoder::Q,
            },
            max_line_length: 78,
            rfc2231,
        }
    }

    #[test]
    fn simple_values() {
        let e = Rfc2231Encoder::new("utf-8");
        assert_eq!("charset=utf-8", render_parameter("charset", "utf-8", &cx(Some(&e))));
        assert_eq!(
            "filename=\"my file.txt\"",
            render_parameter("filename", "my file.txt", &cx(Some(&e)))
        );
    }

    #[test]
    fn non_ascii_values_use_rfc2231() {
        let e = Rfc2231Encoder::new("utf-8");
        assert_eq!(
            "filename*=utf-8''f%C3%BCr.txt",
            render_parameter("filename", "für.txt", &cx(Some(&e)))
        );
    }

    #[test]
    fn long_values_continue() {
        let e = Rfc2231Encoder::new("utf-8");
        let value = "a".repeat(100);
        let rendered = render_parameter("filename", &value, &cx(Some(&e)));
        let lines = rendered.split(";\r\n ").collect::<Vec<_>>();
        assert_eq!(2, lines.len());
        assert!(lines[0].starts_with("filename*0*=utf-8''aaa"));
        assert!(lines[1].starts_with("filename*1*=aaa"));
        let joined: String = lines
            .iter()
            .map(|l| &l[l.rfind('=').unwrap() + 1..])
            .map(|l| l.trim_start_matches("utf-8''"))
            .collect();
        assert_eq!(value, joined);
    }

    #[test]
    fn without_rfc2231_falls_back_to_encoded_words() {
        assert_eq!(
            "name=\"=?utf-8?Q?f=C3=BCr=2Etxt?=\"",
            render_parameter("name", "für.txt", &cx(None))
        );
    }
}

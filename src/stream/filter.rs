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

//! Filters applied to bytes in flight through an `InputByteStream`.

use std::collections::BTreeMap;

pub trait StreamFilter {
    /// Whether the tail of `buffer` might be the start of a sequence this
    /// filter replaces, in which case the caller should wait for more bytes
    /// before filtering.
    fn should_buffer(&self, buffer: &[u8]) -> bool;

    fn filter(&self, buffer: &[u8]) -> Vec<u8>;
}

#[derive(Default)]
struct Node {
    children: BTreeMap<u8, usize>,
    /// Index of the pattern ending here, if any.
    terminal: Option<usize>,
}

/// Replaces any number of byte sequences in a single pass.
///
/// The search sequences are compiled into a trie, so that `\r\n`, `\r` and
/// `\n` can all be recognised at the same time. When several patterns match
/// at the same position, the one registered last wins.
pub struct ByteArrayReplacementFilter {
    nodes: Vec<Node>,
    replacements: Vec<Vec<u8>>,
    max_len: usize,
}

impl ByteArrayReplacementFilter {
    pub fn new(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        let mut this = ByteArrayReplacementFilter {
            nodes: vec![Node::default()],
            replacements: Vec::with_capacity(pairs.len()),
            max_len: 0,
        };

        for (search, replace) in pairs {
            if search.is_empty() {
                continue;
            }

            let mut node = 0;
            for &b in &search {
                node = match this.nodes[node].children.get(&b) {
                    Some(&next) => next,
                    None => {
                        this.nodes.push(Node::default());
                        let next = this.nodes.len() - 1;
                        this.nodes[node].children.insert(b, next);
                        next
                    }
                };
            }

            this.nodes[node].terminal = Some(this.replacements.len());
            this.replacements.push(replace);
            this.max_len = this.max_len.max(search.len());
        }

        this
    }

    /// A filter turning every line ending (`\r\n`, bare `\r` or bare `\n`)
    /// into `\r\n`.
    pub fn canonical_line_endings() -> Self {
        ByteArrayReplacementFilter::new(vec![
            (b"\r".to_vec(), b"\r\n".to_vec()),
            (b"\n".to_vec(), b"\r\n".to_vec()),
            (b"\r\n".to_vec(), b"\r\n".to_vec()),
        ])
    }

    /// Filter `buffer`, only considering patterns whose index is greater
    /// than `min_index`.
    ///
    /// This lets a caller which has already applied the patterns up to some
    /// index run the rest without matching the same slot twice.
    pub fn filter_from(
        &self,
        buffer: &[u8],
        min_index: Option<usize>,
    ) -> Vec<u8> {
        if 0 == self.max_len {
            return buffer.to_vec();
        }

        let mut out = Vec::with_capacity(buffer.len() + buffer.len() / 16);
        let mut i = 0;
        while i < buffer.len() {
            let mut node = 0;
            let mut best: Option<(usize, usize)> = None;
            for (j, b) in buffer[i..].iter().enumerate() {
                node = match self.nodes[node].children.get(b) {
                    Some(&next) => next,
                    None => break,
                };

                if let Some(ix) = self.nodes[node].terminal {
                    let eligible = min_index.map_or(true, |min| ix > min);
                    let better = best.map_or(true, |(b, _)| ix > b);
                    if eligible && better {
                        best = Some((ix, j + 1));
                    }
                }
            }

            match best {
                Some((ix, len)) => {
                    out.extend_from_slice(&self.replacements[ix]);
                    i += len;
                }
                None => {
                    out.push(buffer[i]);
                    i += 1;
                }
            }
        }

        out
    }
}

impl StreamFilter for ByteArrayReplacementFilter {
    fn should_buffer(&self, buffer: &[u8]) -> bool {
        let start = buffer.len().saturating_sub(self.max_len.saturating_sub(1));
        (start..buffer.len()).any(|s| {
            let mut node = 0;
            for b in &buffer[s..] {
                node = match self.nodes[node].children.get(b) {
                    Some(&next) => next,
                    None => return false,
                };
            }
            !self.nodes[node].children.is_empty()
        })
    }

    fn filter(&self, buffer: &[u8]) -> Vec<u8> {
        self.filter_from(buffer, None)
    }
}

/// Replaces byte strings one pattern at a time, each pattern being applied to
/// the output of the previous one.
pub struct StringReplacementFilter {
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
}

impl StringReplacementFilter {
    pub fn new(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        StringReplacementFilter {
            pairs: pairs.into_iter().filter(|p| !p.0.is_empty()).collect(),
        }
    }
}

impl StreamFilter for StringReplacementFilter {
    fn should_buffer(&self, buffer: &[u8]) -> bool {
        self.pairs.iter().any(|&(ref needle, _)| {
            let longest = buffer.len().min(needle.len() - 1);
            (1..=longest)
                .any(|n| needle.starts_with(&buffer[buffer.len() - n..]))
        })
    }

    fn filter(&self, buffer: &[u8]) -> Vec<u8> {
        let mut data = buffer.to_vec();
        for &(ref needle, ref replacement) in &self.pairs {
            data = replace_all(&data, needle, replacement);
        }
        data
    }
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut copied = 0;
    for candidate in memchr::memchr_iter(needle[0], haystack) {
        if candidate < copied {
            continue;
        }

        if haystack[candidate..].starts_with(needle) {
            out.extend_from_slice(&haystack[copied..candidate]);
            out.extend_from_slice(replacement);
            copied = candidate + needle.len();
        }
    }
    out.extend_from_slice(&haystack[copied..]);
    out
}

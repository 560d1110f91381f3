// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Decoder for Oracle's wrapped PL/SQL distribution format.
//!
//! A wrapped file carries a `CREATE … <type> <name> WRAPPED` declaration
//! (possibly split over several lines), a length header of two hex
//! numbers, and a base64 payload. The decoded payload is a 20-byte SHA-1
//! checksum followed by a zlib stream whose bytes went through the fixed
//! substitution table in [`crate::charmap`]. Inflating it yields the
//! original source minus its `CREATE` prefix, which is reconstructed from
//! the declaration.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::bytes::Regex;

use crate::charmap::CHARMAP;
use crate::error::UnwrapError;
use crate::util;

lazy_static! {
    /// The wrapped declaration, searched in the rolling comment-stripped
    /// declaration buffer. Triggers cannot be wrapped, so the type
    /// alternation is narrower than the normalizer's.
    static ref DECLARATION: Regex = Regex::new(
        r"(?i-u)(?P<create_suffix>create\s+(or\s+replace\s+)?)(?P<object_type>package\s+body|package|procedure|function)\s+(?P<object_name>.*)\s+wrapped(\s+|$)"
    )
    .unwrap();

    /// Comments disappear from the declaration before it is parsed.
    static ref COMMENT: Regex = Regex::new(r"(?s-u)(/\*.*?\*/|--[^\n]*?\n)").unwrap();

    /// The length header: two hex numbers, the second being the base64
    /// payload length in characters (newlines included).
    static ref LENGTH_HEADER: Regex = Regex::new(r"(?-u)^[0-9a-f]+ ([0-9a-f]+)$").unwrap();
}

/// The declaration parts needed to rebuild the `CREATE` prefix.
struct Declaration {
    span: (usize, usize),
    create_suffix: Vec<u8>,
    object_type: Vec<u8>,
    object_name: Vec<u8>,
}

fn parse_declaration(buffer: &[u8]) -> Option<Declaration> {
    let caps = DECLARATION.captures(buffer)?;
    let whole = caps.get(0)?;
    Some(Declaration {
        span: (whole.start(), whole.end()),
        create_suffix: caps.name("create_suffix")?.as_bytes().to_ascii_uppercase(),
        object_type: util::collapse_spaces(
            &caps.name("object_type")?.as_bytes().to_ascii_uppercase(),
        ),
        object_name: caps.name("object_name")?.as_bytes().to_ascii_uppercase(),
    })
}

/// The schema-qualified part of a dotted object name, up to (and
/// excluding) the first dot outside double quotes.
fn schema_prefix(object_name: &[u8]) -> Vec<u8> {
    let mut schema = Vec::new();
    let mut quoted = false;
    for part in object_name.split(|&b| b == b'.') {
        if !schema.is_empty() {
            schema.push(b'.');
        }
        schema.extend_from_slice(part);
        if part.iter().filter(|&&b| b == b'"').count() % 2 == 1 {
            quoted = !quoted;
        }
        if !quoted {
            break;
        }
    }
    schema
}

/// Front-end for the unwrap codec.
///
/// The matching wrap direction shells out to Oracle's proprietary `wrap`
/// binary and is deliberately not part of this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Wrapper;

impl Wrapper {
    pub fn new() -> Self {
        Self
    }

    /// Decodes every wrapped object in `input` and returns the restored
    /// source.
    pub fn unwrap<R: BufRead>(&self, input: R) -> Result<Vec<u8>, UnwrapError> {
        let mut out = Vec::new();
        self.unwrap_to(input, &mut out)?;
        Ok(out)
    }

    /// Decodes every wrapped object in `input` into `out`.
    pub fn unwrap_to<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut out: W,
    ) -> Result<(), UnwrapError> {
        let mut declaration_buffer: Vec<u8> = Vec::new();
        let mut carry: Vec<u8> = Vec::new();
        let mut decoded_objects = 0usize;
        let mut raw = Vec::new();

        loop {
            raw.clear();
            if input.read_until(b'\n', &mut raw)? == 0 {
                break;
            }

            let line = COMMENT.replace_all(&raw, &b" "[..]);
            let line = util::trim(&line).to_vec();
            if line.is_empty() {
                continue;
            }

            let Some(declaration) = parse_declaration(&declaration_buffer) else {
                declaration_buffer.push(b' ');
                declaration_buffer.extend_from_slice(&line);
                let stripped = COMMENT
                    .replace_all(&declaration_buffer, &b""[..])
                    .into_owned();
                declaration_buffer = stripped;
                continue;
            };
            declaration_buffer =
                declaration_buffer[declaration.span.0..declaration.span.1].to_vec();
            trace!(
                "wrapped declaration: {} {}",
                String::from_utf8_lossy(&declaration.object_type),
                String::from_utf8_lossy(&declaration.object_name),
            );

            let Some(header) = LENGTH_HEADER
                .captures(&line)
                .and_then(|caps| caps.get(1).map(|g| g.as_bytes().to_vec()))
            else {
                continue;
            };
            let expected = parse_hex(&header)?;
            debug!("expecting {expected} base64 characters");

            // The announced length counts newline bytes; carriage returns
            // are dropped before counting.
            let mut payload: Vec<u8> = Vec::new();
            let mut chunk = Vec::new();
            while payload.len() < expected {
                chunk.clear();
                if input.read_until(b'\n', &mut chunk)? == 0 {
                    break;
                }
                chunk.retain(|&b| b != b'\r');
                if chunk.is_empty() {
                    continue;
                }
                payload.extend_from_slice(&chunk);
            }
            if payload.len() < expected {
                return Err(UnwrapError::TruncatedPayload {
                    expected,
                    got: payload.len(),
                });
            }
            if payload.len() > expected {
                // Whatever follows the payload opens the next declaration.
                carry = payload.split_off(expected);
            }
            payload.retain(|&b| b != b'\n');

            let mut text = decode_payload(&payload)?;
            text.push(b'\n');

            if text.to_ascii_uppercase().starts_with(&declaration.object_type) {
                let mut prefix = declaration.create_suffix.clone();
                prefix.extend_from_slice(&declaration.object_type);
                let mut prefix = util::collapse_spaces(util::trim(&prefix));

                if declaration.object_name.contains(&b'.') {
                    prefix.push(b' ');
                    prefix.extend_from_slice(&schema_prefix(&declaration.object_name));
                    prefix.push(b'.');
                } else {
                    prefix.push(b' ');
                }

                text = restore_prefix(&text, &declaration.object_type, &prefix);
                text.retain(|&b| b != 0);
            }

            out.write_all(&text)?;
            decoded_objects += 1;
            declaration_buffer = std::mem::take(&mut carry);
        }

        if decoded_objects == 0 {
            return Err(UnwrapError::NotWrapped);
        }
        out.flush()?;
        Ok(())
    }

    /// Decodes the wrapped file at `path`. With `write_to` set the output
    /// goes to that file and `None` is returned; otherwise the restored
    /// bytes come back.
    pub fn unwrap_path(
        &self,
        path: &Path,
        write_to: Option<&Path>,
    ) -> Result<Option<Vec<u8>>, UnwrapError> {
        let input = BufReader::new(File::open(path)?);
        match write_to {
            Some(target) => {
                let mut out = File::create(target)?;
                self.unwrap_to(input, &mut out)?;
                Ok(None)
            }
            None => self.unwrap(input).map(Some),
        }
    }
}

fn parse_hex(digits: &[u8]) -> Result<usize, UnwrapError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| {
            UnwrapError::CorruptPayload(format!(
                "unusable length header '{}'",
                String::from_utf8_lossy(digits)
            ))
        })
}

/// base64 → drop the 20-byte SHA-1 → substitute → inflate.
fn decode_payload(payload: &[u8]) -> Result<Vec<u8>, UnwrapError> {
    let decoded = BASE64
        .decode(payload)
        .map_err(|err| UnwrapError::CorruptPayload(format!("base64: {err}")))?;

    let substituted: Vec<u8> = decoded
        .get(20..)
        .unwrap_or_default()
        .iter()
        .map(|&b| CHARMAP[b as usize])
        .collect();

    let mut inflated = Vec::new();
    ZlibDecoder::new(substituted.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|err| UnwrapError::CorruptPayload(format!("zlib: {err}")))?;
    Ok(inflated)
}

/// Swaps the bare `<object_type>\s+` at the start of the inflated text for
/// the reconstructed `CREATE` prefix. The caller already verified the text
/// starts with the object type (case-insensitively).
fn restore_prefix(text: &[u8], object_type: &[u8], prefix: &[u8]) -> Vec<u8> {
    let mut rest = object_type.len();
    while rest < text.len() && util::is_space(text[rest]) {
        rest += 1;
    }
    if rest == object_type.len() {
        // No whitespace after the keyword, nothing to replace.
        return text.to_vec();
    }
    [prefix, &text[rest..]].concat()
}

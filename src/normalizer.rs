// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Implements the normalizing pass over PL/SQL source.
//!
//! The pass reads the input line by line and splits each line on the
//! earliest byte-pattern match. Splitting recurses into the remainder of
//! the line, so a line with several context boundaries (comments, string
//! literals, quoted identifiers) is handled piecewise: every slice is
//! filtered according to the active lexical context and the flag set, then
//! the pieces are joined back under the whitespace-collapsing rules of the
//! declaration grammar.
//!
//! While slicing, the pass recognizes the declaration
//! `CREATE [OR REPLACE] (PROCEDURE|FUNCTION|PACKAGE [BODY]|TRIGGER) <name>
//! (AS|IS|WRAPPED)` and records what it found; the inspection predicates
//! run a full pass into a discarded sink and just look at that record.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use lazy_static::lazy_static;
use log::debug;
use regex::bytes::Regex;

use crate::error::NormalizeError;
use crate::flags::NormalizeFlags;
use crate::matcher::{self, EndPattern, MatchKind};
use crate::util;

/// Budget for context boundaries on a single line; exhausting it surfaces
/// as an error instead of blowing the stack.
const MAX_LINE_SPLITS: usize = 1000;

lazy_static! {
    /// A statement terminator already present at the end of a normalized
    /// line, e.g. `end;\n/\n`.
    static ref TRAILING_SLASH: Regex = Regex::new(r"(?-u)(^|\s+)/(\s+)?(\n)?$").unwrap();
}

/// The lexical region the pass is currently inside of. At most one region
/// is active at any byte position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Context {
    Comment,
    Literal,
    ObjectName,
}

impl Context {
    fn kind(self) -> MatchKind {
        match self {
            Self::Comment => MatchKind::Comment,
            Self::Literal => MatchKind::Literal,
            Self::ObjectName => MatchKind::ObjectName,
        }
    }
}

/// Everything a single pass learns about its input.
///
/// Owned by the pass and dropped with it; nothing is shared between calls.
#[derive(Debug, Default)]
struct ParseState {
    context: Option<Context>,
    end_pattern: Option<EndPattern>,
    wrapped: bool,
    create_found: bool,
    or_found: bool,
    replace_found: bool,
    as_found: bool,
    object_type: Option<String>,
    object_name: Option<String>,
    /// The next object-name slice feeds the accumulated name.
    object_name_append: bool,
    /// The quoted identifier holds word characters only, so its quotes are
    /// dropped from the output and the accumulated name.
    object_name_remove_quotes: bool,
}

impl ParseState {
    fn in_context(&self) -> bool {
        self.context.is_some() && self.end_pattern.is_some()
    }
}

struct Machine<'a> {
    flags: &'a NormalizeFlags,
    state: ParseState,
}

impl<'a> Machine<'a> {
    fn new(flags: &'a NormalizeFlags) -> Self {
        Self {
            flags,
            state: ParseState::default(),
        }
    }

    /// Drives a whole input through the pass, writing the normalized lines
    /// to `out` and joining them under the declaration-phase rules.
    fn run<R: BufRead, W: Write>(
        &mut self,
        mut input: R,
        line_limit: Option<usize>,
        mut out: W,
    ) -> Result<(), NormalizeError> {
        // The terminator is dropped again if the last meaningful line
        // already carries one, or if a line limit cuts the pass short.
        let mut add_slash = !self.flags.comments_only;
        let mut end_space = true;
        let mut out_ends_space = false;
        let mut lines_done = 0usize;
        let mut line = Vec::new();

        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }

            // Captured before normalizing: the line join below must see the
            // phase the line started in, not the one it ended in.
            let as_found = self.state.as_found;
            let wrapped = self.state.wrapped;
            let in_context = self.state.in_context();

            let mut normalized = self.normalize_line(&line, 0)?;

            if self.flags.no_spaces || (!as_found && !wrapped) {
                if !end_space && !in_context && !util::starts_with_space(&normalized) {
                    out.write_all(b" ")?;
                    out_ends_space = true;
                } else if end_space && util::starts_with_space(&normalized) {
                    normalized = util::trim_start(&normalized).to_vec();
                }
            }

            out.write_all(&normalized)?;
            if let Some(&last) = normalized.last() {
                out_ends_space = util::is_space(last);
            }
            lines_done += 1;

            if line_limit.map_or(false, |limit| limit > 0 && lines_done >= limit) {
                debug!("line limit of {lines_done} reached, stopping early");
                add_slash = false;
                break;
            }

            if !self.flags.comments_only && !util::trim(&normalized).is_empty() {
                add_slash = !TRAILING_SLASH.is_match(&normalized);
            }

            if (self.flags.no_spaces || (!wrapped && !as_found))
                && !in_context
                && !normalized.is_empty()
            {
                if !util::trim(&normalized).is_empty() {
                    end_space = util::ends_with_space(&normalized);
                }
            } else {
                end_space = true;
            }
        }

        if add_slash {
            let terminator: &[u8] = if !self.flags.no_spaces {
                b"\n\n/"
            } else if out_ends_space {
                b"/"
            } else {
                b" /"
            };
            out.write_all(terminator)?;
        }
        out.flush()?;

        if self.state.object_type.is_none() {
            return Err(NormalizeError::MissingObjectMetadata("type"));
        }
        if self.state.object_name.is_none() {
            return Err(NormalizeError::MissingObjectMetadata("name"));
        }

        Ok(())
    }

    /// Normalizes one line, recursing on the remainder after each pattern
    /// match.
    fn normalize_line(&mut self, line: &[u8], depth: usize) -> Result<Vec<u8>, NormalizeError> {
        if line.is_empty() {
            return Ok(Vec::new());
        }
        if depth >= MAX_LINE_SPLITS {
            return Err(NormalizeError::NestingTooDeep);
        }

        // Windows newlines are dropped unconditionally.
        let line: Vec<u8> = line.iter().copied().filter(|&b| b != b'\r').collect();

        if self.state.wrapped {
            // The wrapped blob must not contain declaration keywords at
            // top level; everything else passes through untouched.
            if matcher::find_declaration(&line).is_some() {
                return Err(NormalizeError::MalformedWrapped(
                    String::from_utf8_lossy(util::trim(&line)).into_owned(),
                ));
            }
            if self.flags.comments_only {
                return Ok(Vec::new());
            }
            return Ok(line);
        }

        if let (Some(context), Some(end)) = (self.state.context, self.state.end_pattern.clone()) {
            return self.close_context(&line, context, &end, depth);
        }

        let Some(found) = matcher::find_any(&line) else {
            // No pattern on this line. If the declaration still lacks a
            // name while the type is known, the first bare token is it.
            if self.state.object_type.is_some()
                && self.state.object_name.is_none()
                && !util::trim(&line).is_empty()
            {
                self.set_object_name_from(&line)?;
            }
            return self.filter_content(&line);
        };

        let before = self.filter_content(&line[..found.start])?;
        let mut joining = line[found.start..found.end].to_vec();
        let after = &line[found.end..];
        self.state.end_pattern = found.end_pattern.clone();

        if self.state.object_type.is_some()
            && self.state.object_name.is_none()
            && !util::trim(&line[..found.start]).is_empty()
        {
            self.set_object_name_from(&line[..found.start])?;
        }

        match found.kind {
            MatchKind::Comment => {
                self.state.context = Some(Context::Comment);
                if self.flags.comments_only {
                    // Emitted comments should not carry their indentation.
                    joining = util::trim_start(&joining).to_vec();
                }
            }
            MatchKind::ObjectName => {
                self.state.context = Some(Context::ObjectName);
                if self.state.create_found && !self.state.as_found {
                    self.state.object_name_append = true;
                    let closes_here = self
                        .state
                        .end_pattern
                        .as_ref()
                        .and_then(|end| end.find(after));
                    if let Some((close, _)) = closes_here {
                        if after[..close].iter().all(|&b| is_word_byte(b)) {
                            self.state.object_name_remove_quotes = true;
                        }
                    }
                }
            }
            MatchKind::Literal => {
                self.state.context = Some(Context::Literal);
            }
            MatchKind::Create if !self.state.create_found => {
                self.state.create_found = true;
            }
            _ if !self.state.create_found => {
                // Before `CREATE` nothing but comments is of interest.
            }
            kind if !self.state.as_found => {
                self.declaration_keyword(kind, &mut joining)?;
            }
            kind => {
                if matches!(kind, MatchKind::Create | MatchKind::Replace | MatchKind::Wrapped) {
                    return Err(NormalizeError::Syntax(format!(
                        "'{}' keyword inside an object body",
                        keyword_name(kind),
                    )));
                }
            }
        }

        if found.kind != MatchKind::Literal || self.flags.comments_only {
            joining = self.filter_content(&joining)?;
        }

        let after = self.normalize_line(after, depth + 1)?;
        Ok(self.join_line(&before, &joining, &after, found.kind, true))
    }

    /// Handles a line while a comment, literal or quoted identifier is
    /// open: either the whole line belongs to the context, or the context
    /// closes somewhere on it and the remainder is processed afresh.
    fn close_context(
        &mut self,
        line: &[u8],
        context: Context,
        end: &EndPattern,
        depth: usize,
    ) -> Result<Vec<u8>, NormalizeError> {
        let Some((start, stop)) = end.find(line) else {
            return self.filter_content(line);
        };

        let before = self.filter_content(&line[..start])?;
        let joining_raw = &line[start..stop];
        let mut joining = if context != Context::Literal || self.flags.comments_only {
            self.filter_content(joining_raw)?
        } else {
            joining_raw.to_vec()
        };

        self.state.context = None;
        self.state.end_pattern = None;

        let mut after = line[stop..].to_vec();
        match context {
            Context::Comment => {
                if (self.flags.no_comments || !self.state.as_found) && joining_raw.ends_with(b"\n")
                {
                    // Removing a comment must not glue the surrounding
                    // statements onto one line.
                    after.insert(0, b'\n');
                }
                if self.flags.comments_only && !joining.ends_with(b"\n") {
                    joining.push(b'\n');
                }
            }
            Context::ObjectName => {
                self.state.object_name_remove_quotes = false;
            }
            Context::Literal => {}
        }

        let after = self.normalize_line(&after, depth + 1)?;
        Ok(self.join_line(&before, &joining, &after, context.kind(), false))
    }

    /// Declaration-phase keyword dispatch, between `CREATE` and `AS`/`IS`/
    /// `WRAPPED`.
    fn declaration_keyword(
        &mut self,
        kind: MatchKind,
        joining: &mut Vec<u8>,
    ) -> Result<(), NormalizeError> {
        match kind {
            MatchKind::Or => self.state.or_found = true,
            MatchKind::Replace => {
                if !self.state.or_found {
                    return Err(NormalizeError::Syntax(
                        "'replace' found before 'or'".to_owned(),
                    ));
                }
                self.state.replace_found = true;
            }
            MatchKind::ObjectType => {
                joining.make_ascii_uppercase();
                let token = String::from_utf8_lossy(util::trim(joining)).into_owned();
                match self.state.object_type.take() {
                    None => self.state.object_type = Some(token),
                    Some(current) if current == "PACKAGE" && token == "BODY" => {
                        self.state.object_type = Some(format!("{current} {token}"));
                    }
                    Some(current) => {
                        return Err(NormalizeError::UnsupportedObjectType(format!(
                            "{current} {token}"
                        )));
                    }
                }
            }
            MatchKind::As | MatchKind::Wrapped => {
                let token = String::from_utf8_lossy(util::trim(joining)).into_owned();
                if self.state.object_type.is_none() {
                    return Err(NormalizeError::Syntax(format!(
                        "keyword '{token}' found in declaration but object type is not detected"
                    )));
                }
                if self.state.object_name.is_none() {
                    return Err(NormalizeError::Syntax(format!(
                        "keyword '{token}' found in declaration but object name is not parsed"
                    )));
                }
                joining.make_ascii_uppercase();
                if kind == MatchKind::As {
                    self.state.as_found = true;
                } else {
                    self.state.wrapped = true;
                }
            }
            MatchKind::Create => {
                return Err(NormalizeError::Syntax(
                    "keyword 'create' is duplicated in object definition".to_owned(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Transforms one slice according to the active context and the flag
    /// set. This is the only place output bytes come from.
    fn filter_content(&mut self, line: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        if self.flags.comments_only {
            if self.state.context == Some(Context::Comment) {
                return Ok(line.to_vec());
            }
            // Object type and name are still parsed in this mode.
            if self.state.object_name_append {
                self.append_object_name(line)?;
            }
            return Ok(Vec::new());
        }

        if self.state.context == Some(Context::Comment) {
            if self.flags.no_comments {
                return Ok(Vec::new());
            }
            // Comments in the declaration are dropped to keep the prefix
            // canonical.
            if !self.state.as_found && !self.state.wrapped {
                return Ok(Vec::new());
            }
            return Ok(line.to_vec());
        }

        // Everything before `CREATE` is discarded.
        if !self.state.create_found {
            return Ok(Vec::new());
        }

        if self.state.object_name_append {
            self.append_object_name(line)?;
        }

        if self.state.context == Some(Context::ObjectName) {
            let mut slice = line.to_vec();
            if self.flags.uppercase || !self.state.as_found {
                slice.make_ascii_uppercase();
            }
            if self.state.object_name_remove_quotes {
                slice.retain(|&b| b != b'"');
            }
            return Ok(slice);
        }

        if self.state.context == Some(Context::Literal) {
            if self.flags.no_literals {
                return Ok(Vec::new());
            }
            return Ok(line.to_vec());
        }

        let trimmed = util::trim_start(line);
        let mut slice = if trimmed.to_ascii_uppercase().starts_with(b"CREATE") {
            trimmed.to_vec()
        } else {
            line.to_vec()
        };

        // The declaration prefix is upper-cased and aligned into one line
        // no matter the flags.
        if self.flags.uppercase || !self.state.as_found {
            slice.make_ascii_uppercase();
        }
        if self.flags.no_spaces || !self.state.as_found {
            slice = util::collapse_spaces(&slice);
        }

        Ok(slice)
    }

    /// Feeds one slice into the accumulated object name. Never called for
    /// comment or literal slices.
    fn append_object_name(&mut self, line: &[u8]) -> Result<(), NormalizeError> {
        let mut to_append = line.to_ascii_uppercase();
        if self.state.object_name_remove_quotes {
            to_append.retain(|&b| b != b'"');
        }

        if self.state.context != Some(Context::ObjectName) {
            // Outside the quoted identifier only the first bare word still
            // belongs to the name; trailing whitespace ends the append.
            to_append = util::first_token(&to_append).to_vec();
            self.state.object_name_append = line.iter().copied().any(util::is_space);
        }

        if !to_append.is_empty() {
            let chunk = decode_identifier(&to_append)?;
            match self.state.object_name.as_mut() {
                Some(name) => name.push_str(&chunk),
                None => self.state.object_name = Some(chunk),
            }
        }

        Ok(())
    }

    /// Takes the first whitespace-delimited token of `slice` as the object
    /// name; empty tokens leave the name unset.
    fn set_object_name_from(&mut self, slice: &[u8]) -> Result<(), NormalizeError> {
        let token = util::first_token(&util::trim(slice).to_ascii_uppercase()).to_vec();
        if !token.is_empty() {
            self.state.object_name = Some(decode_identifier(&token)?);
        }
        Ok(())
    }

    /// Reassembles a split line. Outside the body (and without
    /// `no_spaces`), whitespace is collapsed at the slice boundaries so
    /// the declaration prefix ends up single-space delimited; enclosing
    /// contexts keep their interior untouched.
    fn join_line(
        &self,
        before: &[u8],
        joining: &[u8],
        after: &[u8],
        kind: MatchKind,
        opening: bool,
    ) -> Vec<u8> {
        if !self.flags.no_spaces
            && (self.state.as_found
                || self.state.wrapped
                || (kind == MatchKind::Comment && self.flags.comments_only))
        {
            return [before, joining, after].concat();
        }

        let enclosing = kind.is_enclosing();

        let mut result = if !enclosing || opening {
            util::collapse_spaces(before)
        } else {
            before.to_vec()
        };
        let mut joining = if !enclosing {
            util::collapse_spaces(joining)
        } else {
            joining.to_vec()
        };

        if (util::ends_with_space(&result) && !enclosing) || (enclosing && opening) {
            joining = util::trim_start(&joining).to_vec();
        }
        result.extend_from_slice(&joining);

        if util::ends_with_space(&result)
            && util::starts_with_space(after)
            && (!enclosing || !opening || joining.is_empty())
        {
            result.truncate(util::trim_end(&result).len());
        }
        result.extend_from_slice(after);

        result
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn keyword_name(kind: MatchKind) -> &'static str {
    match kind {
        MatchKind::Create => "create",
        MatchKind::Replace => "replace",
        MatchKind::Wrapped => "wrapped",
        MatchKind::Or => "or",
        MatchKind::As => "as",
        MatchKind::ObjectType => "object type",
        MatchKind::ObjectName => "object name",
        MatchKind::Literal => "literal",
        MatchKind::Comment => "comment",
    }
}

fn decode_identifier(bytes: &[u8]) -> Result<String, NormalizeError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| NormalizeError::Encoding(String::from_utf8_lossy(bytes).into_owned()))
}

/// Streaming PL/SQL normalizer.
///
/// Stateless; every operation owns its parse state for exactly one pass,
/// so calls may be freely interleaved on one instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes `input` and returns the transformed bytes.
    pub fn normalize<R: BufRead>(
        &self,
        input: R,
        flags: &NormalizeFlags,
        line_limit: Option<usize>,
    ) -> Result<Vec<u8>, NormalizeError> {
        let mut out = Vec::new();
        self.normalize_to(input, flags, line_limit, &mut out)?;
        Ok(out)
    }

    /// Normalizes `input` into `out`, streaming line by line.
    pub fn normalize_to<R: BufRead, W: Write>(
        &self,
        input: R,
        flags: &NormalizeFlags,
        line_limit: Option<usize>,
        out: W,
    ) -> Result<(), NormalizeError> {
        flags.validate()?;
        Machine::new(flags).run(input, line_limit, out)
    }

    /// Normalizes the file at `path`. With `write_to` set the output goes
    /// to that file and `None` is returned; otherwise the transformed
    /// bytes come back.
    pub fn normalize_path(
        &self,
        path: &Path,
        flags: &NormalizeFlags,
        line_limit: Option<usize>,
        write_to: Option<&Path>,
    ) -> Result<Option<Vec<u8>>, NormalizeError> {
        let input = BufReader::new(File::open(path)?);
        match write_to {
            Some(target) => {
                let mut out = File::create(target)?;
                self.normalize_to(input, flags, line_limit, &mut out)?;
                Ok(None)
            }
            None => self.normalize(input, flags, line_limit).map(Some),
        }
    }

    /// Whether the input parses as a `CREATE … <type> <name>` PL/SQL
    /// object. Never fails: any normalization error reads as "no".
    pub fn is_sql<R: BufRead>(&self, input: R) -> bool {
        let state = self.inspect(input);
        state.create_found && state.object_type.is_some() && state.object_name.is_some()
    }

    pub fn is_sql_path(&self, path: &Path) -> Result<bool, NormalizeError> {
        Ok(self.is_sql(BufReader::new(File::open(path)?)))
    }

    /// Whether the input is a wrapped PL/SQL object.
    pub fn is_wrapped<R: BufRead>(&self, input: R) -> bool {
        let state = self.inspect(input);
        state.create_found
            && state.object_type.is_some()
            && state.object_name.is_some()
            && state.wrapped
    }

    pub fn is_wrapped_path(&self, path: &Path) -> Result<bool, NormalizeError> {
        Ok(self.is_wrapped(BufReader::new(File::open(path)?)))
    }

    /// Whether the input could be fed to Oracle's `wrap`: a plain (not yet
    /// wrapped) procedure, function or package body.
    pub fn is_wrappable<R: BufRead>(&self, input: R) -> bool {
        let state = self.inspect(input);
        state.create_found
            && state.object_name.is_some()
            && state.as_found
            && matches!(
                state.object_type.as_deref(),
                Some("PROCEDURE" | "FUNCTION" | "PACKAGE BODY")
            )
    }

    pub fn is_wrappable_path(&self, path: &Path) -> Result<bool, NormalizeError> {
        Ok(self.is_wrappable(BufReader::new(File::open(path)?)))
    }

    /// Runs a full normalization into a sink and hands back whatever the
    /// declaration parse picked up. Errors are intentionally swallowed
    /// here; a sample that does not normalize is simply not PL/SQL.
    fn inspect<R: BufRead>(&self, input: R) -> ParseState {
        let flags = NormalizeFlags {
            no_literals: true,
            ..NormalizeFlags::full()
        };
        let mut machine = Machine::new(&flags);
        match machine.run(input, None, io::sink()) {
            Ok(()) => machine.state,
            Err(err) => {
                debug!("inspection pass discarded: {err}");
                ParseState::default()
            }
        }
    }
}

// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Earliest-match scanning over the declaration and body pattern tables.
//!
//! All patterns operate on raw bytes with Unicode matching disabled, so
//! `\s` and `.` mean single bytes exactly like the lexical rules they
//! implement. Declaration keywords are guarded by `(\s|^)…(\s|$)`; the
//! reported span therefore covers the guarding whitespace byte on either
//! side when present, and the state machine splits lines on those exact
//! spans.

use lazy_static::lazy_static;
use regex::bytes::Regex;

/// What a start-pattern hit means to the state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MatchKind {
    Create,
    Or,
    Replace,
    ObjectType,
    As,
    Wrapped,
    ObjectName,
    Literal,
    Comment,
}

impl MatchKind {
    /// Contexts that enclose their content until an end pattern closes them.
    pub(crate) fn is_enclosing(self) -> bool {
        matches!(self, Self::ObjectName | Self::Literal | Self::Comment)
    }
}

/// A context-closing byte sequence, searched by plain scan.
///
/// Every closer is a fixed string: `"` for quoted identifiers, `'` for
/// plain literals, `\n` or `*/` for comments, and close-delimiter + `'`
/// for `q'X…X'` literals.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct EndPattern(Vec<u8>);

impl EndPattern {
    pub(crate) fn find(&self, haystack: &[u8]) -> Option<(usize, usize)> {
        let needle = self.0.as_slice();
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|start| (start, start + needle.len()))
    }
}

/// The earliest start-pattern hit on a line.
#[derive(Clone, Debug)]
pub(crate) struct PatternMatch {
    pub(crate) kind: MatchKind,
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) end_pattern: Option<EndPattern>,
}

enum EndSpec {
    None,
    Fixed(&'static [u8]),
    /// `q'X…X'`: the delimiter captured by the start pattern closes the
    /// literal, bracket delimiters through their counterpart.
    ClosingDelimiter,
}

struct Pattern {
    kind: MatchKind,
    start: Regex,
    end: EndSpec,
}

impl Pattern {
    fn new(kind: MatchKind, start: &str, end: EndSpec) -> Self {
        Self {
            kind,
            start: Regex::new(start).unwrap(),
            end,
        }
    }
}

lazy_static! {
    /// Keywords recognized during the declaration; forbidden in the body.
    static ref DECLARATION_PATTERNS: Vec<Pattern> = vec![
        Pattern::new(MatchKind::Create, r"(?i-u)(\s|^)create(\s|$)", EndSpec::None),
        Pattern::new(MatchKind::Or, r"(?i-u)(\s|^)or(\s|$)", EndSpec::None),
        Pattern::new(MatchKind::Replace, r"(?i-u)(\s|^)replace(\s|$)", EndSpec::None),
        Pattern::new(
            MatchKind::ObjectType,
            r"(?i-u)(\s|^)(function|procedure|package|body|trigger)(\s|$)",
            EndSpec::None,
        ),
        Pattern::new(MatchKind::As, r"(?i-u)(\s|^)(as|is)(\s|$)", EndSpec::None),
        Pattern::new(MatchKind::Wrapped, r"(?i-u)(\s|^)wrapped(\s|$)", EndSpec::None),
    ];

    /// Contexts legal in any part of the input.
    ///
    /// National-character literal prefixes (`N'…'`, `NQ'X…X'`) are not
    /// recognized; the `N` is treated as ordinary code preceding the
    /// literal.
    static ref BODY_PATTERNS: Vec<Pattern> = vec![
        Pattern::new(MatchKind::ObjectName, "\"", EndSpec::Fixed(b"\"")),
        Pattern::new(MatchKind::Literal, r"(?i-u)q'(.)", EndSpec::ClosingDelimiter),
        Pattern::new(MatchKind::Literal, "'", EndSpec::Fixed(b"'")),
        Pattern::new(MatchKind::Comment, r"(?-u)(\s|^)--", EndSpec::Fixed(b"\n")),
        Pattern::new(MatchKind::Comment, r"(?-u)/\*", EndSpec::Fixed(b"*/")),
    ];
}

fn closing_delimiter(open: u8) -> u8 {
    match open {
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        b'(' => b')',
        other => other,
    }
}

fn scan(line: &[u8], table: &[Pattern]) -> Option<PatternMatch> {
    let mut found: Option<PatternMatch> = None;

    for pattern in table {
        let Some(caps) = pattern.start.captures(line) else {
            continue;
        };
        let Some(whole) = caps.get(0) else {
            continue;
        };

        // Earliest start wins; ties keep the first pattern in table order.
        if let Some(best) = &found {
            if whole.start() >= best.start {
                continue;
            }
        }

        let end_pattern = match pattern.end {
            EndSpec::None => None,
            EndSpec::Fixed(bytes) => Some(EndPattern(bytes.to_vec())),
            EndSpec::ClosingDelimiter => {
                let delimiter = caps.get(1).and_then(|group| group.as_bytes().first());
                delimiter.map(|&open| EndPattern(vec![closing_delimiter(open), b'\'']))
            }
        };

        found = Some(PatternMatch {
            kind: pattern.kind,
            start: whole.start(),
            end: whole.end(),
            end_pattern,
        });
    }

    found
}

/// Searches the declaration keyword table alone.
pub(crate) fn find_declaration(line: &[u8]) -> Option<PatternMatch> {
    scan(line, &DECLARATION_PATTERNS)
}

/// Searches both tables and returns the earliest hit overall; the
/// declaration table wins offset ties.
pub(crate) fn find_any(line: &[u8]) -> Option<PatternMatch> {
    match (scan(line, &DECLARATION_PATTERNS), scan(line, &BODY_PATTERNS)) {
        (Some(declaration), Some(body)) => {
            if body.start < declaration.start {
                Some(body)
            } else {
                Some(declaration)
            }
        }
        (declaration, body) => declaration.or(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn must_find(line: &[u8]) -> PatternMatch {
        find_any(line).unwrap_or_else(|| panic!("no match in {:?}", line))
    }

    #[test]
    fn keyword_span_covers_guard_whitespace() {
        let hit = must_find(b"create or replace");
        assert_eq!(hit.kind, MatchKind::Create);
        assert_eq!((hit.start, hit.end), (0, 7));

        let hit = must_find(b"  create\n");
        assert_eq!(hit.kind, MatchKind::Create);
        assert_eq!((hit.start, hit.end), (1, 9));
    }

    #[test]
    fn keywords_need_whitespace_boundaries() {
        assert!(find_any(b"recreated").is_none());
        assert!(find_any(b"xcreate").is_none());
        assert!(find_any(b"corridor").is_none());
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let hit = must_find(b"CrEaTe ");
        assert_eq!(hit.kind, MatchKind::Create);
        let hit = must_find(b" WRAPPED ");
        assert_eq!(hit.kind, MatchKind::Wrapped);
    }

    #[test]
    fn earliest_match_wins() {
        // The literal at offset 2 precedes the comment at offset 7.
        let hit = must_find(b"x 'lit' -- c");
        assert_eq!(hit.kind, MatchKind::Literal);
        assert_eq!((hit.start, hit.end), (2, 3));

        let hit = must_find(b"-- 'quote'");
        assert_eq!(hit.kind, MatchKind::Comment);
        assert_eq!(hit.start, 0);
    }

    #[test]
    fn combined_scan_prefers_the_earlier_table_hit() {
        let hit = must_find(b" as 'x'");
        assert_eq!(hit.kind, MatchKind::As);
        assert_eq!((hit.start, hit.end), (0, 4));

        let hit = must_find(b"'x' as y");
        assert_eq!(hit.kind, MatchKind::Literal);
    }

    #[test]
    fn alternate_quote_literal_builds_matching_closer() {
        let hit = must_find(b"q'[it's here]' rest");
        assert_eq!(hit.kind, MatchKind::Literal);
        assert_eq!((hit.start, hit.end), (0, 3));
        let end = hit.end_pattern.expect("q-literal must carry a closer");
        assert_eq!(end.find(b"it's here]' rest"), Some((9, 11)));
    }

    #[test]
    fn alternate_quote_literal_self_delimiter() {
        let hit = must_find(b"q'!bang!'");
        let end = hit.end_pattern.expect("q-literal must carry a closer");
        assert_eq!(end.find(b"bang!'"), Some((4, 6)));
    }

    #[test]
    fn q_form_beats_plain_quote_at_same_region() {
        let hit = must_find(b"q'{x}'");
        assert_eq!(hit.kind, MatchKind::Literal);
        // The q-form starts at 0, the bare quote only at 1.
        assert_eq!((hit.start, hit.end), (0, 3));
    }

    #[test]
    fn line_comment_requires_space_or_line_start() {
        let hit = must_find(b"--c\n");
        assert_eq!(hit.kind, MatchKind::Comment);
        assert_eq!(hit.end_pattern.and_then(|e| e.find(b"c\n")), Some((1, 2)));

        // A `--` glued to code only matches through the preceding space.
        let hit = must_find(b"a -- b");
        assert_eq!((hit.start, hit.end), (1, 4));
    }

    #[test]
    fn block_comment_closer() {
        let hit = must_find(b"/* note */");
        assert_eq!(hit.kind, MatchKind::Comment);
        assert_eq!(hit.end_pattern.and_then(|e| e.find(b" note */")), Some((6, 8)));
    }

    #[test]
    fn object_type_alternatives() {
        for keyword in [b"function".as_slice(), b"procedure", b"package", b"body", b"trigger"] {
            let mut line = keyword.to_vec();
            line.push(b' ');
            assert_eq!(must_find(&line).kind, MatchKind::ObjectType, "{keyword:?}");
        }
    }

    #[test]
    fn declaration_scan_ignores_body_contexts() {
        assert!(find_declaration(b"'literal only'").is_none());
        assert!(find_declaration(b"wrapped ").is_some());
    }
}

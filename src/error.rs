// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Error taxonomy for normalization and unwrapping.

use std::io;

/// Possible errors raised while normalizing PL/SQL source.
///
/// Every variant fails the whole pass; nothing is retried. The inspection
/// predicates ([`is_sql`][`crate::Normalizer::is_sql`] and friends) swallow
/// all of these and report `false` instead.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The requested flag combination is contradictory.
    #[error("conflicting normalization flags: {0}")]
    Config(String),
    /// A declaration keyword appeared where the grammar forbids it.
    #[error("wrong syntax: {0}")]
    Syntax(String),
    /// An object type was assigned twice with an incompatible second token.
    #[error("unsupported object type: '{0}'")]
    UnsupportedObjectType(String),
    /// End of input was reached without parsing both object type and name.
    #[error("object {0} not parsed")]
    MissingObjectMetadata(&'static str),
    /// A declaration keyword turned up inside a wrapped body.
    #[error("wrong wrapped content: '{0}'")]
    MalformedWrapped(String),
    /// Candidate object-name bytes did not decode as an identifier.
    #[error("undecodable characters found in possible object name: {0}")]
    Encoding(String),
    /// A single line split into more context boundaries than the stack
    /// budget allows.
    #[error("too many context boundaries on one line")]
    NestingTooDeep,
    /// The input or output stream failed.
    #[error(transparent)]
    Resource(#[from] io::Error),
}

/// Possible errors raised while unwrapping Oracle-wrapped PL/SQL.
#[derive(Debug, thiserror::Error)]
pub enum UnwrapError {
    /// The input never produced a `CREATE … WRAPPED` declaration header.
    #[error("input does not contain a wrapped PL/SQL object")]
    NotWrapped,
    /// The input ended before the announced base64 payload length.
    #[error("wrapped payload truncated: expected {expected} base64 characters, got {got}")]
    TruncatedPayload { expected: usize, got: usize },
    /// The payload did not survive base64 decoding or zlib inflation.
    #[error("wrapped payload corrupt: {0}")]
    CorruptPayload(String),
    /// The input or output stream failed.
    #[error(transparent)]
    Resource(#[from] io::Error),
}

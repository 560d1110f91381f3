// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! Normalization and unwrap tooling for Oracle PL/SQL sources.
//!
//! The crate does two jobs, both operating on raw bytes:
//!
//! * [`Normalizer`] runs a stateful lexical pass over PL/SQL declaration
//!   syntax and rewrites the byte stream according to a set of
//!   [`NormalizeFlags`] (strip comments, collapse whitespace, upper-case,
//!   strip literal contents, or extract comments alone). The same pass
//!   powers the `is_sql` / `is_wrapped` / `is_wrappable` predicates.
//! * [`Wrapper`] decodes Oracle's *wrapped* distribution format back into
//!   readable source: base64, a fixed byte substitution table and zlib,
//!   plus reconstruction of the `CREATE … <type> <name>` prefix.
//!
//! Producing wrapped files requires Oracle's proprietary `wrap` binary
//! and is intentionally out of scope.

mod charmap;
mod error;
mod flags;
mod matcher;
mod normalizer;
mod util;
mod wrapper;

pub use error::{NormalizeError, UnwrapError};
pub use flags::NormalizeFlags;
pub use normalizer::Normalizer;
pub use wrapper::Wrapper;

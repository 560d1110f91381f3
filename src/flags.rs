// SPDX-License-Identifier: SEE LICENSE IN LICENSE.md
// SPDX-FileCopyrightText: 2022 CYBERTEC PostgreSQL International GmbH
// <office@cybertec.at>

//! The normalization flag set and its consistency rules.

use crate::error::NormalizeError;

/// Switches controlling what a normalization pass rewrites.
///
/// Two combinations are rejected before any input is read: `no_spaces`
/// requires `no_comments` (collapsing whitespace around a surviving `--`
/// comment would swallow the rest of the statement), and `comments_only`
/// excludes every other flag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NormalizeFlags {
    /// Strip all comments from the body.
    pub no_comments: bool,
    /// Collapse every whitespace run in the body to a single space.
    pub no_spaces: bool,
    /// Upper-case everything outside literals and comments.
    pub uppercase: bool,
    /// Strip the contents of string literals.
    pub no_literals: bool,
    /// Emit the comments alone and drop everything else.
    pub comments_only: bool,
}

impl NormalizeFlags {
    /// The `no_comments` + `no_spaces` + `uppercase` combination.
    pub fn full() -> Self {
        Self {
            no_comments: true,
            no_spaces: true,
            uppercase: true,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), NormalizeError> {
        if self.no_spaces && !self.no_comments {
            return Err(NormalizeError::Config(
                "can not process with 'no_spaces' without 'no_comments' since this could \
                 convert the PL/SQL sample to one with wrong syntax"
                    .to_owned(),
            ));
        }

        if self.comments_only
            && (self.no_comments || self.no_spaces || self.uppercase || self.no_literals)
        {
            return Err(NormalizeError::Config(
                "flag 'comments_only' is incompatible with the other normalization flags"
                    .to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_are_valid() {
        assert!(NormalizeFlags::default().validate().is_ok());
    }

    #[test]
    fn full_flags_are_valid() {
        let flags = NormalizeFlags::full();
        assert!(flags.no_comments && flags.no_spaces && flags.uppercase);
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn no_spaces_requires_no_comments() {
        let flags = NormalizeFlags {
            no_spaces: true,
            ..NormalizeFlags::default()
        };
        assert!(matches!(
            flags.validate(),
            Err(NormalizeError::Config(_))
        ));
    }

    #[test]
    fn comments_only_excludes_everything_else() {
        let flags = NormalizeFlags {
            comments_only: true,
            uppercase: true,
            ..NormalizeFlags::default()
        };
        assert!(matches!(
            flags.validate(),
            Err(NormalizeError::Config(_))
        ));

        let alone = NormalizeFlags {
            comments_only: true,
            ..NormalizeFlags::default()
        };
        assert!(alone.validate().is_ok());
    }
}

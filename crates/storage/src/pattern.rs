//! Glob pattern matching with Redis `KEYS`/`SCAN MATCH` semantics.
//!
//! Supported syntax:
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | any run of characters, including none |
//! | `?` | exactly one character |
//! | `[ae]`, `[a-z]` | one character from the class |
//! | `[^e]` | one character not in the class |
//! | `\x` | the literal character `x` |
//!
//! Matching is done by [`globset`]. Patterns are rewritten into its dialect
//! first: `[^` becomes `[!`, and braces outside a class are escaped since
//! Redis has no alternation. Key separators carry no meaning, so `*` also
//! crosses `/`.
//!
//! Unlike Redis, a class opened with `!` is negated, and an unclosed `[` is
//! rejected instead of matched literally.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{StorageError, StorageResult};

/// A compiled key glob.
///
/// # Examples
///
/// ```
/// use warden_storage::pattern::KeyGlob;
///
/// let glob = KeyGlob::new("app:locks:export:p[0-9]").unwrap();
/// assert!(glob.is_match("app:locks:export:p1"));
/// assert!(!glob.is_match("app:locks:export:px"));
/// ```
#[derive(Clone)]
pub struct KeyGlob {
    pattern: String,
    matcher: GlobMatcher,
}

impl KeyGlob {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if the pattern is malformed, such as
    /// an unclosed class or a dangling `\`.
    pub fn new(pattern: &str) -> StorageResult<Self> {
        let glob = GlobBuilder::new(&to_globset_syntax(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| {
                StorageError::internal_with_source(format!("invalid glob pattern '{pattern}'"), e)
            })?;
        Ok(Self { pattern: pattern.to_owned(), matcher: glob.compile_matcher() })
    }

    /// Returns whether `candidate` matches.
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }

    /// The pattern as given, in Redis syntax.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for KeyGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyGlob({})", self.pattern)
    }
}

/// Returns whether `candidate` matches the glob `pattern`. A malformed
/// pattern matches nothing.
///
/// # Examples
///
/// ```
/// use warden_storage::pattern::glob_match;
///
/// assert!(glob_match("app:ownership:*", "app:ownership:r1:u1"));
/// assert!(glob_match("locks:?:p1", "locks:a:p1"));
/// assert!(glob_match("h[^e]llo", "hallo"));
/// assert!(!glob_match("locks:*", "auth:token:ab"));
/// ```
#[must_use]
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    KeyGlob::new(pattern).is_ok_and(|glob| glob.is_match(candidate))
}

fn to_globset_syntax(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push('\\');
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            },
            '[' if !in_class => {
                in_class = true;
                out.push('[');
                if chars.next_if_eq(&'^').is_some() {
                    out.push('!');
                }
            },
            ']' if in_class => {
                in_class = false;
                out.push(']');
            },
            '{' | '}' if !in_class => {
                out.push('\\');
                out.push(ch);
            },
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("*", "", true)]
    #[case("*", "anything", true)]
    #[case("ns:ownership:r1:*", "ns:ownership:r1:u1", true)]
    #[case("ns:ownership:r1:*", "ns:ownership:r2:u1", false)]
    #[case("ns:*:token:*", "ns:auth:token:abc", true)]
    #[case("a?c", "abc", true)]
    #[case("a?c", "ac", false)]
    #[case("a\\*c", "a*c", true)]
    #[case("a\\*c", "abc", false)]
    #[case("exact", "exact", true)]
    #[case("exact", "exactly", false)]
    #[case("*suffix", "the-suffix", true)]
    #[case("**", "x", true)]
    #[case("ns:*", "ns:a/b", true)]
    #[case("h[ae]llo", "hello", true)]
    #[case("h[ae]llo", "hallo", true)]
    #[case("h[ae]llo", "hillo", false)]
    #[case("h[^e]llo", "hallo", true)]
    #[case("h[^e]llo", "hello", false)]
    #[case("h[a-b]llo", "hbllo", true)]
    #[case("h[a-b]llo", "hcllo", false)]
    #[case("ns:locks:export:p[0-9]", "ns:locks:export:p1", true)]
    #[case("{a,b}", "a", false)]
    #[case("{a,b}", "{a,b}", true)]
    fn test_glob_cases(#[case] pattern: &str, #[case] candidate: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, candidate), expected, "{pattern} vs {candidate}");
    }

    #[rstest]
    #[case("h[^e]llo", "h[!e]llo")]
    #[case("{x}", "\\{x\\}")]
    #[case("[{]", "[{]")]
    #[case("a\\[b", "a\\[b")]
    fn test_rewrite(#[case] pattern: &str, #[case] rewritten: &str) {
        assert_eq!(to_globset_syntax(pattern), rewritten);
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        let err = KeyGlob::new("ns:[abc").unwrap_err();
        assert!(matches!(err, StorageError::Internal { .. }));
        assert!(!glob_match("ns:[abc", "ns:[abc"));
    }

    #[test]
    fn test_debug_shows_pattern() {
        let glob = KeyGlob::new("ns:*").unwrap();
        assert_eq!(format!("{glob:?}"), "KeyGlob(ns:*)");
        assert_eq!(glob.as_str(), "ns:*");
    }

    proptest! {
        /// A pattern without wildcards matches only itself.
        #[test]
        fn literal_pattern_matches_only_itself(s in "[A-Za-z0-9:._-]{0,40}", t in "[A-Za-z0-9:._-]{0,40}") {
            prop_assert!(glob_match(&s, &s));
            prop_assert_eq!(glob_match(&s, &t), s == t);
        }

        /// `prefix*` matches exactly the strings starting with `prefix`.
        #[test]
        fn prefix_star_matches_prefix(prefix in "[A-Za-z0-9:]{0,20}", rest in "[A-Za-z0-9:]{0,20}") {
            let pattern = format!("{prefix}*");
            let candidate = format!("{prefix}{rest}");
            prop_assert!(glob_match(&pattern, &candidate));
        }
    }
}

//! SQL LIKE pattern translation.
//!
//! A LIKE pattern becomes an anchored regular expression matching the
//! whole candidate string: `%` turns into "any sequence", `_` into "any
//! single character", and a backslash escapes the following character
//! into its literal self. Everything else is regex-escaped so pattern
//! text can never smuggle regex syntax into the match.

use regex::Regex;

use cmr_types::{RepoResult, RepositoryError};

/// Translate a LIKE pattern into a full-match [`Regex`].
pub fn like_to_regex(pattern: &str) -> RepoResult<Regex> {
    // (?s) so `%` spans newlines too.
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            '\\' => {
                // Escaped character, copied literally. A trailing lone
                // backslash stays a backslash.
                let literal = chars.next().unwrap_or('\\');
                translated.push_str(&regex::escape(&literal.to_string()));
            }
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    Regex::new(&translated).map_err(|e| {
        RepositoryError::InvalidArgument(format!("malformed LIKE pattern '{pattern}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn underscore_matches_exactly_one_character() {
        let re = like_to_regex("fo_bar").unwrap();
        assert!(re.is_match("foxbar"));
        assert!(re.is_match("foobar"));
        assert!(!re.is_match("fobar")); // too short
        assert!(!re.is_match("foxxbar")); // too long
    }

    #[test]
    fn percent_matches_any_sequence() {
        let re = like_to_regex("fo%bar").unwrap();
        assert!(re.is_match("fobar"));
        assert!(re.is_match("foxbar"));
        assert!(re.is_match("foxxxxbar"));
        assert!(!re.is_match("fobaz"));
    }

    #[test]
    fn match_is_anchored_to_the_whole_string() {
        let re = like_to_regex("bar").unwrap();
        assert!(re.is_match("bar"));
        assert!(!re.is_match("embargo"));
        assert!(!re.is_match("barn"));
    }

    #[test]
    fn escaped_wildcards_are_literal() {
        let re = like_to_regex(r"100\%").unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));

        let re = like_to_regex(r"a\_b").unwrap();
        assert!(re.is_match("a_b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn escaped_backslash_is_literal() {
        let re = like_to_regex(r"a\\b").unwrap();
        assert!(re.is_match(r"a\b"));
        assert!(!re.is_match("ab"));
    }

    #[test]
    fn regex_metacharacters_in_patterns_are_literal() {
        let re = like_to_regex("a.b").unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));

        let re = like_to_regex("(x)+").unwrap();
        assert!(re.is_match("(x)+"));
        assert!(!re.is_match("x"));
    }

    #[test]
    fn percent_spans_newlines() {
        let re = like_to_regex("start%end").unwrap();
        assert!(re.is_match("start\nmiddle\nend"));
    }

    #[test]
    fn empty_pattern_matches_only_the_empty_string() {
        let re = like_to_regex("").unwrap();
        assert!(re.is_match(""));
        assert!(!re.is_match("x"));
    }

    proptest! {
        // A wildcard-free pattern must match exactly itself.
        #[test]
        fn literal_patterns_match_only_themselves(
            s in "[a-zA-Z0-9 .+()*?^$|-]{0,16}",
            other in "[a-zA-Z0-9 .+()*?^$|-]{0,16}",
        ) {
            let re = like_to_regex(&s).unwrap();
            prop_assert!(re.is_match(&s));
            prop_assert_eq!(re.is_match(&other), s == other);
        }

        // Prefixing with % keeps every suffix match working.
        #[test]
        fn percent_prefix_matches_any_prefix(
            prefix in "[a-z]{0,8}",
            suffix in "[a-z]{1,8}",
        ) {
            let re = like_to_regex(&format!("%{suffix}")).unwrap();
            let candidate = format!("{prefix}{suffix}");
            prop_assert!(re.is_match(&candidate));
        }
    }
}

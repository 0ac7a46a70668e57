//! Case-insensitive wildcard name patterns.

use regex::Regex;

/// A pattern that could not be compiled.
#[derive(thiserror::Error, Debug)]
#[error("Invalid name pattern '{pattern}': {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

/// A compiled name pattern.
///
/// `*` matches any run of characters and `?` any single character. A pattern
/// with neither gets an implicit trailing `*`, so `foo` behaves like `foo*`.
/// An empty or whitespace-only pattern matches every name.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Fails only if the translated expression exceeds the regex size limit.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        let mut body = String::with_capacity(trimmed.len() + 8);
        for c in trimmed.chars() {
            match c {
                '*' => body.push_str(".*"),
                '?' => body.push('.'),
                c => body.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        // Only a pattern without any wildcard is a prefix.
        if !trimmed.contains(['*', '?']) {
            body.push_str(".*");
        }

        let regex = Regex::new(&format!("(?is)^{body}$")).map_err(|source| PatternError {
            pattern: trimmed.to_string(),
            source,
        })?;
        Ok(Self {
            source: trimmed.to_string(),
            regex,
        })
    }

    /// The pattern text as given (trimmed).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern matches every name.
    pub fn matches_all(&self) -> bool {
        self.source.is_empty() || self.source.chars().all(|c| c == '*')
    }

    /// Test a name against the pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Returns `true` if any pattern in `patterns` matches `name`.
pub fn any_match(patterns: &[NamePattern], name: &str) -> bool {
    patterns.iter().any(|p| p.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_everything() {
        let p = NamePattern::new("*").unwrap();
        assert!(p.matches_all());
        for name in ["", "a", "Az.Accounts", "PESTER"] {
            assert!(p.is_match(name));
        }
    }

    #[test]
    fn test_bare_pattern_is_prefix() {
        let bare = NamePattern::new("foo").unwrap();
        let star = NamePattern::new("foo*").unwrap();
        for name in ["foo", "FooBar", "foo.bar", "xfoo", "fo"] {
            assert_eq!(bare.is_match(name), star.is_match(name), "{name}");
        }
        assert!(bare.is_match("FOOTBALL"));
        assert!(!bare.is_match("xfoo"));
    }

    #[test]
    fn test_empty_pattern_matches_all() {
        let p = NamePattern::new("   ").unwrap();
        assert!(p.matches_all());
        assert!(p.is_match("anything"));
    }

    #[test]
    fn test_inner_wildcards_and_literals() {
        let p = NamePattern::new("Az.*s").unwrap();
        assert!(p.is_match("az.accounts"));
        assert!(!p.is_match("Az.Compute"));
        assert!(!p.is_match("AzXaccounts"));

        let q = NamePattern::new("P?ster*").unwrap();
        assert!(q.is_match("Pester"));
        assert!(!q.is_match("Pster"));
    }

    #[test]
    fn test_question_mark_disables_prefix() {
        let p = NamePattern::new("A?").unwrap();
        assert!(p.is_match("ab"));
        assert!(!p.is_match("Abcdef"));
        assert!(!p.is_match("A"));
    }

    #[test]
    fn test_brackets_are_literal() {
        let p = NamePattern::new("a[1]*").unwrap();
        assert!(p.is_match("a[1]b"));
        assert!(!p.is_match("a1b"));
    }
}

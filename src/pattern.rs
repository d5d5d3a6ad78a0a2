// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! SQL-like pattern translation and memoization.
//!
//! Translates `%`/`_` patterns into anchored, case-insensitive regular
//! expressions and caches the compiled [`Regex`] in a bounded LRU keyed by
//! the raw pattern string, so a `like` predicate evaluated across every
//! leaf slot during a scan compiles its pattern at most once per distinct
//! pattern value.

use crate::cache::LruCache;
use crate::error::{IxError, IxResult};
use regex::Regex;

/// Escapes every regex metacharacter in `fragment` except the two SQL-like
/// wildcards, which are translated separately.
fn escape_literal(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if regex_syntax::is_meta_character(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Translates a SQL-like pattern (`%` = any run, `_` = any single
/// character) into an anchored, case-insensitive regex source string.
pub fn translate(pattern: &str) -> String {
    let mut regex_src = String::with_capacity(pattern.len() + 8);
    regex_src.push_str("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex_src.push_str(".*"),
            '_' => regex_src.push('.'),
            _ => regex_src.push_str(&escape_literal(&ch.to_string())),
        }
    }
    regex_src.push('$');
    regex_src
}

/// Compiles `pattern` into an anchored, case-insensitive [`Regex`].
///
/// ## Error Conditions
/// - `IxError::InvalidPattern`: the translated source fails to compile
///   (should not happen for well-formed input, since every literal
///   character is escaped before translation; kept as a recoverable error
///   rather than a panic for defensive robustness against future wildcard
///   additions).
pub fn compile(pattern: &str) -> IxResult<Regex> {
    let source = translate(pattern);
    Regex::new(&source).map_err(|e| IxError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Memoized `like`-pattern-to-regex translator, bounded by the same
/// capacity as the node cache (C4) and sharing its [`LruCache`]
/// implementation.
pub struct PatternCache {
    inner: LruCache<String, Regex>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Returns the compiled regex for `pattern`, compiling and memoizing it
    /// on first use.
    pub fn get_or_compile(&mut self, pattern: &str) -> IxResult<Regex> {
        if let Some(regex) = self.inner.get(&pattern.to_string()) {
            return Ok(regex.clone());
        }
        let regex = compile(pattern)?;
        self.inner.put(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Minimal stand-in for the metacharacter set the `regex` crate treats
/// specially, used only to decide what [`escape_literal`] must backslash.
mod regex_syntax {
    pub fn is_meta_character(ch: char) -> bool {
        matches!(
            ch,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_becomes_any_run() {
        let re = compile("%h%").unwrap();
        assert!(re.is_match("the"));
        assert!(re.is_match("HELLO"));
        assert!(!re.is_match("nope"));
    }

    #[test]
    fn underscore_becomes_single_char() {
        let re = compile("%_s").unwrap();
        assert!(re.is_match("cats"));
        assert!(re.is_match("things"));
        assert!(!re.is_match("cat"));
    }

    #[test]
    fn pattern_is_anchored() {
        let re = compile("foo").unwrap();
        assert!(re.is_match("foo"));
        assert!(!re.is_match("foobar"));
        assert!(!re.is_match("barfoo"));
    }

    #[test]
    fn literal_regex_metacharacters_are_escaped() {
        let re = compile("a.b").unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));
    }

    #[test]
    fn cache_memoizes_translation() {
        let mut cache = PatternCache::new(2);
        assert!(cache.is_empty());
        cache.get_or_compile("%a%").unwrap();
        assert_eq!(cache.len(), 1);
        cache.get_or_compile("%a%").unwrap();
        assert_eq!(cache.len(), 1);
    }
}

//! Iteration pattern parsing and model/prompt selection.
//!
//! Patterns come in four shapes: `"all"`, `"N"` (exact), `"M-N"` (inclusive
//! range), and `"N+"` (open range). Rule lists are resolved first-match-wins;
//! a well-formed list carries a catch-all (`"all"` or `"1+"`), which the
//! config validator enforces.

use crate::config::{ModelRule, PromptSpec};
use crate::error::{ConfigError, Result};

/// A parsed iteration pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationPattern {
    /// Matches every iteration.
    All,
    /// Matches exactly one iteration.
    Exact(u32),
    /// Matches an inclusive range.
    Range(u32, u32),
    /// Matches `n` and everything after.
    From(u32),
}

impl IterationPattern {
    /// Parse a pattern string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if let Some(base) = s.strip_suffix('+') {
            let n = parse_bound(base, s)?;
            return Ok(Self::From(n));
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let lo = parse_bound(lo, s)?;
            let hi = parse_bound(hi, s)?;
            if lo > hi {
                return Err(ConfigError::InvalidIterationPattern(s.to_string()));
            }
            return Ok(Self::Range(lo, hi));
        }
        Ok(Self::Exact(parse_bound(s, s)?))
    }

    /// Whether `iteration` (1-based) matches this pattern.
    #[must_use]
    pub fn matches(self, iteration: u32) -> bool {
        match self {
            Self::All => true,
            Self::Exact(n) => iteration == n,
            Self::Range(lo, hi) => (lo..=hi).contains(&iteration),
            Self::From(n) => iteration >= n,
        }
    }

    /// Whether this pattern matches every iteration from 1 upward.
    #[must_use]
    pub fn is_catch_all(self) -> bool {
        matches!(self, Self::All | Self::From(0) | Self::From(1))
    }
}

fn parse_bound(text: &str, pattern: &str) -> Result<u32> {
    text.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidIterationPattern(pattern.to_string()))
}

/// Resolve the model for `iteration` from a rule list, first match wins.
pub fn resolve_model(rules: &[ModelRule], iteration: u32) -> Result<&str> {
    for rule in rules {
        if IterationPattern::parse(&rule.iterations)?.matches(iteration) {
            return Ok(&rule.model);
        }
    }
    Err(ConfigError::NoModelRuleMatch(iteration))
}

/// Whether any rule in the list is a catch-all.
pub fn has_catch_all(rules: &[ModelRule]) -> bool {
    rules.iter().any(|rule| {
        IterationPattern::parse(&rule.iterations).is_ok_and(IterationPattern::is_catch_all)
    })
}

/// Select the prompt text for `iteration` from a [`PromptSpec`].
///
/// A direct string applies to every iteration; variant lists resolve
/// first-match-wins. Returns `None` when no variant matches.
#[must_use]
pub fn select_prompt(spec: &PromptSpec, iteration: u32) -> Option<&str> {
    match spec {
        PromptSpec::Text(text) => Some(text),
        PromptSpec::Variants(variants) => variants.iter().find_map(|variant| {
            IterationPattern::parse(&variant.iterations)
                .ok()
                .filter(|p| p.matches(iteration))
                .map(|_| variant.text.as_str())
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptVariant;

    fn rule(iterations: &str, model: &str) -> ModelRule {
        ModelRule {
            iterations: iterations.into(),
            model: model.into(),
        }
    }

    #[test]
    fn parse_all() {
        assert_eq!(IterationPattern::parse("all").unwrap(), IterationPattern::All);
        assert_eq!(IterationPattern::parse("ALL").unwrap(), IterationPattern::All);
    }

    #[test]
    fn parse_exact() {
        assert_eq!(
            IterationPattern::parse("3").unwrap(),
            IterationPattern::Exact(3)
        );
    }

    #[test]
    fn parse_range() {
        assert_eq!(
            IterationPattern::parse("1-3").unwrap(),
            IterationPattern::Range(1, 3)
        );
    }

    #[test]
    fn parse_open_range() {
        assert_eq!(
            IterationPattern::parse("4+").unwrap(),
            IterationPattern::From(4)
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(IterationPattern::parse("x").is_err());
        assert!(IterationPattern::parse("3-1").is_err());
        assert!(IterationPattern::parse("-2").is_err());
        assert!(IterationPattern::parse("").is_err());
    }

    #[test]
    fn matching() {
        assert!(IterationPattern::All.matches(17));
        assert!(IterationPattern::Exact(2).matches(2));
        assert!(!IterationPattern::Exact(2).matches(3));
        assert!(IterationPattern::Range(1, 3).matches(3));
        assert!(!IterationPattern::Range(1, 3).matches(4));
        assert!(IterationPattern::From(4).matches(4));
        assert!(IterationPattern::From(4).matches(100));
        assert!(!IterationPattern::From(4).matches(3));
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![rule("1-3", "sonnet"), rule("all", "opus")];
        assert_eq!(resolve_model(&rules, 1).unwrap(), "sonnet");
        assert_eq!(resolve_model(&rules, 3).unwrap(), "sonnet");
        assert_eq!(resolve_model(&rules, 4).unwrap(), "opus");
    }

    #[test]
    fn no_match_errors() {
        let rules = vec![rule("1-3", "sonnet")];
        assert!(matches!(
            resolve_model(&rules, 4),
            Err(ConfigError::NoModelRuleMatch(4))
        ));
    }

    #[test]
    fn catch_all_detection() {
        assert!(has_catch_all(&[rule("all", "m")]));
        assert!(has_catch_all(&[rule("1+", "m")]));
        assert!(!has_catch_all(&[rule("1-3", "m"), rule("4-9", "m")]));
    }

    #[test]
    fn select_prompt_direct() {
        let spec = PromptSpec::Text("fixed".into());
        assert_eq!(select_prompt(&spec, 1), Some("fixed"));
        assert_eq!(select_prompt(&spec, 42), Some("fixed"));
    }

    #[test]
    fn select_prompt_variants() {
        let spec = PromptSpec::Variants(vec![
            PromptVariant {
                iterations: "1".into(),
                text: "first".into(),
            },
            PromptVariant {
                iterations: "2+".into(),
                text: "revise".into(),
            },
        ]);
        assert_eq!(select_prompt(&spec, 1), Some("first"));
        assert_eq!(select_prompt(&spec, 2), Some("revise"));
        assert_eq!(select_prompt(&spec, 9), Some("revise"));
    }

    #[test]
    fn select_prompt_no_variant_match() {
        let spec = PromptSpec::Variants(vec![PromptVariant {
            iterations: "2".into(),
            text: "only second".into(),
        }]);
        assert_eq!(select_prompt(&spec, 1), None);
    }
}

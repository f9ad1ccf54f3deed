//! Filename filter for remote listings

use std::fmt;

use glob::Pattern;

/// Glob over a bare file name: `*`, `?` and `[...]` classes.
#[derive(Clone, PartialEq, Eq)]
pub struct FilterPattern {
    pattern: Pattern,
}

impl FilterPattern {
    pub const DEFAULT: &'static str = "*.*";

    pub fn new(pattern: &str) -> Result<Self, glob::PatternError> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches(name)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for FilterPattern {
    fn default() -> Self {
        Self {
            // "*.*" is a literal valid pattern
            pattern: Pattern::new(Self::DEFAULT).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for FilterPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilterPattern").field(&self.as_str()).finish()
    }
}

impl fmt::Display for FilterPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

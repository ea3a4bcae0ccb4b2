//! Tokens treated as missing data when raw text is turned into values

use serde::{Deserialize, Serialize};

/// Missing-value configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingValues {
    /// Tokens to treat as missing
    pub patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching
    pub case_sensitive: bool,
}

impl Default for MissingValues {
    fn default() -> Self {
        Self {
            patterns: vec![
                String::new(),
                "-".to_string(),
                "N/A".to_string(),
                "NA".to_string(),
                "NaN".to_string(),
                "null".to_string(),
                "None".to_string(),
            ],
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl MissingValues {
    /// Check if a raw value should be treated as missing
    pub fn is_missing(&self, value: &str) -> bool {
        let test_value = if self.trim_whitespace {
            value.trim()
        } else {
            value
        };

        self.patterns.iter().any(|pattern| {
            if self.case_sensitive {
                test_value == pattern
            } else {
                test_value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    /// Add a missing-value token
    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    /// Remove a missing-value token
    pub fn remove_pattern(&mut self, pattern: &str) {
        self.patterns.retain(|p| p != pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tokens() {
        let missing = MissingValues::default();
        assert!(missing.is_missing(""));
        assert!(missing.is_missing("  n/a "));
        assert!(missing.is_missing("none"));
        assert!(!missing.is_missing("0"));
    }

    #[test]
    fn test_case_sensitive_patterns() {
        let mut missing = MissingValues {
            case_sensitive: true,
            ..Default::default()
        };
        missing.add_pattern("?");
        assert!(missing.is_missing("?"));
        assert!(!missing.is_missing("none"));
        missing.remove_pattern("?");
        assert!(!missing.is_missing("?"));
    }
}

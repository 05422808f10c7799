// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;

/// Convert a simple shell glob pattern to a [`Regex`]. Only `*` (match
/// anything) and `?` (match one char) are supported, matched against
/// tool names rather than command strings.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

pub fn matches(pattern: &str, tool_name: &str) -> bool {
    glob_to_regex(pattern).is_some_and(|re| re.is_match(tool_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_prefix_matches() {
        assert!(matches("fs_*", "fs_write"));
        assert!(!matches("fs_*", "web_fetch"));
    }

    #[test]
    fn exact_pattern_matches_only_exact_name() {
        assert!(matches("new_answer", "new_answer"));
        assert!(!matches("new_answer", "new_answer_v2"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(matches("vote?", "vote1"));
        assert!(!matches("vote?", "vote12"));
    }
}

// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for flaketrack-runner.

use flaketrack_metadata::TITLE_PATH_SEPARATOR;
use std::time::Duration;

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "attempt" if `count` is 1, otherwise "attempts".
    pub fn attempts_str(count: u32) -> &'static str {
        if count == 1 { "attempt" } else { "attempts" }
    }

    /// Returns "retry" if `count` is 1, otherwise "retries".
    pub fn retries_str(count: u32) -> &'static str {
        if count == 1 { "retry" } else { "retries" }
    }
}

/// Replaces every character that isn't an ASCII letter or digit with an underscore.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Returns the title of the innermost describe block from a full title path, or the empty string
/// for a test declared outside any describe block.
pub(crate) fn parent_title(full_title_path: &str) -> &str {
    let mut segments = full_title_path.rsplit(TITLE_PATH_SEPARATOR);
    // The first segment from the right is the test's own title.
    segments.next();
    segments.next().unwrap_or("")
}

/// Returns the first line of `s`.
pub(crate) fn first_line(s: &str) -> &str {
    s.split('\n').next().unwrap_or(s)
}

/// Returns the first `count` lines of `s`, joined by newlines.
pub(crate) fn head_lines(s: &str, count: usize) -> String {
    s.split('\n').take(count).collect::<Vec<_>>().join("\n")
}

/// Returns `duration` in whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Rounds a millisecond count to the nearest whole second.
pub(crate) fn round_millis_to_secs(millis: u64) -> u64 {
    millis.saturating_add(500) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        "FAILED-Attempt2-Login-should login with valid credentials",
        "FAILED_Attempt2_Login_should_login_with_valid_credentials" ; "spaces and dashes"
    )]
    #[test_case("Dashboard > widgets (1/2)", "Dashboard___widgets__1_2_" ; "punctuation")]
    #[test_case("Über-test", "_ber_test" ; "non-ascii letters")]
    #[test_case("", "" ; "empty")]
    fn sanitize(input: &str, expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[test_case("Login > should login", "Login" ; "one level")]
    #[test_case("Admin > Employees > should add", "Employees" ; "nested")]
    #[test_case("top-level test", "" ; "no describe block")]
    fn parent(input: &str, expected: &str) {
        assert_eq!(parent_title(input), expected);
    }

    #[test]
    fn lines() {
        let stack = "AssertionError: expected\n  at a\n  at b\n  at c\n  at d\n  at e\n  at f";
        assert_eq!(first_line(stack), "AssertionError: expected");
        assert_eq!(
            head_lines(stack, 5),
            "AssertionError: expected\n  at a\n  at b\n  at c\n  at d"
        );
        assert_eq!(head_lines("single", 5), "single");
    }

    #[test_case(0, 0 ; "zero")]
    #[test_case(499, 0 ; "rounds down")]
    #[test_case(500, 1 ; "rounds half up")]
    #[test_case(61_234, 61 ; "minutes")]
    fn round_secs(millis: u64, expected: u64) {
        assert_eq!(round_millis_to_secs(millis), expected);
    }
}

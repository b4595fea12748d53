// Copyright (c) The flaketrack Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use owo_colors::Style;

/// The width of the rules drawn around report sections.
pub(super) const RULE_WIDTH: usize = 50;

/// Returns a heavy horizontal rule, used around the run summary.
pub(super) fn heavy_rule() -> String {
    "═".repeat(RULE_WIDTH)
}

/// Returns a light horizontal rule, used around detail sections.
pub(super) fn light_rule() -> String {
    "─".repeat(RULE_WIDTH)
}

#[derive(Debug, Default, Clone)]
pub(super) struct Styles {
    pub(super) count: Style,
    pub(super) pass: Style,
    pub(super) retry: Style,
    pub(super) fail: Style,
    pub(super) skip: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.retry = Style::new().magenta().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
    }
}

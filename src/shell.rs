/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use once_cell::sync::Lazy;
use regex::Regex;

static UNSAFE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_@%+=:,./-]").unwrap());

/// Quotes `arg` for the device shell that `adb shell` hands its arguments to.
///
/// Arguments made only of safe characters are passed through untouched.
pub fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_owned();
    }

    if !UNSAFE_REGEX.is_match(arg) {
        return arg.to_owned();
    }

    format!("'{}'", arg.replace('\'', "'\"'\"'"))
}

#[cfg(test)]
mod tests {
    use super::quote;

    #[test]
    fn safe_arguments_are_untouched() {
        assert_eq!(quote("/sdcard/20240101120000-screenshot.png"), "/sdcard/20240101120000-screenshot.png");
        assert_eq!(quote("screenrecord"), "screenrecord");
    }

    #[test]
    fn unsafe_arguments_are_single_quoted() {
        assert_eq!(quote("my file.png"), "'my file.png'");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
        assert_eq!(quote(""), "''");
    }
}

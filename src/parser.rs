/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Parsing of `adb devices -l` output.

use std::collections::BTreeMap;

use crate::adb::DeviceSerial;

/// Anything shorter than this is a stray token (a state word, a blank), not a serial.
pub const MIN_SERIAL_LEN: usize = 5;

/// One line of `adb devices -l`, split into its parts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceEntry {
    pub serial: DeviceSerial,
    pub state: String,
    pub attributes: BTreeMap<String, String>,
}

/// Extracts the device serials from the output of `adb devices -l`.
///
/// The first line is the `List of devices attached` header and is skipped.
/// Every following line contributes the text before its first whitespace.
/// Parsing stops at the first line whose serial is empty or shorter than
/// [`MIN_SERIAL_LEN`]; nothing after such a line is returned. Duplicates are
/// kept.
pub fn parse_device_list(raw: &str) -> Vec<DeviceSerial> {
    let mut lines = raw.lines();
    // header
    lines.next();

    lines
        .map(serial_candidate)
        .take_while(|candidate| is_serial(candidate))
        .map(|serial| serial.to_owned())
        .collect()
}

/// Turns `"serial   device product:x model:y ..."` into a [`DeviceEntry`].
///
/// Returns `None` for lines that would not pass [`parse_device_list`].
pub fn parse_device_line(line: &str) -> Option<DeviceEntry> {
    let serial = serial_candidate(line);
    if !is_serial(serial) {
        return None;
    }

    let mut words = line[serial.len()..].split_whitespace();
    let state = words.next().unwrap_or_default().to_owned();
    let attributes = words
        .filter_map(|pair| {
            let mut kv = pair.split(':');
            if let (Some(k), Some(v), None) = (kv.next(), kv.next(), kv.next()) {
                Some((k.to_owned(), v.to_owned()))
            } else {
                None
            }
        })
        .collect();

    Some(DeviceEntry {
        serial: serial.to_owned(),
        state,
        attributes,
    })
}

/// Text up to the first whitespace; empty when the line starts with whitespace.
fn serial_candidate(line: &str) -> &str {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.find(char::is_whitespace) {
        Some(end) => &line[..end],
        None => line,
    }
}

fn is_serial(candidate: &str) -> bool {
    candidate.chars().count() >= MIN_SERIAL_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "List of devices attached\n";

    #[test]
    fn single_device() {
        assert_eq!(
            parse_device_list("List of devices attached\nABCDE1234\tdevice\n"),
            vec!["ABCDE1234"]
        );
    }

    #[test]
    fn short_identifier_ends_discovery() {
        assert_eq!(
            parse_device_list("List of devices attached\nabcd\tdevice\n"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn stops_at_first_malformed_line() {
        let raw = format!(
            "{}emulator-5554\tdevice\nR58M123ABC\tdevice\n\n0123456789\tdevice\n",
            HEADER
        );
        assert_eq!(parse_device_list(&raw), vec!["emulator-5554", "R58M123ABC"]);

        let raw = format!("{}emulator-5554\tdevice\n  indented\tdevice\nR58M123ABC\tdevice\n", HEADER);
        assert_eq!(parse_device_list(&raw), vec!["emulator-5554"]);
    }

    #[test]
    fn long_listing_with_attributes() {
        let raw = "List of devices attached\n\
                   R58M123ABC             device usb:1-1 product:beyond1lteeea model:SM_G973F device:beyond1 transport_id:3\n\
                   emulator-5554          offline transport_id:1\n\
                   \n";
        assert_eq!(parse_device_list(raw), vec!["R58M123ABC", "emulator-5554"]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // four characters, five bytes
        let raw = format!("{}äbcd\tdevice\nABCDE1234\tdevice\n", HEADER);
        assert!(parse_device_list(&raw).is_empty());

        let raw = format!("{}äbcde\tdevice\n", HEADER);
        assert_eq!(parse_device_list(&raw), vec!["äbcde"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let raw = format!("{}ABCDE1234\tdevice\nABCDE1234\tdevice\n", HEADER);
        assert_eq!(parse_device_list(&raw), vec!["ABCDE1234", "ABCDE1234"]);
    }

    #[test]
    fn header_only_or_empty() {
        assert!(parse_device_list(HEADER).is_empty());
        assert!(parse_device_list("List of devices attached").is_empty());
        assert!(parse_device_list("").is_empty());
    }

    #[test]
    fn windows_line_endings() {
        let raw = "List of devices attached\r\nABCDE1234\r\n\r\n";
        assert_eq!(parse_device_list(raw), vec!["ABCDE1234"]);
    }

    #[test]
    fn device_line_attributes() {
        let entry = parse_device_line(
            "R58M123ABC             device usb:1-1 product:beyond1lteeea model:SM_G973F transport_id:3",
        )
        .unwrap();
        assert_eq!(entry.serial, "R58M123ABC");
        assert_eq!(entry.state, "device");
        assert_eq!(entry.attributes.get("model").map(String::as_str), Some("SM_G973F"));
        assert_eq!(entry.attributes.get("transport_id").map(String::as_str), Some("3"));
        assert_eq!(entry.attributes.len(), 4);

        assert_eq!(parse_device_line("abcd\tdevice"), None);
        assert_eq!(parse_device_line(" ABCDE1234 device"), None);
    }

    #[test]
    fn device_line_without_state() {
        let entry = parse_device_line("ABCDE1234").unwrap();
        assert_eq!(entry.state, "");
        assert!(entry.attributes.is_empty());
    }
}

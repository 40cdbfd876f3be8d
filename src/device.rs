/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, trace};

use crate::adb::{AdbCommand, DeviceSerial};
use crate::gateway::{Gateway, ProcessHandle};
use crate::Result;

/// The device properties collected for every device, in query order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyKind {
    Model,
    SwVersion,
    OsVersion,
    MaxAppSdk,
    Csc,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 5] = [
        PropertyKind::Model,
        PropertyKind::SwVersion,
        PropertyKind::OsVersion,
        PropertyKind::MaxAppSdk,
        PropertyKind::Csc,
    ];

    /// The `getprop` key holding this property.
    pub fn key(self) -> &'static str {
        match self {
            PropertyKind::Model => "ro.product.model",
            PropertyKind::SwVersion => "ro.build.version.incremental",
            PropertyKind::OsVersion => "ro.build.version.release",
            PropertyKind::MaxAppSdk => "ro.build.version.sdk",
            PropertyKind::Csc => "ro.csc.sales_code",
        }
    }

    pub fn next(self) -> Option<PropertyKind> {
        match self {
            PropertyKind::Model => Some(PropertyKind::SwVersion),
            PropertyKind::SwVersion => Some(PropertyKind::OsVersion),
            PropertyKind::OsVersion => Some(PropertyKind::MaxAppSdk),
            PropertyKind::MaxAppSdk => Some(PropertyKind::Csc),
            PropertyKind::Csc => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropertyKind::Model => "Model",
            PropertyKind::SwVersion => "SW version",
            PropertyKind::OsVersion => "OS version",
            PropertyKind::MaxAppSdk => "Max app SDK",
            PropertyKind::Csc => "CSC",
        })
    }
}

/// Identifying information about one device, filled in as replies arrive.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DeviceInfo {
    pub serial: DeviceSerial,
    pub model: String,
    pub sw_version: String,
    pub os_version: String,
    pub max_app_sdk: String,
    pub csc: String,
    /// Connection state reported by `adb devices -l`, e.g. `device` or `unauthorized`.
    pub state: String,
    /// `key:value` pairs reported by `adb devices -l`.
    pub attributes: BTreeMap<String, String>,
}

impl DeviceInfo {
    pub fn new(serial: DeviceSerial) -> DeviceInfo {
        DeviceInfo {
            serial,
            ..Default::default()
        }
    }

    pub fn get(&self, kind: PropertyKind) -> &str {
        match kind {
            PropertyKind::Model => &self.model,
            PropertyKind::SwVersion => &self.sw_version,
            PropertyKind::OsVersion => &self.os_version,
            PropertyKind::MaxAppSdk => &self.max_app_sdk,
            PropertyKind::Csc => &self.csc,
        }
    }

    fn field_mut(&mut self, kind: PropertyKind) -> &mut String {
        match kind {
            PropertyKind::Model => &mut self.model,
            PropertyKind::SwVersion => &mut self.sw_version,
            PropertyKind::OsVersion => &mut self.os_version,
            PropertyKind::MaxAppSdk => &mut self.max_app_sdk,
            PropertyKind::Csc => &mut self.csc,
        }
    }
}

/// Where a device is in its property chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Nothing in flight; `kind` is the next property to ask for.
    Idle(PropertyKind),
    /// Waiting for the reply to `process`.
    Querying {
        kind: PropertyKind,
        process: ProcessHandle,
    },
    /// Every property has been stored.
    Complete,
}

/// Outcome of feeding a reply to a [`DeviceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The reply did not belong to the query in flight.
    Ignored,
    /// Stored; the query for the contained property has been issued.
    Advanced(PropertyKind),
    /// Stored the last property. Returned exactly once per handle.
    Complete,
}

/// A discovered device and the state of its property chain.
///
/// At most one query is in flight at any time; properties are fetched in
/// [`PropertyKind::ALL`] order.
#[derive(Debug)]
pub struct DeviceHandle {
    info: DeviceInfo,
    state: QueryState,
}

impl DeviceHandle {
    pub fn new(serial: DeviceSerial) -> DeviceHandle {
        DeviceHandle::with_info(DeviceInfo::new(serial))
    }

    pub fn with_info(info: DeviceInfo) -> DeviceHandle {
        DeviceHandle {
            info,
            state: QueryState::Idle(PropertyKind::Model),
        }
    }

    pub fn serial(&self) -> &DeviceSerial {
        &self.info.serial
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn in_flight(&self) -> Option<ProcessHandle> {
        match self.state {
            QueryState::Querying { process, .. } => Some(process),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == QueryState::Complete
    }

    /// Issues the query for the current property.
    ///
    /// Does nothing and returns `None` while a query is in flight or once the
    /// chain is complete.
    pub fn start_next_query<G: Gateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<Option<ProcessHandle>> {
        let kind = match self.state {
            QueryState::Idle(kind) => kind,
            QueryState::Querying { .. } | QueryState::Complete => return Ok(None),
        };

        let command = AdbCommand::GetProp {
            serial: self.info.serial.clone(),
            key: kind.key(),
        };
        let process = gateway.run_async(&command)?;
        debug!("{}: querying {} ({})", self.info.serial, kind, process);

        self.state = QueryState::Querying { kind, process };
        Ok(Some(process))
    }

    /// Stores the reply to the query in flight and issues the next one.
    ///
    /// Replies for any other process are ignored. If issuing the next query
    /// fails, the reply is still stored and the handle stays idle on the next
    /// property.
    pub fn on_reply<G: Gateway + ?Sized>(
        &mut self,
        process: ProcessHandle,
        raw: &str,
        gateway: &G,
    ) -> Result<Reply> {
        let kind = match self.state {
            QueryState::Querying { kind, process: p } if p == process => kind,
            _ => {
                trace!("{}: ignoring reply from {}", self.info.serial, process);
                return Ok(Reply::Ignored);
            }
        };

        let value = first_line(raw);
        debug!("{}: {} = {:?}", self.info.serial, kind, value);
        *self.info.field_mut(kind) = value.to_owned();

        match kind.next() {
            Some(next) => {
                self.state = QueryState::Idle(next);
                self.start_next_query(gateway)?;
                Ok(Reply::Advanced(next))
            }
            None => {
                self.state = QueryState::Complete;
                Ok(Reply::Complete)
            }
        }
    }

    /// Terminates the query in flight, if any. Returns whether one was in flight.
    pub fn cancel<G: Gateway + ?Sized>(&mut self, gateway: &G) -> bool {
        match self.state {
            QueryState::Querying { kind, process } => {
                gateway.terminate(process);
                self.state = QueryState::Idle(kind);
                true
            }
            _ => false,
        }
    }
}

/// `getprop` answers with one line; keep that line and drop the terminator.
pub fn first_line(raw: &str) -> &str {
    let line = match raw.find('\n') {
        Some(end) => &raw[..end],
        None => raw,
    };
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_walk_in_order() {
        let mut kind = Some(PropertyKind::Model);
        let mut seen = Vec::new();
        while let Some(k) = kind {
            seen.push(k);
            kind = k.next();
        }
        assert_eq!(seen, PropertyKind::ALL);
    }

    #[test]
    fn property_keys() {
        let keys: Vec<_> = PropertyKind::ALL.iter().map(|k| k.key()).collect();
        assert_eq!(
            keys,
            vec![
                "ro.product.model",
                "ro.build.version.incremental",
                "ro.build.version.release",
                "ro.build.version.sdk",
                "ro.csc.sales_code",
            ]
        );
    }

    #[test]
    fn first_line_trimming() {
        assert_eq!(first_line("SM-G973F\n"), "SM-G973F");
        assert_eq!(first_line("SM-G973F\r\n"), "SM-G973F");
        assert_eq!(first_line("no newline"), "no newline");
        assert_eq!(first_line("\n"), "");
        assert_eq!(first_line(""), "");
        assert_eq!(first_line("first\nsecond\n"), "first");
    }
}

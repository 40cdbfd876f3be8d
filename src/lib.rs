/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Discovers Android devices through `adb` and collects their identifying
//! properties, one `getprop` at a time per device.
//!
//! ```no_run
//! use adb_probe::{Bridge, Registry};
//!
//! # async fn run() -> adb_probe::Result<()> {
//! let mut registry = Registry::with_bridge(Bridge::default());
//! registry.scan()?;
//! registry.settle().await;
//! for line in registry.summary() {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod adb;
pub mod device;
pub mod gateway;
pub mod parser;
pub mod registry;
pub mod shell;


use std::io;
use std::path::PathBuf;

use thiserror::Error;
pub use unix_path::{Path as UnixPath, PathBuf as UnixPathBuf};

pub use crate::adb::{AdbCommand, Bridge, DeviceSerial};
pub use crate::device::{DeviceHandle, DeviceInfo, PropertyKind, QueryState, Reply};
pub use crate::gateway::{Completion, Gateway, ProcessGateway, ProcessHandle};
pub use crate::parser::{parse_device_line, parse_device_list, DeviceEntry};
pub use crate::registry::{InfoView, Registry, Update};

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0}")]
    Adb(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("File was not transferred: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Multiple Android devices online")]
    MultipleDevices,
    #[error("No Android devices are online")]
    NoDevices,
    #[error("No device selected")]
    NoSelection,
    #[error("screenrecord is not running on the device")]
    RecordingNotFound,
    #[error("Unknown Android device with serial '{0}'")]
    UnknownDevice(String),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}

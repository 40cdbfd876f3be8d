/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Per-device actions. These block the calling thread until the bridge tool is done.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::adb::{AdbCommand, DeviceSerial};
use crate::gateway::{Gateway, ProcessHandle};
use crate::{DeviceError, Result, UnixPath, UnixPathBuf};

pub const PICTURE_EXTENSION: &str = ".png";
pub const VIDEO_EXTENSION: &str = ".mp4";

/// Where captures are written on the device before they are pulled.
pub const REMOTE_DIR: &str = "/sdcard";

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

fn remote_path(file_name: &str) -> UnixPathBuf {
    let mut path = UnixPathBuf::from(REMOTE_DIR);
    path.push(file_name);
    path
}

/// Pulls `remote` into `local`, removes it from the device and checks `local` arrived.
fn fetch<G: Gateway + ?Sized>(
    gateway: &G,
    serial: &str,
    remote: &UnixPath,
    local: &Path,
) -> Result<()> {
    gateway.run_sync(&AdbCommand::Pull {
        serial: serial.to_owned(),
        remote: remote.to_path_buf(),
        local: local.to_path_buf(),
    })?;

    gateway.run_sync(&AdbCommand::Remove {
        serial: serial.to_owned(),
        remote: remote.to_path_buf(),
    })?;

    if !local.exists() {
        return Err(DeviceError::MissingFile(local.to_path_buf()));
    }

    Ok(())
}

/// Captures the screen of `serial` into `<dest_dir>/<timestamp>-screenshot.png`.
pub fn take_screenshot<G: Gateway + ?Sized>(
    gateway: &G,
    serial: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let file_name = format!("{}-screenshot{}", timestamp(), PICTURE_EXTENSION);
    let remote = remote_path(&file_name);
    let local = dest_dir.join(&file_name);
    debug!("Capturing screen of {} to {}", serial, remote.display());

    gateway.run_sync(&AdbCommand::ScreenCap {
        serial: serial.to_owned(),
        remote: remote.clone(),
    })?;
    fetch(gateway, serial, &remote, &local)?;

    info!("Saved screenshot to {}", local.display());
    Ok(local)
}

/// A `screenrecord` running on a device.
#[derive(Debug)]
pub struct ScreenRecording {
    serial: DeviceSerial,
    file_name: String,
    remote: UnixPathBuf,
    process: ProcessHandle,
}

impl ScreenRecording {
    /// Starts recording into `/sdcard/<timestamp>.mp4` without waiting for it.
    pub fn start<G: Gateway + ?Sized>(gateway: &G, serial: &str) -> Result<ScreenRecording> {
        let file_name = format!("{}{}", timestamp(), VIDEO_EXTENSION);
        let remote = remote_path(&file_name);

        let process = gateway.run_async(&AdbCommand::ScreenRecord {
            serial: serial.to_owned(),
            remote: remote.clone(),
        })?;
        debug!("Recording {} to {} ({})", serial, remote.display(), process);

        Ok(ScreenRecording {
            serial: serial.to_owned(),
            file_name,
            remote,
            process,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn remote(&self) -> &UnixPath {
        &self.remote
    }

    pub fn process(&self) -> ProcessHandle {
        self.process
    }

    /// Stops the recording and moves the video to `dest_dir`.
    ///
    /// Fails with [`DeviceError::RecordingNotFound`] when `screenrecord` was no
    /// longer running on the device; the local process is terminated either way.
    pub fn stop<G: Gateway + ?Sized>(self, gateway: &G, dest_dir: &Path) -> Result<PathBuf> {
        let running = gateway.run_sync(&AdbCommand::ProcessId {
            serial: self.serial.clone(),
            name: "screenrecord".to_owned(),
        })?;

        gateway.terminate(self.process);

        if running.trim().is_empty() {
            warn!("screenrecord is not running on {}", self.serial);
            return Err(DeviceError::RecordingNotFound);
        }

        let local = dest_dir.join(&self.file_name);
        fetch(gateway, &self.serial, &self.remote, &local)?;

        info!("Saved screen recording to {}", local.display());
        Ok(local)
    }
}

/// Installs one APK. Returns whether adb reported success.
pub fn install_apk<G: Gateway + ?Sized>(gateway: &G, serial: &str, apk: &Path) -> Result<bool> {
    debug!("Installing {} on {}", apk.display(), serial);
    gateway
        .run_sync(&AdbCommand::Install {
            serial: serial.to_owned(),
            apk: apk.to_path_buf(),
        })
        .map(|v| v.contains("Success"))
}

/// Installs every given file, and every `*.apk` below every given directory.
pub fn install_apks<G: Gateway + ?Sized>(
    gateway: &G,
    serial: &str,
    paths: &[PathBuf],
) -> Result<Vec<(PathBuf, bool)>> {
    let mut results = Vec::new();

    for apk in collect_apks(paths)? {
        let installed = install_apk(gateway, serial, &apk)?;
        if !installed {
            warn!("Installing {} on {} failed", apk.display(), serial);
        }
        results.push((apk, installed));
    }

    Ok(results)
}

fn collect_apks(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut apks = Vec::new();

    for path in paths {
        if !path.is_dir() {
            apks.push(path.clone());
            continue;
        }

        let walker = WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let is_apk = entry
                .path()
                .extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("apk"));
            if is_apk {
                apks.push(entry.into_path());
            }
        }
    }

    Ok(apks)
}

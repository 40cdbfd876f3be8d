/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::ffi::OsString;
use std::path::PathBuf;

use crate::shell;
use crate::UnixPathBuf;

pub type DeviceSerial = String;

/// Location of the adb binary used for every invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bridge {
    /// The bridge tool to run.  Falls back to `$ADB`, then to `adb` on `PATH`.
    pub program: Option<PathBuf>,
}

impl Bridge {
    pub fn new<P: Into<PathBuf>>(program: P) -> Bridge {
        Bridge {
            program: Some(program.into()),
        }
    }

    pub fn program(&self) -> PathBuf {
        self.program
            .clone()
            .or_else(|| std::env::var_os("ADB").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("adb"))
    }
}

/// Every bridge tool invocation this crate issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbCommand {
    /// `adb devices -l`
    ListDevices,
    /// `adb -s <serial> shell getprop <key>`
    GetProp {
        serial: DeviceSerial,
        key: &'static str,
    },
    /// `adb -s <serial> shell screencap -p <remote>`
    ScreenCap {
        serial: DeviceSerial,
        remote: UnixPathBuf,
    },
    /// `adb -s <serial> shell screenrecord <remote>`
    ScreenRecord {
        serial: DeviceSerial,
        remote: UnixPathBuf,
    },
    /// `adb -s <serial> shell pidof <name>`
    ProcessId {
        serial: DeviceSerial,
        name: String,
    },
    /// `adb -s <serial> pull <remote> <local>`
    Pull {
        serial: DeviceSerial,
        remote: UnixPathBuf,
        local: PathBuf,
    },
    /// `adb -s <serial> shell rm <remote>`
    Remove {
        serial: DeviceSerial,
        remote: UnixPathBuf,
    },
    /// `adb -s <serial> install <apk>`
    Install { serial: DeviceSerial, apk: PathBuf },
}

impl AdbCommand {
    pub fn serial(&self) -> Option<&str> {
        match self {
            AdbCommand::ListDevices => None,
            AdbCommand::GetProp { serial, .. }
            | AdbCommand::ScreenCap { serial, .. }
            | AdbCommand::ScreenRecord { serial, .. }
            | AdbCommand::ProcessId { serial, .. }
            | AdbCommand::Pull { serial, .. }
            | AdbCommand::Remove { serial, .. }
            | AdbCommand::Install { serial, .. } => Some(serial),
        }
    }

    /// Argument list passed to the bridge tool, without the program itself.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if let Some(serial) = self.serial() {
            args.push("-s".into());
            args.push(serial.into());
        }

        match self {
            AdbCommand::ListDevices => {
                args.push("devices".into());
                args.push("-l".into());
            }
            AdbCommand::GetProp { key, .. } => {
                args.extend(["shell", "getprop", *key].map(OsString::from));
            }
            AdbCommand::ScreenCap { remote, .. } => {
                args.extend(["shell", "screencap", "-p"].map(OsString::from));
                args.push(remote_arg(remote));
            }
            AdbCommand::ScreenRecord { remote, .. } => {
                args.extend(["shell", "screenrecord"].map(OsString::from));
                args.push(remote_arg(remote));
            }
            AdbCommand::ProcessId { name, .. } => {
                args.extend(["shell", "pidof"].map(OsString::from));
                args.push(shell::quote(name).into());
            }
            AdbCommand::Pull { remote, local, .. } => {
                args.push("pull".into());
                // pull is not run through the remote shell, no quoting.
                args.push(remote.display().to_string().into());
                args.push(local.clone().into_os_string());
            }
            AdbCommand::Remove { remote, .. } => {
                args.extend(["shell", "rm"].map(OsString::from));
                args.push(remote_arg(remote));
            }
            AdbCommand::Install { apk, .. } => {
                args.push("install".into());
                args.push(apk.clone().into_os_string());
            }
        }

        args
    }
}

/// Remote paths end up on the device's shell command line.
fn remote_arg(remote: &UnixPathBuf) -> OsString {
    shell::quote(&remote.display().to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(command: &AdbCommand) -> Vec<String> {
        command
            .args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn list_devices_has_no_serial() {
        assert_eq!(rendered(&AdbCommand::ListDevices), vec!["devices", "-l"]);
    }

    #[test]
    fn getprop_targets_serial() {
        let command = AdbCommand::GetProp {
            serial: "ABCDE1234".to_owned(),
            key: "ro.product.model",
        };
        assert_eq!(
            rendered(&command),
            vec!["-s", "ABCDE1234", "shell", "getprop", "ro.product.model"]
        );
    }

    #[test]
    fn remote_shell_paths_are_quoted() {
        let command = AdbCommand::Remove {
            serial: "emulator-5554".to_owned(),
            remote: UnixPathBuf::from("/sdcard/my video.mp4"),
        };
        assert_eq!(
            rendered(&command),
            vec!["-s", "emulator-5554", "shell", "rm", "'/sdcard/my video.mp4'"]
        );

        let command = AdbCommand::Pull {
            serial: "emulator-5554".to_owned(),
            remote: UnixPathBuf::from("/sdcard/my video.mp4"),
            local: PathBuf::from("out.mp4"),
        };
        assert_eq!(
            rendered(&command),
            vec!["-s", "emulator-5554", "pull", "/sdcard/my video.mp4", "out.mp4"]
        );
    }

    #[test]
    fn explicit_program_wins() {
        assert_eq!(
            Bridge::new("/opt/platform-tools/adb").program(),
            PathBuf::from("/opt/platform-tools/adb")
        );
    }
}

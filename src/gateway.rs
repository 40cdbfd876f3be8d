/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Running the bridge tool as an external process.

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace, warn};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::adb::{AdbCommand, Bridge};
use crate::{DeviceError, Result};

/// Token for one asynchronous bridge invocation.
///
/// Every call to [`Gateway::run_async`] gets a fresh token, so a completion
/// can always be matched to exactly the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(Uuid);

impl ProcessHandle {
    pub fn new() -> ProcessHandle {
        ProcessHandle(Uuid::new_v4())
    }
}

impl Default for ProcessHandle {
    fn default() -> ProcessHandle {
        ProcessHandle::new()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Delivered once an asynchronous invocation has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub handle: ProcessHandle,
    /// Captured standard output with `\r\n` unified to `\n`.
    pub output: String,
}

/// Issues bridge tool invocations.
pub trait Gateway {
    /// Starts `command` without waiting for it. Its output arrives later as a
    /// [`Completion`] carrying the returned handle.
    fn run_async(&self, command: &AdbCommand) -> Result<ProcessHandle>;

    /// Runs `command` to completion, blocking the calling thread, and returns
    /// its standard output. A remote command exiting non-zero is not an
    /// error; the bridge tool itself failing is.
    fn run_sync(&self, command: &AdbCommand) -> Result<String>;

    /// Kills the process behind `handle`. Returns `false` if it already
    /// finished or was never known. No completion is delivered afterwards.
    fn terminate(&self, handle: ProcessHandle) -> bool;
}

/// [`Gateway`] that spawns the real bridge tool on the tokio runtime.
#[derive(Debug)]
pub struct ProcessGateway {
    bridge: Bridge,
    completions: UnboundedSender<Completion>,
    running: Arc<Mutex<HashMap<ProcessHandle, AbortHandle>>>,
}

impl ProcessGateway {
    /// Creates the gateway together with the receiving end of its completions.
    pub fn new(bridge: Bridge) -> (ProcessGateway, UnboundedReceiver<Completion>) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let gateway = ProcessGateway {
            bridge,
            completions,
            running: Arc::new(Mutex::new(HashMap::new())),
        };
        (gateway, receiver)
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Number of asynchronous invocations that have neither finished nor been terminated.
    pub fn running(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Gateway for ProcessGateway {
    fn run_async(&self, command: &AdbCommand) -> Result<ProcessHandle> {
        let program = self.bridge.program();
        let args = command.args();
        trace!("run_async: >> {} {:?}", program.display(), args);

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let handle = ProcessHandle::new();
        let completions = self.completions.clone();
        let running = Arc::clone(&self.running);

        // Hold the table while spawning so the task cannot deregister before it is registered.
        let mut table = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(async move {
            let result = child.wait_with_output().await;
            let registered = running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle)
                .is_some();
            if !registered {
                // terminated after the child exited but before the abort landed
                trace!("Discarding output of terminated {}", handle);
                return;
            }

            match result {
                Ok(output) => {
                    trace!("run_async: << {} {:?}", handle, bstr::BStr::new(&output.stdout));
                    let completion = Completion {
                        handle,
                        output: decode(&output.stdout),
                    };
                    if completions.send(completion).is_err() {
                        debug!("Dropping output of {}, nobody is listening", handle);
                    }
                }
                // Never answered; whoever waits on this handle stalls.
                Err(err) => warn!("Failed to collect output of {}: {}", handle, err),
            }
        });
        table.insert(handle, task.abort_handle());

        Ok(handle)
    }

    fn run_sync(&self, command: &AdbCommand) -> Result<String> {
        let program = self.bridge.program();
        let args = command.args();
        trace!("run_sync: >> {} {:?}", program.display(), args);

        let output = std::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .output()?;

        trace!("run_sync: << {:?}", bstr::BStr::new(&output.stdout));
        if !output.status.success() {
            debug!(
                "{} exited with {}: {:?}",
                program.display(),
                output.status,
                bstr::BStr::new(&output.stderr)
            );

            // adb's own failures (no such device, no server, ...) as opposed
            // to a remote command exiting non-zero.
            let stderr = decode(&output.stderr);
            if let Some(message) = bridge_error(&stderr) {
                return Err(DeviceError::Adb(format!("adb error: {}", message)));
            }
        }

        Ok(decode(&output.stdout))
    }

    fn terminate(&self, handle: ProcessHandle) -> bool {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);

        match task {
            Some(task) => {
                debug!("Terminating {}", handle);
                // Dropping the aborted future drops the child, which kills it.
                task.abort();
                true
            }
            None => false,
        }
    }
}

fn bridge_error(stderr: &str) -> Option<&str> {
    stderr
        .lines()
        .find_map(|line| line.strip_prefix("adb: error: ").or_else(|| line.strip_prefix("error: ")))
}

fn decode(bytes: &[u8]) -> String {
    // Unify new lines by removing possible carriage returns
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bridge_errors_are_recognized() {
        assert_eq!(
            bridge_error("adb: error: device 'ABCDE1234' not found\n"),
            Some("device 'ABCDE1234' not found")
        );
        assert_eq!(
            bridge_error("* daemon started successfully\nerror: no devices/emulators found\n"),
            Some("no devices/emulators found")
        );
        assert_eq!(bridge_error(""), None);
        assert_eq!(bridge_error("rm: /sdcard/x: No such file or directory\n"), None);
    }

    #[test]
    fn handles_are_unique() {
        assert_ne!(ProcessHandle::new(), ProcessHandle::new());
    }

    #[test]
    fn decode_unifies_line_endings() {
        assert_eq!(decode(b"SM-G973F\r\n"), "SM-G973F\n");
        assert_eq!(decode(b"a\r\nb\n"), "a\nb\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let (gateway, _completions) =
            ProcessGateway::new(Bridge::new("/nonexistent/adb-probe-test/adb"));
        assert!(gateway.run_async(&AdbCommand::ListDevices).is_err());
        assert!(gateway.run_sync(&AdbCommand::ListDevices).is_err());
        assert_eq!(gateway.running(), 0);
    }

    #[cfg(unix)]
    fn fake_adb(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("adb");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn completion_carries_normalized_output() {
        let dir = tempfile::tempdir().unwrap();
        let adb = fake_adb(
            dir.path(),
            r"printf 'List of devices attached\r\nABCDE1234\tdevice\r\n'",
        );
        let (gateway, mut completions) = ProcessGateway::new(Bridge::new(adb));

        let handle = gateway.run_async(&AdbCommand::ListDevices).unwrap();
        let completion = tokio::time::timeout(Duration::from_secs(10), completions.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(completion.handle, handle);
        assert_eq!(completion.output, "List of devices attached\nABCDE1234\tdevice\n");
        assert_eq!(gateway.running(), 0);
        assert!(!gateway.terminate(handle));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn terminate_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let adb = fake_adb(
            dir.path(),
            &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
        );
        let (gateway, mut completions) = ProcessGateway::new(Bridge::new(adb));

        let handle = gateway.run_async(&AdbCommand::ListDevices).unwrap();
        let pid = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                    if let Ok(pid) = pid.trim().parse::<u32>() {
                        return pid;
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(gateway.running(), 1);

        assert!(gateway.terminate(handle));
        assert_eq!(gateway.running(), 0);

        // Gone, or a zombie waiting to be reaped.
        let alive = || match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => !stat.rsplit(')').next().unwrap_or("").trim_start().starts_with('Z'),
            Err(_) => false,
        };
        let killed = tokio::time::timeout(Duration::from_secs(10), async {
            while alive() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(killed.is_ok(), "child {} still running", pid);

        let late = tokio::time::timeout(Duration::from_millis(300), completions.recv()).await;
        assert!(late.is_err(), "completion delivered after terminate: {:?}", late);
    }

    #[tokio::test]
    async fn unknown_handle_is_not_terminated() {
        let (gateway, _completions) = ProcessGateway::new(Bridge::default());
        assert!(!gateway.terminate(ProcessHandle::new()));
    }
}

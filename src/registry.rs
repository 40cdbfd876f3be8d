/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;

use log::{debug, info, trace, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::adb::{AdbCommand, Bridge, DeviceSerial};
use crate::device::{DeviceHandle, DeviceInfo, PropertyKind, Reply};
use crate::gateway::{Completion, Gateway, ProcessGateway, ProcessHandle};
use crate::parser::{parse_device_line, parse_device_list};
use crate::{DeviceError, Result};

/// Something the presentation layer should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// A discovery scan finished and `added` new devices started their property chain.
    ScanFinished { added: usize },
    /// A device completed its property chain; carries the re-rendered summary.
    Refresh(Vec<String>),
}

/// The information shown for the selected device; blank without a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoView {
    pub title: String,
    pub info: DeviceInfo,
}

impl InfoView {
    pub const NO_DEVICE_TITLE: &'static str = "<Device Name>";

    fn blank() -> InfoView {
        InfoView {
            title: InfoView::NO_DEVICE_TITLE.to_owned(),
            info: DeviceInfo::default(),
        }
    }
}

impl fmt::Display for InfoView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if !self.info.serial.is_empty() {
            writeln!(f, "  {:<12} {}", "Serial", self.info.serial)?;
        }
        for kind in PropertyKind::ALL {
            writeln!(f, "  {:<12} {}", kind.to_string(), self.info.get(kind))?;
        }
        Ok(())
    }
}

/// Devices discovered by the most recent scans, in discovery order.
///
/// The registry owns every [`DeviceHandle`] and routes gateway completions to
/// the scan or to the device whose query they answer.
#[derive(Debug)]
pub struct Registry<G: Gateway> {
    gateway: G,
    completions: UnboundedReceiver<Completion>,
    devices: Vec<DeviceHandle>,
    selected: Option<usize>,
    scan: Option<ProcessHandle>,
}

impl Registry<ProcessGateway> {
    /// Registry driving the real bridge tool.
    pub fn with_bridge(bridge: Bridge) -> Registry<ProcessGateway> {
        let (gateway, completions) = ProcessGateway::new(bridge);
        Registry::new(gateway, completions)
    }
}

impl<G: Gateway> Registry<G> {
    /// `completions` must be the channel `gateway` delivers its completions on.
    pub fn new(gateway: G, completions: UnboundedReceiver<Completion>) -> Registry<G> {
        Registry {
            gateway,
            completions,
            devices: Vec::new(),
            selected: None,
            scan: None,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    /// No scan and no property query in flight.
    ///
    /// Devices that could not issue their next query count as settled, they
    /// have nothing left to wait for.
    pub fn is_settled(&self) -> bool {
        self.scan.is_none() && self.devices.iter().all(|device| device.in_flight().is_none())
    }

    /// Starts a discovery scan. Returns `false` if one is already running.
    pub fn scan(&mut self) -> Result<bool> {
        if self.scan.is_some() {
            debug!("Scan already running");
            return Ok(false);
        }

        let handle = self.gateway.run_async(&AdbCommand::ListDevices)?;
        debug!("Scanning for devices ({})", handle);
        self.scan = Some(handle);
        Ok(true)
    }

    /// Adds every newly listed device and starts its property chain.
    ///
    /// Serials already in the registry are skipped. Returns the number added.
    pub fn on_scan_output(&mut self, raw: &str) -> usize {
        // header
        let lines = raw.lines().skip(1);
        let mut added = 0;

        for (serial, line) in parse_device_list(raw).into_iter().zip(lines) {
            if self.position(&serial).is_some() {
                trace!("{} already known", serial);
                continue;
            }

            let mut details = DeviceInfo::new(serial);
            if let Some(entry) = parse_device_line(line) {
                details.state = entry.state;
                details.attributes = entry.attributes;
            }

            let mut device = DeviceHandle::with_info(details);
            if let Err(err) = device.start_next_query(&self.gateway) {
                warn!("Failed to query {}: {}", device.serial(), err);
            }
            info!("Found device {}", device.serial());
            self.devices.push(device);
            added += 1;
        }

        added
    }

    /// Re-renders the device summary after a device completed its chain.
    pub fn on_device_complete(&self, index: usize) -> Update {
        if let Some(device) = self.devices.get(index) {
            debug!("{}: all properties collected", device.serial());
        }
        Update::Refresh(self.summary())
    }

    /// `"1. <model>"` per device, in discovery order.
    pub fn summary(&self) -> Vec<String> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, device)| format!("{}. {}", i + 1, device.info().model))
            .collect()
    }

    /// Routes one completion. Completions nobody is waiting for are dropped.
    pub fn dispatch(&mut self, completion: Completion) -> Option<Update> {
        let Completion { handle, output } = completion;

        if self.scan == Some(handle) {
            self.scan = None;
            let added = self.on_scan_output(&output);
            return Some(Update::ScanFinished { added });
        }

        let index = match self
            .devices
            .iter()
            .position(|device| device.in_flight() == Some(handle))
        {
            Some(index) => index,
            None => {
                trace!("Ignoring stale completion {}", handle);
                return None;
            }
        };

        match self.devices[index].on_reply(handle, &output, &self.gateway) {
            Ok(Reply::Complete) => Some(self.on_device_complete(index)),
            Ok(Reply::Advanced(_)) | Ok(Reply::Ignored) => None,
            Err(err) => {
                warn!("Failed to query {}: {}", self.devices[index].serial(), err);
                None
            }
        }
    }

    /// Waits for the next completion that produces an [`Update`].
    ///
    /// Returns `None` once the gateway has gone away.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            let completion = self.completions.recv().await?;
            if let Some(update) = self.dispatch(completion) {
                return Some(update);
            }
        }
    }

    /// Dispatches completions until [`Registry::is_settled`].
    ///
    /// A device whose query never returns keeps this waiting; bound it with
    /// `tokio::time::timeout` if that matters.
    pub async fn settle(&mut self) -> Vec<Update> {
        let mut updates = Vec::new();
        while !self.is_settled() {
            match self.next_update().await {
                Some(update) => updates.push(update),
                None => break,
            }
        }
        updates
    }

    /// Terminates every query in flight, drops all devices and the selection.
    ///
    /// Returns the number of queries that were terminated.
    pub fn clear(&mut self) -> usize {
        let mut terminated = 0;
        for mut device in self.devices.drain(..) {
            if device.cancel(&self.gateway) {
                terminated += 1;
            }
        }
        self.selected = None;
        terminated
    }

    /// Forgets all devices and scans again.
    pub fn refresh(&mut self) -> Result<bool> {
        self.clear();
        self.scan()
    }

    pub fn position(&self, serial: &str) -> Option<usize> {
        self.devices
            .iter()
            .position(|device| device.serial() == serial)
    }

    /// Selects the device at `position`; anything out of range clears the selection.
    pub fn select(&mut self, position: i64) -> Option<&DeviceHandle> {
        self.selected = usize::try_from(position)
            .ok()
            .filter(|&index| index < self.devices.len());
        self.selected_device()
    }

    /// Selects `serial` or `$ANDROID_SERIAL`, or the only device when neither is set.
    pub fn select_default(&mut self, serial: Option<&str>) -> Result<&DeviceHandle> {
        let wanted = serial
            .map(|s| s.to_owned())
            .or_else(|| std::env::var("ANDROID_SERIAL").ok());

        let index = match wanted {
            Some(serial) => self
                .position(&serial)
                .ok_or(DeviceError::UnknownDevice(serial))?,
            None => match self.devices.len() {
                0 => return Err(DeviceError::NoDevices),
                1 => 0,
                _ => return Err(DeviceError::MultipleDevices),
            },
        };

        self.selected = Some(index);
        Ok(&self.devices[index])
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_device(&self) -> Option<&DeviceHandle> {
        self.selected.and_then(|index| self.devices.get(index))
    }

    pub fn selected_serial(&self) -> Result<&DeviceSerial> {
        self.selected_device()
            .map(DeviceHandle::serial)
            .ok_or(DeviceError::NoSelection)
    }

    pub fn info_view(&self) -> InfoView {
        match self.selected_device() {
            Some(device) => InfoView {
                title: device.info().model.clone(),
                info: device.info().clone(),
            },
            None => InfoView::blank(),
        }
    }
}

impl<G: Gateway> Drop for Registry<G> {
    fn drop(&mut self) {
        self.clear();
    }
}

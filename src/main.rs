/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use adb_probe::actions::{install_apks, take_screenshot, ScreenRecording};
use adb_probe::{Bridge, DeviceError, Registry, Update};
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(version, about = "Inspect Android devices attached through adb")]
struct Args {
    /// adb binary to use (defaults to $ADB, then `adb` on PATH)
    #[arg(long, value_name = "PATH")]
    adb: Option<PathBuf>,
    /// Device to act on (defaults to $ANDROID_SERIAL, then the only device)
    #[arg(short, long)]
    serial: Option<String>,
    /// Seconds to wait for devices to report their properties
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// More output; repeat for trace logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List attached devices and their properties
    Devices {
        /// Show every device instead of only the selected one
        #[arg(short, long)]
        all: bool,
    },
    /// Save a screenshot of the device
    Screenshot {
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Record the screen until Ctrl-C or until --seconds elapsed
    Record {
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Install APK files, or every APK below the given directories
    Install {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), DeviceError> {
    let bridge = Bridge {
        program: args.adb.clone(),
    };
    let mut registry = Registry::with_bridge(bridge);

    registry.scan()?;
    let settled = tokio::time::timeout(Duration::from_secs(args.timeout), async {
        while !registry.is_settled() {
            match registry.next_update().await {
                Some(Update::ScanFinished { added }) => debug!("Scan found {} device(s)", added),
                Some(Update::Refresh(summary)) => debug!("Devices: {:?}", summary),
                None => break,
            }
        }
    })
    .await;
    if settled.is_err() {
        warn!("Some devices did not answer within {}s", args.timeout);
    }

    match args.command {
        Command::Devices { all } => {
            if registry.is_empty() {
                return Err(DeviceError::NoDevices);
            }

            for line in registry.summary() {
                println!("{}", line);
            }
            println!();

            if all {
                for index in 0..registry.len() {
                    registry.select(index as i64);
                    println!("{}", registry.info_view());
                }
            } else {
                registry.select_default(args.serial.as_deref())?;
                println!("{}", registry.info_view());
            }
        }
        Command::Screenshot { out } => {
            let serial = registry.select_default(args.serial.as_deref())?.serial().clone();
            let path = take_screenshot(registry.gateway(), &serial, &out)?;
            println!("{}", path.display());
        }
        Command::Record { out, seconds } => {
            let serial = registry.select_default(args.serial.as_deref())?.serial().clone();
            let recording = ScreenRecording::start(registry.gateway(), &serial)?;
            info!("Recording {}, press Ctrl-C to stop", serial);

            match seconds {
                Some(seconds) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(seconds)) => (),
                        res = tokio::signal::ctrl_c() => res?,
                    }
                }
                None => tokio::signal::ctrl_c().await?,
            }

            let path = recording.stop(registry.gateway(), &out)?;
            println!("{}", path.display());
        }
        Command::Install { paths } => {
            let serial = registry.select_default(args.serial.as_deref())?.serial().clone();
            let results = install_apks(registry.gateway(), &serial, &paths)?;

            let failed = results.iter().filter(|(_, ok)| !ok).count();
            for (apk, ok) in &results {
                println!("{} {}", if *ok { "installed" } else { "FAILED   " }, apk.display());
            }
            if failed > 0 {
                return Err(DeviceError::Adb(format!(
                    "{} of {} installs failed",
                    failed,
                    results.len()
                )));
            }
        }
    }

    Ok(())
}

//! Listen, launch the device, accept its link and drive one session.

use std::io::BufReader;
use std::net::TcpListener;

use anyhow::Context;
use fibre_core::{
    DeviceProcess, FirmwareImage, FrameReader, FrameWriter, Session, SessionConfig, SessionFault,
    SessionOutcome, SessionStatus,
};
use tracing::{info, warn};

use crate::{DeviceSupervisor, ProbeConfig};

/// Result of a session that got as far as accepting the device link.
#[derive(Debug)]
pub struct ProbeRun {
    /// How the session ended.
    pub result: Result<SessionOutcome, SessionFault>,
    /// Session state at exit.
    pub status: SessionStatus,
}

/// Loads firmware, binds the listener, starts the device and serves its
/// link until the session ends.
///
/// Firmware is read before anything is started so a bad path fails fast.
///
/// # Errors
///
/// Returns setup failures: unreadable firmware, bind, spawn or accept
/// errors. Session faults are reported in [`ProbeRun::result`].
pub fn run(config: &ProbeConfig) -> anyhow::Result<ProbeRun> {
    let firmware = FirmwareImage::read(&config.firmware)
        .with_context(|| format!("reading firmware {}", config.firmware.display()))?;
    info!(
        path = %config.firmware.display(),
        bytes = firmware.byte_len(),
        "firmware loaded"
    );

    let listener = TcpListener::bind(&config.listen)
        .with_context(|| format!("binding {}", config.listen))?;
    info!(listen = %config.listen, "waiting for device link");

    let mut device = DeviceSupervisor::spawn(&config.device, &config.device_args, &config.log)
        .with_context(|| format!("starting {}", config.device.display()))?;

    serve(&listener, &mut device, firmware, SessionConfig::default())
}

/// Accepts one connection on `listener` and runs a session over it.
///
/// `device` is terminated when the session ends; on an accept failure it is
/// left to its owner.
///
/// # Errors
///
/// Returns accept and socket setup failures.
pub fn serve<D>(
    listener: &TcpListener,
    device: &mut D,
    firmware: FirmwareImage,
    config: SessionConfig,
) -> anyhow::Result<ProbeRun>
where
    D: DeviceProcess + ?Sized,
{
    let (stream, peer) = listener.accept().context("accepting device link")?;
    info!(%peer, "device connected");
    stream.set_nodelay(true).context("configuring device link")?;
    let writer = stream.try_clone().context("cloning device link")?;

    let mut reader = FrameReader::new(BufReader::new(stream));
    let mut session = Session::new(FrameWriter::new(writer), config, firmware);

    let result = match session.open_link() {
        Ok(()) => session.run(&mut reader, device),
        Err(fault) => {
            if let Err(err) = device.terminate() {
                warn!(%err, "device teardown after fault failed");
            }
            Err(fault)
        }
    };

    Ok(ProbeRun {
        result,
        status: session.status(),
    })
}

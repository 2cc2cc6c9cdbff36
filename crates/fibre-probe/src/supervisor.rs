//! Device emulator child process.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use fibre_core::DeviceProcess;
use tracing::{info, warn};

/// Owns the device emulator process and kills it when dropped.
#[derive(Debug)]
pub struct DeviceSupervisor {
    child: Option<Child>,
}

impl DeviceSupervisor {
    /// Spawns `program` with stdout and stderr both appended to `log`.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the log file cannot be created or the
    /// program cannot be started.
    pub fn spawn<I, S>(program: &Path, args: I, log: &Path) -> io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let stdout = File::create(log)?;
        let stderr = stdout.try_clone()?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;
        info!(pid = child.id(), program = %program.display(), "device started");
        Ok(Self { child: Some(child) })
    }

    /// Process id of a running device.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl DeviceProcess for DeviceSupervisor {
    fn terminate(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(status) = child.try_wait()? {
            info!(%status, "device already exited");
            return Ok(());
        }
        match child.kill() {
            Ok(()) => {}
            // Exited between the poll and the kill.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err),
        }
        let status = child.wait()?;
        info!(%status, "device terminated");
        Ok(())
    }
}

impl Drop for DeviceSupervisor {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            warn!(%err, "device teardown on drop failed");
        }
    }
}

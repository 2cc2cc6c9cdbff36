use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

/// Default address the probe listens on for the device link.
pub const DEFAULT_LISTEN: &str = "localhost:54321";
/// Default device emulator program.
pub const DEFAULT_DEVICE: &str = "./vs100";
/// Default firmware image.
pub const DEFAULT_FIRMWARE: &str = "drivers/X10R4/fw-235.bin";

#[derive(Debug, Clone, Parser)]
#[command(name = "fibre-probe", version, about)]
struct Args {
    /// File receiving the device emulator's stdout and stderr.
    log: PathBuf,

    /// Address to accept the device link on.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Device emulator program.
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// Firmware image uploaded during bring-up.
    #[arg(long, default_value = DEFAULT_FIRMWARE)]
    firmware: PathBuf,

    /// Write a JSON session report here on exit.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log every frame.
    #[arg(short, long)]
    verbose: bool,

    /// Extra arguments passed to the device emulator.
    #[arg(last = true)]
    device_args: Vec<OsString>,
}

/// Resolved probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Device emulator log file.
    pub log: PathBuf,
    /// Listen address in `host:port` form.
    pub listen: String,
    /// Device emulator program.
    pub device: PathBuf,
    /// Arguments passed to the device emulator.
    pub device_args: Vec<OsString>,
    /// Firmware image path.
    pub firmware: PathBuf,
    /// Optional JSON report path.
    pub report: Option<PathBuf>,
    /// Raise the default log level to `debug`.
    pub verbose: bool,
}

impl ProbeConfig {
    /// Parses the process arguments, exiting with usage on error.
    #[must_use]
    pub fn from_env() -> Self {
        Args::parse().into()
    }

    /// Parses an explicit argument list; the first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns the clap error for unknown flags or a missing log path.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Args::try_parse_from(args).map(Into::into)
    }
}

impl From<Args> for ProbeConfig {
    fn from(args: Args) -> Self {
        Self {
            log: args.log,
            listen: args.listen,
            device: args.device,
            device_args: args.device_args,
            firmware: args.firmware,
            report: args.report,
            verbose: args.verbose,
        }
    }
}

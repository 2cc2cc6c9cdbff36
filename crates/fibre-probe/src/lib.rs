//! Bring-up probe: plays the host controller against a device emulator
//! connected over TCP.

/// Command-line configuration.
pub mod cli;
pub use cli::ProbeConfig;

/// Device emulator process lifetime.
pub mod supervisor;
pub use supervisor::DeviceSupervisor;

/// Session bootstrap over a TCP link.
pub mod bootstrap;
pub use bootstrap::{run, serve, ProbeRun};

/// JSON session reports.
pub mod report;
pub use report::{FaultReport, SessionReport};

/// Tracing subscriber setup.
pub mod logging;

//! CLI entry point for the fibre bring-up probe.

use std::process::ExitCode;

use anyhow::Context;
use fibre_probe::{logging, ProbeConfig, SessionReport};
use tracing::{error, info};

use clap as _;
use fibre_core as _;
use serde as _;
use serde_json as _;
#[cfg(test)]
use tempfile as _;
use tracing_subscriber as _;

fn main() -> ExitCode {
    let config = ProbeConfig::from_env();
    logging::init(config.verbose);

    match probe(&config) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn probe(config: &ProbeConfig) -> anyhow::Result<ExitCode> {
    let run = fibre_probe::run(config)?;

    if let Some(path) = &config.report {
        SessionReport::new(&run.result, run.status.clone())
            .write(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    match run.result {
        Ok(outcome) => {
            info!(?outcome, state = %run.status.state, "session ended");
            Ok(ExitCode::SUCCESS)
        }
        Err(fault) => {
            error!(class = ?fault.class(), "{fault}");
            Ok(ExitCode::FAILURE)
        }
    }
}

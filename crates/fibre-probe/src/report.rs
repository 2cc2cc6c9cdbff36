use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use fibre_core::{FaultClass, FaultContext, SessionFault, SessionOutcome, SessionStatus};
use serde::{Deserialize, Serialize};

/// Fault portion of a session report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    /// Fault class.
    pub class: FaultClass,
    /// Rendered fault message.
    pub message: String,
    /// Where the fault happened.
    pub context: FaultContext,
}

impl From<&SessionFault> for FaultReport {
    fn from(fault: &SessionFault) -> Self {
        Self {
            class: fault.class(),
            message: fault.fault.to_string(),
            context: fault.context,
        }
    }
}

/// JSON report written when the probe exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Clean outcome, absent when the session faulted.
    pub outcome: Option<SessionOutcome>,
    /// Fault that ended the session, if any.
    pub fault: Option<FaultReport>,
    /// Session state at exit.
    pub status: SessionStatus,
}

impl SessionReport {
    /// Builds a report from a finished session.
    #[must_use]
    pub fn new(result: &Result<SessionOutcome, SessionFault>, status: SessionStatus) -> Self {
        match result {
            Ok(outcome) => Self {
                outcome: Some(*outcome),
                fault: None,
                status,
            },
            Err(fault) => Self {
                outcome: None,
                fault: Some(fault.into()),
                status,
            },
        }
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the I/O or serialization error.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.write_all(b"\n")?;
        out.flush()
    }
}

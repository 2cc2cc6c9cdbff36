use std::fmt;
use std::io;

use thiserror::Error;

use crate::{Reason, SequencerState};

/// Fault classes used to tell transport faults apart from sequencing faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Inbound framing could not be decoded.
    Transport,
    /// Interrupt reason register held a value with no registered handler.
    Protocol,
    /// A registered reason arrived while the sequencer expected another one.
    Sequencing,
    /// Device memory access violated addressing rules.
    Memory,
    /// Host-side I/O failed (socket, child process).
    Io,
}

/// Fault taxonomy for a scripted bring-up session.
///
/// Every variant is fatal: the session never retries and never skips a frame.
#[derive(Debug, Error)]
pub enum ProtocolFault {
    /// Tag byte has no inbound handler.
    #[error("unhandled protocol tag 0x{tag:02X}")]
    UnknownTag {
        /// Raw tag byte.
        tag: u8,
    },
    /// Peer closed the link in the middle of a frame payload.
    #[error("truncated payload for tag 0x{tag:02X}: expected {expected} bytes, received {received}")]
    TruncatedPayload {
        /// Tag whose payload was cut short.
        tag: u8,
        /// Payload length fixed by the tag.
        expected: usize,
        /// Bytes actually delivered before end-of-stream.
        received: usize,
    },
    /// Register update named an index outside `CSR0..=CSR7`.
    #[error("register index {index} out of range")]
    RegisterIndex {
        /// Raw register index.
        index: u8,
    },
    /// Word access used an odd byte address.
    #[error("unaligned word access at 0x{address:06X}")]
    UnalignedAccess {
        /// Offending byte address.
        address: u32,
    },
    /// Reason register held a value with no registered handler, including
    /// combinations of otherwise valid bits.
    #[error("unhandled interrupt reason 0x{raw:04X}")]
    UnhandledReason {
        /// Raw value read from CSR1.
        raw: u16,
    },
    /// Reason is registered but the sequencer has no transition for it.
    #[error("unexpected {reason} while {state}")]
    UnexpectedReason {
        /// Sequencer state at the time of the interrupt.
        state: SequencerState,
        /// Reason that was delivered.
        reason: Reason,
    },
    /// Firmware image does not fit in device memory at its load address.
    #[error("firmware image of {bytes} bytes does not fit device memory")]
    FirmwareTooLarge {
        /// Image length in bytes.
        bytes: usize,
    },
    /// Command descriptor does not fit device memory at its offset.
    #[error("descriptor of {len} words does not fit device memory at word {offset}")]
    DescriptorOutOfRange {
        /// Host word offset of the descriptor.
        offset: usize,
        /// Descriptor length in words.
        len: usize,
    },
    /// Reading from or writing to the link failed.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    /// Terminating the device emulator failed.
    #[error("device teardown failed: {0}")]
    Teardown(#[source] io::Error),
}

impl ProtocolFault {
    /// Returns the fault class for this fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::UnknownTag { .. } | Self::TruncatedPayload { .. } | Self::RegisterIndex { .. } => {
                FaultClass::Transport
            }
            Self::UnhandledReason { .. } => FaultClass::Protocol,
            Self::UnexpectedReason { .. } => FaultClass::Sequencing,
            Self::UnalignedAccess { .. }
            | Self::FirmwareTooLarge { .. }
            | Self::DescriptorOutOfRange { .. } => FaultClass::Memory,
            Self::Transport(_) | Self::Teardown(_) => FaultClass::Io,
        }
    }
}

/// Session context captured when a fault ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FaultContext {
    /// Sequencer state when the fault was raised.
    pub state: SequencerState,
    /// Last raw interrupt reason read from CSR1, if any interrupt was seen.
    pub last_reason: Option<u16>,
    /// Tag of the last inbound frame, if any frame was read.
    pub last_tag: Option<u8>,
}

impl fmt::Display for FaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state {}", self.state)?;
        match self.last_reason {
            Some(raw) => write!(f, ", last reason 0x{raw:04X}")?,
            None => write!(f, ", no reason seen")?,
        }
        match self.last_tag {
            Some(tag) => write!(f, ", last tag 0x{tag:02X}"),
            None => write!(f, ", no frame seen"),
        }
    }
}

/// Fatal session fault together with where it happened.
#[derive(Debug, Error)]
#[error("{fault} ({context})")]
pub struct SessionFault {
    /// Underlying fault.
    #[source]
    pub fault: ProtocolFault,
    /// Session context at the time of the fault.
    pub context: FaultContext,
}

impl SessionFault {
    /// Returns the class of the underlying fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        self.fault.class()
    }
}

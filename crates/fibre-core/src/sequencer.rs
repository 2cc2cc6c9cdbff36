//! Bring-up sequencer: an explicit state enumeration and a single transition
//! table keyed by `(state, reason)`.

use std::fmt;

use crate::Reason;

/// Device-side address at which command descriptors are placed.
pub const DESCRIPTOR_BASE: u32 = 0x0008_0000;
/// Firmware entry address handed to the start command.
pub const FIRMWARE_ENTRY: u32 = 0x0000_1000;
/// Descriptor submitted when the device reports its initialize finished.
pub const POST_INIT_DESCRIPTOR: [u16; 2] = [0x0081, 0x0000];

/// Where the bring-up sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SequencerState {
    /// Waiting for the device to finish powering up.
    #[default]
    Idle,
    /// Initialize command issued.
    AwaitingInit,
    /// Post-initialize descriptor submitted.
    AwaitingPostInit,
    /// Firmware-load descriptor submitted.
    AwaitingFirmwareLoad,
    /// Start command issued.
    AwaitingStart,
    /// Area-copy descriptor submitted.
    AwaitingCopy,
    /// Sequence finished; the device is being torn down.
    Finished,
}

impl SequencerState {
    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingInit => "awaiting-init",
            Self::AwaitingPostInit => "awaiting-post-init",
            Self::AwaitingFirmwareLoad => "awaiting-firmware-load",
            Self::AwaitingStart => "awaiting-start",
            Self::AwaitingCopy => "awaiting-copy",
            Self::Finished => "finished",
        })
    }
}

/// Work performed when a transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Action {
    /// Issue the initialize command.
    Initialize,
    /// Submit [`POST_INIT_DESCRIPTOR`].
    PostInit,
    /// Upload firmware and submit its load descriptor.
    LoadFirmware,
    /// Issue the start command.
    Start,
    /// Build and submit the area-copy descriptor.
    CopyArea,
    /// Terminate the device emulator and end the session.
    Terminate,
}

/// Command written into `CSR0`, with its optional `CSR3`/`CSR4` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DeviceCommand {
    /// Code 1: initialize, no parameter.
    Initialize,
    /// Code 2: execute the descriptor at `descriptor`.
    Execute {
        /// Device address of the descriptor.
        descriptor: u32,
    },
    /// Code 3: start firmware at `entry`.
    Start {
        /// Firmware entry address.
        entry: u32,
    },
}

impl DeviceCommand {
    /// Command code placed in `CSR0` bits 5..1.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Initialize => 1,
            Self::Execute { .. } => 2,
            Self::Start { .. } => 3,
        }
    }

    /// 32-bit parameter split across `CSR3` (low) and `CSR4` (high).
    #[must_use]
    pub const fn parameter(self) -> Option<u32> {
        match self {
            Self::Initialize => None,
            Self::Execute { descriptor } => Some(descriptor),
            Self::Start { entry } => Some(entry),
        }
    }
}

/// Transition table: `(state, reason) -> (next state, action)`.
///
/// `InitDone` in `AwaitingInit` detours through `AwaitingPostInit`; the
/// firmware upload then waits for that descriptor's `CommandDone`.
pub const TRANSITION_TABLE: &[(SequencerState, Reason, SequencerState, Action)] = &[
    (
        SequencerState::Idle,
        Reason::PowerupDone,
        SequencerState::AwaitingInit,
        Action::Initialize,
    ),
    (
        SequencerState::AwaitingInit,
        Reason::InitDone,
        SequencerState::AwaitingPostInit,
        Action::PostInit,
    ),
    (
        SequencerState::AwaitingPostInit,
        Reason::CommandDone,
        SequencerState::AwaitingFirmwareLoad,
        Action::LoadFirmware,
    ),
    (
        SequencerState::AwaitingInit,
        Reason::CommandDone,
        SequencerState::AwaitingFirmwareLoad,
        Action::LoadFirmware,
    ),
    (
        SequencerState::AwaitingFirmwareLoad,
        Reason::CommandDone,
        SequencerState::AwaitingStart,
        Action::Start,
    ),
    (
        SequencerState::AwaitingStart,
        Reason::StartDone,
        SequencerState::AwaitingCopy,
        Action::CopyArea,
    ),
    (
        SequencerState::AwaitingCopy,
        Reason::CommandDone,
        SequencerState::Finished,
        Action::Terminate,
    ),
];

/// Looks up the transition for `reason` in `state`.
#[must_use]
pub fn transition(state: SequencerState, reason: Reason) -> Option<(SequencerState, Action)> {
    TRANSITION_TABLE
        .iter()
        .find_map(|(from, on, to, action)| {
            (*from == state && *on == reason).then_some((*to, *action))
        })
}

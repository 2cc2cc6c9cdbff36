//! Host-side protocol engine for bringing up a VS100 display device over its
//! fibre link.

/// Fault taxonomy and session fault context.
pub mod fault;
pub use fault::{FaultClass, FaultContext, ProtocolFault, SessionFault};

/// Control and status register file.
pub mod registers;
pub use registers::{
    CsrFile, CsrIndex, CSR0_COMMAND_MASK, CSR0_GO, CSR0_POWERUP, CSR0_RECEIVE_ENABLED,
    CSR0_XMIT_ENABLED, CSR_COUNT,
};

/// Word-addressed device memory.
pub mod memory;
pub use memory::{validate_word_alignment, DeviceMemory, MemoryAccess, DEVICE_MEMORY_WORDS};

/// Link frame codec.
pub mod frame;
pub use frame::{FrameReader, FrameSink, FrameWriter, InboundFrame, OutboundFrame, Tag};

/// Interrupt reason codes.
pub mod reason;
pub use reason::Reason;

/// Bring-up state machine and device commands.
pub mod sequencer;
pub use sequencer::{
    transition, Action, DeviceCommand, SequencerState, DESCRIPTOR_BASE, FIRMWARE_ENTRY,
    POST_INIT_DESCRIPTOR, TRANSITION_TABLE,
};

/// Command descriptor encoding for area copies.
pub mod descriptor;
pub use descriptor::{
    Bitmap, ClipMode, CopyAreaRequest, DescriptorError, Mask, Opcode, Point, RasterFunction,
    RasterMap, Rect, SCREEN,
};

/// Firmware image upload.
pub mod firmware;
pub use firmware::{
    FirmwareImage, FirmwareLoadDescriptor, FIRMWARE_DESCRIPTOR_LEN, FIRMWARE_ENTRY_VECTOR,
    FIRMWARE_LOAD_ADDRESS, LOAD_FIRMWARE_OPCODE,
};

/// Session configuration.
pub mod config;
pub use config::SessionConfig;

/// Session context and frame dispatch.
pub mod session;
pub use session::{DeviceProcess, Session, SessionOutcome, SessionStatus, Step};

#[cfg(test)]
use proptest as _;

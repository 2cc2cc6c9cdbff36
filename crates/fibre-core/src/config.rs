use crate::{CopyAreaRequest, DESCRIPTOR_BASE, FIRMWARE_ENTRY};

/// Immutable configuration for one bring-up session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SessionConfig {
    /// Device address passed with execute commands.
    pub descriptor_base: u32,
    /// Host word offset at which descriptors are written.
    pub descriptor_offset: usize,
    /// Firmware entry address passed with the start command.
    pub firmware_entry: u32,
    /// Area copy submitted once the firmware has started.
    pub copy: CopyAreaRequest,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            descriptor_base: DESCRIPTOR_BASE,
            descriptor_offset: 0,
            firmware_entry: FIRMWARE_ENTRY,
            copy: CopyAreaRequest::bring_up(),
        }
    }
}

//! Firmware image upload and its load descriptor.

use std::fs;
use std::io;
use std::path::Path;

use crate::{DeviceMemory, ProtocolFault};

/// Opcode word of the firmware-load descriptor.
pub const LOAD_FIRMWARE_OPCODE: u16 = 0x0080;
/// Byte address at which the firmware image is placed.
pub const FIRMWARE_LOAD_ADDRESS: u16 = 0x0030;
/// Entry vector handed to the device: vector slot, entry point, segment.
pub const FIRMWARE_ENTRY_VECTOR: [u16; 3] = [0x0008, 0x1000, 0x0000];
/// Length of the firmware-load descriptor in words.
pub const FIRMWARE_DESCRIPTOR_LEN: usize = 11;

/// Firmware as big-endian 16-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirmwareImage {
    words: Vec<u16>,
}

impl FirmwareImage {
    /// Pairs consecutive bytes into big-endian words. A trailing odd byte is
    /// dropped.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            words: bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
        }
    }

    /// Reads an image from a raw binary file.
    ///
    /// # Errors
    ///
    /// Returns the filesystem error when the file cannot be read.
    pub fn read(path: &Path) -> io::Result<Self> {
        Ok(Self::from_bytes(&fs::read(path)?))
    }

    /// Image words.
    #[must_use]
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Image length in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.words.len() * 2
    }

    /// Copies the image to [`FIRMWARE_LOAD_ADDRESS`] and returns the
    /// descriptor describing it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolFault::FirmwareTooLarge`] when the image does not fit.
    pub fn upload(&self, memory: &mut DeviceMemory) -> Result<FirmwareLoadDescriptor, ProtocolFault> {
        let too_large = || ProtocolFault::FirmwareTooLarge {
            bytes: self.byte_len(),
        };
        let length = u32::try_from(self.byte_len()).map_err(|_| too_large())?;
        if !memory.write_block(usize::from(FIRMWARE_LOAD_ADDRESS >> 1), &self.words) {
            return Err(too_large());
        }
        Ok(FirmwareLoadDescriptor {
            length,
            load_address: FIRMWARE_LOAD_ADDRESS,
            entry_vector: FIRMWARE_ENTRY_VECTOR,
        })
    }
}

/// Descriptor telling the device where the uploaded firmware lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirmwareLoadDescriptor {
    /// Image length in bytes.
    pub length: u32,
    /// Byte address of the image.
    pub load_address: u16,
    /// Entry vector fields.
    pub entry_vector: [u16; 3],
}

impl FirmwareLoadDescriptor {
    /// Encodes the descriptor.
    ///
    /// Layout: opcode (2 words), next (2 words), reserved, length (2 words),
    /// load address, entry vector (3 words).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn encode(&self) -> [u16; FIRMWARE_DESCRIPTOR_LEN] {
        let [vector, entry, segment] = self.entry_vector;
        [
            LOAD_FIRMWARE_OPCODE,
            0,
            0,
            0,
            0,
            self.length as u16,
            (self.length >> 16) as u16,
            self.load_address,
            vector,
            entry,
            segment,
        ]
    }
}

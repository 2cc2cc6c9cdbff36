//! Device-visible shared memory, addressed the way the device bus sees it.
//!
//! Storage is word-granular. Byte addresses map to words by `address >> 1`
//! and bytes within a word are big-endian: the even address selects the
//! high byte.

use crate::ProtocolFault;

/// Number of 16-bit words backing device memory (512 KiB).
pub const DEVICE_MEMORY_WORDS: usize = 262_144;

/// Outcome of a device-originated memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryAccess<T> {
    /// Address resolved to backing storage.
    Mapped(T),
    /// Address lies past the end of device memory.
    NonExistent,
}

/// Flat word-addressable device memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMemory {
    words: Box<[u16]>,
}

impl Default for DeviceMemory {
    fn default() -> Self {
        Self::with_words(DEVICE_MEMORY_WORDS)
    }
}

impl DeviceMemory {
    /// Allocates zeroed memory of `words` 16-bit words.
    #[must_use]
    pub fn with_words(words: usize) -> Self {
        Self {
            words: vec![0; words].into_boxed_slice(),
        }
    }

    /// Size of memory in words.
    #[must_use]
    pub const fn len_words(&self) -> usize {
        self.words.len()
    }

    /// Reads the word at an even byte address.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolFault::UnalignedAccess`] when `address` is odd.
    pub fn read_word(&self, address: u32) -> Result<MemoryAccess<u16>, ProtocolFault> {
        validate_word_alignment(address)?;
        Ok(self
            .word_slot(address)
            .map_or(MemoryAccess::NonExistent, |slot| {
                MemoryAccess::Mapped(self.words[slot])
            }))
    }

    /// Writes the word at an even byte address.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolFault::UnalignedAccess`] when `address` is odd.
    pub fn write_word(
        &mut self,
        address: u32,
        value: u16,
    ) -> Result<MemoryAccess<()>, ProtocolFault> {
        validate_word_alignment(address)?;
        Ok(match self.word_slot(address) {
            Some(slot) => {
                self.words[slot] = value;
                MemoryAccess::Mapped(())
            }
            None => MemoryAccess::NonExistent,
        })
    }

    /// Reads one byte; even addresses select the high byte of the word.
    #[must_use]
    pub fn read_byte(&self, address: u32) -> MemoryAccess<u8> {
        self.word_slot(address)
            .map_or(MemoryAccess::NonExistent, |slot| {
                let [hi, lo] = self.words[slot].to_be_bytes();
                MemoryAccess::Mapped(if address & 1 == 0 { hi } else { lo })
            })
    }

    /// Writes one byte, leaving the other half of the word untouched.
    pub fn write_byte(&mut self, address: u32, value: u8) -> MemoryAccess<()> {
        match self.word_slot(address) {
            Some(slot) => {
                let [mut hi, mut lo] = self.words[slot].to_be_bytes();
                if address & 1 == 0 {
                    hi = value;
                } else {
                    lo = value;
                }
                self.words[slot] = u16::from_be_bytes([hi, lo]);
                MemoryAccess::Mapped(())
            }
            None => MemoryAccess::NonExistent,
        }
    }

    /// Host-side word read by word offset.
    #[must_use]
    pub fn word(&self, offset: usize) -> Option<u16> {
        self.words.get(offset).copied()
    }

    /// Host-side word slice starting at `offset`, if fully in range.
    #[must_use]
    pub fn words(&self, offset: usize, len: usize) -> Option<&[u16]> {
        self.words.get(offset..offset.checked_add(len)?)
    }

    /// Host-side block write starting at word `offset`.
    ///
    /// Returns `false` and writes nothing when the block does not fit.
    #[must_use]
    pub fn write_block(&mut self, offset: usize, block: &[u16]) -> bool {
        let Some(end) = offset.checked_add(block.len()) else {
            return false;
        };
        match self.words.get_mut(offset..end) {
            Some(target) => {
                target.copy_from_slice(block);
                true
            }
            None => false,
        }
    }

    fn word_slot(&self, address: u32) -> Option<usize> {
        let slot = usize::try_from(address >> 1).ok()?;
        (slot < self.words.len()).then_some(slot)
    }
}

/// Validates alignment for device word accesses.
///
/// # Errors
///
/// Returns [`ProtocolFault::UnalignedAccess`] when `address` is odd.
pub const fn validate_word_alignment(address: u32) -> Result<(), ProtocolFault> {
    if address & 1 == 0 {
        Ok(())
    } else {
        Err(ProtocolFault::UnalignedAccess { address })
    }
}

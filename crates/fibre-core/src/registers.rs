//! Host-side mirror of the device control/status registers.

use std::io;

use crate::{FrameSink, OutboundFrame};

/// Number of control/status registers (`CSR0..CSR7`).
pub const CSR_COUNT: usize = 8;
/// `CSR0` command field (`command << 1 | go`).
pub const CSR0_COMMAND_MASK: u16 = 0x003F;
/// `CSR0` go bit; set together with a command code to start it.
pub const CSR0_GO: u16 = 0x0001;
/// `CSR0` bit set by the host while its transmitter is enabled.
pub const CSR0_XMIT_ENABLED: u16 = 0x1000;
/// `CSR0` bit mirroring that the device transmitter is enabled.
pub const CSR0_RECEIVE_ENABLED: u16 = 0x4000;
/// `CSR0` value at power-up.
pub const CSR0_POWERUP: u16 = 0x0040;

/// Control/status register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum CsrIndex {
    /// `CSR0`: command code, go bit and link enables.
    Control = 0,
    /// `CSR1`: interrupt reason bitmask.
    Reason = 1,
    /// `CSR2`: peripheral event.
    Event = 2,
    /// `CSR3`: command parameter, low 16 bits.
    ParamLow = 3,
    /// `CSR4`: command parameter, high 16 bits.
    ParamHigh = 4,
    /// `CSR5`: device id.
    Id = 5,
    /// `CSR6`: unassigned.
    Spare = 6,
    /// `CSR7`: interrupt vector.
    Vector = 7,
}

impl CsrIndex {
    /// Ordered list of all registers.
    pub const ALL: [Self; CSR_COUNT] = [
        Self::Control,
        Self::Reason,
        Self::Event,
        Self::ParamLow,
        Self::ParamHigh,
        Self::Id,
        Self::Spare,
        Self::Vector,
    ];

    /// Returns the array index (`0..=7`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the wire encoding of this register index.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire register index.
    #[must_use]
    pub const fn from_u8(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Control),
            1 => Some(Self::Reason),
            2 => Some(Self::Event),
            3 => Some(Self::ParamLow),
            4 => Some(Self::ParamHigh),
            5 => Some(Self::Id),
            6 => Some(Self::Spare),
            7 => Some(Self::Vector),
            _ => None,
        }
    }
}

/// Register file shared between host and device.
///
/// Host writes go through [`CsrFile::set`], which always reflects the new
/// value to the device. Device updates arrive as frames and are stored
/// silently with [`CsrFile::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CsrFile {
    csr: [u16; CSR_COUNT],
}

impl Default for CsrFile {
    fn default() -> Self {
        let mut csr = [0; CSR_COUNT];
        csr[CsrIndex::Control.index()] = CSR0_POWERUP;
        Self { csr }
    }
}

impl CsrFile {
    /// Reads a register.
    #[must_use]
    pub const fn get(&self, index: CsrIndex) -> u16 {
        self.csr[index.index()]
    }

    /// Writes a register and sends the matching register-update frame.
    ///
    /// # Errors
    ///
    /// Returns the sink's I/O error when the frame cannot be delivered. The
    /// local value is already updated in that case.
    pub fn set<S: FrameSink + ?Sized>(
        &mut self,
        sink: &mut S,
        index: CsrIndex,
        value: u16,
    ) -> io::Result<()> {
        self.csr[index.index()] = value;
        sink.send(OutboundFrame::Csr { index, value })
    }

    /// Sends the current value of a register without changing it.
    ///
    /// # Errors
    ///
    /// Returns the sink's I/O error when the frame cannot be delivered.
    pub fn publish<S: FrameSink + ?Sized>(&self, sink: &mut S, index: CsrIndex) -> io::Result<()> {
        sink.send(OutboundFrame::Csr {
            index,
            value: self.get(index),
        })
    }

    /// Stores a device-originated value without echoing it back.
    pub const fn update(&mut self, index: CsrIndex, value: u16) {
        self.csr[index.index()] = value;
    }

    /// Sets or clears bits locally without sending a frame.
    pub const fn set_bits(&mut self, index: CsrIndex, bits: u16, enabled: bool) {
        if enabled {
            self.csr[index.index()] |= bits;
        } else {
            self.csr[index.index()] &= !bits;
        }
    }

    /// Returns the raw register array.
    #[must_use]
    pub const fn as_array(&self) -> [u16; CSR_COUNT] {
        self.csr
    }
}

//! Fibre link framing.
//!
//! Every frame is one tag byte followed by a payload whose length is fixed by
//! the tag. Multi-byte fields are big-endian.

use std::io::{self, ErrorKind, Read, Write};

use tracing::debug;

use crate::{CsrIndex, ProtocolFault};

/// Link message tags. The sender column is noted per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Tag {
    /// Both directions: transmitter switched on.
    XmitOn = 1,
    /// Both directions: transmitter switched off.
    XmitOff = 2,
    /// Both directions: interrupt.
    Interrupt = 3,
    /// Both directions: register index and 16-bit value.
    Csr = 4,
    /// Device to host: 32-bit address, byte read.
    Read8 = 5,
    /// Device to host: 32-bit address, word read.
    Read16 = 6,
    /// Host to device: 16-bit read reply.
    Data = 7,
    /// Host to device: read hit non-existent memory.
    Nxm = 8,
    /// Device to host: 32-bit address and 8-bit value.
    Write8 = 9,
    /// Device to host: 32-bit address and 16-bit value.
    Write16 = 10,
}

impl Tag {
    /// Converts a raw tag byte into a known tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::XmitOn),
            2 => Some(Self::XmitOff),
            3 => Some(Self::Interrupt),
            4 => Some(Self::Csr),
            5 => Some(Self::Read8),
            6 => Some(Self::Read16),
            7 => Some(Self::Data),
            8 => Some(Self::Nxm),
            9 => Some(Self::Write8),
            10 => Some(Self::Write16),
            _ => None,
        }
    }

    /// Returns the raw tag byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inbound payload length for tags the host accepts; `None` for tags the
    /// host never receives.
    #[must_use]
    pub const fn inbound_payload_len(self) -> Option<usize> {
        match self {
            Self::XmitOn | Self::XmitOff | Self::Interrupt => Some(0),
            Self::Csr => Some(3),
            Self::Read8 | Self::Read16 => Some(4),
            Self::Write8 => Some(5),
            Self::Write16 => Some(6),
            Self::Data | Self::Nxm => None,
        }
    }
}

/// Decoded frame received from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundFrame {
    /// Device transmitter enabled.
    XmitOn,
    /// Device transmitter disabled.
    XmitOff,
    /// Device raised an interrupt; the reason is in `CSR1`.
    Interrupt,
    /// Device updated a register.
    Csr {
        /// Register index as sent on the wire.
        index: u8,
        /// New register value.
        value: u16,
    },
    /// Device reads a byte of host memory.
    ReadByte {
        /// Byte address.
        address: u32,
    },
    /// Device reads a word of host memory.
    ReadWord {
        /// Byte address.
        address: u32,
    },
    /// Device writes a byte of host memory.
    WriteByte {
        /// Byte address.
        address: u32,
        /// Byte value.
        value: u8,
    },
    /// Device writes a word of host memory.
    WriteWord {
        /// Byte address.
        address: u32,
        /// Word value.
        value: u16,
    },
}

impl InboundFrame {
    /// Tag this frame arrived with.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::XmitOn => Tag::XmitOn,
            Self::XmitOff => Tag::XmitOff,
            Self::Interrupt => Tag::Interrupt,
            Self::Csr { .. } => Tag::Csr,
            Self::ReadByte { .. } => Tag::Read8,
            Self::ReadWord { .. } => Tag::Read16,
            Self::WriteByte { .. } => Tag::Write8,
            Self::WriteWord { .. } => Tag::Write16,
        }
    }

    fn decode(tag: Tag, payload: &[u8]) -> Option<Self> {
        let address = |bytes: &[u8]| -> Option<u32> {
            Some(u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?))
        };
        Some(match tag {
            Tag::XmitOn => Self::XmitOn,
            Tag::XmitOff => Self::XmitOff,
            Tag::Interrupt => Self::Interrupt,
            Tag::Csr => Self::Csr {
                index: *payload.first()?,
                value: u16::from_be_bytes([*payload.get(1)?, *payload.get(2)?]),
            },
            Tag::Read8 => Self::ReadByte {
                address: address(payload)?,
            },
            Tag::Read16 => Self::ReadWord {
                address: address(payload)?,
            },
            Tag::Write8 => Self::WriteByte {
                address: address(payload)?,
                value: *payload.get(4)?,
            },
            Tag::Write16 => Self::WriteWord {
                address: address(payload)?,
                value: u16::from_be_bytes([*payload.get(4)?, *payload.get(5)?]),
            },
            Tag::Data | Tag::Nxm => return None,
        })
    }
}

/// Frame sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundFrame {
    /// Host transmitter enabled.
    XmitOn,
    /// Host transmitter disabled.
    XmitOff,
    /// Register update.
    Csr {
        /// Register written.
        index: CsrIndex,
        /// Value written.
        value: u16,
    },
    /// Reply to a read request.
    Data(u16),
    /// Reply to a read request that hit non-existent memory.
    Nxm,
}

impl OutboundFrame {
    /// Longest encoded outbound frame in bytes.
    pub const MAX_LEN: usize = 4;

    /// Tag this frame is sent with.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::XmitOn => Tag::XmitOn,
            Self::XmitOff => Tag::XmitOff,
            Self::Csr { .. } => Tag::Csr,
            Self::Data(_) => Tag::Data,
            Self::Nxm => Tag::Nxm,
        }
    }

    /// Encodes the frame into a fixed buffer and returns the used length.
    #[must_use]
    pub const fn encode(&self) -> ([u8; Self::MAX_LEN], usize) {
        let mut bytes = [0; Self::MAX_LEN];
        bytes[0] = self.tag().as_u8();
        let len = match *self {
            Self::XmitOn | Self::XmitOff | Self::Nxm => 1,
            Self::Csr { index, value } => {
                let [hi, lo] = value.to_be_bytes();
                bytes[1] = index.as_u8();
                bytes[2] = hi;
                bytes[3] = lo;
                4
            }
            Self::Data(value) => {
                let [hi, lo] = value.to_be_bytes();
                bytes[1] = hi;
                bytes[2] = lo;
                3
            }
        };
        (bytes, len)
    }

    /// Encoded bytes as an owned vector.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let (bytes, len) = self.encode();
        bytes[..len].to_vec()
    }
}

/// Outbound seam: anything that can carry host frames to the device.
pub trait FrameSink {
    /// Sends one frame. Implementations must not batch: the frame is on the
    /// wire when this returns.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the frame cannot be delivered.
    fn send(&mut self, frame: OutboundFrame) -> io::Result<()>;
}

impl FrameSink for Vec<OutboundFrame> {
    fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        self.push(frame);
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        (**self).send(frame)
    }
}

/// Writes frames to a byte stream, flushing after each one.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps a byte sink.
    #[must_use]
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Returns a reference to the wrapped writer.
    #[must_use]
    pub const fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> FrameSink for FrameWriter<W> {
    fn send(&mut self, frame: OutboundFrame) -> io::Result<()> {
        debug!(?frame, "send");
        let (bytes, len) = frame.encode();
        self.inner.write_all(&bytes[..len])?;
        self.inner.flush()
    }
}

/// Reads length-checked frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// Wraps a byte source.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped reader.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the link on a frame boundary.
    ///
    /// # Errors
    ///
    /// - [`ProtocolFault::UnknownTag`] for tags the host does not accept.
    /// - [`ProtocolFault::TruncatedPayload`] when the stream ends mid-payload.
    /// - [`ProtocolFault::Transport`] for other read failures.
    pub fn read_frame(&mut self) -> Result<Option<InboundFrame>, ProtocolFault> {
        let mut raw_tag = [0_u8; 1];
        if self.read_full(&mut raw_tag)? == 0 {
            return Ok(None);
        }
        let raw_tag = raw_tag[0];
        let (tag, expected) = Tag::from_u8(raw_tag)
            .and_then(|tag| Some((tag, tag.inbound_payload_len()?)))
            .ok_or(ProtocolFault::UnknownTag { tag: raw_tag })?;

        let mut payload = [0_u8; 6];
        let received = self.read_full(&mut payload[..expected])?;
        if received < expected {
            return Err(ProtocolFault::TruncatedPayload {
                tag: raw_tag,
                expected,
                received,
            });
        }

        let frame = InboundFrame::decode(tag, &payload[..expected])
            .ok_or(ProtocolFault::UnknownTag { tag: raw_tag })?;
        debug!(?frame, "receive");
        Ok(Some(frame))
    }

    /// Fills `buf` unless the stream ends first; returns the bytes read.
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

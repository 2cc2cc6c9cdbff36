//! One scripted bring-up session: register file, device memory and sequencer
//! state held in a single context and driven by inbound frames.

use std::io::{self, Read};

use tracing::{debug, info, warn};

use crate::{
    transition, Action, CsrFile, CsrIndex, DeviceCommand, DeviceMemory, FaultContext,
    FirmwareImage, FrameReader, FrameSink, InboundFrame, MemoryAccess, OutboundFrame,
    ProtocolFault, Reason, SequencerState, SessionConfig, SessionFault, CSR0_COMMAND_MASK,
    CSR0_GO, CSR0_RECEIVE_ENABLED, CSR0_XMIT_ENABLED, POST_INIT_DESCRIPTOR,
};

/// Lifetime seam for the device emulator process.
pub trait DeviceProcess {
    /// Terminates the device emulator. Must tolerate a process that already
    /// exited.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the process cannot be signalled or reaped.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Result of handling one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Keep reading frames.
    Continue,
    /// Sequence reached its terminal state.
    Finished,
}

/// How a session that did not fault ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SessionOutcome {
    /// Every command was issued and the last one completed.
    Completed,
    /// The device closed the link first.
    PeerClosed,
}

/// Point-in-time view of a session, suitable for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SessionStatus {
    /// Current sequencer state.
    pub state: SequencerState,
    /// Commands issued so far, in order.
    pub commands: Vec<DeviceCommand>,
    /// Last raw reason read from `CSR1`.
    pub last_reason: Option<u16>,
    /// Tag of the last inbound frame.
    pub last_tag: Option<u8>,
    /// Register file contents.
    pub csr: CsrFile,
}

/// Session context passed to every handler.
#[derive(Debug)]
pub struct Session<L> {
    link: L,
    config: SessionConfig,
    firmware: FirmwareImage,
    csr: CsrFile,
    memory: DeviceMemory,
    state: SequencerState,
    commands: Vec<DeviceCommand>,
    last_reason: Option<u16>,
    last_tag: Option<u8>,
}

impl<L: FrameSink> Session<L> {
    /// Creates an idle session writing frames to `link`.
    #[must_use]
    pub fn new(link: L, config: SessionConfig, firmware: FirmwareImage) -> Self {
        Self {
            link,
            config,
            firmware,
            csr: CsrFile::default(),
            memory: DeviceMemory::default(),
            state: SequencerState::Idle,
            commands: Vec::new(),
            last_reason: None,
            last_tag: None,
        }
    }

    /// Current sequencer state.
    #[must_use]
    pub const fn state(&self) -> SequencerState {
        self.state
    }

    /// Register file.
    #[must_use]
    pub const fn csr(&self) -> &CsrFile {
        &self.csr
    }

    /// Device memory.
    #[must_use]
    pub const fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// Commands issued so far.
    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Outbound link.
    #[must_use]
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Consumes the session and returns the outbound link.
    #[must_use]
    pub fn into_link(self) -> L {
        self.link
    }

    /// Returns `true` while the device reports its transmitter enabled.
    #[must_use]
    pub const fn receive_enabled(&self) -> bool {
        self.csr.get(CsrIndex::Control) & CSR0_RECEIVE_ENABLED != 0
    }

    /// Captures the session state for reporting.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            commands: self.commands.clone(),
            last_reason: self.last_reason,
            last_tag: self.last_tag,
            csr: self.csr.clone(),
        }
    }

    /// Context attached to faults raised now.
    #[must_use]
    pub const fn fault_context(&self) -> FaultContext {
        FaultContext {
            state: self.state,
            last_reason: self.last_reason,
            last_tag: self.last_tag,
        }
    }

    /// Enables the host transmitter.
    ///
    /// # Errors
    ///
    /// Returns a transport fault when the frame cannot be sent.
    pub fn open_link(&mut self) -> Result<(), SessionFault> {
        info!("xmit on");
        self.csr.set_bits(CsrIndex::Control, CSR0_XMIT_ENABLED, true);
        self.link
            .send(OutboundFrame::XmitOn)
            .map_err(|err| self.fault(err.into()))
    }

    /// Disables the host transmitter.
    ///
    /// # Errors
    ///
    /// Returns a transport fault when the frame cannot be sent.
    pub fn close_link(&mut self) -> Result<(), SessionFault> {
        info!("xmit off");
        self.csr.set_bits(CsrIndex::Control, CSR0_XMIT_ENABLED, false);
        self.link
            .send(OutboundFrame::XmitOff)
            .map_err(|err| self.fault(err.into()))
    }

    /// Reads frames until the sequence finishes or the device hangs up,
    /// then terminates the device.
    ///
    /// The device is terminated on every exit path, faults included.
    ///
    /// # Errors
    ///
    /// Returns the first fault raised by framing, dispatch, sequencing or
    /// device teardown, with the session context at that point.
    pub fn run<R, D>(
        &mut self,
        reader: &mut FrameReader<R>,
        device: &mut D,
    ) -> Result<SessionOutcome, SessionFault>
    where
        R: Read,
        D: DeviceProcess + ?Sized,
    {
        let outcome = loop {
            let frame = match reader.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(state = %self.state, "link closed by device");
                    break SessionOutcome::PeerClosed;
                }
                Err(fault) => {
                    if let ProtocolFault::UnknownTag { tag }
                    | ProtocolFault::TruncatedPayload { tag, .. } = fault
                    {
                        self.last_tag = Some(tag);
                    }
                    return Err(self.abort(device, self.fault(fault)));
                }
            };
            match self.handle_frame(frame) {
                Ok(Step::Continue) => {}
                Ok(Step::Finished) => break SessionOutcome::Completed,
                Err(fault) => return Err(self.abort(device, fault)),
            }
        };

        info!("terminating device");
        device
            .terminate()
            .map_err(|err| self.fault(ProtocolFault::Teardown(err)))?;
        Ok(outcome)
    }

    /// Handles one inbound frame to completion, including every outbound
    /// frame it causes.
    ///
    /// # Errors
    ///
    /// Returns the fault raised while handling the frame, with context.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Result<Step, SessionFault> {
        self.last_tag = Some(frame.tag().as_u8());
        let result = match frame {
            InboundFrame::XmitOn => {
                info!("device xmit on");
                self.csr
                    .set_bits(CsrIndex::Control, CSR0_RECEIVE_ENABLED, true);
                Ok(Step::Continue)
            }
            InboundFrame::XmitOff => {
                info!("device xmit off");
                self.csr
                    .set_bits(CsrIndex::Control, CSR0_RECEIVE_ENABLED, false);
                Ok(Step::Continue)
            }
            InboundFrame::Interrupt => self.on_interrupt(),
            InboundFrame::Csr { index, value } => self.on_csr(index, value),
            InboundFrame::ReadWord { address } => self.on_read_word(address),
            InboundFrame::ReadByte { address } => self.on_read_byte(address),
            InboundFrame::WriteWord { address, value } => self.on_write_word(address, value),
            InboundFrame::WriteByte { address, value } => {
                if self.memory.write_byte(address, value) == MemoryAccess::NonExistent {
                    warn!(address, "byte write to non-existent memory dropped");
                }
                Ok(Step::Continue)
            }
        };
        result.map_err(|fault| self.fault(fault))
    }

    fn on_csr(&mut self, index: u8, value: u16) -> Result<Step, ProtocolFault> {
        let csr = CsrIndex::from_u8(index).ok_or(ProtocolFault::RegisterIndex { index })?;
        debug!("CSR{index} {value:04X}");
        self.csr.update(csr, value);
        Ok(Step::Continue)
    }

    fn on_read_word(&mut self, address: u32) -> Result<Step, ProtocolFault> {
        let reply = match self.memory.read_word(address)? {
            MemoryAccess::Mapped(value) => OutboundFrame::Data(value),
            MemoryAccess::NonExistent => {
                warn!(address, "word read from non-existent memory");
                OutboundFrame::Nxm
            }
        };
        self.link.send(reply)?;
        Ok(Step::Continue)
    }

    fn on_read_byte(&mut self, address: u32) -> Result<Step, ProtocolFault> {
        let reply = match self.memory.read_byte(address) {
            MemoryAccess::Mapped(value) => OutboundFrame::Data(u16::from(value)),
            MemoryAccess::NonExistent => {
                warn!(address, "byte read from non-existent memory");
                OutboundFrame::Nxm
            }
        };
        self.link.send(reply)?;
        Ok(Step::Continue)
    }

    fn on_write_word(&mut self, address: u32, value: u16) -> Result<Step, ProtocolFault> {
        if self.memory.write_word(address, value)? == MemoryAccess::NonExistent {
            warn!(address, "word write to non-existent memory dropped");
        }
        Ok(Step::Continue)
    }

    /// Reads and acknowledges the reason register, then dispatches on the
    /// exact value read.
    fn on_interrupt(&mut self) -> Result<Step, ProtocolFault> {
        let raw = self.csr.get(CsrIndex::Reason);
        self.last_reason = Some(raw);
        self.csr.set(&mut self.link, CsrIndex::Reason, 0)?;

        let reason = Reason::from_raw(raw).ok_or(ProtocolFault::UnhandledReason { raw })?;
        info!("{reason}");
        if reason == Reason::Nothing {
            return Ok(Step::Continue);
        }

        let (next, action) =
            transition(self.state, reason).ok_or(ProtocolFault::UnexpectedReason {
                state: self.state,
                reason,
            })?;
        let step = self.perform(action)?;
        debug!(from = %self.state, to = %next, ?action, "transition");
        self.state = next;
        Ok(step)
    }

    fn perform(&mut self, action: Action) -> Result<Step, ProtocolFault> {
        match action {
            Action::Initialize => self.issue(DeviceCommand::Initialize)?,
            Action::PostInit => {
                self.write_descriptor(&POST_INIT_DESCRIPTOR)?;
                self.issue(DeviceCommand::Execute {
                    descriptor: self.config.descriptor_base,
                })?;
            }
            Action::LoadFirmware => {
                info!(bytes = self.firmware.byte_len(), "send firmware");
                let descriptor = self.firmware.upload(&mut self.memory)?;
                self.write_descriptor(&descriptor.encode())?;
                self.issue(DeviceCommand::Execute {
                    descriptor: self.config.descriptor_base,
                })?;
            }
            Action::Start => self.issue(DeviceCommand::Start {
                entry: self.config.firmware_entry,
            })?,
            Action::CopyArea => {
                let words = self.config.copy.encode();
                self.write_descriptor(&words)?;
                self.issue(DeviceCommand::Execute {
                    descriptor: self.config.descriptor_base,
                })?;
            }
            Action::Terminate => return Ok(Step::Finished),
        }
        Ok(Step::Continue)
    }

    fn write_descriptor(&mut self, words: &[u16]) -> Result<(), ProtocolFault> {
        let offset = self.config.descriptor_offset;
        if self.memory.write_block(offset, words) {
            Ok(())
        } else {
            Err(ProtocolFault::DescriptorOutOfRange {
                offset,
                len: words.len(),
            })
        }
    }

    /// Sets the parameter registers, if any, before the command register.
    fn issue(&mut self, command: DeviceCommand) -> io::Result<()> {
        if let Some(parameter) = command.parameter() {
            let [b3, b2, b1, b0] = parameter.to_be_bytes();
            self.csr
                .set(&mut self.link, CsrIndex::ParamLow, u16::from_be_bytes([b1, b0]))?;
            self.csr
                .set(&mut self.link, CsrIndex::ParamHigh, u16::from_be_bytes([b3, b2]))?;
        }
        let control = (self.csr.get(CsrIndex::Control) & !CSR0_COMMAND_MASK)
            | (command.code() << 1)
            | CSR0_GO;
        self.csr.set(&mut self.link, CsrIndex::Control, control)?;
        info!(?command, "command issued");
        self.commands.push(command);
        Ok(())
    }

    fn fault(&self, fault: ProtocolFault) -> SessionFault {
        SessionFault {
            fault,
            context: self.fault_context(),
        }
    }

    fn abort<D: DeviceProcess + ?Sized>(&self, device: &mut D, fault: SessionFault) -> SessionFault {
        warn!(%fault, "session aborted");
        if let Err(err) = device.terminate() {
            warn!(%err, "device teardown after fault failed");
        }
        fault
    }
}

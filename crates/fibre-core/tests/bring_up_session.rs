//! Scripted bring-up sessions driven end to end through the frame codec.

use std::io::{self, Cursor};

use fibre_core::{
    CopyAreaRequest, CsrIndex, DeviceCommand, DeviceProcess, FaultClass, FirmwareImage,
    FrameReader, InboundFrame, OutboundFrame, ProtocolFault, SequencerState, Session,
    SessionConfig, SessionOutcome, Step, FIRMWARE_LOAD_ADDRESS,
};
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const FIRMWARE: [u8; 6] = [0x4E, 0x71, 0x4E, 0x71, 0x60, 0xFE];

#[derive(Default)]
struct FakeDevice {
    terminations: usize,
}

impl DeviceProcess for FakeDevice {
    fn terminate(&mut self) -> io::Result<()> {
        self.terminations += 1;
        Ok(())
    }
}

fn new_session() -> Session<Vec<OutboundFrame>> {
    Session::new(
        Vec::new(),
        SessionConfig::default(),
        FirmwareImage::from_bytes(&FIRMWARE),
    )
}

/// Device-side bytes that raise an interrupt with `raw` in the reason register.
fn raise(raw: u16) -> Vec<u8> {
    let [hi, lo] = raw.to_be_bytes();
    vec![0x04, 0x01, hi, lo, 0x03]
}

fn script(reasons: &[u16]) -> Vec<u8> {
    reasons.iter().flat_map(|&raw| raise(raw)).collect()
}

fn csr(index: CsrIndex, value: u16) -> OutboundFrame {
    OutboundFrame::Csr { index, value }
}

fn ack() -> OutboundFrame {
    csr(CsrIndex::Reason, 0)
}

#[test]
fn full_bring_up_completes_and_terminates_device() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x02, 0x02, 0x04, 0x02])));

    session.open_link().expect("vec sink");
    let outcome = session.run(&mut reader, &mut device).expect("clean run");

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(device.terminations, 1);
    assert_eq!(session.state(), SequencerState::Finished);
    assert_eq!(
        session.commands(),
        &[
            DeviceCommand::Initialize,
            DeviceCommand::Execute {
                descriptor: 0x0008_0000
            },
            DeviceCommand::Start { entry: 0x1000 },
            DeviceCommand::Execute {
                descriptor: 0x0008_0000
            },
        ]
    );
    assert_eq!(
        session.link(),
        &vec![
            OutboundFrame::XmitOn,
            ack(),
            csr(CsrIndex::Control, 0x1043),
            ack(),
            csr(CsrIndex::ParamLow, 0x0000),
            csr(CsrIndex::ParamHigh, 0x0008),
            csr(CsrIndex::Control, 0x1045),
            ack(),
            csr(CsrIndex::ParamLow, 0x1000),
            csr(CsrIndex::ParamHigh, 0x0000),
            csr(CsrIndex::Control, 0x1047),
            ack(),
            csr(CsrIndex::ParamLow, 0x0000),
            csr(CsrIndex::ParamHigh, 0x0008),
            csr(CsrIndex::Control, 0x1045),
            ack(),
        ]
    );
    assert_eq!(session.csr().get(CsrIndex::Reason), 0);
    assert_eq!(
        session.memory().words(0, 29),
        Some(CopyAreaRequest::bring_up().encode().as_slice())
    );
}

#[test]
fn outbound_frames_encode_big_endian() {
    assert_eq!(
        csr(CsrIndex::ParamHigh, 0x0008).to_bytes(),
        vec![0x04, 0x04, 0x00, 0x08]
    );
    assert_eq!(
        csr(CsrIndex::Control, 0x1045).to_bytes(),
        vec![0x04, 0x00, 0x10, 0x45]
    );
    assert_eq!(OutboundFrame::Data(0xBEEF).to_bytes(), vec![0x07, 0xBE, 0xEF]);
    assert_eq!(OutboundFrame::Nxm.to_bytes(), vec![0x08]);
}

#[test]
fn firmware_is_uploaded_before_execute() {
    let mut session = new_session();
    for raw in [0x80, 0x02] {
        session
            .handle_frame(InboundFrame::Csr {
                index: 1,
                value: raw,
            })
            .expect("csr update");
        assert_eq!(
            session.handle_frame(InboundFrame::Interrupt).expect("reason"),
            Step::Continue
        );
    }

    assert_eq!(session.state(), SequencerState::AwaitingFirmwareLoad);
    assert_eq!(
        session.memory().words(0, 11),
        Some(&[0x0080, 0, 0, 0, 0, 6, 0, 0x0030, 0x0008, 0x1000, 0][..])
    );
    assert_eq!(
        session
            .memory()
            .words(usize::from(FIRMWARE_LOAD_ADDRESS >> 1), 3),
        Some(&[0x4E71, 0x4E71, 0x60FE][..])
    );
}

#[test]
fn init_done_submits_post_init_descriptor() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x01])));

    let outcome = session.run(&mut reader, &mut device).expect("clean run");

    assert_eq!(outcome, SessionOutcome::PeerClosed);
    assert_eq!(session.state(), SequencerState::AwaitingPostInit);
    assert_eq!(session.memory().words(0, 2), Some(&[0x0081, 0x0000][..]));
    assert_eq!(
        session.memory().word(usize::from(FIRMWARE_LOAD_ADDRESS >> 1)),
        Some(0)
    );
    assert_eq!(
        session.commands(),
        &[
            DeviceCommand::Initialize,
            DeviceCommand::Execute {
                descriptor: 0x0008_0000
            },
        ]
    );
    assert_eq!(
        &session.link()[2..],
        &[
            ack(),
            csr(CsrIndex::ParamLow, 0x0000),
            csr(CsrIndex::ParamHigh, 0x0008),
            csr(CsrIndex::Control, 0x0045),
        ]
    );
}

#[test]
fn init_done_path_uploads_firmware_on_next_command_done() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[
        0x80, 0x01, 0x02, 0x02, 0x04, 0x02,
    ])));

    let outcome = session.run(&mut reader, &mut device).expect("clean run");

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(device.terminations, 1);
    let execute = DeviceCommand::Execute {
        descriptor: 0x0008_0000,
    };
    assert_eq!(
        session.commands(),
        &[
            DeviceCommand::Initialize,
            execute,
            execute,
            DeviceCommand::Start { entry: 0x1000 },
            execute,
        ]
    );
    assert_eq!(session.state(), SequencerState::Finished);
}

#[test]
fn repeated_init_done_is_a_sequencing_fault() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x01, 0x01])));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("second init done");

    assert_eq!(fault.class(), FaultClass::Sequencing);
    assert_eq!(fault.context.state, SequencerState::AwaitingPostInit);
    assert_eq!(device.terminations, 1);
}

#[test]
fn nothing_reasons_are_skipped_mid_sequence() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x00, 0x00, 0x02])));

    session.run(&mut reader, &mut device).expect("clean run");

    assert_eq!(session.state(), SequencerState::AwaitingFirmwareLoad);
    assert_eq!(session.commands().len(), 2);
}

#[test]
fn composite_reason_faults_and_tears_down() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x06])));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("composite reason");

    assert!(matches!(
        fault.fault,
        ProtocolFault::UnhandledReason { raw: 0x0006 }
    ));
    assert_eq!(fault.class(), FaultClass::Protocol);
    assert_eq!(fault.context.state, SequencerState::AwaitingInit);
    assert_eq!(fault.context.last_reason, Some(0x0006));
    assert_eq!(device.terminations, 1);
}

#[test]
fn out_of_order_reason_is_a_sequencing_fault() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(script(&[0x80, 0x04])));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("start done before init");

    assert_eq!(fault.class(), FaultClass::Sequencing);
    assert_eq!(session.state(), SequencerState::AwaitingInit);
    assert_eq!(session.commands(), &[DeviceCommand::Initialize]);
}

#[test]
fn truncated_frame_is_a_transport_fault() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut bytes = raise(0x80);
    bytes.extend([0x06, 0x00, 0x00]);
    let mut reader = FrameReader::new(Cursor::new(bytes));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("short read word");

    assert!(matches!(
        fault.fault,
        ProtocolFault::TruncatedPayload {
            tag: 0x06,
            expected: 4,
            received: 2
        }
    ));
    assert_eq!(fault.class(), FaultClass::Transport);
    assert_eq!(fault.context.last_tag, Some(0x06));
    assert_eq!(device.terminations, 1);
}

#[test]
fn host_only_tags_are_rejected_inbound() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(vec![0x07, 0x12, 0x34]));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("data frame from device");

    assert!(matches!(fault.fault, ProtocolFault::UnknownTag { tag: 0x07 }));
}

#[test]
fn device_memory_requests_are_served_during_bring_up() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut bytes = raise(0x80);
    bytes.extend([0x0A, 0x00, 0x00, 0x00, 0x40, 0x12, 0x34]);
    bytes.extend([0x06, 0x00, 0x00, 0x00, 0x40]);
    bytes.extend([0x05, 0x00, 0x00, 0x00, 0x41]);
    bytes.extend([0x06, 0x00, 0x10, 0x00, 0x00]);
    let mut reader = FrameReader::new(Cursor::new(bytes));

    session.run(&mut reader, &mut device).expect("clean run");

    assert_eq!(
        &session.link()[2..],
        &[
            OutboundFrame::Data(0x1234),
            OutboundFrame::Data(0x0034),
            OutboundFrame::Nxm,
        ]
    );
}

#[test]
fn unaligned_word_read_is_a_memory_fault() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(vec![0x06, 0x00, 0x00, 0x00, 0x03]));

    let fault = session
        .run(&mut reader, &mut device)
        .expect_err("odd address");

    assert!(matches!(
        fault.fault,
        ProtocolFault::UnalignedAccess { address: 3 }
    ));
    assert_eq!(fault.class(), FaultClass::Memory);
}

#[test]
fn silent_device_closes_cleanly() {
    let mut session = new_session();
    let mut device = FakeDevice::default();
    let mut reader = FrameReader::new(Cursor::new(Vec::new()));

    let outcome = session.run(&mut reader, &mut device).expect("empty link");

    assert_eq!(outcome, SessionOutcome::PeerClosed);
    assert_eq!(session.state(), SequencerState::Idle);
    assert!(session.commands().is_empty());
    assert_eq!(device.terminations, 1);
}

#[test]
fn teardown_failure_is_reported() {
    struct StuckDevice;

    impl DeviceProcess for StuckDevice {
        fn terminate(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    let mut session = new_session();
    let mut reader = FrameReader::new(Cursor::new(Vec::new()));

    let fault = session
        .run(&mut reader, &mut StuckDevice)
        .expect_err("teardown fails");

    assert!(matches!(fault.fault, ProtocolFault::Teardown(_)));
    assert_eq!(fault.class(), FaultClass::Io);
}

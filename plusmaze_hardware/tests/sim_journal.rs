use plusmaze_hardware::error::HwError;
use plusmaze_hardware::{PortOp, SimulatedMaze};
use plusmaze_traits::RegisterPort;
use rstest::rstest;

#[rstest]
fn journal_preserves_issue_order() {
    let sim = SimulatedMaze::new();
    let mut port = sim.clone();

    port.write_register(0x01, 565).unwrap();
    port.fire_trigger(0x40, 2).unwrap();
    let _ = port.read_register(0x20).unwrap();

    assert_eq!(
        sim.journal(),
        vec![
            PortOp::Write {
                addr: 0x01,
                value: 565
            },
            PortOp::Trigger {
                channel: 0x40,
                bit: 2
            },
            PortOp::Read { addr: 0x20 },
        ]
    );
    assert_eq!(sim.writes_to(0x01), vec![565]);
    assert_eq!(sim.triggers_on(0x40), vec![2]);
}

#[rstest]
#[case(4, vec![0xAB, 0xCD, 0, 0])]
#[case(1, vec![0xAB])]
fn streams_are_padded_or_truncated(#[case] length: usize, #[case] expected: Vec<u8>) {
    let sim = SimulatedMaze::new();
    let mut port = sim.clone();
    sim.set_stream(0xA0, vec![0xAB, 0xCD]);
    assert_eq!(port.read_stream(0xA0, length).unwrap(), expected);
}

#[rstest]
fn injected_failure_is_a_transport_error_and_clears() {
    let sim = SimulatedMaze::new();
    let mut port = sim.clone();
    sim.fail_next("usb stall");

    let err = port.fire_trigger(0x40, 6).expect_err("first call fails");
    match err.downcast_ref::<HwError>() {
        Some(HwError::Transport(msg)) => assert_eq!(msg, "usb stall"),
        other => panic!("unexpected error: {other:?}"),
    }
    // Not retried by the port; the next call goes through.
    port.fire_trigger(0x40, 6).unwrap();
    assert_eq!(sim.triggers_on(0x40), vec![6]);
}

#[rstest]
fn fail_after_lets_earlier_transfers_through() {
    let sim = SimulatedMaze::new();
    let mut port = sim.clone();
    sim.fail_after(2, "link reset");

    port.write_register(0x01, 1).unwrap();
    port.fire_trigger(0x40, 6).unwrap();
    assert!(port.fire_trigger(0x40, 6).is_err());
    port.fire_trigger(0x40, 5).unwrap();
    assert_eq!(sim.triggers_on(0x40), vec![6, 5]);
}

mod common;

use common::{EAST, NORTH, SOUTH, WEST, sim_driver};
use crossbeam_channel::unbounded;
use plusmaze_config::parse_trials;
use plusmaze_core::{
    OperatorCommand, RunOutcome, TrialRecord, TrialSequencer, TrialState, drive,
};
use plusmaze_traits::Arm;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn unattended_session_writes_results_and_licks() {
    let (sim, driver, clock) = sim_driver();
    sim.script_reads(0x20, [WEST, WEST, NORTH, NORTH, NORTH, EAST]);
    sim.set_stream(0xA0, vec![0b1010_0101; 4]);

    let trials = parse_trials("west north\nnorth east\n").unwrap();
    let mut seq = TrialSequencer::new(driver, &trials, Arm::West).unwrap();
    seq.begin().unwrap();

    let (_tx, rx) = unbounded();
    let out = drive(&mut seq, &clock, &rx, &AtomicBool::new(false), true).unwrap();
    assert_eq!(out, RunOutcome::Finished);
    assert_eq!(seq.state(), TrialState::Complete);
    assert_eq!(seq.accuracy(), Some(1.0));
    // north trial needed one quarter turn of the block
    assert_eq!(seq.block_position(), Arm::North);

    let dir = tempdir().unwrap();
    let path = dir.path().join("mouse7.txt");
    seq.persist(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let t1: Vec<&str> = lines[0].split_whitespace().collect();
    assert_eq!(&t1[..3], &["west", "north", "north"]);
    assert_eq!(&t1[4..], &["0", "1", "2", "2"]);
    let t2: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(&t2[..3], &["north", "east", "east"]);
    assert_eq!(&t2[4..], &["2", "3", "4", "4"]);

    // every line re-parses, both as a record and as a trial definition
    let rec = TrialRecord::parse_line(lines[0]).unwrap();
    assert!(rec.elapsed.unwrap() >= Duration::from_secs(20));
    assert_eq!(parse_trials(&text).unwrap(), trials);

    let licks = std::fs::read_to_string(dir.path().join("mouse7-lick.txt")).unwrap();
    assert_eq!(licks, "1\n0\n1\n0\n");
}

#[test]
fn start_is_retried_until_animal_is_in_place() {
    let (sim, driver, clock) = sim_driver();
    sim.script_reads(0x20, [SOUTH, WEST, WEST, NORTH]);
    let trials = parse_trials("west north\n").unwrap();
    let mut seq = TrialSequencer::new(driver, &trials, Arm::West).unwrap();
    seq.begin().unwrap();

    let (_tx, rx) = unbounded();
    drive(&mut seq, &clock, &rx, &AtomicBool::new(false), true).unwrap();
    assert_eq!(seq.log().get(0).unwrap().result, Some(Arm::North));
    // one dose only, at north
    let doses: Vec<u8> = sim
        .triggers_on(0x40)
        .into_iter()
        .filter(|b| (1..=4).contains(b))
        .collect();
    assert_eq!(doses, vec![3]);
}

#[test]
fn autosave_keeps_unfinished_trials_as_placeholders() {
    let (sim, driver, clock) = sim_driver();
    sim.set_register(0x20, WEST);
    let trials = parse_trials("west north\nsouth east\n").unwrap();
    let mut seq = TrialSequencer::new(driver, &trials, Arm::West).unwrap();
    seq.begin().unwrap();
    seq.start().unwrap();
    clock.advance(Duration::from_secs(10));
    seq.open().unwrap();
    assert!(sim.is_recording());

    let dir = tempdir().unwrap();
    let path = dir.path().join("autobackup.txt");
    seq.autosave(&path).unwrap();
    assert!(!sim.is_recording());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "west north - - - - - -\nsouth east - - - - - -\n"
    );
    assert!(dir.path().join("autobackup-lick.txt").exists());
}

#[test]
fn stop_mid_trial_releases_the_scope_on_save() {
    let (sim, driver, clock) = sim_driver();
    sim.set_register(0x20, WEST);
    let trials = parse_trials("west north\n").unwrap();
    let mut seq = TrialSequencer::new(driver, &trials, Arm::West).unwrap();
    seq.begin().unwrap();
    seq.start().unwrap();
    clock.advance(Duration::from_secs(10));
    seq.open().unwrap();

    let (tx, rx) = unbounded();
    tx.send(OperatorCommand::Stop).unwrap();
    let out = drive(&mut seq, &clock, &rx, &AtomicBool::new(false), false).unwrap();
    assert_eq!(out, RunOutcome::Stopped);
    assert!(sim.is_recording());

    let dir = tempdir().unwrap();
    let path = dir.path().join("mouse9.txt");
    seq.persist(&path).unwrap();
    assert!(!sim.is_recording());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "west north - - - - - -\n"
    );
}

#[test]
fn autosave_survives_a_dead_link() {
    let (sim, driver, _clock) = sim_driver();
    let trials = parse_trials("west north\n").unwrap();
    let mut seq = TrialSequencer::new(driver, &trials, Arm::West).unwrap();
    seq.begin().unwrap();
    sim.disconnect();

    let dir = tempdir().unwrap();
    let path = dir.path().join("autobackup.txt");
    seq.autosave(&path).unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("autobackup-lick.txt").exists());
}

#![allow(dead_code)]

use plusmaze_core::{DeviceProfile, MazeDriver};
use plusmaze_hardware::{SimScope, SimulatedMaze};
use plusmaze_traits::ManualClock;

pub const PROFILE: &str = include_str!("../../../etc/plusmaze.toml");

// Detector ids of the shipped profile
pub const WEST: u32 = 0;
pub const SOUTH: u32 = 1;
pub const NORTH: u32 = 2;
pub const EAST: u32 = 3;

pub fn profile() -> DeviceProfile {
    let cfg = plusmaze_config::load_toml(PROFILE).expect("parse profile");
    cfg.validate().expect("valid profile");
    DeviceProfile::from(&cfg)
}

pub fn sim_driver() -> (SimulatedMaze, MazeDriver, ManualClock) {
    let p = profile();
    let sim = SimulatedMaze::new();
    sim.attach_scope(SimScope {
        trigger_channel: p.scope.trigger_channel,
        start_bit: p.scope.start_bit,
        stop_bit: p.scope.stop_bit,
        reset_bit: p.scope.reset_bit,
        frame_lo_addr: p.scope.frame_lo_addr,
        frame_hi_addr: p.scope.frame_hi_addr,
        frames_per_read: 1,
    });
    let clock = ManualClock::new();
    let driver = MazeDriver::builder()
        .with_port(sim.clone())
        .with_profile(p)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("driver");
    (sim, driver, clock)
}

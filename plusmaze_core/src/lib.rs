#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Plus-maze trial and training engine (hardware-agnostic).
//!
//! All hardware interaction goes through `plusmaze_traits::RegisterPort`,
//! wrapped by `MazeDriver`. The sequencers own the driver while they run and
//! advance one `tick()` at a time from an external scheduler (`runner`).
//!
//! ## Architecture
//!
//! - **Driver**: gates, dosing, rotation, recording, sensors (`driver`)
//! - **Classification**: arm-to-arm moves as left/right turns (`classifier`)
//! - **Block**: center platform alignment before trials (`reposition`)
//! - **Trials**: operator-paced trial state machine (`trial`)
//! - **Training**: continuous egocentric training (`training`)
//! - **Monitor**: idle polling with autoreward (`monitor`)
//! - **Records**: result and lick files (`log`)

pub mod classifier;
pub mod conversions;
pub mod driver;
pub mod error;
pub mod hw_error;
pub mod log;
pub mod monitor;
pub mod profile;
pub mod reposition;
pub mod runner;
pub mod status;
pub mod trial;
pub mod training;
pub mod types;
pub mod util;

pub use classifier::{InvalidTransition, classify};
pub use driver::{MazeDriver, MazeDriverBuilder};
pub use error::{BuildError, MazeError, Result};
pub use log::{ExperimentLog, TrainingLog, TrainingRecord, TrainingStats, TrialRecord};
pub use monitor::{AutoReward, MazeMonitor};
pub use profile::DeviceProfile;
pub use reposition::{BlockRepositioner, RotationPlan, plan_rotation};
pub use runner::{OperatorCommand, RunOutcome, Sequencer, drive};
pub use status::SessionStatus;
pub use trial::{TrialSequencer, TrialState};
pub use training::{ContinuousTrainingSequencer, TrainingConfig, TrainingState};
pub use types::{DoseTarget, LickBuffer, RotationCommand, Turn};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::driver::MazeDriver;
    use crate::profile::DeviceProfile;
    use plusmaze_hardware::{SimScope, SimulatedMaze};
    use plusmaze_traits::ManualClock;

    const PROFILE: &str = include_str!("../../etc/plusmaze.toml");

    /// The shipped unit profile.
    pub fn profile() -> DeviceProfile {
        let cfg = plusmaze_config::load_toml(PROFILE).unwrap();
        cfg.validate().unwrap();
        DeviceProfile::from(&cfg)
    }

    /// Driver over a simulated board with scope emulation and a manual clock.
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
            .unwrap();
        (sim, driver, clock)
    }
}

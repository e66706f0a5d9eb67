//! Register-level control of one maze unit.
//!
//! `MazeDriver` is the only component that touches the `RegisterPort`. It
//! translates maze-level operations (gate, dose, rotate, record) into
//! register traffic using the injected `DeviceProfile`. Port errors are
//! mapped to `MazeError::Device` and never retried.

use crate::error::{BuildError, MazeError, Result};
use crate::hw_error::map_hw_error;
use crate::profile::DeviceProfile;
use crate::types::{DoseTarget, LickBuffer, RotationCommand, Turn};
use eyre::WrapErr;
use plusmaze_traits::{Arm, Clock, MonotonicClock, PortError, RegisterPort};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn device<T>(r: std::result::Result<T, PortError>, what: &'static str) -> Result<T> {
    r.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err(what)
}

pub struct MazeDriver {
    port: Box<dyn RegisterPort>,
    profile: DeviceProfile,
    clock: Arc<dyn Clock + Send + Sync>,
    // Last frame count observed in the current recording session
    last_frame: Option<u32>,
}

impl std::fmt::Debug for MazeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MazeDriver")
            .field("profile", &self.profile)
            .field("last_frame", &self.last_frame)
            .finish_non_exhaustive()
    }
}

impl MazeDriver {
    pub fn builder() -> MazeDriverBuilder {
        MazeDriverBuilder::default()
    }

    /// Take ownership of the port and program the dosing registers.
    ///
    /// A device error here is fatal: the unit is not usable without its
    /// dosing volumes.
    pub fn new(
        port: Box<dyn RegisterPort>,
        profile: DeviceProfile,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let mut driver = Self {
            port,
            profile,
            clock,
            last_frame: None,
        };
        driver.program_dosing().wrap_err("initialize maze driver")?;
        Ok(driver)
    }

    fn program_dosing(&mut self) -> Result<()> {
        let dosing = self.profile.dosing;
        for arm in Arm::ALL {
            let d = dosing.arm(arm);
            device(
                self.port.write_register(d.addr, d.volume),
                "write dose volume",
            )?;
            tracing::debug!(%arm, addr = d.addr, volume = d.volume, "dose volume programmed");
        }
        let reps = dosing.packed_reps();
        device(
            self.port.write_register(dosing.reps_addr, reps),
            "write dose repetitions",
        )?;
        tracing::debug!(reps, "dose repetitions programmed");
        Ok(())
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Block for a settle delay on the driver's clock.
    pub fn settle(&self, d: Duration) {
        self.clock.sleep(d);
    }

    /// Release the hardware.
    pub fn into_port(self) -> Box<dyn RegisterPort> {
        self.port
    }

    /// Command a gate closed or open. Re-asserts the register on every call.
    pub fn actuate_gate(&mut self, arm: Arm, closed: bool) -> Result<()> {
        let gate = *self.profile.gate(arm);
        let value = if closed { gate.closed } else { gate.open };
        device(self.port.write_register(gate.addr, value), "actuate gate")?;
        tracing::info!(%arm, closed, value, "gate {}", if closed { "closed" } else { "opened" });
        Ok(())
    }

    pub fn dose(&mut self, target: DoseTarget) -> Result<()> {
        let dosing = self.profile.dosing;
        let bit = match target {
            DoseTarget::Arm(arm) => dosing.arm(arm).trigger_bit,
            DoseTarget::All => dosing.broadcast_bit,
        };
        device(
            self.port.fire_trigger(dosing.trigger_channel, bit),
            "fire dose trigger",
        )?;
        tracing::info!(%target, bit, "dosed");
        Ok(())
    }

    pub fn rotate(&mut self, cmd: RotationCommand) -> Result<()> {
        let rotation = self.profile.rotation;
        let bit = rotation.bit(cmd);
        if !cmd.is_implemented() {
            tracing::warn!(%cmd, bit, "maze-wide rotation is not wired; firing placeholder bit");
        }
        device(
            self.port.fire_trigger(rotation.trigger_channel, bit),
            "fire rotation trigger",
        )?;
        tracing::info!(%cmd, bit, "rotating");
        Ok(())
    }

    /// Turn the center block back into a T after the animal turned.
    pub fn compensate_turn(&mut self, turn: Turn) -> Result<()> {
        let cmd = match turn {
            Turn::Right => RotationCommand::CenterCcw,
            Turn::Left => RotationCommand::CenterCw,
        };
        self.rotate(cmd)
    }

    pub fn start_recording(&mut self) -> Result<()> {
        let scope = self.profile.scope;
        device(
            self.port.fire_trigger(scope.trigger_channel, scope.start_bit),
            "start recording",
        )?;
        tracing::info!("started miniscope recording");
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        let scope = self.profile.scope;
        device(
            self.port.fire_trigger(scope.trigger_channel, scope.stop_bit),
            "stop recording",
        )?;
        tracing::info!("stopped miniscope recording");
        Ok(())
    }

    /// Zero the frame counter and return the count read back after settling.
    pub fn reset_recording_counter(&mut self) -> Result<u32> {
        let scope = self.profile.scope;
        device(
            self.port.fire_trigger(scope.trigger_channel, scope.reset_bit),
            "reset frame counter",
        )?;
        self.settle(self.profile.timing.counter_settle);
        self.last_frame = None;
        let frames = self.frame_count()?;
        tracing::info!(frames, "frame counter reset");
        Ok(frames)
    }

    /// Frames recorded so far, assembled from two 16-bit registers.
    pub fn frame_count(&mut self) -> Result<u32> {
        let scope = self.profile.scope;
        let lo = device(
            self.port.read_register(scope.frame_lo_addr),
            "read frame count (lo)",
        )?;
        let hi = device(
            self.port.read_register(scope.frame_hi_addr),
            "read frame count (hi)",
        )?;
        let frames = ((hi & 0xFFFF) << 16) | (lo & 0xFFFF);
        if let Some(prev) = self.last_frame
            && frames < prev
        {
            tracing::warn!(prev, frames, "frame count went backwards");
        }
        self.last_frame = Some(frames);
        tracing::trace!(frames, "frame count");
        Ok(frames)
    }

    /// Arm of the most recent proximity detection.
    pub fn last_detected_arm(&mut self) -> Result<Arm> {
        let addr = self.profile.proximity.addr;
        let raw = device(self.port.read_register(addr), "read proximity")?;
        let arm = self.profile.proximity.lookup(raw).ok_or_else(|| {
            eyre::Report::new(MazeError::Config(format!(
                "proximity id {} has no arm mapping",
                raw & self.profile.proximity.mask
            )))
        })?;
        tracing::trace!(raw, %arm, "proximity");
        Ok(arm)
    }

    pub fn lick_state(&mut self) -> Result<bool> {
        let lick = self.profile.lick;
        let raw = device(
            self.port.read_register(lick.status_addr),
            "read lick status",
        )?;
        Ok((raw >> lick.status_bit) & 1 == 1)
    }

    /// Rewind the lick buffer, wait for it to settle, then stream it out.
    pub fn drain_lick_buffer(&mut self) -> Result<LickBuffer> {
        let lick = self.profile.lick;
        device(
            self.port.fire_trigger(lick.trigger_channel, lick.reset_bit),
            "reset lick buffer",
        )?;
        self.settle(self.profile.timing.buffer_settle);
        let bytes = device(
            self.port.read_stream(lick.pipe_addr, lick.buffer_bytes),
            "read lick buffer",
        )?;
        tracing::debug!(bytes = bytes.len(), "lick buffer drained");
        Ok(LickBuffer::from_bytes(&bytes))
    }
}

/// Builder for `MazeDriver`; the port and profile are mandatory.
#[derive(Default)]
pub struct MazeDriverBuilder {
    port: Option<Box<dyn RegisterPort>>,
    profile: Option<DeviceProfile>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl MazeDriverBuilder {
    pub fn with_port(mut self, port: impl RegisterPort + 'static) -> Self {
        self.port = Some(Box::new(port));
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<MazeDriver> {
        let port = self
            .port
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPort))?;
        let profile = self
            .profile
            .ok_or_else(|| eyre::Report::new(BuildError::MissingProfile))?;
        if profile.proximity.ids.is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "proximity table is empty",
            )));
        }
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        MazeDriver::new(port, profile, clock)
    }
}

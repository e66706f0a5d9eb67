//! Register-port backends for the plus maze.
//!
//! The USB/FPGA transport binding is provided by the host application; this
//! crate ships the simulated backend used for dry runs and tests.
pub mod error;

use plusmaze_traits::{PortError, RegisterPort};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::HwError;

/// One operation observed by the simulated port, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    Write { addr: u8, value: u32 },
    Read { addr: u8 },
    Trigger { channel: u8, bit: u8 },
    Stream { channel: u8, length: usize },
}

/// Video scope wiring emulated by the simulated port.
///
/// While recording, every read of `frame_lo_addr` advances the frame counter
/// by `frames_per_read`.
#[derive(Debug, Clone, Copy)]
pub struct SimScope {
    pub trigger_channel: u8,
    pub start_bit: u8,
    pub stop_bit: u8,
    pub reset_bit: u8,
    pub frame_lo_addr: u8,
    pub frame_hi_addr: u8,
    pub frames_per_read: u32,
}

#[derive(Debug)]
struct ScopeState {
    wiring: SimScope,
    recording: bool,
    frames: u32,
}

#[derive(Debug)]
struct SimState {
    registers: HashMap<u8, u32>,
    scripted: HashMap<u8, VecDeque<u32>>,
    streams: HashMap<u8, Vec<u8>>,
    journal: Vec<PortOp>,
    connected: bool,
    /// Transfers still allowed through, then the message to fail with.
    fail_after: Option<(usize, String)>,
    scope: Option<ScopeState>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            registers: HashMap::new(),
            scripted: HashMap::new(),
            streams: HashMap::new(),
            journal: Vec::new(),
            connected: true,
            fail_after: None,
            scope: None,
        }
    }
}

impl SimState {
    fn check_link(&mut self) -> Result<(), HwError> {
        if !self.connected {
            return Err(HwError::Disconnected);
        }
        match self.fail_after.take() {
            Some((0, msg)) => return Err(HwError::Transport(msg)),
            Some((n, msg)) => self.fail_after = Some((n - 1, msg)),
            None => {}
        }
        Ok(())
    }
}

/// Simulated maze controller board.
///
/// Clones share one register file, so a test can keep a handle for scripting
/// and inspection after moving the port into a driver.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMaze {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedMaze {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value returned by reads of `addr` once its script is exhausted.
    pub fn set_register(&self, addr: u8, value: u32) {
        self.state.borrow_mut().registers.insert(addr, value);
    }

    /// Queue values returned by successive reads of `addr`. The last value
    /// repeats after the queue drains.
    pub fn script_reads(&self, addr: u8, values: impl IntoIterator<Item = u32>) {
        self.state
            .borrow_mut()
            .scripted
            .entry(addr)
            .or_default()
            .extend(values);
    }

    /// Bytes served by pipe `channel`; shorter than a request means zero padding.
    pub fn set_stream(&self, channel: u8, bytes: Vec<u8>) {
        self.state.borrow_mut().streams.insert(channel, bytes);
    }

    pub fn attach_scope(&self, wiring: SimScope) {
        self.state.borrow_mut().scope = Some(ScopeState {
            wiring,
            recording: false,
            frames: 0,
        });
    }

    pub fn is_recording(&self) -> bool {
        self.state
            .borrow()
            .scope
            .as_ref()
            .is_some_and(|s| s.recording)
    }

    pub fn disconnect(&self) {
        self.state.borrow_mut().connected = false;
    }

    pub fn reconnect(&self) {
        self.state.borrow_mut().connected = true;
    }

    /// Fail the next operation with a transport error.
    pub fn fail_next(&self, msg: impl Into<String>) {
        self.fail_after(0, msg);
    }

    /// Let `ok` more operations through, then fail one with a transport error.
    pub fn fail_after(&self, ok: usize, msg: impl Into<String>) {
        self.state.borrow_mut().fail_after = Some((ok, msg.into()));
    }

    pub fn journal(&self) -> Vec<PortOp> {
        self.state.borrow().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.borrow_mut().journal.clear();
    }

    /// Values written to `addr`, oldest first.
    pub fn writes_to(&self, addr: u8) -> Vec<u32> {
        self.state
            .borrow()
            .journal
            .iter()
            .filter_map(|op| match *op {
                PortOp::Write { addr: a, value } if a == addr => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Bits fired on `channel`, oldest first.
    pub fn triggers_on(&self, channel: u8) -> Vec<u8> {
        self.state
            .borrow()
            .journal
            .iter()
            .filter_map(|op| match *op {
                PortOp::Trigger { channel: c, bit } if c == channel => Some(bit),
                _ => None,
            })
            .collect()
    }
}

impl RegisterPort for SimulatedMaze {
    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), PortError> {
        let mut st = self.state.borrow_mut();
        st.check_link()?;
        st.journal.push(PortOp::Write { addr, value });
        st.registers.insert(addr, value);
        tracing::trace!(addr, value, "sim wire-in");
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u32, PortError> {
        let mut st = self.state.borrow_mut();
        st.check_link()?;
        st.journal.push(PortOp::Read { addr });

        if let Some(scope) = st.scope.as_mut() {
            if addr == scope.wiring.frame_lo_addr {
                if scope.recording {
                    scope.frames = scope.frames.saturating_add(scope.wiring.frames_per_read);
                }
                return Ok(scope.frames & 0xFFFF);
            }
            if addr == scope.wiring.frame_hi_addr {
                return Ok(scope.frames >> 16);
            }
        }

        let scripted = st.scripted.get_mut(&addr).and_then(VecDeque::pop_front);
        let value = match scripted {
            Some(v) => {
                st.registers.insert(addr, v);
                v
            }
            None => st.registers.get(&addr).copied().unwrap_or(0),
        };
        tracing::trace!(addr, value, "sim wire-out");
        Ok(value)
    }

    fn fire_trigger(&mut self, channel: u8, bit: u8) -> Result<(), PortError> {
        let mut st = self.state.borrow_mut();
        st.check_link()?;
        st.journal.push(PortOp::Trigger { channel, bit });
        if let Some(scope) = st.scope.as_mut()
            && channel == scope.wiring.trigger_channel
        {
            if bit == scope.wiring.start_bit {
                scope.recording = true;
            } else if bit == scope.wiring.stop_bit {
                scope.recording = false;
            } else if bit == scope.wiring.reset_bit {
                scope.frames = 0;
            }
        }
        tracing::trace!(channel, bit, "sim trigger");
        Ok(())
    }

    fn read_stream(&mut self, channel: u8, length: usize) -> Result<Vec<u8>, PortError> {
        let mut st = self.state.borrow_mut();
        st.check_link()?;
        st.journal.push(PortOp::Stream { channel, length });
        let mut out = st.streams.get(&channel).cloned().unwrap_or_default();
        out.resize(length, 0);
        tracing::trace!(channel, length, "sim pipe-out");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_reads_repeat_last_value() {
        let sim = SimulatedMaze::new();
        let mut port = sim.clone();
        sim.script_reads(0x20, [1, 2]);
        assert_eq!(port.read_register(0x20).unwrap(), 1);
        assert_eq!(port.read_register(0x20).unwrap(), 2);
        assert_eq!(port.read_register(0x20).unwrap(), 2);
    }

    #[test]
    fn disconnected_port_fails_every_call() {
        let sim = SimulatedMaze::new();
        let mut port = sim.clone();
        sim.disconnect();
        assert!(port.write_register(0, 1).is_err());
        assert!(port.read_register(0).is_err());
        assert!(port.fire_trigger(0x40, 1).is_err());
        assert!(port.read_stream(0xA0, 16).is_err());
        assert!(sim.journal().is_empty());
    }

    #[test]
    fn scope_counts_frames_only_while_recording() {
        let sim = SimulatedMaze::new();
        let mut port = sim.clone();
        sim.attach_scope(SimScope {
            trigger_channel: 0x40,
            start_bit: 7,
            stop_bit: 8,
            reset_bit: 9,
            frame_lo_addr: 0x21,
            frame_hi_addr: 0x22,
            frames_per_read: 3,
        });
        assert_eq!(port.read_register(0x21).unwrap(), 0);
        port.fire_trigger(0x40, 7).unwrap();
        assert_eq!(port.read_register(0x21).unwrap(), 3);
        port.fire_trigger(0x40, 8).unwrap();
        assert_eq!(port.read_register(0x21).unwrap(), 3);
        port.fire_trigger(0x40, 9).unwrap();
        assert_eq!(port.read_register(0x21).unwrap(), 0);
    }
}

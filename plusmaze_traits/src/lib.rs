pub mod arm;
pub mod clock;

pub use arm::{Arm, ParseArmError};
pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at the hardware boundary.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Register-mapped access to the maze controller board.
///
/// Wire-in registers are written, wire-out registers are read, trigger
/// channels take one-shot pulses on a single bit, and pipe channels stream
/// a fixed number of bytes. Every call fails when the transport is gone.
pub trait RegisterPort {
    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), PortError>;
    fn read_register(&mut self, addr: u8) -> Result<u32, PortError>;
    fn fire_trigger(&mut self, channel: u8, bit: u8) -> Result<(), PortError>;
    fn read_stream(&mut self, channel: u8, length: usize) -> Result<Vec<u8>, PortError>;
}

impl<P: RegisterPort + ?Sized> RegisterPort for Box<P> {
    fn write_register(&mut self, addr: u8, value: u32) -> Result<(), PortError> {
        (**self).write_register(addr, value)
    }
    fn read_register(&mut self, addr: u8) -> Result<u32, PortError> {
        (**self).read_register(addr)
    }
    fn fire_trigger(&mut self, channel: u8, bit: u8) -> Result<(), PortError> {
        (**self).fire_trigger(channel, bit)
    }
    fn read_stream(&mut self, channel: u8, length: usize) -> Result<Vec<u8>, PortError> {
        (**self).read_stream(channel, length)
    }
}

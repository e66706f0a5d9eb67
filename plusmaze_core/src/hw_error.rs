//! Maps `Box<dyn Error>` from the register-port boundary to `MazeError`.
//!
//! `plusmaze_traits::RegisterPort` returns boxed errors so that any transport
//! can sit behind it; this module converts those to our typed error enum, with
//! an optional feature-gated path for `plusmaze_hardware::HwError` downcasting.

use crate::error::MazeError;

/// Map a trait-boundary error to `MazeError::Device`.
///
/// Known hardware errors are downcast first so their message is kept intact;
/// anything else is stringified.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> MazeError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<plusmaze_hardware::error::HwError>() {
            return match hw {
                plusmaze_hardware::error::HwError::Disconnected => {
                    MazeError::Device("controller board disconnected".into())
                }
                other => MazeError::Device(other.to_string()),
            };
        }
    }

    MazeError::Device(e.to_string())
}

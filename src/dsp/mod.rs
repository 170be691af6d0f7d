mod battery;
mod butterworth;
mod fft;
mod imu;
mod pulse;
mod spo2;
mod stage;
mod window;

pub use battery::{percentage_from_millivolts, DEFAULT_PERCENTAGE};
pub use spo2::blood_oxygenation;
pub use stage::DspStage;
pub use window::{PatchWindow, WindowStore};

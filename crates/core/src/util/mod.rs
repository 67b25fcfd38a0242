pub mod rolling_window;

pub use rolling_window::{RollingWindow, Timestamped, WindowError};

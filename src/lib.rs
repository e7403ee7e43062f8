//! AntRide - ANT+ sensor core for a bicycle computer
//!
//! Decodes ANT+ heart-rate, speed, cadence and power broadcasts into ride
//! metrics and manages the radio channels behind them: pairing, background
//! scanning and device search.

pub mod sensors;
pub mod storage;

// Re-export commonly used types
pub use sensors::ant::AntSensorManager;
pub use storage::config::AppConfig;

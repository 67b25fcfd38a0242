pub mod analysis;
pub mod bus;
pub mod capture;
pub mod clock;
pub mod config;
pub mod emotion;
pub mod feedback;
pub mod metrics;
pub mod report;
pub mod rewards;
pub mod scoring;
pub mod session;
pub mod transcription;
pub mod util;

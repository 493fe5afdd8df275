pub mod aggregator;
pub mod calibration;
pub mod channel;
pub mod channel_session;
pub mod grid;
pub mod pointer;
pub mod profile;
pub mod region;
pub mod utils;

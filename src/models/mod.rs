pub mod availability;
pub mod driver;
pub mod event;
pub mod job;
pub mod ranking;

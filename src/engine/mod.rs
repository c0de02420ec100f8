pub mod assignment;
pub mod availability;
pub mod dashboard;
pub mod drivers;
pub mod jobs;
pub mod notifications;
pub mod ranking;
pub mod scoring;

#[cfg(test)]
pub(crate) mod testing;

//! External signal clients and the background polling scheduler.

pub mod events;
pub mod garages;
pub mod poller;
pub mod traffic;
pub mod weather;

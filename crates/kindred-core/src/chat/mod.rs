//! Session orchestration: the per-message entry point, the inactivity
//! sweeper, and the state transitions they share.

pub mod locks;
pub mod reply;
pub mod repository;
pub mod service;
pub mod session;
pub mod sweeper;

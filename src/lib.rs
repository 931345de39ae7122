//! Interview Coach: staged mock-interview sessions with an avatar interviewer.

pub mod avatar;
pub mod config;
pub mod error;
pub mod interview;

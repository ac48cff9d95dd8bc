//! Infrastructure layer - Storage backends and logging

pub mod logging;
pub mod storage;

//! Avatar transport providers

pub mod heygen;
pub mod scripted;

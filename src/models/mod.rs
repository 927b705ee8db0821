// src/models/mod.rs
pub mod tracking;
pub mod notification;

pub use tracking::*;
pub use notification::*;

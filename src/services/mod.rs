// src/services/mod.rs
pub mod api_service;
pub mod display_service;
pub mod messaging_service;
pub mod notification_poller;
pub(crate) mod poll_loop;
pub mod tracker_service;

#[cfg(test)]
pub(crate) mod test_support;

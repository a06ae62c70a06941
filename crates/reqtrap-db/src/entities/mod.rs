//! Database entities

pub mod mock_response;
pub mod request_log;
pub mod user;

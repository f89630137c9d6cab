pub mod error_details;
pub mod rate_limit;
pub mod request_id;
pub mod request_logger;
pub mod security;

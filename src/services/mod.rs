pub mod drive;
pub mod temp_storage;
pub mod upload_service;
pub mod upload_tracker;

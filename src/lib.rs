pub mod api;
pub mod channel_objects;
pub mod errors;
pub mod process_runner;
pub mod requests_queue;
pub mod result_store;
pub mod tactics;
pub mod utils;
pub mod worker;

pub mod activity_chain;
pub mod markers;
pub mod models;
pub mod time_window;

pub mod activity_mapper;
pub mod backend_client;
pub mod config;
pub mod error;
pub mod map_widget;
pub mod route_cache;
pub mod routing_provider;

pub mod bootstrap;
pub mod commands;
pub mod map_lifecycle;
pub mod mutation_coordinator;
pub mod route_resolver;

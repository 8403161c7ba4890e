//! HTTP API for the simulation
//!
//! JSON endpoints over one shared [`TurnEngine`](crate::engine::TurnEngine),
//! plus a server-sent-events variant of the turn endpoint.

mod error;
pub mod simulation_routes;

pub use error::ApiError;
pub use simulation_routes::create_simulation_router;

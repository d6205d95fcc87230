pub mod costs;
pub mod events;
pub mod health;

pub use costs::create_cost_routes;
pub use events::create_event_routes;
pub use health::create_health_routes;

pub mod admin_routes;
pub mod health_routes;
pub mod public_routes;

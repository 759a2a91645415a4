//! Gateway wiring: request parameter helpers and method handlers.

pub mod handlers;
mod params;
mod register;

#[cfg(test)]
mod tests;

pub use register::register_handlers;

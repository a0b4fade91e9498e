//! Client registration: identity checks, party validation and joining or
//! leaving the pool

pub mod handler;
pub mod validation;

pub use handler::RegistrationHandler;
pub use validation::{validate_client, validate_party, ClientInfo, ClientPolicy};

/// Shared test infrastructure for the integration tests.

pub mod scripted_backend;

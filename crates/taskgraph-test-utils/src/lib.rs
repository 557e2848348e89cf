//! Mocks and fixtures shared by the taskgraph test suites.

mod capabilities;
mod fixtures;
mod integrations;

pub use capabilities::{MockAgent, MockCapabilities, MockTeam};
pub use fixtures::{temp_file, write_file};
pub use integrations::{MemoryFileStore, MockHttpClient};

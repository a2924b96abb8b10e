pub mod artifacts;
pub mod catalog;
pub mod fanout;
pub mod gate;
pub mod normalizer;
pub mod orchestrator;
pub mod runner;
pub mod serializer;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod warehouse;

pub use orchestrator::{Dependencies, InvocationOutcome, Orchestrator};

//! store
//!
//! Where the session is persisted between runs.
//!
//! - [`ConfigSessionStore`]: the profile config file (what the CLI uses)
//! - [`MemorySessionStore`]: process memory (tests and embedders)

mod file_store;
mod memory;
mod traits;

pub use file_store::ConfigSessionStore;
pub use memory::MemorySessionStore;
pub use traits::{SessionStore, StoreError};

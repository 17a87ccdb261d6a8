mod config;
mod identifiers;
mod session_table;
mod ue_session;

pub use config::*;
pub use identifiers::SeidAllocator;
pub use session_table::{DuplicateKey, LookupError, SessionTable};
pub use ue_session::*;

#[cfg(test)]
pub(crate) use ue_session::test_support;

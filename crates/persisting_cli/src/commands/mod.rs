//! CLI command implementations.

pub mod dump_wal;
pub mod flush;
pub mod inspect;
pub mod verify;

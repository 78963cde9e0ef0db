//! cybertutor-store: reference document stores.
//!
//! [`MemoryStore`] keeps everything in process behind one lock. [`FileStore`]
//! keeps a JSON snapshot on disk and takes a file lock around every
//! operation, so several processes can share it. In both, increments,
//! test-and-set, and transactions are atomic and batches apply
//! all-or-nothing.

pub mod file;
pub mod memory;
mod snapshot;

pub use file::FileStore;
pub use memory::MemoryStore;

//! End-to-end tests through the `tidkv` facade.
//!
//! Every scenario runs against `MemoryStore`; set `RUST_LOG=tidkv=debug`
//! (or `debug`) to see transaction lifecycle events.

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod concurrent_increments;
mod lifecycle;
mod read_only;
mod tombstones;

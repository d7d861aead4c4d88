//! # sync-core
//!
//! Pure logic for workspace-sync (no I/O, instant tests).
//!
//! This crate turns classified filesystem notifications into the steps the
//! local engine has to perform, without touching the filesystem or the
//! network itself.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (reading files, sending events) is performed by
//! `sync-engine`, which interprets the steps produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod ignore;
pub mod notification;

pub use cursor::{Step, WatchCursor};
pub use ignore::IgnoreSet;
pub use notification::Notification;

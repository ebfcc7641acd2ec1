// src/exec/mod.rs

//! Process execution layer.
//!
//! The supervisor never spawns processes itself; it talks to a
//! [`ProcessManager`] over a connect/act/disconnect session.
//!
//! - [`backend`] defines the `ProcessManager` trait and the launch
//!   vocabulary (`StartOptions`, `LaunchCommand`, `RestartPolicy`).
//! - [`local`] is the in-process manager used by the `localsvc` binary: a
//!   registry of named processes keyed by identity.
//! - [`runner`] spawns a single child with `tokio::process::Command`, relays
//!   its output to `tracing` and applies the crash auto-restart policy.
//! - [`store`] persists registrations so they outlive a single session.

pub mod backend;
pub mod local;
pub mod runner;
pub mod store;

pub use backend::{
    LaunchCommand, ProcessDescription, ProcessManager, ProcessRef, RestartPolicy, StartOptions,
};
pub use local::LocalProcessManager;
pub use store::{RegistrationRecord, RegistrationStore};

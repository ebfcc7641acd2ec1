// src/config/mod.rs

//! Configuration loading and validation for localsvc.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into a [`ConfigFile`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    BindingSourceConfig, BindingsSection, ConfigFile, CredentialsSection, RawConfigFile,
    ServiceSection, SupervisorSection, WatchSection,
};

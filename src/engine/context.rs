// src/engine/context.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::DeploymentMode;

/// Shared, clonable deployment mode flag.
///
/// Read synchronously at the moment a restart or run executes, so a restart
/// queued before teardown began is still dropped.
#[derive(Debug, Clone, Default)]
pub struct DeploymentContext {
    removing: Arc<AtomicBool>,
}

impl DeploymentContext {
    pub fn new(mode: DeploymentMode) -> Self {
        let ctx = Self::default();
        ctx.set_mode(mode);
        ctx
    }

    pub fn mode(&self) -> DeploymentMode {
        if self.is_removing() {
            DeploymentMode::Remove
        } else {
            DeploymentMode::Deploy
        }
    }

    pub fn set_mode(&self, mode: DeploymentMode) {
        self.removing
            .store(mode == DeploymentMode::Remove, Ordering::SeqCst);
    }

    pub fn is_removing(&self) -> bool {
        self.removing.load(Ordering::SeqCst)
    }
}

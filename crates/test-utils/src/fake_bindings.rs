use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use localsvc::bindings::{BindingResolver, BindingValues};
use localsvc::credentials::{CredentialProvider, Credentials};
use localsvc::errors::{LocalsvcError, Result};
use localsvc::types::BoxFuture;

/// Resolver whose values tests can change between polls.
#[derive(Debug, Clone, Default)]
pub struct FakeResolver {
    values: Arc<Mutex<BTreeMap<String, String>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `resolve` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BindingResolver for FakeResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<BindingValues>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(LocalsvcError::BindingFetchError(
                    "fake: secrets backend unavailable".into(),
                ));
            }
            Ok(self.values.lock().unwrap().clone())
        })
    }
}

/// Credential provider returning a fixed set and counting fetches.
#[derive(Debug, Clone, Default)]
pub struct FakeCredentials {
    credentials: Arc<Mutex<Credentials>>,
    calls: Arc<AtomicUsize>,
}

impl FakeCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(Mutex::new(credentials)),
            calls: Arc::default(),
        }
    }

    /// Replace what the next fetch returns (simulates a token refresh).
    pub fn rotate(&self, credentials: Credentials) {
        *self.credentials.lock().unwrap() = credentials;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialProvider for FakeCredentials {
    fn credentials(&self) -> BoxFuture<'_, Result<Credentials>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.credentials.lock().unwrap().clone())
        })
    }
}

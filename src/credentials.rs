// src/credentials.rs

//! Credential/region context injected into the managed process.
//!
//! Credentials are looked up on every start and never cached, so a rotated
//! session token reaches the service on its next restart.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::Result;
use crate::types::BoxFuture;

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const REGION: &str = "AWS_REGION";

/// Ambient cloud credentials. Absent values are simply not injected.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub region: Option<String>,
}

// Never print secrets.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<set>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<set>"))
            .field("region", &self.region)
            .finish()
    }
}

impl Credentials {
    /// Environment variables for the values that are present.
    pub fn into_env(self) -> BTreeMap<String, String> {
        [
            (ACCESS_KEY_ID, self.access_key_id),
            (SECRET_ACCESS_KEY, self.secret_access_key),
            (SESSION_TOKEN, self.session_token),
            (REGION, self.region),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect()
    }
}

/// Read-only accessor for the current credentials.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> BoxFuture<'_, Result<Credentials>>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from the host environment on every call.
pub struct EnvCredentialProvider {
    inject: bool,
    region: Option<String>,
    lookup: Lookup,
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider")
            .field("inject", &self.inject)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl EnvCredentialProvider {
    /// `region` overrides `AWS_REGION` when set. With `inject = false` no
    /// credentials are provided at all.
    pub fn new(inject: bool, region: Option<String>) -> Self {
        Self::with_lookup(inject, region, |key| std::env::var(key).ok())
    }

    /// Same as [`EnvCredentialProvider::new`] but with a custom variable
    /// lookup instead of the process environment.
    pub fn with_lookup<F>(inject: bool, region: Option<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            inject,
            region,
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> BoxFuture<'_, Result<Credentials>> {
        Box::pin(async move {
            if !self.inject {
                return Ok(Credentials::default());
            }

            Ok(Credentials {
                access_key_id: self.var(ACCESS_KEY_ID),
                secret_access_key: self.var(SECRET_ACCESS_KEY),
                session_token: self.var(SESSION_TOKEN),
                region: self.region.clone().or_else(|| self.var(REGION)),
            })
        })
    }
}

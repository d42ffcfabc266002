//! Request signing: a stage that admits a request only when its `_sign` parameter matches.
//!
//! A signed request carries `_t` (unix seconds), `_app` (caller id) and `_sign`. The signature is
//! the lowercase hex md5 of the app secret followed by every other parameter value, ordered by
//! parameter name, all joined with `:`. See [`sign_params`].

mod store;

pub use store::{CachePolicy, CachedSecretStore, SecretError, SecretStore, StaticSecretStore};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::chain::{Flow, Stage};
use crate::context::RequestContext;
use crate::error::{ApiError, Halt};

const TIMESTAMP: &str = "_t";
const APP: &str = "_app";
const SIGN: &str = "_sign";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    /// How far `_t` may be from the server clock, in either direction.
    pub expire_seconds: i64,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self { expire_seconds: 300 }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expire_seconds must be positive, got {expire_seconds}")]
pub struct InvalidSignConfig {
    pub expire_seconds: i64,
}

impl SignConfig {
    pub fn validate(self) -> Result<Self, InvalidSignConfig> {
        if self.expire_seconds <= 0 {
            return Err(InvalidSignConfig { expire_seconds: self.expire_seconds });
        }
        Ok(self)
    }
}

/// Flattened request parameters, displayed as `map[k:v k:v]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignParams(pub BTreeMap<String, String>);

impl fmt::Display for SignParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("map[")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}:{v}")?;
        }
        f.write_str("]")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("checkSign|not enough|{params}")]
    NotEnough { params: SignParams },

    #[error("checkSign|conv _t|{params}|{reason}")]
    InvalidTimestamp { params: SignParams, reason: String },

    #[error("checkSign|expire|{params}|{diff}")]
    Expired { params: SignParams, diff: i64 },

    #[error("checkSign|get sign err|{params}|deny: app not exist")]
    UnknownApp { params: SignParams },

    #[error("checkSign|sign err|{params}")]
    Mismatch { params: SignParams },
}

/// md5-hex of `secret` and the values of `params` in key order, `_sign` excluded, joined by `:`.
pub fn sign_params(secret: &str, params: &BTreeMap<String, String>) -> String {
    let mut canonical = String::from(secret);
    for (_, value) in params.iter().filter(|(key, _)| key.as_str() != SIGN) {
        canonical.push(':');
        canonical.push_str(value);
    }
    hex::encode(Md5::digest(canonical.as_bytes()))
}

/// Verifies the flattened parameters against the secret store at unix time `now`.
pub async fn check_sign<S>(store: &S, config: SignConfig, params: SignParams, now: i64) -> Result<(), SignError>
where
    S: SecretStore + ?Sized,
{
    let (Some(t), Some(app), Some(sign)) = (params.0.get(TIMESTAMP), params.0.get(APP), params.0.get(SIGN)) else {
        return Err(SignError::NotEnough { params });
    };

    let t = match t.parse::<i64>() {
        Ok(t) => t,
        Err(e) => return Err(SignError::InvalidTimestamp { reason: e.to_string(), params }),
    };

    let diff = now.saturating_sub(t);
    if diff.unsigned_abs() > config.expire_seconds.unsigned_abs() {
        return Err(SignError::Expired { params, diff });
    }

    let secret = match store.app_secret(app).await {
        Ok(secret) => secret,
        Err(e) => {
            warn!(target: "rest::sign", app = app.as_str(), cause = %e, "get app secret failed");
            return Err(SignError::UnknownApp { params });
        }
    };

    if *sign != sign_params(&secret, &params.0) {
        return Err(SignError::Mismatch { params });
    }
    Ok(())
}

/// The authentication stage of a signed endpoint.
///
/// Any failure answers `200` with `{"errno":-1,"errmsg":"签名错误:<reason>"}`.
#[derive(Debug)]
pub struct SignGuard<S> {
    store: S,
    config: SignConfig,
}

impl<S: SecretStore> SignGuard<S> {
    pub fn new(store: S) -> Self {
        Self { store, config: SignConfig::default() }
    }

    /// For use with [`ChainBuilder::try_stage`](crate::ChainBuilder::try_stage).
    pub fn try_new(store: S, config: SignConfig) -> Result<Self, InvalidSignConfig> {
        Ok(Self { store, config: config.validate()? })
    }
}

#[async_trait]
impl<S: SecretStore> Stage for SignGuard<S> {
    async fn serve(&self, ctx: &mut RequestContext) -> Result<Flow, Halt> {
        info!(target: "rest::sign", "start SignChecker...");
        let params = SignParams(ctx.request().form().flatten());
        info!(target: "rest::sign", "SignChecker|{params}");

        let now = chrono::Utc::now().timestamp();
        match check_sign(&self.store, self.config, params, now).await {
            Ok(()) => Ok(Flow::Next),
            Err(e) => {
                error!(target: "rest::sign", "SignChecker|签名错误|{e}");
                Err(ApiError::new(-1, format!("签名错误:{e}"), None).into())
            }
        }
    }
}

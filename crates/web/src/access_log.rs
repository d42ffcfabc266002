//! One access record per request: url, caller, client address.

use async_trait::async_trait;
use http::header::HeaderName;
use tracing::info;

use crate::chain::{Flow, Stage};
use crate::context::RequestContext;
use crate::error::Halt;
use crate::request::ApiRequest;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// The identified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub login_name: String,
}

/// Looks up who sent a request.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityResolver: Send + Sync {
    fn user_info(&self, request: &ApiRequest) -> Option<UserInfo>;
}

/// Reads a [`UserInfo`] an earlier layer attached to the request extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionIdentity;

impl IdentityResolver for ExtensionIdentity {
    fn user_info(&self, request: &ApiRequest) -> Option<UserInfo> {
        request.extensions().get::<UserInfo>().cloned()
    }
}

#[derive(Debug)]
pub struct AccessLog<R = ExtensionIdentity> {
    resolver: R,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self { resolver: ExtensionIdentity }
    }
}

impl<R: IdentityResolver> AccessLog<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: IdentityResolver> Stage for AccessLog<R> {
    async fn serve(&self, ctx: &mut RequestContext) -> Result<Flow, Halt> {
        let request = ctx.request();
        let login_name = self.resolver.user_info(request).map(|user| user.login_name).unwrap_or_default();
        info!(
            target: "rest::apilog",
            url = request.request_uri(),
            login_name = login_name.as_str(),
            remote_addr = %client_address(request),
            "api access"
        );
        Ok(Flow::Next)
    }
}

/// The client address: the first `X-Forwarded-For` hop, else the peer host without its port.
pub fn client_address(request: &ApiRequest) -> String {
    let forwarded = request.headers().get(X_FORWARDED_FOR).and_then(|value| value.to_str().ok()).unwrap_or("");
    if !forwarded.is_empty() {
        return forwarded.split(',').next().unwrap_or(forwarded).to_string();
    }

    match request.remote_addr() {
        Some(addr) => {
            let addr = addr.to_string();
            match addr.rfind(':') {
                Some(idx) => addr[..idx].to_string(),
                None => addr,
            }
        }
        None => String::new(),
    }
}

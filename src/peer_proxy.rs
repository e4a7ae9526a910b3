//! A thin, permission-checked handle for calling back into the peer on the other end of an
//! endpoint, restricted to the method names the local [`Service`](crate::service::Service)
//! declared it is allowed to call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::message::CallParams;
use crate::endpoint_core::EndpointCore;

/// Restricts peer calls to a pre-declared allow-list, the explicit-map replacement for a
/// dynamic "call whatever the peer happens to expose" surface.
#[derive(Clone)]
pub struct PeerProxy {
    core: Arc<EndpointCore>,
    requests: Arc<HashSet<String>>,
    notifications: Arc<HashSet<String>>,
}

impl PeerProxy {
    pub(crate) fn new(
        core: Arc<EndpointCore>,
        requests: impl IntoIterator<Item = String>,
        notifications: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            core,
            requests: Arc::new(requests.into_iter().collect()),
            notifications: Arc::new(notifications.into_iter().collect()),
        }
    }

    pub async fn call(&self, method: &str, params: CallParams) -> Result<Value> {
        self.call_with_timeout(method, params, None).await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: CallParams,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !self.requests.contains(method) {
            return Err(Error::UnknownPeerOperation {
                method: method.to_string(),
            });
        }
        self.core.invoke_request(method, params, timeout).await
    }

    pub fn notify(&self, method: &str, params: CallParams) -> Result<()> {
        if !self.notifications.contains(method) {
            return Err(Error::UnknownPeerOperation {
                method: method.to_string(),
            });
        }
        self.core.invoke_notification(method, params)
    }
}

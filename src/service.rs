//! Handler registration: the explicit parameter shape a method requires, declared up front
//! rather than discovered by reflecting over a function signature at call time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::error::JsonRpcError;
use crate::dispatch::HandlerContext;

/// The parameter shape a handler declares at registration time. Incoming positional and named
/// arguments are checked against this before the handler is ever invoked.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub variadic_positional: bool,
    pub variadic_named: bool,
}

impl ParamSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(required: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            required: required.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    pub fn with_optional(mut self, optional: impl IntoIterator<Item = &'static str>) -> Self {
        self.optional = optional.into_iter().map(String::from).collect();
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic_positional = true;
        self.variadic_named = true;
        self
    }

    /// Whether `positional_count` positional arguments plus the given named arguments can
    /// satisfy this spec: every required name is covered exactly once (by position or by name,
    /// never both), no unexpected names are present unless the spec is variadic, and no more
    /// positional arguments arrive than there are declared slots unless variadic.
    pub fn is_compatible(&self, positional_count: usize, named: &Map<String, Value>) -> bool {
        if !self.variadic_named {
            for key in named.keys() {
                if !self.required.contains(key) && !self.optional.contains(key) {
                    return false;
                }
            }
        }

        let declared_slots = self.required.len() + self.optional.len();
        if !self.variadic_positional && positional_count > declared_slots {
            return false;
        }

        let covered_by_position = positional_count.min(self.required.len());
        for name in &self.required[..covered_by_position] {
            if named.contains_key(name) {
                // Same parameter supplied twice: once positionally, once by name.
                return false;
            }
        }
        for name in &self.required[covered_by_position..] {
            if !named.contains_key(name) {
                return false;
            }
        }
        true
    }
}

pub type HandlerResult = Result<Value, JsonRpcError>;

#[async_trait]
pub trait RequestHandler: Send + Sync {
    fn param_spec(&self) -> &ParamSpec;
    async fn call(
        &self,
        ctx: HandlerContext,
        positional: Vec<Value>,
        named: Map<String, Value>,
    ) -> HandlerResult;
}

#[async_trait]
pub trait NotificationHandler: Send + Sync {
    fn param_spec(&self) -> &ParamSpec;
    async fn call(&self, ctx: HandlerContext, positional: Vec<Value>, named: Map<String, Value>);
}

/// Lookup surface the dispatcher consults to resolve an incoming method name to a handler.
pub trait ServiceRegistry: Send + Sync {
    fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>>;
    fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>>;
}

/// A plain map-backed [`ServiceRegistry`], built up with [`Service::request`] /
/// [`Service::notification`].
#[derive(Default, Clone)]
pub struct Service {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    notifications: HashMap<String, Arc<dyn NotificationHandler>>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) -> Self {
        self.requests.insert(method.into(), handler);
        self
    }

    pub fn notification(
        mut self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self {
        self.notifications.insert(method.into(), handler);
        self
    }

    /// Method names registered for `invoke_request`, used to build a peer proxy's allow-list.
    pub fn request_method_names(&self) -> Vec<String> {
        self.requests.keys().cloned().collect()
    }

    /// Method names registered for `invoke_notification`, used to build a peer proxy's
    /// allow-list.
    pub fn notification_method_names(&self) -> Vec<String> {
        self.notifications.keys().cloned().collect()
    }
}

impl ServiceRegistry for Service {
    fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(method).cloned()
    }

    fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications.get(method).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_positional_argument_matches_required() {
        let spec = ParamSpec::new(["txt"]);
        assert!(spec.is_compatible(1, &Map::new()));
        assert!(!spec.is_compatible(2, &Map::new()));
    }

    #[test]
    fn named_argument_satisfies_required() {
        let spec = ParamSpec::new(["a", "b"]);
        let mut named = Map::new();
        named.insert("b".into(), json!(2));
        assert!(!spec.is_compatible(0, &named)); // "a" still missing
        named.insert("a".into(), json!(1));
        assert!(spec.is_compatible(0, &named));
    }

    #[test]
    fn unknown_named_argument_is_incompatible_unless_variadic() {
        let spec = ParamSpec::new(["a"]);
        let mut named = Map::new();
        named.insert("surprise".into(), json!(1));
        named.insert("a".into(), json!(1));
        assert!(!spec.is_compatible(0, &named));
        assert!(spec.clone().variadic().is_compatible(0, &named));
    }

    #[test]
    fn double_supplied_parameter_is_incompatible() {
        let spec = ParamSpec::new(["a"]);
        let mut named = Map::new();
        named.insert("a".into(), json!(1));
        assert!(!spec.is_compatible(1, &named));
    }
}

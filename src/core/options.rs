//! Construction-time configuration for an [`RpcEndpoint`](crate::endpoint::RpcEndpoint).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::core::message::MessageId;

/// Chooses between pre-emptive OS threads and a cooperative single-threaded scheduler for
/// everything the endpoint spawns: the socket queue's reader/writer loops, request handlers,
/// and batch fan-out. The two models share one interface ([`crate::tasking::Tasking`]); handlers
/// written for one must not be mixed into an endpoint running the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingModel {
    /// Each spawned unit of work may run truly concurrently, on tokio's multi-thread runtime.
    Threads,
    /// Spawned work is cooperatively scheduled onto a single OS thread via a `LocalSet`. The
    /// caller is responsible for driving that `LocalSet` (typically via `LocalSet::run_until`).
    Cooperative,
}

/// Named concurrency quotas applied to task groups spawned by the dispatcher. `None` means
/// unbounded.
#[derive(Debug, Clone, Default)]
pub struct TaskQuotas {
    pub dispatcher: Option<usize>,
    pub handlers: Option<usize>,
    pub batches: Option<usize>,
}

/// Pluggable id generator, invoked once per outgoing request to produce a fresh, unique
/// [`MessageId`]. The default mirrors the reference generator: monotonically increasing
/// `"id-<n>"` strings.
pub type IdGenerator = Arc<dyn Fn() -> MessageId + Send + Sync>;

pub fn default_id_generator() -> IdGenerator {
    let counter = AtomicU64::new(1);
    Arc::new(move || Value::String(format!("id-{}", counter.fetch_add(1, Ordering::Relaxed))))
}

/// An id generator producing a fresh UUID v4 per call, for deployments where ids must be
/// globally unique across endpoints rather than merely unique within one connection.
pub fn uuid_id_generator() -> IdGenerator {
    Arc::new(|| Value::String(uuid::Uuid::new_v4().to_string()))
}

/// Endpoint-wide configuration resolved at construction time and held immutable thereafter.
#[derive(Clone)]
pub struct EndpointOptions {
    pub threading_model: ThreadingModel,
    pub quotas: TaskQuotas,
    pub id_generator: IdGenerator,
    /// Maximum bytes a single frame may occupy before framing treats it as an oversized,
    /// unrecoverable message. `None` disables the check.
    pub max_frame_bytes: Option<usize>,
    /// Extra metadata describing the connection, surfaced to handlers via the handler context.
    pub connection_tags: HashMap<String, String>,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            threading_model: ThreadingModel::Threads,
            quotas: TaskQuotas::default(),
            id_generator: default_id_generator(),
            max_frame_bytes: Some(16 * 1024 * 1024),
            connection_tags: HashMap::new(),
        }
    }
}

impl EndpointOptions {
    pub fn threads() -> Self {
        Self {
            threading_model: ThreadingModel::Threads,
            ..Default::default()
        }
    }

    pub fn cooperative() -> Self {
        Self {
            threading_model: ThreadingModel::Cooperative,
            ..Default::default()
        }
    }

    pub fn with_quotas(mut self, quotas: TaskQuotas) -> Self {
        self.quotas = quotas;
        self
    }

    pub fn with_id_generator(mut self, gen: IdGenerator) -> Self {
        self.id_generator = gen;
        self
    }

    /// Switches id generation to [`uuid_id_generator`].
    pub fn with_uuid_ids(self) -> Self {
        self.with_id_generator(uuid_id_generator())
    }

    pub fn with_max_frame_bytes(mut self, max: Option<usize>) -> Self {
        self.max_frame_bytes = max;
        self
    }
}

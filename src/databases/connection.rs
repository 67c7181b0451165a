//! Connection-acquisition policy shared by both handlers.

/// How a handler obtains a backend connection for each call.
///
/// All three strategies sit behind the same handler call surface and are
/// interchangeable. `Persistent` holds one session for the handler lifetime;
/// combining it with the concurrent harness serializes tasks behind that
/// single session. `Pooled` keeps a fixed-size pool with get/put per call.
/// `Ephemeral` opens and closes a connection per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPolicy {
    Persistent,
    Pooled { size: usize },
    Ephemeral,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        ConnectionPolicy::Ephemeral
    }
}

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Context, ContextId, OutboundMessage};

/// Message sink — where a run's outbound messages go.
///
/// The live executor and the test/simulation executor are the same
/// interpreter wired to different sinks: a transmitting sink for real
/// recipients, a recording sink that captures without transmitting.
pub trait MessageSink: Send + Sync + 'static {
    /// Sink name (e.g., "webhook", "recording").
    fn name(&self) -> &str;

    /// Deliver one message to a recipient.
    fn send(&self, recipient: &str, message: &OutboundMessage) -> BoxFuture<'_, Result<()>>;
}

/// Context store — persistence backend for execution contexts.
///
/// Must round-trip `variables`, `history`, and `status` exactly.
pub trait ContextStore: Send + Sync + 'static {
    /// Load a context by id. Ok(None) when unknown.
    fn load(&self, id: &ContextId) -> BoxFuture<'_, Result<Option<Context>>>;

    /// Persist a context (insert or replace).
    fn save(&self, ctx: &Context) -> BoxFuture<'_, Result<()>>;

    /// Ids of non-terminal contexts whose expiry timestamp has passed.
    fn expired_before(&self, cutoff: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<ContextId>>>;
}

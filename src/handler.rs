/// Detection handlers
///
/// A handler is invoked synchronously from the streaming loop with the
/// keyword that was detected (or `"silence"`). The loop does not advance
/// until the handler returns, and a handler error aborts the stream.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Capability invoked when a registered keyword or silence is detected
pub trait Handler {
    fn detected(&mut self, keyword: &str) -> anyhow::Result<()>;
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn detected(&mut self, keyword: &str) -> anyhow::Result<()> {
        (**self).detected(keyword)
    }
}

/// Adapter letting a plain closure act as a [`Handler`]
pub struct HandlerFn<F>(F);

impl<F> Handler for HandlerFn<F>
where
    F: FnMut(&str),
{
    fn detected(&mut self, keyword: &str) -> anyhow::Result<()> {
        (self.0)(keyword);
        Ok(())
    }
}

/// Wrap a closure so it can be registered as a handler
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: FnMut(&str),
{
    HandlerFn(f)
}

/// Detection event forwarded out of the streaming loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotwordEvent {
    /// Keyword name, or `"silence"`
    pub keyword: String,

    /// Timestamp when the detection was routed (microseconds since epoch)
    pub timestamp: i64,
}

/// Handler that forwards every detection into a channel
///
/// Fails once the receiving side has been dropped, which stops the
/// streaming loop on the next detection.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<HotwordEvent>,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::UnboundedSender<HotwordEvent>) -> Self {
        Self { tx }
    }

    /// Create a handler together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HotwordEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn current_timestamp_micros() -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default()
    }
}

impl Handler for ChannelHandler {
    fn detected(&mut self, keyword: &str) -> anyhow::Result<()> {
        let event = HotwordEvent {
            keyword: keyword.to_string(),
            timestamp: Self::current_timestamp_micros(),
        };

        debug!("Forwarding detection event: {}", keyword);
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

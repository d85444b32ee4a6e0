/// The body processors expect back when a delivery has been taken in.
pub const ACCEPTED: &str = "[accepted]";

/// Per-scope settings for a processor's listener route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    pub processor: String,
    /// The decoder registry entry to decode this processor's payloads with.
    pub decoder: String,
}

impl ListenerOptions {
    pub fn new<S: Into<String>>(processor: S, decoder: S) -> Self {
        Self { processor: processor.into(), decoder: decoder.into() }
    }
}

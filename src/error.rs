//! Termination reasons reported through [`Subscription::err`](crate::Subscription::err).

use std::sync::Arc;

/// Reason a subscription ended other than a plain unsubscribe.
///
/// Cloneable so that every waiter on `err()` observes the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Every handle to the owning feed was dropped.
    #[error("feed dropped while subscription was active")]
    FeedDropped,

    /// The consumer dropped its receiving end of the channel.
    #[error("subscriber channel receiver was dropped")]
    ReceiverDropped,

    /// A producer subscription failed.
    #[error("producer failed: {0}")]
    Producer(Arc<anyhow::Error>),
}

impl Error {
    /// Short label used for metric attributes.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::FeedDropped => "feed_dropped",
            Self::ReceiverDropped => "receiver_dropped",
            Self::Producer(_) => "producer",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Producer(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_display() {
        let err = Error::from(anyhow::anyhow!("socket reset"));
        assert_eq!(err.to_string(), "producer failed: socket reset");
        assert_eq!(err.kind(), "producer");
    }
}

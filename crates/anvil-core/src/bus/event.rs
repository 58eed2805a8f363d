use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use uuid::Uuid;

/// A published event: a topic, an opaque payload and envelope metadata.
///
/// Cloning is cheap; the topic and payload are shared.
#[derive(Clone)]
pub struct Event {
    id: Uuid,
    topic: Arc<str>,
    payload: Arc<dyn Any + Send + Sync>,
    timestamp: SystemTime,
}

impl Event {
    pub fn new<P: Any + Send + Sync>(topic: impl Into<Arc<str>>, payload: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: Arc::new(payload),
            timestamp: SystemTime::now(),
        }
    }

    /// Unique id assigned at construction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the payload if it is a `P`.
    pub fn payload<P: Any>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }

    /// Returns a shared handle to the payload if it is a `P`.
    pub fn payload_arc<P: Any + Send + Sync>(&self) -> Option<Arc<P>> {
        Arc::clone(&self.payload).downcast::<P>().ok()
    }

    pub fn payload_is<P: Any>(&self) -> bool {
        self.payload.is::<P>()
    }

    /// Moves the event to `topic`, keeping its id and timestamp.
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Replaces the payload, keeping the id and timestamp.
    pub fn with_payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Arc::new(payload);
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accessors_agree() {
        let event = Event::new("user.created", String::from("ada"));

        assert!(event.payload_is::<String>());
        assert!(!event.payload_is::<u32>());
        assert_eq!(event.payload::<String>().map(String::as_str), Some("ada"));

        let shared = event.payload_arc::<String>().unwrap();
        assert_eq!(shared.as_str(), "ada");
        assert!(event.payload_arc::<u32>().is_none());
    }

    #[test]
    fn test_rewrites_keep_envelope() {
        let event = Event::new("draft", 1u8);
        let (id, stamp) = (event.id(), event.timestamp());

        let rewritten = event.with_topic("final").with_payload("done");

        assert_eq!(rewritten.id(), id);
        assert_eq!(rewritten.timestamp(), stamp);
        assert_eq!(rewritten.topic(), "final");
        assert!(rewritten.payload_is::<&str>());
        assert!(!rewritten.payload_is::<u8>());
    }
}

use crate::transcription::{TranscriptEvent, TranscriptionError, TranscriptionProvider};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};

/// Replays a fixed list of events, each delivered once its timestamp has elapsed since
/// the subscription was polled for the first time.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTranscription {
    events: Arc<Vec<TranscriptEvent>>,
}

impl ScriptedTranscription {
    pub fn new(mut events: Vec<TranscriptEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self {
            events: Arc::new(events),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TranscriptionProvider for ScriptedTranscription {
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(&self) -> Result<BoxStream<'static, TranscriptEvent>, TranscriptionError> {
        let events = Arc::clone(&self.events);
        let stream = stream::once(async { Instant::now() })
            .flat_map(move |origin| {
                let events = Arc::clone(&events);
                stream::iter(0..events.len()).then(move |i| {
                    let event = events[i].clone();
                    async move {
                        sleep_until(origin + event.timestamp).await;
                        event
                    }
                })
            })
            .boxed();
        Ok(stream)
    }
}

/// Recognizer that is never available, e.g. on platforms without speech support.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableTranscription;

impl TranscriptionProvider for UnavailableTranscription {
    fn is_available(&self) -> bool {
        false
    }

    fn subscribe(&self) -> Result<BoxStream<'static, TranscriptEvent>, TranscriptionError> {
        Err(TranscriptionError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn script() -> ScriptedTranscription {
        ScriptedTranscription::new(vec![
            TranscriptEvent::final_text("second", Duration::from_secs(4)),
            TranscriptEvent::final_text("first", Duration::from_secs(1)),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_events_in_time_order() {
        let provider = script();
        let start = Instant::now();
        let events: Vec<_> = provider.subscribe().expect("available").collect().await;
        let texts: Vec<_> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn each_subscription_restarts() {
        let provider = script();
        let a: Vec<_> = provider.subscribe().expect("available").collect().await;
        let b: Vec<_> = provider.subscribe().expect("available").collect().await;
        assert_eq!(a, b);
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn unavailable_provider_refuses_subscription() {
        let provider = UnavailableTranscription;
        assert!(!provider.is_available());
        assert!(matches!(
            provider.subscribe(),
            Err(TranscriptionError::Unavailable)
        ));
    }
}

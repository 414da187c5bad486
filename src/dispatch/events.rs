//! Fire-and-forget dispatch observability events.
//!
//! The dispatcher and runner push structured events into an optional
//! unbounded channel. Emission is synchronous and never awaited; a closed
//! or absent receiver is silently ignored so observability can never block
//! or fail a fetch.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::fetcher::runner::FetchState;
use crate::models::Domain;

/// One structured observability event.
#[derive(Clone, Debug)]
pub enum DispatchEvent {
    AttemptStarted {
        provider: &'static str,
        domain: Domain,
    },
    AttemptRetried {
        provider: &'static str,
        attempt: u32,
        delay: Duration,
    },
    AttemptFailed {
        provider: &'static str,
        domain: Domain,
        /// The lifecycle state the attempt failed from.
        state: FetchState,
        message: String,
    },
    AttemptSucceeded {
        provider: &'static str,
        domain: Domain,
        records: usize,
    },
}

/// Optional sink for [`DispatchEvent`]s.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<DispatchEvent>>,
}

impl EventSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(sender: UnboundedSender<DispatchEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Emit one event. Never blocks, never fails.
    pub fn emit(&self, event: DispatchEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sink_swallows_events() {
        let sink = EventSink::disabled();
        sink.emit(DispatchEvent::AttemptStarted {
            provider: "TEST",
            domain: Domain::EquityHistorical,
        });
    }

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.emit(DispatchEvent::AttemptStarted {
            provider: "TEST",
            domain: Domain::EquityHistorical,
        });
        sink.emit(DispatchEvent::AttemptSucceeded {
            provider: "TEST",
            domain: Domain::EquityHistorical,
            records: 2,
        });
        assert!(matches!(
            rx.recv().await.unwrap(),
            DispatchEvent::AttemptStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            DispatchEvent::AttemptSucceeded { records: 2, .. }
        ));
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(tx);
        sink.emit(DispatchEvent::AttemptStarted {
            provider: "TEST",
            domain: Domain::OptionsChain,
        });
    }
}

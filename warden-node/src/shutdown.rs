//! Shutdown signalling for the node process.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use warden_core::{SessionEvent, SessionListener};

/// Why the node stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    SessionDisconnected,
    SessionExpired,
    SessionClosed,
    /// The election error policy escalated a failed round
    ElectionEscalated(String),
    /// Every signal handle was dropped while waiting
    SignalDropped,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::SessionDisconnected => write!(f, "session disconnected"),
            ShutdownReason::SessionExpired => write!(f, "session expired"),
            ShutdownReason::SessionClosed => write!(f, "session closed"),
            ShutdownReason::ElectionEscalated(reason) => {
                write!(f, "election escalated: {}", reason)
            }
            ShutdownReason::SignalDropped => write!(f, "shutdown signal dropped"),
        }
    }
}

/// One-time shutdown trigger shared by everything that may stop the node.
///
/// The first reason wins; later triggers are ignored.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger shutdown. Returns false when it was already triggered.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let triggered = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if triggered {
            info!("Shutdown triggered: {}", reason);
        } else {
            debug!("Shutdown already triggered, ignoring {}", reason);
        }
        triggered
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Create a waiter for this signal
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a [`ShutdownSignal`] without keeping it alive.
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownListener {
    /// Resolve once the signal is triggered, or when every signal handle is
    /// gone.
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            let current = self.receiver.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.receiver.changed().await.is_err() {
                return ShutdownReason::SignalDropped;
            }
        }
    }
}

/// Session listener completing the shutdown signal once the session is lost.
pub struct SessionWatch {
    shutdown: ShutdownSignal,
}

impl SessionWatch {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl SessionListener for SessionWatch {
    async fn on_session_event(&self, event: SessionEvent) {
        let reason = match event {
            SessionEvent::Connected => {
                info!("Successfully connected to the coordination store");
                return;
            }
            SessionEvent::Disconnected => ShutdownReason::SessionDisconnected,
            SessionEvent::Expired => ShutdownReason::SessionExpired,
            SessionEvent::Closed => ShutdownReason::SessionClosed,
        };
        info!("Lost coordination session: {}", event);
        self.shutdown.trigger(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();

        let handle = tokio::spawn(async move { listener.wait().await });

        assert!(signal.trigger(ShutdownReason::SessionExpired));
        assert!(!signal.trigger(ShutdownReason::SessionClosed));
        assert!(signal.is_triggered());

        assert_eq!(handle.await.unwrap(), ShutdownReason::SessionExpired);
    }

    #[tokio::test]
    async fn test_dropped_signal_ends_wait() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        drop(signal);

        assert_eq!(listener.wait().await, ShutdownReason::SignalDropped);
    }

    #[tokio::test]
    async fn test_session_watch_ignores_connect() {
        let signal = ShutdownSignal::new();
        let watch = SessionWatch::new(signal.clone());

        watch.on_session_event(SessionEvent::Connected).await;
        assert!(!signal.is_triggered());

        watch.on_session_event(SessionEvent::Disconnected).await;
        assert_eq!(
            signal.subscribe().wait().await,
            ShutdownReason::SessionDisconnected
        );
    }
}

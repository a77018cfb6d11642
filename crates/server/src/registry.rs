//! Call session registry
//!
//! One addressable session per call id, shared by the webhook phase and
//! the media-stream phase — which may run on different connections and
//! arrive in either order. A small key-value handoff store carries
//! webhook-phase state (caller lookup) into the media phase; readers
//! treat a missing entry as normal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

use voice_gateway_pipeline::VoiceSessionOrchestrator;
use voice_gateway_transport::TelephonyBridge;

use crate::ServerError;

/// One live telephony call
pub struct CallSession {
    pub call_sid: String,
    pub orchestrator: Arc<VoiceSessionOrchestrator>,
    pub bridge: Arc<TelephonyBridge>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl CallSession {
    pub fn new(
        call_sid: impl Into<String>,
        orchestrator: Arc<VoiceSessionOrchestrator>,
        bridge: Arc<TelephonyBridge>,
    ) -> Self {
        Self {
            call_sid: call_sid.into(),
            orchestrator,
            bridge,
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Check if the call has gone idle past the timeout
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }
}

/// Registry of live calls keyed by call id
pub struct CallRegistry {
    calls: RwLock<HashMap<String, Arc<CallSession>>>,
    handoff: RwLock<HashMap<String, serde_json::Value>>,
    max_calls: usize,
    call_timeout: Duration,
    cleanup_interval: Duration,
}

impl CallRegistry {
    pub fn new(max_calls: usize, call_timeout: Duration) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            handoff: RwLock::new(HashMap::new()),
            max_calls,
            call_timeout,
            cleanup_interval: Duration::from_secs(60),
        }
    }

    /// Register a session, enforcing the capacity cap. At capacity,
    /// idle calls are expired first; the evicted sessions are not torn
    /// down here (the cleanup task owns that), only deregistered.
    pub fn insert(&self, session: Arc<CallSession>) -> Result<(), ServerError> {
        if self.count() >= self.max_calls && self.get(&session.call_sid).is_none() {
            let _ = self.cleanup_expired();
        }

        let mut calls = self.calls.write();
        if calls.len() >= self.max_calls && !calls.contains_key(&session.call_sid) {
            return Err(ServerError::Capacity);
        }

        tracing::info!(call = %session.call_sid, "call registered");
        calls.insert(session.call_sid.clone(), session);
        Ok(())
    }

    pub fn get(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        self.calls.read().get(call_sid).cloned()
    }

    /// Remove a session; the caller is responsible for teardown.
    pub fn remove(&self, call_sid: &str) -> Option<Arc<CallSession>> {
        let removed = self.calls.write().remove(call_sid);
        self.handoff.write().remove(call_sid);
        if removed.is_some() {
            tracing::info!(call = %call_sid, "call removed");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.calls.read().len()
    }

    /// Stash webhook-phase state for the media phase.
    pub fn put_handoff(&self, call_sid: &str, value: serde_json::Value) {
        self.handoff.write().insert(call_sid.to_string(), value);
    }

    /// Read webhook-phase state. May legitimately be absent: the media
    /// stream can land on an instance that never saw the webhook.
    pub fn take_handoff(&self, call_sid: &str) -> Option<serde_json::Value> {
        self.handoff.write().remove(call_sid)
    }

    /// Drop idle calls. Locks are taken one at a time, never nested.
    pub fn cleanup_expired(&self) -> Vec<Arc<CallSession>> {
        let timeout = self.call_timeout;
        let removed: Vec<Arc<CallSession>> = {
            let mut calls = self.calls.write();
            let expired: Vec<String> = calls
                .iter()
                .filter(|(_, session)| session.is_expired(timeout))
                .map(|(sid, _)| sid.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|sid| calls.remove(&sid))
                .collect()
        };

        if !removed.is_empty() {
            let mut handoff = self.handoff.write();
            for session in &removed {
                tracing::info!(call = %session.call_sid, "expired idle call");
                handoff.remove(&session.call_sid);
            }
        }
        removed
    }

    /// Background task that periodically expires idle calls and tears
    /// their sessions down. Returns a shutdown sender.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = registry.cleanup_expired();
                        for session in removed {
                            session.bridge.teardown().await;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("call cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use voice_gateway_core::InMemoryConversationLog;
    use voice_gateway_llm::ScriptedBackend;
    use voice_gateway_pipeline::testing::{CapturingTextToSpeech, InjectedSpeechToText};
    use voice_gateway_pipeline::OrchestratorConfig;

    fn session(call_sid: &str) -> Arc<CallSession> {
        let orchestrator = Arc::new(VoiceSessionOrchestrator::new(
            call_sid,
            OrchestratorConfig::default(),
            Arc::new(InjectedSpeechToText::new()),
            Arc::new(CapturingTextToSpeech::new()),
            Arc::new(ScriptedBackend::with_reply("ok.")),
            Arc::new(InMemoryConversationLog::new()),
        ));
        let bridge = Arc::new(TelephonyBridge::new(call_sid, "hi", orchestrator.clone()));
        Arc::new(CallSession::new(call_sid, orchestrator, bridge))
    }

    #[test]
    fn test_insert_get_remove() {
        let registry = CallRegistry::new(10, Duration::from_secs(60));
        registry.insert(session("CA1")).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(registry.get("CA1").is_some());
        assert!(registry.remove("CA1").is_some());
        assert!(registry.get("CA1").is_none());
        assert!(registry.remove("CA1").is_none());
    }

    #[test]
    fn test_capacity_cap() {
        let registry = CallRegistry::new(1, Duration::from_secs(60));
        registry.insert(session("CA1")).unwrap();

        assert!(matches!(
            registry.insert(session("CA2")),
            Err(ServerError::Capacity)
        ));
        // Re-registering the same call is not a capacity violation.
        assert!(registry.insert(session("CA1")).is_ok());
    }

    #[test]
    fn test_handoff_is_defensive() {
        let registry = CallRegistry::new(10, Duration::from_secs(60));

        // Missing entries are normal, not an error.
        assert!(registry.take_handoff("CA-unknown").is_none());

        registry.put_handoff("CA1", serde_json::json!({"from": "+15550100"}));
        let value = registry.take_handoff("CA1").unwrap();
        assert_eq!(value["from"], "+15550100");
        // Consumed on read.
        assert!(registry.take_handoff("CA1").is_none());
    }

    #[test]
    fn test_expiry() {
        let registry = CallRegistry::new(10, Duration::from_millis(0));
        registry.insert(session("CA1")).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        let removed = registry.cleanup_expired();
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.count(), 0);
    }
}

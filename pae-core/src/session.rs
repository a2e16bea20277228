use pae_net::MacAddr;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::state_machine::{Event, OutputQueues, StateMachine, StateMachineFactory};

struct SessionEntry {
    machine: Box<dyn StateMachine>,
    last_seen: Instant,
}

/// Owns one state machine per supplicant MAC address.
///
/// Machines are created on first contact, up to `max_clients`; past that the
/// least recently active one is evicted to make room.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<MacAddr, SessionEntry>>>,
    factory: Arc<dyn StateMachineFactory>,
    queues: OutputQueues,
    max_clients: usize,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn StateMachineFactory>,
        queues: OutputQueues,
        max_clients: usize,
    ) -> Self {
        SessionManager {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            factory,
            queues,
            max_clients: max_clients.max(1),
        }
    }

    fn create_if_missing(
        &self,
        sessions: &mut HashMap<MacAddr, SessionEntry>,
        mac: MacAddr,
    ) -> bool {
        if sessions.contains_key(&mac) {
            return false;
        }
        if sessions.len() >= self.max_clients {
            evict_oldest(sessions);
        }
        info!("New supplicant {}", mac);
        let mut machine = self.factory.create(mac, self.queues.clone());
        machine.set_restart_requested(true);
        machine.set_port_enabled(true);
        sessions.insert(
            mac,
            SessionEntry {
                machine,
                last_seen: Instant::now(),
            },
        );
        true
    }

    /// Makes sure a machine exists for `mac`. Returns true if one was created.
    pub async fn get_or_create(&self, mac: MacAddr) -> bool {
        let mut sessions = self.sessions.lock().await;
        self.create_if_missing(&mut sessions, mac)
    }

    /// Delivers `event` to the machine for `mac`, creating it if needed.
    pub async fn dispatch(&self, mac: MacAddr, event: Event) {
        let mut sessions = self.sessions.lock().await;
        self.create_if_missing(&mut sessions, mac);
        if let Some(entry) = sessions.get_mut(&mac) {
            entry.last_seen = Instant::now();
            entry.machine.event(event);
        }
    }

    /// Delivers `event` only if a machine for `mac` already exists.
    pub async fn dispatch_existing(&self, mac: MacAddr, event: Event) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&mac) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.machine.event(event);
                true
            }
            None => false,
        }
    }

    /// Drops machines that have seen no traffic for `max_idle`.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<MacAddr> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let idle: Vec<MacAddr> = sessions
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) >= max_idle)
            .map(|(mac, _)| *mac)
            .collect();
        for mac in &idle {
            debug!("Reaping idle supplicant {}", mac);
            sessions.remove(mac);
        }
        idle
    }

    pub async fn contains(&self, mac: &MacAddr) -> bool {
        self.sessions.lock().await.contains_key(mac)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn evict_oldest(sessions: &mut HashMap<MacAddr, SessionEntry>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, entry)| entry.last_seen)
        .map(|(mac, _)| *mac);
    if let Some(mac) = oldest {
        info!("Session table full, evicting {}", mac);
        sessions.remove(&mac);
    }
}

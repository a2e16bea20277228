//! Maps RADIUS packet identifiers back to the supplicant that caused them.

use pae_net::MacAddr;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::CoreError;

/// An Access-Request that has been sent and not yet answered.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub mac: MacAddr,
    /// Request Authenticator, needed to verify the reply.
    pub authenticator: [u8; 16],
    /// The serialized request, kept for retransmission.
    pub packet: Vec<u8>,
    pub sent_at: Instant,
    pub retries: u32,
}

/// Outcome of a retransmission sweep.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Requests due for another transmission, as `(id, packet)`.
    pub resend: Vec<(u8, Vec<u8>)>,
    /// Clients whose request ran out of retries.
    pub expired: Vec<MacAddr>,
}

/// Identifiers are handed out sequentially and wrap after 255, so at most 256
/// requests can be told apart. A 257th outstanding request overwrites the
/// oldest entry.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    next_id: u8,
    pending: HashMap<u8, PendingRequest>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_radius_id(&mut self) -> u8 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Stores `request` under `id`. Returns the request it displaced, whose
    /// client will never see an answer.
    pub fn record(&mut self, id: u8, request: PendingRequest) -> Option<PendingRequest> {
        let previous = self.pending.insert(id, request);
        if let Some(previous) = &previous {
            warn!(
                "RADIUS id {} reused while a request from {} was still outstanding",
                id, previous.mac
            );
        }
        previous
    }

    pub fn lookup_by_radius_id(&self, id: u8) -> Result<&PendingRequest, CoreError> {
        self.pending
            .get(&id)
            .ok_or(CoreError::UnknownCorrelation(id))
    }

    pub fn take(&mut self, id: u8) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Collects requests unanswered for `timeout`. Those with retries left are
    /// returned for resending and restamped; the rest are removed.
    pub fn sweep(&mut self, now: Instant, timeout: Duration, max_retries: u32) -> Sweep {
        let mut sweep = Sweep::default();
        let mut dead = Vec::new();
        for (id, request) in self.pending.iter_mut() {
            if now.saturating_duration_since(request.sent_at) < timeout {
                continue;
            }
            if request.retries < max_retries {
                request.retries += 1;
                request.sent_at = now;
                sweep.resend.push((*id, request.packet.clone()));
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            if let Some(request) = self.pending.remove(&id) {
                sweep.expired.push(request.mac);
            }
        }
        sweep
    }
}

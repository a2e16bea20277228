//! The interface between the orchestrator and per-client state machines.

use pae_net::radius::RadiusCode;
use pae_net::{MacAddr, Message};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Something that happened to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// An EAPOL frame arrived from the supplicant.
    MessageReceived(Message),
    /// The RADIUS server answered this client's last request.
    RadiusMessageReceived {
        code: RadiusCode,
        message: Option<Message>,
        state: Option<Vec<u8>>,
    },
    /// The last request went unanswered after every retransmission.
    RadiusTimeout,
}

/// A message for the supplicant, queued for the EAP egress loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapOutput {
    pub message: Message,
    pub src_mac: MacAddr,
}

/// A message for the RADIUS server, queued for the RADIUS egress loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusOutput {
    pub message: Message,
    pub src_mac: MacAddr,
    pub username: String,
    pub state: Option<Vec<u8>>,
}

/// Producer halves of the two outbound queues, shared by every client.
#[derive(Debug, Clone)]
pub struct OutputQueues {
    pub eap: UnboundedSender<EapOutput>,
    pub radius: UnboundedSender<RadiusOutput>,
}

impl OutputQueues {
    pub fn new() -> (
        Self,
        UnboundedReceiver<EapOutput>,
        UnboundedReceiver<RadiusOutput>,
    ) {
        let (eap_tx, eap_rx) = tokio::sync::mpsc::unbounded_channel();
        let (radius_tx, radius_rx) = tokio::sync::mpsc::unbounded_channel();
        (
            OutputQueues {
                eap: eap_tx,
                radius: radius_tx,
            },
            eap_rx,
            radius_rx,
        )
    }
}

/// Called with `(supplicant, group_address)` once a supplicant authenticates.
pub type AuthHandler = Arc<dyn Fn(MacAddr, MacAddr) + Send + Sync>;

pub trait StateMachine: Send {
    fn event(&mut self, event: Event);
    fn set_restart_requested(&mut self, restart: bool);
    fn set_port_enabled(&mut self, enabled: bool);
}

pub trait StateMachineFactory: Send + Sync {
    fn create(&self, mac: MacAddr, queues: OutputQueues) -> Box<dyn StateMachine>;
}

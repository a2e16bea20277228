//! A pass-through 802.1X authenticator state machine.
//!
//! The authenticator asks for the supplicant's identity, then relays the EAP
//! conversation to the RADIUS server one request at a time, and relays the
//! server's verdict back to the supplicant.

use pae_net::eap::EapCode;
use pae_net::radius::RadiusCode;
use pae_net::{MacAddr, Message};
use tracing::{debug, info, warn};

use crate::state_machine::{
    AuthHandler, EapOutput, Event, OutputQueues, RadiusOutput, StateMachine, StateMachineFactory,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapolState {
    Idle,
    IdentitySent,
    /// A request is outstanding at the RADIUS server.
    AwaitingRadius,
    ChallengeSent,
    Authenticated,
    Failed,
}

impl Default for EapolState {
    fn default() -> Self {
        EapolState::Idle
    }
}

pub struct EapolSession {
    /// The client's MAC address.
    pub mac_addr: MacAddr,
    /// The current state of the EAPOL conversation.
    pub state: EapolState,
    /// Identifier of the last EAP request sent to the supplicant.
    pub eap_identifier: u8,
    /// The RADIUS `State` attribute, echoed back on the next request.
    pub radius_state: Option<Vec<u8>>,
    /// The client's identity (username), once known.
    pub username: Option<String>,
    restart_requested: bool,
    port_enabled: bool,
    queues: OutputQueues,
    auth_handler: Option<AuthHandler>,
    group_address: MacAddr,
}

impl EapolSession {
    pub fn new(
        mac_addr: MacAddr,
        queues: OutputQueues,
        auth_handler: Option<AuthHandler>,
        group_address: MacAddr,
    ) -> Self {
        EapolSession {
            mac_addr,
            state: EapolState::Idle,
            eap_identifier: 0,
            radius_state: None,
            username: None,
            restart_requested: false,
            port_enabled: false,
            queues,
            auth_handler,
            group_address,
        }
    }

    fn send_to_supplicant(&self, message: Message) {
        let output = EapOutput {
            message,
            src_mac: self.mac_addr,
        };
        if self.queues.eap.send(output).is_err() {
            warn!("EAP output queue closed, dropping message for {}", self.mac_addr);
        }
    }

    fn send_to_radius(&mut self, message: Message, username: String) {
        let output = RadiusOutput {
            message,
            src_mac: self.mac_addr,
            username,
            state: self.radius_state.clone(),
        };
        if self.queues.radius.send(output).is_err() {
            warn!("RADIUS output queue closed, dropping message for {}", self.mac_addr);
            return;
        }
        self.state = EapolState::AwaitingRadius;
    }

    fn reset(&mut self) {
        self.state = EapolState::Idle;
        self.username = None;
        self.radius_state = None;
    }

    /// Starts a fresh conversation with an Identity request.
    fn restart(&mut self) {
        info!("(Re)starting authentication for {}", self.mac_addr);
        self.restart_requested = false;
        self.reset();
        self.eap_identifier = self.eap_identifier.wrapping_add(1);
        self.send_to_supplicant(Message::Identity {
            src_mac: self.mac_addr,
            message_id: self.eap_identifier,
            code: EapCode::Request,
            identity: String::new(),
        });
        self.state = EapolState::IdentitySent;
    }

    fn handle_supplicant_message(&mut self, message: Message) {
        let is_identity_response = matches!(
            message,
            Message::Identity {
                code: EapCode::Response,
                ..
            }
        );
        match message {
            Message::EapolStart { .. } => self.restart(),
            Message::EapolLogoff { .. } => {
                info!("Received EAPOL-Logoff from {}", self.mac_addr);
                self.reset();
            }
            _ if self.restart_requested && !is_identity_response => self.restart(),
            Message::Identity {
                code: EapCode::Response,
                message_id,
                ref identity,
                ..
            } => {
                let identity = identity.clone();
                self.handle_identity_response(message, message_id, identity);
            }
            Message::LegacyNak {
                code: EapCode::Response,
                ..
            }
            | Message::Md5Challenge {
                code: EapCode::Response,
                ..
            }
            | Message::Ttls {
                code: EapCode::Response,
                ..
            } => self.forward_response(message),
            other => {
                warn!("Ignoring unexpected {:?} from supplicant {}", other, self.mac_addr);
            }
        }
    }

    fn handle_identity_response(&mut self, message: Message, message_id: u8, identity: String) {
        match self.state {
            EapolState::AwaitingRadius => {
                warn!(
                    "Ignoring identity from {} while a RADIUS request is outstanding",
                    self.mac_addr
                );
                return;
            }
            EapolState::IdentitySent if message_id != self.eap_identifier => {
                warn!(
                    "Identity response id {} from {} does not match request id {}",
                    message_id, self.mac_addr, self.eap_identifier
                );
                return;
            }
            _ => {}
        }
        info!("Received EAP-Response/Identity for user: {}", identity);
        self.restart_requested = false;
        self.eap_identifier = message_id;
        self.radius_state = None;
        self.username = Some(identity.clone());
        self.send_to_radius(message, identity);
    }

    fn forward_response(&mut self, message: Message) {
        if self.state != EapolState::ChallengeSent {
            warn!(
                "Ignoring EAP response from {} in state {:?}",
                self.mac_addr, self.state
            );
            return;
        }
        if message.message_id() != Some(self.eap_identifier) {
            warn!(
                "EAP response id {:?} from {} does not match request id {}",
                message.message_id(),
                self.mac_addr,
                self.eap_identifier
            );
            return;
        }
        match self.username.clone() {
            Some(username) => self.send_to_radius(message, username),
            None => warn!("No identity known for {}, dropping response", self.mac_addr),
        }
    }

    fn handle_radius_reply(
        &mut self,
        code: RadiusCode,
        message: Option<Message>,
        state: Option<Vec<u8>>,
    ) {
        if self.state != EapolState::AwaitingRadius {
            warn!(
                "Unexpected RADIUS {:?} for {} in state {:?}",
                code, self.mac_addr, self.state
            );
            return;
        }
        self.radius_state = state;

        match code {
            RadiusCode::AccessChallenge => match message {
                Some(message) => {
                    if let Some(id) = message.message_id() {
                        self.eap_identifier = id;
                    }
                    self.send_to_supplicant(message);
                    self.state = EapolState::ChallengeSent;
                }
                None => {
                    warn!("Access-Challenge for {} without EAP-Message", self.mac_addr);
                    self.fail();
                }
            },
            RadiusCode::AccessAccept => {
                info!("EAP authentication successful for {}", self.mac_addr);
                let message = message.unwrap_or(Message::Success {
                    src_mac: self.mac_addr,
                    message_id: self.eap_identifier,
                });
                self.send_to_supplicant(message);
                self.state = EapolState::Authenticated;
                self.radius_state = None;
                if let Some(handler) = &self.auth_handler {
                    handler(self.mac_addr, self.group_address);
                }
            }
            RadiusCode::AccessReject => {
                warn!("EAP authentication failed for {}", self.mac_addr);
                match message {
                    Some(message) => {
                        self.send_to_supplicant(message);
                        self.state = EapolState::Failed;
                        self.radius_state = None;
                    }
                    None => self.fail(),
                }
            }
            other => {
                warn!("Unhandled RADIUS code {:?} for {}", other, self.mac_addr);
                self.fail();
            }
        }
    }

    fn fail(&mut self) {
        self.send_to_supplicant(Message::Failure {
            src_mac: self.mac_addr,
            message_id: self.eap_identifier,
        });
        self.state = EapolState::Failed;
        self.radius_state = None;
    }
}

impl StateMachine for EapolSession {
    fn event(&mut self, event: Event) {
        if !self.port_enabled {
            debug!("Port disabled for {}, ignoring {:?}", self.mac_addr, event);
            return;
        }
        match event {
            Event::MessageReceived(message) => self.handle_supplicant_message(message),
            Event::RadiusMessageReceived {
                code,
                message,
                state,
            } => self.handle_radius_reply(code, message, state),
            Event::RadiusTimeout => {
                if self.state == EapolState::AwaitingRadius {
                    warn!("RADIUS server did not answer for {}", self.mac_addr);
                    self.fail();
                }
            }
        }
    }

    fn set_restart_requested(&mut self, restart: bool) {
        self.restart_requested = restart;
    }

    fn set_port_enabled(&mut self, enabled: bool) {
        self.port_enabled = enabled;
    }
}

/// Creates an [`EapolSession`] for every new supplicant.
pub struct EapolSessionFactory {
    pub auth_handler: Option<AuthHandler>,
    pub group_address: MacAddr,
}

impl StateMachineFactory for EapolSessionFactory {
    fn create(&self, mac: MacAddr, queues: OutputQueues) -> Box<dyn StateMachine> {
        Box::new(EapolSession::new(
            mac,
            queues,
            self.auth_handler.clone(),
            self.group_address,
        ))
    }
}

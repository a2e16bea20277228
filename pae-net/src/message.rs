//! Translation between wire frames and link-independent protocol messages.
//!
//! Inbound, an Ethernet frame is unwrapped through 802.1X and EAP into a
//! [`Message`]. Outbound, a [`Message`] is wrapped back into an Ethernet frame
//! for the supplicant, or into a RADIUS Access-Request for the server.

use pnet_base::MacAddr;

use crate::eap::{EapCode, EapPacket};
use crate::eapol::{EapolPacket, EapolType};
use crate::error::{CodecError, Result};
use crate::ethernet::{EthernetFrame, ETH_P_PAE};
use crate::radius::{
    eap_message_attributes, AccessRequest, RadiusAttribute, RadiusAttributeType,
    RadiusAttributes, RADIUS_AUTH_LEN,
};

pub const CALLED_STATION_ID: &str = "44-44-44-44-44-44:";
/// Wireless - IEEE 802.11
pub const NAS_PORT_TYPE: u32 = 19;
/// Framed
pub const SERVICE_TYPE: u32 = 2;
pub const FRAMED_MTU: u32 = 1400;

/// A decoded EAPOL frame, as seen by the per-client state machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Identity {
        src_mac: MacAddr,
        message_id: u8,
        code: EapCode,
        identity: String,
    },
    LegacyNak {
        src_mac: MacAddr,
        message_id: u8,
        code: EapCode,
        desired_auth_types: Vec<u8>,
    },
    Md5Challenge {
        src_mac: MacAddr,
        message_id: u8,
        code: EapCode,
        challenge: Vec<u8>,
        extra_data: Vec<u8>,
    },
    Ttls {
        src_mac: MacAddr,
        message_id: u8,
        code: EapCode,
        flags: u8,
        extra_data: Vec<u8>,
    },
    Success {
        src_mac: MacAddr,
        message_id: u8,
    },
    Failure {
        src_mac: MacAddr,
        message_id: u8,
    },
    EapolStart {
        src_mac: MacAddr,
    },
    EapolLogoff {
        src_mac: MacAddr,
    },
}

impl Message {
    pub fn from_eap(src_mac: MacAddr, eap: EapPacket) -> Self {
        match eap {
            EapPacket::Identity {
                code,
                packet_id,
                identity,
            } => Message::Identity {
                src_mac,
                message_id: packet_id,
                code,
                identity,
            },
            EapPacket::LegacyNak {
                code,
                packet_id,
                desired_auth_types,
            } => Message::LegacyNak {
                src_mac,
                message_id: packet_id,
                code,
                desired_auth_types,
            },
            EapPacket::Md5Challenge {
                code,
                packet_id,
                challenge,
                extra_data,
            } => Message::Md5Challenge {
                src_mac,
                message_id: packet_id,
                code,
                challenge,
                extra_data,
            },
            EapPacket::Ttls {
                code,
                packet_id,
                flags,
                extra_data,
            } => Message::Ttls {
                src_mac,
                message_id: packet_id,
                code,
                flags,
                extra_data,
            },
            EapPacket::Success { packet_id } => Message::Success {
                src_mac,
                message_id: packet_id,
            },
            EapPacket::Failure { packet_id } => Message::Failure {
                src_mac,
                message_id: packet_id,
            },
        }
    }

    /// The EAP packet this message carries; `None` for EAPOL-Start and Logoff.
    pub fn to_eap(&self) -> Option<EapPacket> {
        let eap = match self {
            Message::Identity {
                message_id,
                code,
                identity,
                ..
            } => EapPacket::Identity {
                code: *code,
                packet_id: *message_id,
                identity: identity.clone(),
            },
            Message::LegacyNak {
                message_id,
                code,
                desired_auth_types,
                ..
            } => EapPacket::LegacyNak {
                code: *code,
                packet_id: *message_id,
                desired_auth_types: desired_auth_types.clone(),
            },
            Message::Md5Challenge {
                message_id,
                code,
                challenge,
                extra_data,
                ..
            } => EapPacket::Md5Challenge {
                code: *code,
                packet_id: *message_id,
                challenge: challenge.clone(),
                extra_data: extra_data.clone(),
            },
            Message::Ttls {
                message_id,
                code,
                flags,
                extra_data,
                ..
            } => EapPacket::Ttls {
                code: *code,
                packet_id: *message_id,
                flags: *flags,
                extra_data: extra_data.clone(),
            },
            Message::Success { message_id, .. } => EapPacket::Success {
                packet_id: *message_id,
            },
            Message::Failure { message_id, .. } => EapPacket::Failure {
                packet_id: *message_id,
            },
            Message::EapolStart { .. } | Message::EapolLogoff { .. } => return None,
        };
        Some(eap)
    }

    pub fn src_mac(&self) -> MacAddr {
        match self {
            Message::Identity { src_mac, .. }
            | Message::LegacyNak { src_mac, .. }
            | Message::Md5Challenge { src_mac, .. }
            | Message::Ttls { src_mac, .. }
            | Message::Success { src_mac, .. }
            | Message::Failure { src_mac, .. }
            | Message::EapolStart { src_mac }
            | Message::EapolLogoff { src_mac } => *src_mac,
        }
    }

    /// EAP identifier, if the message carries an EAP packet.
    pub fn message_id(&self) -> Option<u8> {
        self.to_eap().map(|eap| eap.packet_id())
    }

    pub fn eapol_type(&self) -> EapolType {
        match self {
            Message::EapolStart { .. } => EapolType::Start,
            Message::EapolLogoff { .. } => EapolType::Logoff,
            _ => EapolType::Eap,
        }
    }
}

/// Decodes an 802.1X frame body sent by `src_mac`.
pub fn eapol_to_event(data: &[u8], src_mac: MacAddr) -> Result<Message> {
    let eapol = EapolPacket::from_bytes(data)?;
    match eapol.eapol_type() {
        Some(EapolType::Eap) => eap_to_event(&eapol.payload, src_mac),
        Some(EapolType::Start) => Ok(Message::EapolStart { src_mac }),
        Some(EapolType::Logoff) => Ok(Message::EapolLogoff { src_mac }),
        None => Err(CodecError::UnknownAuth8021xType(eapol.packet_type)),
    }
}

/// Decodes a bare EAP packet, as found in a RADIUS EAP-Message, on behalf of
/// `src_mac`.
pub fn eap_to_event(data: &[u8], src_mac: MacAddr) -> Result<Message> {
    let eap = EapPacket::from_bytes(data)?;
    Ok(Message::from_eap(src_mac, eap))
}

pub fn ethernet_to_event(data: &[u8]) -> Result<Message> {
    let frame = EthernetFrame::from_bytes(data)?;
    if frame.ethertype != ETH_P_PAE {
        return Err(CodecError::UnexpectedEtherType(frame.ethertype));
    }
    eapol_to_event(&frame.payload, frame.src)
}

/// Frames `message` as EAPOL version 1 inside an Ethernet frame.
pub fn event_to_ethernet(message: &Message, src_mac: MacAddr, dst_mac: MacAddr) -> Result<Vec<u8>> {
    let payload = match message.to_eap() {
        Some(eap) => eap.to_bytes()?,
        None => Vec::new(),
    };
    let eapol = EapolPacket::new(message.eapol_type(), payload);
    let frame = EthernetFrame {
        dst: dst_mac,
        src: src_mac,
        ethertype: ETH_P_PAE,
        payload: eapol.to_bytes()?,
    };
    Ok(frame.to_bytes())
}

/// Assembles the Access-Request for `message` without serializing it.
///
/// Attribute order is User-Name, Called-Station-Id, NAS-Port-Type,
/// Service-Type, Calling-Station-Id, Framed-MTU, EAP-Message, State (when
/// echoing a challenge), Message-Authenticator.
pub fn build_access_request(
    message: &Message,
    src_mac: MacAddr,
    username: &str,
    radius_packet_id: u8,
    state: Option<&[u8]>,
) -> Result<AccessRequest> {
    let eap = message.to_eap().ok_or(CodecError::NoEapPayload)?.to_bytes()?;

    let mut attributes = RadiusAttributes::new();
    attributes.push(RadiusAttribute::new(RadiusAttributeType::UserName, username));
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::CalledStationId,
        CALLED_STATION_ID,
    ));
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::NasPortType,
        NAS_PORT_TYPE.to_be_bytes().to_vec(),
    ));
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::ServiceType,
        SERVICE_TYPE.to_be_bytes().to_vec(),
    ));
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::CallingStationId,
        src_mac.to_string(),
    ));
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::FramedMtu,
        FRAMED_MTU.to_be_bytes().to_vec(),
    ));
    for attribute in eap_message_attributes(&eap) {
        attributes.push(attribute);
    }
    if let Some(state) = state {
        attributes.push(RadiusAttribute::new(RadiusAttributeType::State, state));
    }
    attributes.push(RadiusAttribute::new(
        RadiusAttributeType::MessageAuthenticator,
        vec![0u8; RADIUS_AUTH_LEN],
    ));

    AccessRequest::new(radius_packet_id, attributes)
}

pub fn event_to_radius_request(
    message: &Message,
    src_mac: MacAddr,
    username: &str,
    radius_packet_id: u8,
    state: Option<&[u8]>,
    secret: &str,
) -> Result<Vec<u8>> {
    build_access_request(message, src_mac, username, radius_packet_id, state)?.build(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethernet::PAE_GROUP_ADDRESS;
    use crate::radius::{RadiusCode, RadiusPacket};

    fn supplicant() -> MacAddr {
        MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)
    }

    #[test]
    fn test_eapol_start_frame() {
        let frame = [
            0x01, 0x80, 0xc2, 0x00, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x88, 0x8e,
            0x01, 0x01, 0x00, 0x00,
        ];
        assert_eq!(
            ethernet_to_event(&frame).unwrap(),
            Message::EapolStart {
                src_mac: supplicant()
            }
        );
    }

    #[test]
    fn test_identity_response_roundtrip() {
        let message = Message::Identity {
            src_mac: supplicant(),
            message_id: 5,
            code: EapCode::Response,
            identity: "alice".to_string(),
        };
        let frame = event_to_ethernet(&message, supplicant(), PAE_GROUP_ADDRESS).unwrap();
        assert_eq!(ethernet_to_event(&frame).unwrap(), message);
    }

    #[test]
    fn test_every_message_roundtrips_through_ethernet() {
        let mac = supplicant();
        let messages = vec![
            Message::LegacyNak {
                src_mac: mac,
                message_id: 2,
                code: EapCode::Response,
                desired_auth_types: vec![4],
            },
            Message::Md5Challenge {
                src_mac: mac,
                message_id: 3,
                code: EapCode::Request,
                challenge: vec![0; 16],
                extra_data: vec![],
            },
            Message::Ttls {
                src_mac: mac,
                message_id: 4,
                code: EapCode::Request,
                flags: 0x20,
                extra_data: vec![],
            },
            Message::Success {
                src_mac: mac,
                message_id: 5,
            },
            Message::Failure {
                src_mac: mac,
                message_id: 6,
            },
            Message::EapolStart { src_mac: mac },
            Message::EapolLogoff { src_mac: mac },
        ];
        for message in messages {
            let frame = event_to_ethernet(&message, mac, PAE_GROUP_ADDRESS).unwrap();
            assert_eq!(ethernet_to_event(&frame).unwrap(), message);
        }
    }

    #[test]
    fn test_outbound_frame_addressing() {
        let our_mac = MacAddr::new(0x02, 0x42, 0x7b, 0x79, 0x87, 0x7c);
        let message = Message::EapolLogoff {
            src_mac: supplicant(),
        };
        let frame = event_to_ethernet(&message, our_mac, PAE_GROUP_ADDRESS).unwrap();
        assert_eq!(
            frame,
            vec![
                0x01, 0x80, 0xc2, 0x00, 0x00, 0x03, 0x02, 0x42, 0x7b, 0x79, 0x87, 0x7c, 0x88,
                0x8e, 0x01, 0x02, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_wrong_ethertype_is_rejected() {
        let mut frame = [0u8; 18];
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert_eq!(
            ethernet_to_event(&frame),
            Err(CodecError::UnexpectedEtherType(0x0800))
        );
    }

    #[test]
    fn test_unknown_8021x_type_is_rejected() {
        let frame = [
            0x01, 0x80, 0xc2, 0x00, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x88, 0x8e,
            0x02, 0x03, 0x00, 0x00,
        ];
        assert_eq!(
            ethernet_to_event(&frame),
            Err(CodecError::UnknownAuth8021xType(3))
        );
    }

    #[test]
    fn test_access_request_attributes_without_state() {
        let src_mac = MacAddr::new(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);
        let message = Message::Identity {
            src_mac,
            message_id: 1,
            code: EapCode::Response,
            identity: "alice".to_string(),
        };
        let bytes = event_to_radius_request(&message, src_mac, "alice", 7, None, "SECRET").unwrap();
        let packet = RadiusPacket::parse(&bytes).unwrap();
        assert_eq!(packet.radius_code(), Some(RadiusCode::AccessRequest));
        assert_eq!(packet.id, 7);

        let types: Vec<u8> = packet.attributes.iter().map(|a| a.attr_type).collect();
        assert_eq!(
            types,
            vec![
                RadiusAttributeType::UserName as u8,
                RadiusAttributeType::CalledStationId as u8,
                RadiusAttributeType::NasPortType as u8,
                RadiusAttributeType::ServiceType as u8,
                RadiusAttributeType::CallingStationId as u8,
                RadiusAttributeType::FramedMtu as u8,
                RadiusAttributeType::EapMessage as u8,
                RadiusAttributeType::MessageAuthenticator as u8,
            ]
        );
        assert_eq!(packet.attributes.state(), None);
        assert_eq!(
            packet.attributes.find(RadiusAttributeType::CallingStationId),
            Some(&b"00:11:22:33:44:55"[..])
        );
        assert_eq!(
            packet.attributes.eap_message().unwrap(),
            message.to_eap().unwrap().to_bytes().unwrap()
        );
    }

    #[test]
    fn test_access_request_echoes_state_before_message_authenticator() {
        let message = Message::Md5Challenge {
            src_mac: supplicant(),
            message_id: 2,
            code: EapCode::Response,
            challenge: vec![0x42; 16],
            extra_data: vec![],
        };
        let request =
            build_access_request(&message, supplicant(), "alice", 8, Some(&[9, 9, 9])).unwrap();
        let attributes = &request.attributes.0;
        let n = attributes.len();
        assert!(attributes[n - 2].is(RadiusAttributeType::State));
        assert_eq!(attributes[n - 2].value, vec![9, 9, 9]);
        assert!(attributes[n - 1].is(RadiusAttributeType::MessageAuthenticator));
    }

    #[test]
    fn test_start_cannot_go_to_radius() {
        let message = Message::EapolStart {
            src_mac: supplicant(),
        };
        assert_eq!(
            event_to_radius_request(&message, supplicant(), "alice", 1, None, "SECRET"),
            Err(CodecError::NoEapPayload)
        );
    }
}

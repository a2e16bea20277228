// EAPOL Packet Definitions
// Based on IEEE 802.1X

use crate::error::{CodecError, Result};

pub const EAPOL_HDR_LEN: usize = 4;
pub const EAPOL_VERSION: u8 = 1;

// EAPOL Packet Type
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapolType {
    Eap = 0,
    Start = 1,
    Logoff = 2,
}

impl EapolType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EapolType::Eap),
            1 => Some(EapolType::Start),
            2 => Some(EapolType::Logoff),
            _ => None,
        }
    }
}

/// An 802.1X frame. `packet_type` is kept raw so that frames of types this
/// authenticator does not handle can still be framed and reported.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct EapolPacket {
    pub version: u8,
    pub packet_type: u8,
    pub payload: Vec<u8>,
}

impl EapolPacket {
    pub fn new(packet_type: EapolType, payload: Vec<u8>) -> Self {
        EapolPacket {
            version: EAPOL_VERSION,
            packet_type: packet_type as u8,
            payload,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < EAPOL_HDR_LEN {
            return Err(CodecError::Truncated {
                layer: "802.1X header",
                expected: EAPOL_HDR_LEN,
                actual: data.len(),
            });
        }
        let version = data[0];
        let packet_type = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        // Anything past the body length is Ethernet padding.
        let payload = data
            .get(EAPOL_HDR_LEN..EAPOL_HDR_LEN + length)
            .ok_or(CodecError::Truncated {
                layer: "802.1X body",
                expected: EAPOL_HDR_LEN + length,
                actual: data.len(),
            })?;

        Ok(EapolPacket {
            version,
            packet_type,
            payload: payload.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let length = u16::try_from(self.payload.len()).map_err(|_| CodecError::Oversize {
            field: "802.1X body",
            len: self.payload.len(),
        })?;
        let mut bytes = Vec::with_capacity(EAPOL_HDR_LEN + self.payload.len());
        bytes.push(self.version);
        bytes.push(self.packet_type);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    pub fn eapol_type(&self) -> Option<EapolType> {
        EapolType::from_u8(self.packet_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_frame() {
        let packet = EapolPacket::new(EapolType::Start, vec![]);
        let bytes = packet.to_bytes().unwrap();
        assert_eq!(bytes, vec![0x01, 0x01, 0x00, 0x00]);
        assert_eq!(EapolPacket::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_padding_is_ignored() {
        // Identity request as captured on the wire, padded to the Ethernet minimum.
        let mut data = vec![0x01, 0x00, 0x00, 0x05, 0x01, 0x01, 0x00, 0x05, 0x01];
        data.extend_from_slice(&[0u8; 37]);
        let packet = EapolPacket::from_bytes(&data).unwrap();
        assert_eq!(packet.eapol_type(), Some(EapolType::Eap));
        assert_eq!(packet.payload, vec![0x01, 0x01, 0x00, 0x05, 0x01]);
    }

    #[test]
    fn test_truncated_frames() {
        for len in 0..EAPOL_HDR_LEN {
            assert!(EapolPacket::from_bytes(&[0x01, 0x00, 0x00, 0x00][..len]).is_err());
        }
        let err = EapolPacket::from_bytes(&[0x01, 0x00, 0x00, 0x05, 0x01, 0x01]).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_unknown_type_still_frames() {
        let packet = EapolPacket::from_bytes(&[0x02, 0x03, 0x00, 0x01, 0xff]).unwrap();
        assert_eq!(packet.version, 2);
        assert_eq!(packet.eapol_type(), None);
        assert_eq!(packet.to_bytes().unwrap(), vec![0x02, 0x03, 0x00, 0x01, 0xff]);
    }
}

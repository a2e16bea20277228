//! EAP packet codec (RFC 3748).
//!
//! ```text
//! code(1) | identifier(1) | length(2, big-endian) | [type(1)] | body
//! ```
//!
//! The type byte is only present for Request and Response packets. The
//! declared length covers the header, the type byte and the body; bytes past
//! it belong to whatever carried the packet and are never read.

use crate::error::{CodecError, Result};

pub const EAP_HDR_LEN: usize = 4;
pub const EAP_TYPE_LEN: usize = 1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapType {
    Identity = 1,
    LegacyNak = 3, // Response only
    Md5Challenge = 4,
    Ttls = 21,
}

impl EapType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            3 => Some(EapType::LegacyNak),
            4 => Some(EapType::Md5Challenge),
            21 => Some(EapType::Ttls),
            _ => None,
        }
    }
}

/// A decoded EAP packet. The typed variants only occur with the Request and
/// Response codes.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EapPacket {
    Identity {
        code: EapCode,
        packet_id: u8,
        identity: String,
    },
    LegacyNak {
        code: EapCode,
        packet_id: u8,
        desired_auth_types: Vec<u8>,
    },
    Md5Challenge {
        code: EapCode,
        packet_id: u8,
        challenge: Vec<u8>,
        /// Trailing bytes after the challenge value (usually the name field).
        extra_data: Vec<u8>,
    },
    Ttls {
        code: EapCode,
        packet_id: u8,
        flags: u8,
        extra_data: Vec<u8>,
    },
    Success {
        packet_id: u8,
    },
    Failure {
        packet_id: u8,
    },
}

impl EapPacket {
    pub fn code(&self) -> EapCode {
        match self {
            EapPacket::Identity { code, .. }
            | EapPacket::LegacyNak { code, .. }
            | EapPacket::Md5Challenge { code, .. }
            | EapPacket::Ttls { code, .. } => *code,
            EapPacket::Success { .. } => EapCode::Success,
            EapPacket::Failure { .. } => EapCode::Failure,
        }
    }

    pub fn packet_id(&self) -> u8 {
        match self {
            EapPacket::Identity { packet_id, .. }
            | EapPacket::LegacyNak { packet_id, .. }
            | EapPacket::Md5Challenge { packet_id, .. }
            | EapPacket::Ttls { packet_id, .. }
            | EapPacket::Success { packet_id }
            | EapPacket::Failure { packet_id } => *packet_id,
        }
    }

    pub fn eap_type(&self) -> Option<EapType> {
        match self {
            EapPacket::Identity { .. } => Some(EapType::Identity),
            EapPacket::LegacyNak { .. } => Some(EapType::LegacyNak),
            EapPacket::Md5Challenge { .. } => Some(EapType::Md5Challenge),
            EapPacket::Ttls { .. } => Some(EapType::Ttls),
            EapPacket::Success { .. } | EapPacket::Failure { .. } => None,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < EAP_HDR_LEN {
            return Err(CodecError::Truncated {
                layer: "EAP header",
                expected: EAP_HDR_LEN,
                actual: data.len(),
            });
        }
        let code_byte = data[0];
        let packet_id = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        let code = EapCode::from_u8(code_byte).ok_or(CodecError::MalformedEapHeader(code_byte))?;
        match code {
            EapCode::Success => return Ok(EapPacket::Success { packet_id }),
            EapCode::Failure => return Ok(EapPacket::Failure { packet_id }),
            EapCode::Request | EapCode::Response => {}
        }

        if length < EAP_HDR_LEN + EAP_TYPE_LEN || length > data.len() {
            return Err(CodecError::BadLength {
                layer: "EAP",
                declared: length,
                actual: data.len(),
            });
        }
        let type_byte = data[EAP_HDR_LEN];
        let body = &data[EAP_HDR_LEN + EAP_TYPE_LEN..length];

        match EapType::from_u8(type_byte) {
            Some(EapType::Identity) => decode_identity(code, packet_id, body),
            Some(EapType::LegacyNak) => Ok(EapPacket::LegacyNak {
                code,
                packet_id,
                desired_auth_types: body.to_vec(),
            }),
            Some(EapType::Md5Challenge) => decode_md5_challenge(code, packet_id, body),
            Some(EapType::Ttls) => decode_ttls(code, packet_id, body),
            None => Err(CodecError::UnsupportedEapType(type_byte)),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (eap_type, body) = match self {
            EapPacket::Success { packet_id } => {
                return Ok(encode_header(EapCode::Success, *packet_id, EAP_HDR_LEN as u16).to_vec())
            }
            EapPacket::Failure { packet_id } => {
                return Ok(encode_header(EapCode::Failure, *packet_id, EAP_HDR_LEN as u16).to_vec())
            }
            EapPacket::Identity { identity, .. } => {
                (EapType::Identity, identity.as_bytes().to_vec())
            }
            EapPacket::LegacyNak {
                desired_auth_types, ..
            } => (EapType::LegacyNak, desired_auth_types.clone()),
            EapPacket::Md5Challenge {
                challenge,
                extra_data,
                ..
            } => {
                let value_size = u8::try_from(challenge.len()).map_err(|_| CodecError::Oversize {
                    field: "MD5 challenge value",
                    len: challenge.len(),
                })?;
                let mut body = Vec::with_capacity(1 + challenge.len() + extra_data.len());
                body.push(value_size);
                body.extend_from_slice(challenge);
                body.extend_from_slice(extra_data);
                (EapType::Md5Challenge, body)
            }
            EapPacket::Ttls {
                flags, extra_data, ..
            } => {
                let mut body = Vec::with_capacity(1 + extra_data.len());
                body.push(*flags);
                body.extend_from_slice(extra_data);
                (EapType::Ttls, body)
            }
        };

        let total = EAP_HDR_LEN + EAP_TYPE_LEN + body.len();
        let length = u16::try_from(total).map_err(|_| CodecError::Oversize {
            field: "EAP packet",
            len: total,
        })?;
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&encode_header(self.code(), self.packet_id(), length));
        bytes.push(eap_type as u8);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}

fn encode_header(code: EapCode, packet_id: u8, length: u16) -> [u8; EAP_HDR_LEN] {
    let len = length.to_be_bytes();
    [code as u8, packet_id, len[0], len[1]]
}

fn decode_identity(code: EapCode, packet_id: u8, body: &[u8]) -> Result<EapPacket> {
    let identity = String::from_utf8(body.to_vec()).map_err(|_| CodecError::InvalidIdentity)?;
    Ok(EapPacket::Identity {
        code,
        packet_id,
        identity,
    })
}

fn decode_md5_challenge(code: EapCode, packet_id: u8, body: &[u8]) -> Result<EapPacket> {
    let (&value_size, rest) = body.split_first().ok_or(CodecError::Truncated {
        layer: "MD5 challenge",
        expected: 1,
        actual: 0,
    })?;
    let value_size = value_size as usize;
    if rest.len() < value_size {
        return Err(CodecError::Truncated {
            layer: "MD5 challenge value",
            expected: value_size,
            actual: rest.len(),
        });
    }
    Ok(EapPacket::Md5Challenge {
        code,
        packet_id,
        challenge: rest[..value_size].to_vec(),
        extra_data: rest[value_size..].to_vec(),
    })
}

fn decode_ttls(code: EapCode, packet_id: u8, body: &[u8]) -> Result<EapPacket> {
    let (&flags, extra_data) = body.split_first().ok_or(CodecError::Truncated {
        layer: "TTLS flags",
        expected: 1,
        actual: 0,
    })?;
    Ok(EapPacket::Ttls {
        code,
        packet_id,
        flags,
        extra_data: extra_data.to_vec(),
    })
}

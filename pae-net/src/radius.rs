use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use crate::error::{CodecError, Result};

type HmacMd5 = Hmac<Md5>;

// RADIUS Packet Codes
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum RadiusCode {
    AccessRequest = 1,
    AccessAccept = 2,
    AccessReject = 3,
    AccountingRequest = 4,
    AccountingResponse = 5,
    AccessChallenge = 11,
    StatusServer = 12,
    StatusClient = 13,
}

impl RadiusCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RadiusCode::AccessRequest),
            2 => Some(RadiusCode::AccessAccept),
            3 => Some(RadiusCode::AccessReject),
            4 => Some(RadiusCode::AccountingRequest),
            5 => Some(RadiusCode::AccountingResponse),
            11 => Some(RadiusCode::AccessChallenge),
            12 => Some(RadiusCode::StatusServer),
            13 => Some(RadiusCode::StatusClient),
            _ => None,
        }
    }
}

// RADIUS Attributes
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u8)]
pub enum RadiusAttributeType {
    UserName = 1,
    NasIpAddress = 4,
    NasPort = 5,
    ServiceType = 6,
    FramedMtu = 12,
    ReplyMessage = 18,
    State = 24,
    Class = 25,
    SessionTimeout = 27,
    CalledStationId = 30,
    CallingStationId = 31,
    NasIdentifier = 32,
    NasPortType = 61,
    EapMessage = 79,
    MessageAuthenticator = 80,
}

pub const RADIUS_HDR_LEN: usize = 20;
pub const RADIUS_MAX_LEN: usize = 4096;
pub const RADIUS_AUTH_LEN: usize = 16;
pub const RADIUS_ATTR_HDR_LEN: usize = 2;
/// Largest value a single attribute can carry.
pub const RADIUS_ATTR_MAX_VALUE_LEN: usize = 253;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusAttribute {
    pub attr_type: u8,
    pub value: Vec<u8>,
}

impl RadiusAttribute {
    pub fn new(attr_type: RadiusAttributeType, value: impl Into<Vec<u8>>) -> Self {
        RadiusAttribute {
            attr_type: attr_type as u8,
            value: value.into(),
        }
    }

    pub fn is(&self, attr_type: RadiusAttributeType) -> bool {
        self.attr_type == attr_type as u8
    }
}

/// Ordered attribute list. Order is kept as received and as built, some
/// servers care about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadiusAttributes(pub Vec<RadiusAttribute>);

impl RadiusAttributes {
    pub fn new() -> Self {
        RadiusAttributes(Vec::new())
    }

    pub fn push(&mut self, attribute: RadiusAttribute) {
        self.0.push(attribute);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RadiusAttribute> {
        self.0.iter()
    }

    pub fn find(&self, attr_type: RadiusAttributeType) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|a| a.is(attr_type))
            .map(|a| a.value.as_slice())
    }

    pub fn find_all(&self, attr_type: RadiusAttributeType) -> impl Iterator<Item = &[u8]> {
        self.0
            .iter()
            .filter(move |a| a.is(attr_type))
            .map(|a| a.value.as_slice())
    }

    /// Reassembles an EAP packet split over several EAP-Message attributes.
    pub fn eap_message(&self) -> Option<Vec<u8>> {
        let mut fragments = self.find_all(RadiusAttributeType::EapMessage).peekable();
        fragments.peek()?;
        Some(fragments.flat_map(|f| f.iter().copied()).collect())
    }

    pub fn state(&self) -> Option<&[u8]> {
        self.find(RadiusAttributeType::State)
    }

    fn encoded_len(&self) -> usize {
        self.0
            .iter()
            .map(|a| RADIUS_ATTR_HDR_LEN + a.value.len())
            .sum()
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        for attr in &self.0 {
            if attr.value.len() > RADIUS_ATTR_MAX_VALUE_LEN {
                return Err(CodecError::Oversize {
                    field: "RADIUS attribute",
                    len: attr.value.len(),
                });
            }
            out.push(attr.attr_type);
            out.push((attr.value.len() + RADIUS_ATTR_HDR_LEN) as u8);
            out.extend_from_slice(&attr.value);
        }
        Ok(())
    }
}

/// Splits an EAP packet into EAP-Message attributes of at most 253 bytes
/// each (RFC 3579 section 3.1).
pub fn eap_message_attributes(eap_packet: &[u8]) -> Vec<RadiusAttribute> {
    if eap_packet.is_empty() {
        return vec![RadiusAttribute::new(RadiusAttributeType::EapMessage, Vec::new())];
    }
    eap_packet
        .chunks(RADIUS_ATTR_MAX_VALUE_LEN)
        .map(|chunk| RadiusAttribute::new(RadiusAttributeType::EapMessage, chunk))
        .collect()
}

pub fn parse_attributes(data: &[u8]) -> Result<RadiusAttributes> {
    let mut attributes = RadiusAttributes::new();
    let mut offset = 0;
    while offset < data.len() {
        if data.len() - offset < RADIUS_ATTR_HDR_LEN {
            return Err(CodecError::MalformedRadius(format!(
                "attribute header cut short at offset {}",
                offset
            )));
        }
        let attr_type = data[offset];
        let length = data[offset + 1] as usize;
        if length < RADIUS_ATTR_HDR_LEN || offset + length > data.len() {
            return Err(CodecError::MalformedRadius(format!(
                "attribute {} has bad length {}",
                attr_type, length
            )));
        }
        attributes.push(RadiusAttribute {
            attr_type,
            value: data[offset + RADIUS_ATTR_HDR_LEN..offset + length].to_vec(),
        });
        offset += length;
    }
    Ok(attributes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusPacket {
    pub code: u8,
    pub id: u8,
    pub authenticator: [u8; RADIUS_AUTH_LEN],
    pub attributes: RadiusAttributes,
}

impl RadiusPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RADIUS_HDR_LEN {
            return Err(CodecError::Truncated {
                layer: "RADIUS header",
                expected: RADIUS_HDR_LEN,
                actual: data.len(),
            });
        }
        let len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if len < RADIUS_HDR_LEN || len > data.len() || len > RADIUS_MAX_LEN {
            return Err(CodecError::BadLength {
                layer: "RADIUS",
                declared: len,
                actual: data.len(),
            });
        }
        let mut authenticator = [0u8; RADIUS_AUTH_LEN];
        authenticator.copy_from_slice(&data[4..RADIUS_HDR_LEN]);

        Ok(RadiusPacket {
            code: data[0],
            id: data[1],
            authenticator,
            attributes: parse_attributes(&data[RADIUS_HDR_LEN..len])?,
        })
    }

    pub fn radius_code(&self) -> Option<RadiusCode> {
        RadiusCode::from_u8(self.code)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let total = RADIUS_HDR_LEN + self.attributes.encoded_len();
        if total > RADIUS_MAX_LEN {
            return Err(CodecError::Oversize {
                field: "RADIUS packet",
                len: total,
            });
        }
        let mut bytes = Vec::with_capacity(total);
        bytes.push(self.code);
        bytes.push(self.id);
        bytes.extend_from_slice(&(total as u16).to_be_bytes());
        bytes.extend_from_slice(&self.authenticator);
        self.attributes.encode(&mut bytes)?;
        Ok(bytes)
    }
}

/// An Access-Request ready to be signed and serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub id: u8,
    pub authenticator: [u8; RADIUS_AUTH_LEN],
    pub attributes: RadiusAttributes,
}

impl AccessRequest {
    pub fn new(id: u8, attributes: RadiusAttributes) -> Result<Self> {
        Ok(AccessRequest {
            id,
            authenticator: random_authenticator()?,
            attributes,
        })
    }

    /// Serializes the request. A Message-Authenticator attribute in the list is
    /// overwritten with HMAC-MD5 over the whole packet, computed with the slot
    /// zeroed (RFC 3579 section 3.2).
    pub fn build(&self, secret: &str) -> Result<Vec<u8>> {
        let packet = RadiusPacket {
            code: RadiusCode::AccessRequest as u8,
            id: self.id,
            authenticator: self.authenticator,
            attributes: self.attributes.clone(),
        };
        let mut bytes = packet.to_bytes()?;

        if let Some(offset) = message_authenticator_offset(&bytes[RADIUS_HDR_LEN..]) {
            let slot = RADIUS_HDR_LEN + offset;
            bytes[slot..slot + RADIUS_AUTH_LEN].fill(0);
            let mut mac = hmac_md5(secret)?;
            mac.update(&bytes);
            let digest = mac.finalize().into_bytes();
            bytes[slot..slot + RADIUS_AUTH_LEN].copy_from_slice(&digest);
        }
        Ok(bytes)
    }
}

pub fn random_authenticator() -> Result<[u8; RADIUS_AUTH_LEN]> {
    let mut authenticator = [0u8; RADIUS_AUTH_LEN];
    getrandom::getrandom(&mut authenticator).map_err(|e| CodecError::Entropy(e.to_string()))?;
    Ok(authenticator)
}

/// Checks MD5(Code | Id | Length | RequestAuth | Attributes | Secret) against
/// the authenticator field of a response (RFC 2865 section 3).
pub fn verify_response_authenticator(
    response: &[u8],
    request_authenticator: &[u8; RADIUS_AUTH_LEN],
    secret: &str,
) -> bool {
    if response.len() < RADIUS_HDR_LEN {
        return false;
    }
    let len = u16::from_be_bytes([response[2], response[3]]) as usize;
    if len < RADIUS_HDR_LEN || len > response.len() {
        return false;
    }
    let mut hasher = Md5::new();
    hasher.update(&response[0..4]);
    hasher.update(request_authenticator);
    hasher.update(&response[RADIUS_HDR_LEN..len]);
    hasher.update(secret.as_bytes());
    let expected = hasher.finalize();
    expected.as_slice() == &response[4..RADIUS_HDR_LEN]
}

/// Computes the response authenticator for a reply. Used by servers, and by
/// tests that play one.
pub fn response_authenticator(
    response: &[u8],
    request_authenticator: &[u8; RADIUS_AUTH_LEN],
    secret: &str,
) -> [u8; RADIUS_AUTH_LEN] {
    let mut hasher = Md5::new();
    hasher.update(&response[0..4]);
    hasher.update(request_authenticator);
    hasher.update(&response[RADIUS_HDR_LEN..]);
    hasher.update(secret.as_bytes());
    let mut authenticator = [0u8; RADIUS_AUTH_LEN];
    authenticator.copy_from_slice(&hasher.finalize());
    authenticator
}

fn message_authenticator_offset(attributes: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while offset + RADIUS_ATTR_HDR_LEN <= attributes.len() {
        let attr_type = attributes[offset];
        let length = attributes[offset + 1] as usize;
        if length < RADIUS_ATTR_HDR_LEN {
            return None;
        }
        if attr_type == RadiusAttributeType::MessageAuthenticator as u8
            && length == RADIUS_ATTR_HDR_LEN + RADIUS_AUTH_LEN
        {
            return Some(offset + RADIUS_ATTR_HDR_LEN);
        }
        offset += length;
    }
    None
}

fn hmac_md5(secret: &str) -> Result<HmacMd5> {
    HmacMd5::new_from_slice(secret.as_bytes())
        .map_err(|e| CodecError::MalformedRadius(format!("bad shared secret: {}", e)))
}

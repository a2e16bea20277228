use thiserror::Error;

/// Errors raised while decoding or encoding frames on either leg.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{layer} too short: expected at least {expected} bytes, got {actual}")]
    Truncated {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{layer} length field {declared} does not fit a buffer of {actual} bytes")]
    BadLength {
        layer: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("{field} of {len} bytes exceeds the field size")]
    Oversize { field: &'static str, len: usize },

    #[error("Ethernet frame with bad ethertype 0x{0:04x}")]
    UnexpectedEtherType(u16),

    #[error("EAP identity is not valid UTF-8")]
    InvalidIdentity,

    #[error("malformed EAP header: unknown code {0}")]
    MalformedEapHeader(u8),

    #[error("unsupported EAP type {0}")]
    UnsupportedEapType(u8),

    #[error("unknown 802.1X packet type {0}")]
    UnknownAuth8021xType(u8),

    #[error("message carries no EAP payload")]
    NoEapPayload,

    #[error("malformed RADIUS packet: {0}")]
    MalformedRadius(String),

    #[error("no entropy available: {0}")]
    Entropy(String),
}

impl CodecError {
    /// True for the framing/length failures (truncated buffers, inconsistent
    /// length fields, oversize fields, wrong ethertype, bad identity text).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated { .. }
                | CodecError::BadLength { .. }
                | CodecError::Oversize { .. }
                | CodecError::UnexpectedEtherType(_)
                | CodecError::InvalidIdentity
                | CodecError::MalformedRadius(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_failure_is_not_a_format_error() {
        assert!(!CodecError::Entropy("getrandom failed".to_string()).is_format_error());
        assert!(CodecError::MalformedRadius("bad".to_string()).is_format_error());
    }
}

// Ethernet II framing for EAPOL traffic.

use pnet::packet::ethernet::{EtherType, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet_base::MacAddr;

use crate::error::{CodecError, Result};

pub const ETHERNET_HDR_LEN: usize = 14;

/// EtherType for 802.1X port access entity frames.
pub const ETH_P_PAE: u16 = 0x888e;

/// The reserved multicast address 802.1X frames are sent to.
pub const PAE_GROUP_ADDRESS: MacAddr = MacAddr(0x01, 0x80, 0xc2, 0x00, 0x00, 0x03);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    /// Parses a frame. The ethertype is not checked here.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let packet = EthernetPacket::new(data).ok_or(CodecError::Truncated {
            layer: "Ethernet frame",
            expected: ETHERNET_HDR_LEN,
            actual: data.len(),
        })?;

        Ok(EthernetFrame {
            dst: packet.get_destination(),
            src: packet.get_source(),
            ethertype: packet.get_ethertype().0,
            payload: packet.payload().to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; ETHERNET_HDR_LEN + self.payload.len()];
        // The buffer is sized for the header, so the constructor cannot fail.
        if let Some(mut packet) = MutableEthernetPacket::new(&mut buf) {
            packet.set_destination(self.dst);
            packet.set_source(self.src);
            packet.set_ethertype(EtherType(self.ethertype));
            packet.set_payload(&self.payload);
        }
        buf
    }
}

pub mod eap;
pub mod eapol;
pub mod error;
pub mod ethernet;
pub mod link;
pub mod message;
pub mod radius;

pub use error::CodecError;
pub use link::{LinkDevice, PnetLink};
pub use message::Message;
pub use pnet_base::{MacAddr, ParseMacAddrErr};

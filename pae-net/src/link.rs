use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use pnet::datalink::{self, Channel, DataLinkSender, NetworkInterface};
use pnet::packet::ethernet::EthernetPacket;
use pnet_base::MacAddr;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::ethernet::ETH_P_PAE;

/// A device that carries whole Ethernet frames, header included.
#[async_trait]
pub trait LinkDevice: Send + Sync {
    async fn send(&self, buf: &[u8]) -> Result<usize>;
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;
}

/// Raw link socket on a named interface, backed by a pnet datalink channel.
///
/// The pnet receiver blocks, so it runs on its own thread and hands EAPOL
/// frames sent by other stations over a channel.
pub struct PnetLink {
    mac: MacAddr,
    tx: StdMutex<Box<dyn DataLinkSender>>,
    rx: Mutex<mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>>,
}

impl PnetLink {
    pub fn open(interface_name: &str) -> Result<Self> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface: &NetworkInterface| iface.name == interface_name)
            .ok_or_else(|| anyhow!("interface {} not found", interface_name))?;
        let mac = interface
            .mac
            .ok_or_else(|| anyhow!("interface {} has no MAC address", interface_name))?;

        // Promiscuous so that frames to the PAE group address are delivered.
        let mut channel_config = datalink::Config::default();
        channel_config.promiscuous = true;
        channel_config.read_timeout = Some(Duration::from_millis(500));

        let (tx, mut rx) = match datalink::channel(&interface, channel_config)
            .with_context(|| format!("failed to open datalink channel on {}", interface_name))?
        {
            Channel::Ethernet(tx, rx) => (tx, rx),
            _ => return Err(anyhow!("unhandled channel type on {}", interface_name)),
        };

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let thread_name = format!("pae-rx-{}", interface_name);
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || loop {
                match rx.next() {
                    Ok(frame) => {
                        // ETH_P_ALL also delivers our own outgoing frames.
                        let is_inbound_pae = EthernetPacket::new(frame)
                            .map(|p| p.get_ethertype().0 == ETH_P_PAE && p.get_source() != mac)
                            .unwrap_or(false);
                        if is_inbound_pae && frame_tx.send(Ok(frame.to_vec())).is_err() {
                            debug!("Link receiver dropped, stopping reader thread.");
                            return;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        if frame_tx.is_closed() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("An error occurred while reading from datalink channel: {}", e);
                        let _ = frame_tx.send(Err(e));
                        return;
                    }
                }
            })
            .context("failed to spawn link reader thread")?;

        info!("Opened link socket on {} ({})", interface_name, mac);
        Ok(PnetLink {
            mac,
            tx: StdMutex::new(tx),
            rx: Mutex::new(frame_rx),
        })
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }
}

#[async_trait]
impl LinkDevice for PnetLink {
    async fn send(&self, buf: &[u8]) -> Result<usize> {
        let mut tx = self
            .tx
            .lock()
            .map_err(|_| anyhow!("link sender lock poisoned"))?;
        match tx.send_to(buf, None) {
            Some(Ok(())) => Ok(buf.len()),
            Some(Err(e)) => Err(e).context("failed to send frame"),
            None => Err(anyhow!("link sender has no buffer space")),
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        match self.rx.lock().await.recv().await {
            Some(Ok(frame)) => {
                let len = std::cmp::min(buf.len(), frame.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            Some(Err(e)) => Err(e).context("link read failed"),
            None => Err(anyhow!("link reader thread exited")),
        }
    }
}

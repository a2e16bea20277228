pub mod config;

use anyhow::{anyhow, bail, Context, Result};
use pae_core::{
    AuthHandler, Config, CorrelationTable, EapOutput, EapolSessionFactory, Event, OutputQueues,
    PendingRequest, RadiusOutput, SessionManager,
};
use pae_net::message::{build_access_request, eap_to_event, ethernet_to_event, event_to_ethernet};
use pae_net::radius::{verify_response_authenticator, RadiusCode, RadiusPacket, RADIUS_MAX_LEN};
use pae_net::{LinkDevice, MacAddr, PnetLink};
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Largest frame read from the link, VLAN tag included.
const MAX_FRAME_LEN: usize = 1522;
const RETRANSMIT_TICK: Duration = Duration::from_secs(1);
const REAPER_TICK: Duration = Duration::from_secs(60);

/// Sockets and tables shared by the pump loops.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub link: Arc<dyn LinkDevice>,
    pub our_mac: MacAddr,
    pub group_mac: MacAddr,
    pub radius_socket: Arc<UdpSocket>,
    pub sessions: Arc<SessionManager>,
    pub correlation: Arc<Mutex<CorrelationTable>>,
}

pub async fn initialize_services(
    config: Arc<Config>,
    link: Arc<dyn LinkDevice>,
    our_mac: MacAddr,
    auth_handler: Option<AuthHandler>,
) -> Result<(
    Services,
    UnboundedReceiver<EapOutput>,
    UnboundedReceiver<RadiusOutput>,
)> {
    let group_mac = config.group_mac()?;
    let listen_addr = config.radius_listen_addr();
    let radius_socket = UdpSocket::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind RADIUS socket on {}", listen_addr))?;
    info!(
        "RADIUS socket bound on {}, server is {}",
        radius_socket.local_addr()?,
        config.radius_server_addr()
    );

    let (queues, eap_rx, radius_rx) = OutputQueues::new();
    let factory = Arc::new(EapolSessionFactory {
        auth_handler,
        group_address: group_mac,
    });
    let sessions = Arc::new(SessionManager::new(factory, queues, config.max_clients));

    let services = Services {
        config,
        link,
        our_mac,
        group_mac,
        radius_socket: Arc::new(radius_socket),
        sessions,
        correlation: Arc::new(Mutex::new(CorrelationTable::new())),
    };
    Ok((services, eap_rx, radius_rx))
}

/// Logs the success and runs the `conup` script, if any.
pub fn default_auth_handler(config: Arc<Config>) -> AuthHandler {
    Arc::new(move |mac, group_address| {
        info!("Supplicant {} authenticated", mac);
        if let Some(conup) = &config.conup {
            run_script(conup.clone(), mac, group_address, &config.interface);
        }
    })
}

fn run_script(script_path: String, mac: MacAddr, group_address: MacAddr, interface: &str) {
    info!("Running script {} for {}", script_path, mac);
    let mut cmd = Command::new(&script_path);
    cmd.env("DEV", interface);
    cmd.env("CALLING_STATION_ID", mac.to_string());
    cmd.env("GROUP_ADDRESS", group_address.to_string());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    match cmd.spawn() {
        Ok(mut child) => {
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    warn!("Script {} failed: {}", script_path, e);
                }
            });
        }
        Err(e) => {
            warn!("Failed to spawn script {}: {}", script_path, e);
        }
    }
}

pub async fn run() -> Result<()> {
    let config = Arc::new(config::load_config()?);

    tracing_subscriber::fmt()
        .with_max_level(config.loglevel.as_tracing_level())
        .init();

    info!("Starting paed on {}", config.interface);
    debug!("Config loaded: {:?}", config);

    let link = PnetLink::open(&config.interface)?;
    let our_mac = link.mac();
    let auth_handler = default_auth_handler(config.clone());
    let (services, eap_rx, radius_rx) =
        initialize_services(config, Arc::new(link), our_mac, Some(auth_handler)).await?;

    tokio::select! {
        res = serve(services, eap_rx, radius_rx) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down.");
            Ok(())
        }
    }
}

/// Runs every loop until one of them ends, which is always an error.
pub async fn serve(
    services: Services,
    eap_rx: UnboundedReceiver<EapOutput>,
    radius_rx: UnboundedReceiver<RadiusOutput>,
) -> Result<()> {
    let server_addr = services.config.radius_server_addr();
    let secret = services.config.radiussecret.clone();

    let mut eap_ingress = tokio::spawn(eap_ingress_loop(
        services.link.clone(),
        services.our_mac,
        services.sessions.clone(),
    ));
    let mut eap_egress = tokio::spawn(eap_egress_loop(
        services.link.clone(),
        services.our_mac,
        services.group_mac,
        eap_rx,
    ));
    let mut radius_egress = tokio::spawn(radius_egress_loop(
        services.radius_socket.clone(),
        server_addr,
        secret.clone(),
        services.correlation.clone(),
        services.sessions.clone(),
        radius_rx,
    ));
    let mut radius_ingress = tokio::spawn(radius_ingress_loop(
        services.radius_socket.clone(),
        server_addr,
        secret,
        services.correlation.clone(),
        services.sessions.clone(),
    ));
    let mut radius_retransmit = tokio::spawn(radius_retransmit_loop(
        services.radius_socket.clone(),
        server_addr,
        services.correlation.clone(),
        services.sessions.clone(),
        services.config.radius_timeout(),
        services.config.radiusretry,
    ));
    let mut session_reaper = tokio::spawn(session_reaper_loop(
        services.sessions.clone(),
        services.config.client_idle_timeout(),
    ));

    let err = tokio::select! {
        res = &mut eap_ingress => loop_exit("EAP ingress", res),
        res = &mut eap_egress => loop_exit("EAP egress", res),
        res = &mut radius_egress => loop_exit("RADIUS egress", res),
        res = &mut radius_ingress => loop_exit("RADIUS ingress", res),
        res = &mut radius_retransmit => loop_exit("RADIUS retransmit", res),
        res = &mut session_reaper => loop_exit("Session reaper", res),
    };

    for handle in [
        &eap_ingress,
        &eap_egress,
        &radius_egress,
        &radius_ingress,
        &radius_retransmit,
        &session_reaper,
    ] {
        handle.abort();
    }
    Err(err)
}

fn loop_exit(name: &str, res: std::result::Result<Result<()>, JoinError>) -> anyhow::Error {
    match res {
        Ok(Ok(())) => {
            error!("{} loop finished.", name);
            anyhow!("{} loop finished", name)
        }
        Ok(Err(e)) => {
            error!("{} loop failed: {:#}", name, e);
            e.context(format!("{} loop failed", name))
        }
        Err(e) => {
            error!("{} loop aborted: {}", name, e);
            anyhow!("{} loop aborted: {}", name, e)
        }
    }
}

pub async fn eap_ingress_loop(
    link: Arc<dyn LinkDevice>,
    our_mac: MacAddr,
    sessions: Arc<SessionManager>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    loop {
        let len = link.recv(&mut buf).await.context("link receive failed")?;
        let frame = &buf[..len];
        debug!("Received frame: {}", hex::encode(frame));
        match ethernet_to_event(frame) {
            // Raw sockets echo our own transmissions back.
            Ok(message) if message.src_mac() == our_mac => {
                debug!("Ignoring our own {:?}", message);
            }
            Ok(message) => {
                let mac = message.src_mac();
                sessions.dispatch(mac, Event::MessageReceived(message)).await;
            }
            Err(e) => warn!("Dropping frame: {}", e),
        }
    }
}

pub async fn eap_egress_loop(
    link: Arc<dyn LinkDevice>,
    our_mac: MacAddr,
    group_mac: MacAddr,
    mut eap_rx: UnboundedReceiver<EapOutput>,
) -> Result<()> {
    while let Some(EapOutput { message, src_mac }) = eap_rx.recv().await {
        let frame = match event_to_ethernet(&message, our_mac, group_mac) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping {:?} for {}: {}", message, src_mac, e);
                continue;
            }
        };
        debug!("Sending frame for {}: {}", src_mac, hex::encode(&frame));
        link.send(&frame).await.context("link send failed")?;
    }
    Ok(())
}

pub async fn radius_egress_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    secret: String,
    correlation: Arc<Mutex<CorrelationTable>>,
    sessions: Arc<SessionManager>,
    mut radius_rx: UnboundedReceiver<RadiusOutput>,
) -> Result<()> {
    while let Some(output) = radius_rx.recv().await {
        let (id, packet, displaced) = {
            let mut table = correlation.lock().await;
            let id = table.allocate_radius_id();
            let request = match build_access_request(
                &output.message,
                output.src_mac,
                &output.username,
                id,
                output.state.as_deref(),
            ) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Dropping RADIUS request for {}: {}", output.src_mac, e);
                    continue;
                }
            };
            let packet = match request.build(&secret) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Dropping RADIUS request for {}: {}", output.src_mac, e);
                    continue;
                }
            };
            let displaced = table.record(
                id,
                PendingRequest {
                    mac: output.src_mac,
                    authenticator: request.authenticator,
                    packet: packet.clone(),
                    sent_at: Instant::now(),
                    retries: 0,
                },
            );
            (id, packet, displaced)
        };
        if let Some(previous) = displaced {
            sessions.dispatch_existing(previous.mac, Event::RadiusTimeout).await;
        }
        debug!(
            "Sending Access-Request {} for {}: {}",
            id,
            output.src_mac,
            hex::encode(&packet)
        );
        socket
            .send_to(&packet, server_addr)
            .await
            .context("RADIUS send failed")?;
    }
    Ok(())
}

pub async fn radius_ingress_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    secret: String,
    correlation: Arc<Mutex<CorrelationTable>>,
    sessions: Arc<SessionManager>,
) -> Result<()> {
    let mut buf = vec![0u8; RADIUS_MAX_LEN];
    loop {
        let (len, src) = socket
            .recv_from(&mut buf)
            .await
            .context("RADIUS receive failed")?;
        if src != server_addr {
            warn!("Dropping RADIUS datagram from unexpected source {}", src);
            continue;
        }
        debug!("Received RADIUS datagram: {}", hex::encode(&buf[..len]));
        if let Err(e) = handle_radius_reply(&buf[..len], &secret, &correlation, &sessions).await {
            warn!("Dropping RADIUS reply: {:#}", e);
        }
    }
}

/// Routes one RADIUS reply to the supplicant whose request it answers.
pub async fn handle_radius_reply(
    data: &[u8],
    secret: &str,
    correlation: &Mutex<CorrelationTable>,
    sessions: &SessionManager,
) -> Result<()> {
    let packet = RadiusPacket::parse(data)?;

    let (mac, event) = {
        let mut table = correlation.lock().await;
        let pending = table.lookup_by_radius_id(packet.id)?;
        if !verify_response_authenticator(data, &pending.authenticator, secret) {
            bail!("bad response authenticator for id {}", packet.id);
        }
        let mac = pending.mac;

        let code = match packet.radius_code() {
            Some(
                code @ (RadiusCode::AccessAccept
                | RadiusCode::AccessReject
                | RadiusCode::AccessChallenge),
            ) => code,
            _ => bail!("unexpected RADIUS code {} for id {}", packet.code, packet.id),
        };
        let message = match packet.attributes.eap_message() {
            Some(eap) => Some(eap_to_event(&eap, mac)?),
            None => None,
        };
        let state = packet.attributes.state().map(<[u8]>::to_vec);
        if let Some(state) = &state {
            debug!("RADIUS State for {}: {}", mac, hex::encode(state));
        }

        table.take(packet.id);
        info!("RADIUS {:?} (id {}) for {}", code, packet.id, mac);
        (
            mac,
            Event::RadiusMessageReceived {
                code,
                message,
                state,
            },
        )
    };

    if !sessions.dispatch_existing(mac, event).await {
        warn!("No session for {}, dropping RADIUS reply", mac);
    }
    Ok(())
}

/// Resends unanswered requests and times out the ones out of retries.
pub async fn radius_retransmit_loop(
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    correlation: Arc<Mutex<CorrelationTable>>,
    sessions: Arc<SessionManager>,
    timeout: Duration,
    max_retries: u32,
) -> Result<()> {
    let tick = RETRANSMIT_TICK.min(timeout).max(Duration::from_millis(100));
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        let sweep = correlation
            .lock()
            .await
            .sweep(Instant::now(), timeout, max_retries);
        for (id, packet) in sweep.resend {
            warn!("Retransmitting RADIUS request {}", id);
            socket
                .send_to(&packet, server_addr)
                .await
                .context("RADIUS send failed")?;
        }
        for mac in sweep.expired {
            warn!("RADIUS request for {} timed out", mac);
            sessions.dispatch_existing(mac, Event::RadiusTimeout).await;
        }
    }
}

pub async fn session_reaper_loop(sessions: Arc<SessionManager>, max_idle: Duration) -> Result<()> {
    let tick = REAPER_TICK.min(max_idle).max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(tick);
    loop {
        interval.tick().await;
        let reaped = sessions.reap_idle(max_idle).await;
        if !reaped.is_empty() {
            info!("Reaped {} idle supplicants", reaped.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pae_core::CoreError;
    use pae_net::eap::EapCode;
    use pae_net::ethernet::PAE_GROUP_ADDRESS;
    use pae_net::radius::{
        response_authenticator, RadiusAttribute, RadiusAttributeType, RadiusAttributes,
    };
    use pae_net::Message;

    const SECRET: &str = "testing123";
    const SUPPLICANT: MacAddr = MacAddr(0x00, 0x11, 0x22, 0x33, 0x44, 0x55);

    fn sessions() -> (
        SessionManager,
        UnboundedReceiver<EapOutput>,
        UnboundedReceiver<RadiusOutput>,
    ) {
        let (queues, eap_rx, radius_rx) = OutputQueues::new();
        let factory = Arc::new(EapolSessionFactory {
            auth_handler: None,
            group_address: PAE_GROUP_ADDRESS,
        });
        (SessionManager::new(factory, queues, 8), eap_rx, radius_rx)
    }

    fn signed_reply(
        code: RadiusCode,
        id: u8,
        request_authenticator: &[u8; 16],
        attributes: RadiusAttributes,
    ) -> Vec<u8> {
        let packet = RadiusPacket {
            code: code as u8,
            id,
            authenticator: [0; 16],
            attributes,
        };
        let mut bytes = packet.to_bytes().unwrap();
        let auth = response_authenticator(&bytes, request_authenticator, SECRET);
        bytes[4..20].copy_from_slice(&auth);
        bytes
    }

    fn pending(mac: MacAddr) -> PendingRequest {
        PendingRequest {
            mac,
            authenticator: [7; 16],
            packet: vec![],
            sent_at: Instant::now(),
            retries: 0,
        }
    }

    #[tokio::test]
    async fn test_unknown_correlation_is_reported() {
        let (sessions, _eap_rx, _radius_rx) = sessions();
        let correlation = Mutex::new(CorrelationTable::new());
        let reply = signed_reply(RadiusCode::AccessAccept, 42, &[7; 16], RadiusAttributes::new());

        let err = handle_radius_reply(&reply, SECRET, &correlation, &sessions)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CoreError>(),
            Some(&CoreError::UnknownCorrelation(42))
        );
    }

    #[tokio::test]
    async fn test_forged_reply_keeps_request_pending() {
        let (sessions, _eap_rx, _radius_rx) = sessions();
        let correlation = Mutex::new(CorrelationTable::new());
        correlation.lock().await.record(3, pending(SUPPLICANT));

        let reply = signed_reply(RadiusCode::AccessAccept, 3, &[8; 16], RadiusAttributes::new());
        assert!(handle_radius_reply(&reply, SECRET, &correlation, &sessions)
            .await
            .is_err());
        assert!(correlation.lock().await.lookup_by_radius_id(3).is_ok());
    }

    #[tokio::test]
    async fn test_challenge_reaches_waiting_supplicant() {
        let (sessions, mut eap_rx, mut radius_rx) = sessions();
        sessions
            .dispatch(
                SUPPLICANT,
                Event::MessageReceived(Message::Identity {
                    src_mac: SUPPLICANT,
                    message_id: 1,
                    code: EapCode::Response,
                    identity: "alice".to_string(),
                }),
            )
            .await;
        assert_eq!(radius_rx.recv().await.unwrap().username, "alice");
        let correlation = Mutex::new(CorrelationTable::new());
        correlation.lock().await.record(0, pending(SUPPLICANT));

        let challenge = Message::Md5Challenge {
            src_mac: SUPPLICANT,
            message_id: 2,
            code: EapCode::Request,
            challenge: vec![0x33; 16],
            extra_data: vec![],
        };
        let mut attributes = RadiusAttributes::new();
        attributes.push(RadiusAttribute::new(
            RadiusAttributeType::EapMessage,
            challenge.to_eap().unwrap().to_bytes().unwrap(),
        ));
        attributes.push(RadiusAttribute::new(RadiusAttributeType::State, vec![1, 2]));
        let reply = signed_reply(RadiusCode::AccessChallenge, 0, &[7; 16], attributes);

        handle_radius_reply(&reply, SECRET, &correlation, &sessions)
            .await
            .unwrap();
        assert!(correlation.lock().await.is_empty());
        assert_eq!(eap_rx.recv().await.unwrap().message, challenge);
    }

    #[tokio::test]
    async fn test_displaced_request_times_out_its_supplicant() {
        const SECOND: MacAddr = MacAddr(0x00, 0x66, 0x77, 0x88, 0x99, 0xaa);
        let (sessions, mut eap_rx, mut radius_rx) = sessions();
        let sessions = Arc::new(sessions);
        for (mac, name) in [(SUPPLICANT, "alice"), (SECOND, "bob")] {
            sessions
                .dispatch(
                    mac,
                    Event::MessageReceived(Message::Identity {
                        src_mac: mac,
                        message_id: 1,
                        code: EapCode::Response,
                        identity: name.to_string(),
                    }),
                )
                .await;
        }
        // Alice's request already holds the id the table hands out next.
        assert_eq!(radius_rx.recv().await.unwrap().username, "alice");
        let correlation = Arc::new(Mutex::new(CorrelationTable::new()));
        correlation.lock().await.record(0, pending(SUPPLICANT));

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let egress = tokio::spawn(radius_egress_loop(
            socket,
            server.local_addr().unwrap(),
            SECRET.to_string(),
            correlation.clone(),
            sessions.clone(),
            radius_rx,
        ));

        let mut buf = [0u8; RADIUS_MAX_LEN];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(RadiusPacket::parse(&buf[..len]).unwrap().id, 0);
        assert_eq!(
            correlation.lock().await.lookup_by_radius_id(0).unwrap().mac,
            SECOND
        );

        let output = eap_rx.recv().await.unwrap();
        assert_eq!(output.src_mac, SUPPLICANT);
        assert!(matches!(output.message, Message::Failure { .. }));
        egress.abort();
    }

    #[tokio::test]
    async fn test_reply_for_evicted_session_is_dropped() {
        let (sessions, _eap_rx, _radius_rx) = sessions();
        let correlation = Mutex::new(CorrelationTable::new());
        correlation.lock().await.record(5, pending(SUPPLICANT));

        let reply = signed_reply(RadiusCode::AccessReject, 5, &[7; 16], RadiusAttributes::new());
        handle_radius_reply(&reply, SECRET, &correlation, &sessions)
            .await
            .unwrap();
        assert!(!sessions.contains(&SUPPLICANT).await);
    }
}

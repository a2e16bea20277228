use pae_core::{Config, LogLevel};
use pae_net::MacAddr;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

fn load_test_config() -> Config {
    let config_contents =
        std::fs::read_to_string("tests/paed.toml").expect("Failed to read config file");
    toml::from_str(&config_contents).expect("Failed to parse config file")
}

#[test]
fn test_load_general_config() {
    let config = load_test_config();
    assert_eq!(config.loglevel, LogLevel::Debug);
    assert_eq!(config.loglevel.as_tracing_level(), tracing::Level::DEBUG);
    assert_eq!(config.interface, "eth1");
    assert_eq!(
        config.group_mac().unwrap(),
        MacAddr::new(0x01, 0x80, 0xc2, 0x00, 0x00, 0x03)
    );
    assert_eq!(config.conup, Some("/etc/paed/up.sh".to_string()));
}

#[test]
fn test_load_radius_config() {
    let config = load_test_config();
    assert_eq!(config.radiuslisten, Ipv4Addr::new(127, 0, 0, 1));
    assert_eq!(
        config.radius_listen_addr(),
        "127.0.0.1:18120".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(
        config.radius_server_addr(),
        "127.0.0.1:1812".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(config.radiussecret, "testing123");
    assert_eq!(config.radius_timeout(), Duration::from_secs(5));
    assert_eq!(config.radiusretry, 2);
}

#[test]
fn test_load_session_config() {
    let config = load_test_config();
    assert_eq!(config.max_clients, 64);
    assert_eq!(config.client_idle_timeout(), Duration::from_secs(600));
}

#[test]
fn test_empty_config_uses_defaults() {
    let config = Config::from_toml("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.radiusauthport, 1812);
    assert_eq!(config.radiuslistenport, 0);
    assert_eq!(config.conup, None);
}

#[test]
fn test_invalid_group_address() {
    let config = Config::from_toml("group_address = \"not-a-mac\"").unwrap();
    assert!(config.group_mac().is_err());
}

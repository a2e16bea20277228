use anyhow::{Context, Result};
use clap::Parser;
use pae_core::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, value_parser, default_value = "/etc/paed/paed.toml")]
    pub config_file: PathBuf,

    /// Overrides the interface named in the config file.
    #[clap(short, long, value_parser)]
    pub interface: Option<String>,
}

pub fn load_config() -> Result<Config> {
    let args = Args::parse();
    load_config_with_args(&args)
}

pub fn load_config_with_args(args: &Args) -> Result<Config> {
    let mut config = load_config_from_path(&args.config_file)?;
    if let Some(interface) = &args.interface {
        info!("Interface overridden on the command line: {}", interface);
        config.interface = interface.clone();
    }
    Ok(config)
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let config_contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = Config::from_toml(&config_contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    config.group_mac()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_interface_override() {
        let mut temp_config_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_config_file,
            "interface = \"eth0\"\nradiussecret = \"s3cret\"\nradiusauthport = 11812"
        )
        .unwrap();

        let args = Args::parse_from([
            "paed",
            "--config-file",
            temp_config_file.path().to_str().unwrap(),
            "--interface",
            "wlan1",
        ]);
        let config = load_config_with_args(&args).unwrap();
        assert_eq!(config.interface, "wlan1");
        assert_eq!(config.radiussecret, "s3cret");
        assert_eq!(config.radiusauthport, 11812);
    }

    #[test]
    fn test_default_config_path() {
        let args = Args::parse_from(["paed"]);
        assert_eq!(args.config_file, PathBuf::from("/etc/paed/paed.toml"));
        assert_eq!(args.interface, None);
    }

    #[test]
    fn test_bad_group_address_is_rejected() {
        let mut temp_config_file = NamedTempFile::new().unwrap();
        writeln!(temp_config_file, "group_address = \"01:80:c2\"").unwrap();
        assert!(load_config_from_path(temp_config_file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config_from_path(Path::new("/nonexistent/paed.toml")).is_err());
    }
}

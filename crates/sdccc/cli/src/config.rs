//! Suite and enabled-test configuration

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use sdccc_core::{EnabledTests, SimulatedDeviceConfig, StorageConfig, SuiteConfig};
use sdccc_types::TestIdentifier;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Contents of the suite configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(rename = "SDCcc", default)]
    pub sdccc: SuiteSettings,
}

/// The `[SDCcc]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct SuiteSettings {
    /// No interactive popups
    #[serde(rename = "CIMode", default)]
    pub ci_mode: bool,

    /// Interactive manipulations allowed
    #[serde(default = "default_true")]
    pub graphical_popups: bool,

    #[serde(default)]
    pub test_execution_logging: bool,

    #[serde(default = "default_true")]
    pub enable_message_encoding_check: bool,

    #[serde(default = "default_true")]
    pub summarize_message_encoding_errors: bool,

    /// Sleep after the basic messaging check
    #[serde(default = "default_wait_seconds")]
    pub phase_settle_seconds: u64,

    /// Bound on start, stop, connect and disconnect
    #[serde(default = "default_wait_seconds")]
    pub max_wait_seconds: u64,

    #[serde(rename = "TLS", default)]
    pub tls: TlsSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub consumer: ConsumerSettings,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(rename = "gRPC", default)]
    pub grpc: GrpcSettings,

    #[serde(default)]
    pub commlog: CommlogSettings,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            ci_mode: false,
            graphical_popups: true,
            test_execution_logging: false,
            enable_message_encoding_check: true,
            summarize_message_encoding_errors: true,
            phase_settle_seconds: default_wait_seconds(),
            max_wait_seconds: default_wait_seconds(),
            tls: TlsSettings::default(),
            network: NetworkSettings::default(),
            consumer: ConsumerSettings::default(),
            provider: ProviderSettings::default(),
            grpc: GrpcSettings::default(),
            commlog: CommlogSettings::default(),
        }
    }
}

/// `[SDCcc.TLS]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct TlsSettings {
    pub file_directory: Option<PathBuf>,
    pub key_store_password: Option<String>,
    pub trust_store_password: Option<String>,
    pub participant_private_password: Option<String>,
    pub enabled_protocols: Vec<String>,
    pub enabled_ciphers: Vec<String>,
}

/// `[SDCcc.Network]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct NetworkSettings {
    pub interface_address: String,
    /// Seconds to wait for discovery responses
    pub max_wait: u64,
    #[serde(rename = "MulticastTTL")]
    pub multicast_ttl: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            interface_address: "127.0.0.1".to_string(),
            max_wait: default_wait_seconds(),
            multicast_ttl: 128,
        }
    }
}

/// `[SDCcc.Consumer]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct ConsumerSettings {
    pub enable: bool,
    pub device_epr: Option<String>,
    pub device_location_facility: Option<String>,
    pub device_location_building: Option<String>,
    pub device_location_point_of_care: Option<String>,
    pub device_location_floor: Option<String>,
    pub device_location_room: Option<String>,
    pub device_location_bed: Option<String>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            enable: true,
            device_epr: None,
            device_location_facility: None,
            device_location_building: None,
            device_location_point_of_care: None,
            device_location_floor: None,
            device_location_room: None,
            device_location_bed: None,
        }
    }
}

impl ConsumerSettings {
    /// Location parts that are set, as `key=value`
    pub fn location_filter(&self) -> Vec<String> {
        [
            ("fac", &self.device_location_facility),
            ("bldng", &self.device_location_building),
            ("poc", &self.device_location_point_of_care),
            ("flr", &self.device_location_floor),
            ("rm", &self.device_location_room),
            ("bed", &self.device_location_bed),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}={}", key, v)))
        .collect()
    }
}

/// `[SDCcc.Provider]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct ProviderSettings {
    pub enable: bool,
}

/// `[SDCcc.gRPC]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct GrpcSettings {
    pub server_address: String,
}

impl Default for GrpcSettings {
    fn default() -> Self {
        Self {
            server_address: "localhost:50051".to_string(),
        }
    }
}

/// `[SDCcc.Commlog]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "PascalCase")]
pub struct CommlogSettings {
    /// Messages buffered before the storage commits
    pub buffer_size: usize,
}

impl Default for CommlogSettings {
    fn default() -> Self {
        Self { buffer_size: 100 }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_wait_seconds() -> u64 {
    10
}

fn read(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::io(path, source))
}

impl ConfigFile {
    /// Load the suite configuration file
    pub fn load(path: &Path) -> CliResult<Self> {
        Self::parse(&read(path)?, path)
    }

    pub fn parse(text: &str, path: &Path) -> CliResult<Self> {
        toml::from_str(text).map_err(|source| CliError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn override_option(key: &str, target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        info!("Using {} from cli: {}", key, value);
        *target = Some(value.clone());
    }
}

impl SuiteSettings {
    /// Apply command line overrides
    pub fn apply_overrides(&mut self, cli: &Cli) {
        let consumer = &mut self.consumer;
        override_option("DeviceEpr", &mut consumer.device_epr, &cli.device_epr);
        override_option(
            "DeviceLocationFacility",
            &mut consumer.device_location_facility,
            &cli.device_facility,
        );
        override_option(
            "DeviceLocationBuilding",
            &mut consumer.device_location_building,
            &cli.device_building,
        );
        override_option(
            "DeviceLocationPointOfCare",
            &mut consumer.device_location_point_of_care,
            &cli.device_point_of_care,
        );
        override_option(
            "DeviceLocationFloor",
            &mut consumer.device_location_floor,
            &cli.device_floor,
        );
        override_option(
            "DeviceLocationRoom",
            &mut consumer.device_location_room,
            &cli.device_room,
        );
        override_option(
            "DeviceLocationBed",
            &mut consumer.device_location_bed,
            &cli.device_bed,
        );
        if let Some(address) = &cli.ip_address {
            info!("Using InterfaceAddress from cli: {}", address);
            self.network.interface_address = address.clone();
        }
    }

    /// Reject settings the suite cannot honour
    pub fn validate(&self) -> CliResult<()> {
        if self.provider.enable {
            return Err(CliError::Config(
                "Provider.Enable is set, but only the consumer role can be tested".into(),
            ));
        }
        if self.commlog.buffer_size == 0 {
            return Err(CliError::Config("Commlog.BufferSize must be at least 1".into()));
        }
        Ok(())
    }

    pub fn suite_config(&self, run_dir: &Path) -> SuiteConfig {
        SuiteConfig {
            consumer_enabled: self.consumer.enable,
            settle: Duration::from_secs(self.phase_settle_seconds),
            max_wait: Duration::from_secs(self.max_wait_seconds),
            test_execution_logging: self.test_execution_logging,
            summarize_encoding_errors: self.summarize_message_encoding_errors,
            run_dir: run_dir.to_path_buf(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            buffer_size: self.commlog.buffer_size,
            check_encoding: self.enable_message_encoding_check,
            summarize_encoding_errors: self.summarize_message_encoding_errors,
        }
    }

    pub fn device_config(&self) -> SimulatedDeviceConfig {
        let defaults = SimulatedDeviceConfig::default();
        SimulatedDeviceConfig {
            target_epr: self
                .consumer
                .device_epr
                .clone()
                .unwrap_or(defaults.target_epr),
            interface_address: self.network.interface_address.clone(),
            ..SimulatedDeviceConfig::default()
        }
    }

    /// Log the effective configuration, without secrets
    pub fn log_summary(&self) {
        info!(
            ci_mode = self.ci_mode,
            graphical_popups = self.graphical_popups && !self.ci_mode,
            settle_seconds = self.phase_settle_seconds,
            max_wait_seconds = self.max_wait_seconds,
            "Suite configuration"
        );
        info!(
            interface = %self.network.interface_address,
            discovery_wait_seconds = self.network.max_wait,
            multicast_ttl = self.network.multicast_ttl,
            grpc = %self.grpc.server_address,
            "Network configuration"
        );
        info!(
            directory = ?self.tls.file_directory,
            protocols = ?self.tls.enabled_protocols,
            ciphers = ?self.tls.enabled_ciphers,
            key_store_password = self.tls.key_store_password.is_some(),
            trust_store_password = self.tls.trust_store_password.is_some(),
            participant_private_password = self.tls.participant_private_password.is_some(),
            "TLS configuration"
        );
        info!(
            enabled = self.consumer.enable,
            epr = ?self.consumer.device_epr,
            location = ?self.consumer.location_filter(),
            "Consumer configuration"
        );
    }
}

/// Load the enabled-test configuration
///
/// Each table is a standard and each key a requirement, e.g. `[BICEPS]`
/// with `R0021 = true` enables `BICEPS.R0021`.
pub fn load_enabled_tests(path: &Path) -> CliResult<EnabledTests> {
    parse_enabled_tests(&read(path)?, path)
}

pub fn parse_enabled_tests(text: &str, path: &Path) -> CliResult<EnabledTests> {
    let tables: BTreeMap<String, BTreeMap<String, bool>> =
        toml::from_str(text).map_err(|source| CliError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
    let mut enabled = EnabledTests::new();
    for (standard, requirements) in tables {
        for (requirement, flag) in requirements {
            enabled.set(TestIdentifier::from_parts(&standard, &requirement)?, flag);
        }
    }
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(text: &str) -> CliResult<ConfigFile> {
        ConfigFile::parse(text, Path::new("config.toml"))
    }

    #[test]
    fn test_defaults() {
        let settings = parse("[SDCcc]\n").unwrap().sdccc;
        assert!(!settings.ci_mode);
        assert!(settings.graphical_popups);
        assert!(settings.enable_message_encoding_check);
        assert!(settings.summarize_message_encoding_errors);
        assert_eq!(settings.phase_settle_seconds, 10);
        assert_eq!(settings.network.interface_address, "127.0.0.1");
        assert_eq!(settings.network.multicast_ttl, 128);
        assert!(settings.consumer.enable);
        assert!(!settings.provider.enable);
        assert_eq!(settings.grpc.server_address, "localhost:50051");
        assert_eq!(settings.commlog.buffer_size, 100);
    }

    #[test]
    fn test_nested_tables() {
        let settings = parse(
            r#"
            [SDCcc]
            CIMode = true
            PhaseSettleSeconds = 0
            MaxWaitSeconds = 3

            [SDCcc.TLS]
            FileDirectory = "./configuration"
            EnabledProtocols = ["TLSv1.2", "TLSv1.3"]

            [SDCcc.Network]
            InterfaceAddress = "192.168.0.2"
            MulticastTTL = 4

            [SDCcc.Consumer]
            DeviceEpr = "urn:uuid:857bf583-8a51-475f-a77f-d0ca7de69b11"
            DeviceLocationBed = "Bed1"

            [SDCcc.gRPC]
            ServerAddress = "localhost:50052"

            [SDCcc.Commlog]
            BufferSize = 10
            "#,
        )
        .unwrap()
        .sdccc;

        assert!(settings.ci_mode);
        assert_eq!(settings.max_wait_seconds, 3);
        assert_eq!(settings.tls.enabled_protocols.len(), 2);
        assert_eq!(
            settings.tls.file_directory.as_deref(),
            Some(Path::new("./configuration"))
        );
        assert_eq!(settings.network.multicast_ttl, 4);
        assert_eq!(settings.consumer.location_filter(), vec!["bed=Bed1".to_string()]);
        assert_eq!(settings.grpc.server_address, "localhost:50052");

        let config = settings.suite_config(Path::new("run"));
        assert_eq!(config.settle, Duration::ZERO);
        assert_eq!(config.max_wait, Duration::from_secs(3));
        assert_eq!(settings.storage_config().buffer_size, 10);
        assert_eq!(
            settings.device_config().target_epr,
            "urn:uuid:857bf583-8a51-475f-a77f-d0ca7de69b11"
        );
        assert_eq!(settings.device_config().interface_address, "192.168.0.2");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            parse("[SDCcc]\nCiMode = true\n"),
            Err(CliError::Toml { .. })
        ));
        assert!(parse("[SDCcc.Network]\nInterface = \"x\"\n").is_err());
        assert!(parse("[Other]\n").is_err());
    }

    #[test]
    fn test_validation() {
        let mut settings = SuiteSettings::default();
        assert!(settings.validate().is_ok());
        settings.provider.enable = true;
        assert!(matches!(settings.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let mut settings = parse("[SDCcc.Consumer]\nDeviceEpr = \"urn:uuid:a\"\n")
            .unwrap()
            .sdccc;
        let cli = Cli::try_parse_from([
            "sdccc",
            "-c",
            "c.toml",
            "-t",
            "t.toml",
            "--device-epr",
            "urn:uuid:b",
            "--device-room",
            "Room2",
            "--ipaddress",
            "10.1.1.1",
        ])
        .unwrap();

        settings.apply_overrides(&cli);

        assert_eq!(settings.consumer.device_epr.as_deref(), Some("urn:uuid:b"));
        assert_eq!(settings.consumer.device_location_room.as_deref(), Some("Room2"));
        assert!(settings.consumer.device_location_bed.is_none());
        assert_eq!(settings.network.interface_address, "10.1.1.1");
    }

    #[test]
    fn test_enabled_tests_are_flattened() {
        let enabled = parse_enabled_tests(
            r#"
            [BICEPS]
            R0021 = true
            R5039 = false

            [DPWS]
            R0013 = true
            "#,
            Path::new("test_configuration.toml"),
        )
        .unwrap();

        assert_eq!(enabled.len(), 3);
        assert!(enabled.is_enabled(&TestIdentifier::parse("BICEPS.R0021").unwrap()));
        assert!(!enabled.is_enabled(&TestIdentifier::parse("BICEPS.R5039").unwrap()));
        assert!(enabled.is_enabled(&TestIdentifier::parse("DPWS.R0013").unwrap()));
        assert!(!enabled.is_enabled(&TestIdentifier::parse("GLUE.R0036").unwrap()));
    }

    #[test]
    fn test_enabled_tests_reject_non_boolean_values() {
        assert!(parse_enabled_tests("[DPWS]\nR0013 = \"yes\"\n", Path::new("t.toml")).is_err());
    }
}

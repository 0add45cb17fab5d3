//! On-disk configuration for the Dragino board
//!
//! The deployment file is flat TOML carrying the radio parameters, the
//! GPS serial settings and the activation material. Key material is
//! written as contiguous hex strings. After a successful OTAA join the
//! derived session (devaddr, nwkskey, appskey, fcount) is written back so
//! later runs skip the handshake.
//!
//! The uplink frame counter lives in its own file (`fcount_filename`): a
//! single decimal integer plus newline, rewritten in full after every
//! transmission hand-off so a crash cannot replay a counter value.

use core::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::device::{AESKey, AuthMode, DevAddr, EUI64};

/// Frame counter used when no persisted value can be read
pub const DEFAULT_FCOUNT: u32 = 1;

/// Configuration error
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read or written
    Io(std::io::Error),
    /// File is not valid TOML
    Parse(toml::de::Error),
    /// A field required by the configured auth mode is absent
    MissingField(&'static str),
    /// A field is present but unusable (bad hex, wrong length, unknown mode)
    InvalidField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config i/o error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
            ConfigError::MissingField(field) => write!(f, "missing required field {}", field),
            ConfigError::InvalidField(field) => write!(f, "invalid value for field {}", field),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// The file exactly as serialized; optional fields cover both auth modes
/// and the cached OTAA session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    gps_baud_rate: u32,
    gps_serial_port: String,
    gps_serial_timeout: u32,
    gps_wait_period: u32,
    spreading_factor: u8,
    max_power: String,
    output_power: String,
    sync_word: String,
    rx_crc: bool,
    fcount_filename: String,
    auth_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    devaddr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nwskey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    appskey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deveui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    appeui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    appkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nwkskey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fcount: Option<u32>,
}

/// Session cached in the config file after an OTAA join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    /// Assigned device address
    pub devaddr: DevAddr,
    /// Derived network session key
    pub nwkskey: AESKey,
    /// Derived application session key
    pub appskey: AESKey,
}

/// Activation material, by mode
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// Static session keys from the file
    Abp {
        /// Provisioned device address
        devaddr: DevAddr,
        /// Provisioned network session key
        nwskey: AESKey,
        /// Provisioned application session key
        appskey: AESKey,
    },
    /// Join material, plus the cached session of an earlier join if one
    /// was saved
    Otaa {
        /// Device EUI (logical big-endian)
        deveui: EUI64,
        /// Application EUI (logical big-endian)
        appeui: EUI64,
        /// Root application key
        appkey: AESKey,
        /// Session written back by a previous join, if any
        session: Option<CachedSession>,
    },
}

/// Parsed board configuration
#[derive(Debug, Clone)]
pub struct DraginoConfig {
    path: PathBuf,
    raw: RawConfig,
    /// GPS serial baud rate
    pub gps_baud_rate: u32,
    /// GPS serial device path
    pub gps_serial_port: String,
    /// GPS serial read timeout in seconds
    pub gps_serial_timeout: u32,
    /// How long to wait for a GPS fix in seconds
    pub gps_wait_period: u32,
    /// LoRa spreading factor (7-12)
    pub spreading_factor: u8,
    /// PA max power register nibble
    pub max_power: u8,
    /// PA output power register nibble
    pub output_power: u8,
    /// LoRa sync word (0x34 for public networks)
    pub sync_word: u8,
    /// Whether the receiver checks payload CRCs
    pub rx_crc: bool,
    /// Path of the frame-counter file
    pub fcount_filename: PathBuf,
    /// Activation material
    pub auth: AuthConfig,
}

fn parse_hex_byte(value: &str, field: &'static str) -> Result<u8, ConfigError> {
    u8::from_str_radix(value.trim().trim_start_matches("0x"), 16)
        .map_err(|_| ConfigError::InvalidField(field))
}

fn parse_hex<const N: usize>(value: &str, field: &'static str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(value.trim()).map_err(|_| ConfigError::InvalidField(field))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidField(field))
}

fn require<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::MissingField(field))
}

impl DraginoConfig {
    /// Load and validate the configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let raw: RawConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

        let auth = match raw.auth_mode.to_uppercase().as_str() {
            "ABP" => {
                info!("using ABP mode");
                AuthConfig::Abp {
                    devaddr: DevAddr::new(parse_hex(require(&raw.devaddr, "devaddr")?, "devaddr")?),
                    nwskey: AESKey::new(parse_hex(require(&raw.nwskey, "nwskey")?, "nwskey")?),
                    appskey: AESKey::new(parse_hex(require(&raw.appskey, "appskey")?, "appskey")?),
                }
            }
            "OTAA" => {
                info!("using OTAA mode");
                let session = match (&raw.devaddr, &raw.nwkskey, &raw.appskey) {
                    (Some(devaddr), Some(nwkskey), Some(appskey)) => Some(CachedSession {
                        devaddr: DevAddr::new(parse_hex(devaddr, "devaddr")?),
                        nwkskey: AESKey::new(parse_hex(nwkskey, "nwkskey")?),
                        appskey: AESKey::new(parse_hex(appskey, "appskey")?),
                    }),
                    _ => {
                        debug!("no cached session details");
                        None
                    }
                };
                AuthConfig::Otaa {
                    deveui: parse_hex(require(&raw.deveui, "deveui")?, "deveui")?,
                    appeui: parse_hex(require(&raw.appeui, "appeui")?, "appeui")?,
                    appkey: AESKey::new(parse_hex(require(&raw.appkey, "appkey")?, "appkey")?),
                    session,
                }
            }
            _ => return Err(ConfigError::InvalidField("auth_mode")),
        };

        Ok(Self {
            path: path.to_path_buf(),
            gps_baud_rate: raw.gps_baud_rate,
            gps_serial_port: raw.gps_serial_port.clone(),
            gps_serial_timeout: raw.gps_serial_timeout,
            gps_wait_period: raw.gps_wait_period,
            spreading_factor: raw.spreading_factor,
            max_power: parse_hex_byte(&raw.max_power, "max_power")?,
            output_power: parse_hex_byte(&raw.output_power, "output_power")?,
            sync_word: parse_hex_byte(&raw.sync_word, "sync_word")?,
            rx_crc: raw.rx_crc,
            fcount_filename: PathBuf::from(&raw.fcount_filename),
            auth,
            raw,
        })
    }

    /// The configured activation mode
    pub fn auth_mode(&self) -> AuthMode {
        match self.auth {
            AuthConfig::Abp { .. } => AuthMode::Abp,
            AuthConfig::Otaa { .. } => AuthMode::Otaa,
        }
    }

    /// True when session keys are available without a join handshake
    pub fn joined(&self) -> bool {
        match &self.auth {
            AuthConfig::Abp { .. } => true,
            AuthConfig::Otaa { session, .. } => session.is_some(),
        }
    }

    /// Read the persisted frame counter
    ///
    /// Falls back to the value cached in the config file, then to
    /// [`DEFAULT_FCOUNT`], when the counter file is absent or unreadable.
    pub fn read_fcount(&self) -> u32 {
        match fs::read_to_string(&self.fcount_filename) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(fcount) => {
                    debug!("frame count {} read from {:?}", fcount, self.fcount_filename);
                    fcount
                }
                Err(_) => {
                    warn!("unparsable frame count file, resetting count");
                    DEFAULT_FCOUNT
                }
            },
            Err(_) => {
                let fcount = self.raw.fcount.unwrap_or(DEFAULT_FCOUNT);
                warn!("no frame count file, starting at {}", fcount);
                fcount
            }
        }
    }

    /// Persist the frame counter: truncate and rewrite the counter file
    /// with the decimal value plus newline
    ///
    /// Failures are logged and otherwise ignored; losing a counter write
    /// must never take the link down.
    pub fn save_fcount(&mut self, fcount: u32) {
        self.raw.fcount = Some(fcount);
        if let Err(err) = fs::write(&self.fcount_filename, format!("{}\n", fcount)) {
            warn!(
                "unable to persist frame count to {:?}: {}",
                self.fcount_filename, err
            );
        }
    }

    /// Write the derived OTAA session back to the config file and persist
    /// the reset frame counter
    pub fn save_credentials(
        &mut self,
        devaddr: DevAddr,
        nwkskey: &AESKey,
        appskey: &AESKey,
        fcount: u32,
    ) -> Result<(), ConfigError> {
        if let AuthConfig::Otaa { session, .. } = &mut self.auth {
            *session = Some(CachedSession {
                devaddr,
                nwkskey: nwkskey.clone(),
                appskey: appskey.clone(),
            });
        }
        self.raw.devaddr = Some(hex::encode_upper(devaddr.as_bytes()));
        self.raw.nwkskey = Some(hex::encode_upper(nwkskey.as_bytes()));
        self.raw.appskey = Some(hex::encode_upper(appskey.as_bytes()));
        self.save_fcount(fcount);
        self.save()
    }

    fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string(&self.raw)
            .map_err(|_| ConfigError::InvalidField("configuration not serializable"))?;
        fs::write(&self.path, content)?;
        debug!("configuration written back to {:?}", self.path);
        Ok(())
    }
}

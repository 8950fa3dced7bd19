//! # Connection profile
//!
//! Decides how the robot connects to the messaging service. Without a device configuration the
//! robot connects anonymously to the public quickstart service, publishing telemetry only. With a
//! configuration it connects as a registered device over TLS and also accepts commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{collections::HashMap, fmt, fs, io, path::Path};

use comms_if::net::{ConnectParams, Credentials, NetParams};
use util::host::HostError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

pub const ANONYMOUS_ORG: &str = "quickstart";
pub const ANONYMOUS_DEVICE_TYPE: &str = "iotsample-pcduino";
pub const ANONYMOUS_HOST: &str = "quickstart.messaging.internetofthings.ibmcloud.com";

/// Appended to the organisation id to get a registered device's host.
pub const REGISTERED_HOST_SUFFIX: &str = ".messaging.internetofthings.ibmcloud.com";

pub const USER_PORT: u16 = 1883;
pub const SECURE_PORT: u16 = 8883;

/// Role prefix of the client id, `d` for devices.
const CLIENT_ROLE: &str = "d";

const REGISTERED_USERNAME: &str = "use-token-auth";

const SUPPORTED_AUTH_METHOD: &str = "token";

const DASHBOARD_URL_BASE: &str = "http://quickstart.internetofthings.ibmcloud.com/#/device/";

/// Keys a device configuration must contain, in the order they are checked.
pub const REQUIRED_KEYS: [&str; 5] = ["org", "type", "id", "auth-token", "auth-method"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Resolved connection settings, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub mode: ConnectionMode,
    pub host: String,
    pub user_port: u16,
    pub secure_port: u16,
    pub org_id: String,
    pub device_type: String,
    pub device_id: String,

    /// Present only in registered mode.
    pub credentials: Option<Credentials>,

    pub use_encryption: bool,
}

/// Flat key/value device configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceConfig {
    values: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Shared demo identity, telemetry only.
    Anonymous,

    /// Private authenticated identity, telemetry and commands.
    Registered,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("The device configuration is missing the \"{0}\" field")]
    MissingField(&'static str),

    #[error("Unsupported auth method \"{0}\", only \"token\" is supported")]
    UnsupportedAuthMethod(String),

    #[error("Could not determine the anonymous device id: {0}")]
    DeviceIdUnavailable(HostError),

    #[error("Could not load the device configuration: {0}")]
    ConfigLoadError(io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ConnectionProfile {
    /// Resolve the profile from an optional device configuration.
    ///
    /// `discover_device_id` is only called in anonymous mode, where the device id comes from the
    /// host's hardware address.
    pub fn resolve<F>(
        config: Option<&DeviceConfig>, 
        discover_device_id: F
    ) -> Result<Self, ProfileError>
    where
        F: FnOnce() -> Result<String, HostError>
    {
        match config {
            None => {
                let device_id = discover_device_id()
                    .map_err(ProfileError::DeviceIdUnavailable)?;

                Ok(Self {
                    mode: ConnectionMode::Anonymous,
                    host: ANONYMOUS_HOST.into(),
                    user_port: USER_PORT,
                    secure_port: SECURE_PORT,
                    org_id: ANONYMOUS_ORG.into(),
                    device_type: ANONYMOUS_DEVICE_TYPE.into(),
                    device_id,
                    credentials: None,
                    use_encryption: false,
                })
            },
            Some(cfg) => {
                // Check every required key before using any of them
                for key in REQUIRED_KEYS.iter() {
                    cfg.require(key)?;
                }

                let auth_method = cfg.require("auth-method")?;
                if auth_method != SUPPORTED_AUTH_METHOD {
                    return Err(ProfileError::UnsupportedAuthMethod(auth_method.into()))
                }

                let org_id = cfg.require("org")?.to_string();

                Ok(Self {
                    mode: ConnectionMode::Registered,
                    host: format!("{}{}", org_id, REGISTERED_HOST_SUFFIX),
                    user_port: USER_PORT,
                    secure_port: SECURE_PORT,
                    device_type: cfg.require("type")?.into(),
                    device_id: cfg.require("id")?.into(),
                    credentials: Some(Credentials {
                        username: REGISTERED_USERNAME.into(),
                        auth_token: cfg.require("auth-token")?.into(),
                    }),
                    org_id,
                    use_encryption: true,
                })
            }
        }
    }

    /// Client id presented to the server, `d:<org>:<type>:<id>`.
    pub fn client_id(&self) -> String {
        format!(
            "{}:{}:{}:{}", 
            CLIENT_ROLE, 
            self.org_id, 
            self.device_type, 
            self.device_id
        )
    }

    /// Port to connect to, the secure port if the connection is encrypted.
    pub fn port(&self) -> u16 {
        if self.use_encryption {
            self.secure_port
        }
        else {
            self.user_port
        }
    }

    /// Build the transport connection parameters for this profile.
    pub fn connect_params(&self, net_params: &NetParams) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            port: self.port(),
            client_id: self.client_id(),
            keep_alive: std::time::Duration::from_secs(net_params.keep_alive_s),
            connect_timeout: util::time::secs_to_duration(net_params.connect_timeout_s),
            request_capacity: net_params.request_capacity,
            credentials: self.credentials.clone(),
            tls_ca_paths: match self.use_encryption {
                true => Some(net_params.ca_cert_paths.clone()),
                false => None
            },
            reconnect: net_params.reconnect,
        }
    }

    /// Public dashboard showing this device's telemetry, anonymous mode only.
    pub fn dashboard_url(&self) -> Option<String> {
        match self.mode {
            ConnectionMode::Anonymous => Some(format!(
                "{}{}/sensor/", 
                DASHBOARD_URL_BASE, 
                self.device_id
            )),
            ConnectionMode::Registered => None
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Anonymous => write!(f, "anonymous"),
            ConnectionMode::Registered => write!(f, "registered"),
        }
    }
}

impl DeviceConfig {
    /// Load the configuration file at the given path.
    ///
    /// A missing file is not an error, it means the device is unregistered and `None` is
    /// returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ProfileError> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(Self::parse(&s))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProfileError::ConfigLoadError(e))
        }
    }

    /// Parse a configuration in properties syntax.
    ///
    /// Each line is `key=value` (or `key: value`), blank lines and lines starting with `#` or `!`
    /// are skipped. Keys and values are trimmed and values are never quoted, so everything after
    /// the first separator belongs to the value. A line without a separator is a key with an
    /// empty value.
    pub fn parse(config_str: &str) -> Self {
        config_str
            .lines()
            .map(str::trim)
            .filter(|l| !(l.is_empty() || l.starts_with('#') || l.starts_with('!')))
            .map(|l| match l.find(|c: char| c == '=' || c == ':') {
                Some(i) => (l[..i].trim(), l[i + 1..].trim()),
                None => (l, "")
            })
            .collect()
    }

    /// Get a value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Get a value that must be present and non-empty.
    fn require(&self, key: &'static str) -> Result<&str, ProfileError> {
        match self.get(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ProfileError::MissingField(key))
        }
    }
}

impl<K, V> std::iter::FromIterator<(K, V)> for DeviceConfig 
where
    K: Into<String>,
    V: Into<String>
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn full_config() -> Vec<(&'static str, &'static str)> {
        vec![
            ("org", "a1b2c3"),
            ("type", "pcduino"),
            ("id", "robot01"),
            ("auth-token", "s3cret"),
            ("auth-method", "token"),
        ]
    }

    fn no_mac() -> Result<String, HostError> {
        Err(HostError::NoHardwareAddress)
    }

    #[test]
    fn test_missing_field_reported() {
        for missing in REQUIRED_KEYS.iter() {
            let cfg: DeviceConfig = full_config()
                .into_iter()
                .filter(|(k, _)| k != missing)
                .collect();

            match ConnectionProfile::resolve(Some(&cfg), no_mac) {
                Err(ProfileError::MissingField(f)) => assert_eq!(&f, missing),
                r => panic!("Expected missing {}, got {:?}", missing, r)
            }
        }
    }

    #[test]
    fn test_empty_field_is_missing() {
        let cfg: DeviceConfig = full_config()
            .into_iter()
            .map(|(k, v)| if k == "auth-token" { (k, "") } else { (k, v) })
            .collect();

        match ConnectionProfile::resolve(Some(&cfg), no_mac) {
            Err(ProfileError::MissingField("auth-token")) => (),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_first_missing_field_reported() {
        let cfg: DeviceConfig = vec![("id", "robot01")].into_iter().collect();

        match ConnectionProfile::resolve(Some(&cfg), no_mac) {
            Err(ProfileError::MissingField("org")) => (),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_unsupported_auth_method() {
        let cfg: DeviceConfig = full_config()
            .into_iter()
            .map(|(k, v)| if k == "auth-method" { (k, "cert") } else { (k, v) })
            .collect();

        match ConnectionProfile::resolve(Some(&cfg), no_mac) {
            Err(ProfileError::UnsupportedAuthMethod(m)) => assert_eq!(m, "cert"),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_registered() {
        let cfg: DeviceConfig = full_config().into_iter().collect();

        let mut mac_called = false;
        let profile = ConnectionProfile::resolve(Some(&cfg), || {
            mac_called = true;
            no_mac()
        }).unwrap();

        assert!(!mac_called);
        assert_eq!(profile.mode, ConnectionMode::Registered);
        assert!(profile.use_encryption);
        assert_eq!(profile.host, "a1b2c3.messaging.internetofthings.ibmcloud.com");
        assert_eq!(profile.client_id(), "d:a1b2c3:pcduino:robot01");
        assert_eq!(profile.port(), 8883);
        assert_eq!(
            profile.credentials,
            Some(Credentials {
                username: "use-token-auth".into(),
                auth_token: "s3cret".into()
            })
        );
        assert_eq!(profile.dashboard_url(), None);
    }

    #[test]
    fn test_anonymous() {
        let profile = ConnectionProfile::resolve(None, || Ok("b827eb010203".into())).unwrap();

        assert_eq!(profile.mode, ConnectionMode::Anonymous);
        assert!(!profile.use_encryption);
        assert!(profile.credentials.is_none());
        assert_eq!(profile.host, ANONYMOUS_HOST);
        assert_eq!(profile.port(), 1883);
        assert_eq!(profile.client_id(), "d:quickstart:iotsample-pcduino:b827eb010203");
        assert_eq!(
            profile.dashboard_url().unwrap(),
            "http://quickstart.internetofthings.ibmcloud.com/#/device/b827eb010203/sensor/"
        );
    }

    #[test]
    fn test_anonymous_without_mac() {
        match ConnectionProfile::resolve(None, no_mac) {
            Err(ProfileError::DeviceIdUnavailable(HostError::NoHardwareAddress)) => (),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_connect_params() {
        let net_params = NetParams {
            keep_alive_s: 30,
            connect_timeout_s: 10.0,
            ca_cert_paths: vec!["IoTFoundation.pem".into(), "IoTFoundation-CA.pem".into()],
            request_capacity: 10,
            reconnect: None,
        };

        let anon = ConnectionProfile::resolve(None, || Ok("b827eb010203".into())).unwrap();
        let cp = anon.connect_params(&net_params);
        assert_eq!(cp.port, 1883);
        assert_eq!(cp.keep_alive, std::time::Duration::from_secs(30));
        assert!(cp.tls_ca_paths.is_none());
        assert!(cp.credentials.is_none());

        let cfg: DeviceConfig = full_config().into_iter().collect();
        let reg = ConnectionProfile::resolve(Some(&cfg), no_mac).unwrap();
        let cp = reg.connect_params(&net_params);
        assert_eq!(cp.port, 8883);
        assert_eq!(cp.client_id, "d:a1b2c3:pcduino:robot01");
        assert_eq!(cp.tls_ca_paths.unwrap().len(), 2);
    }

    #[test]
    fn test_parse_properties() {
        let cfg = DeviceConfig::parse(
            "# Registered device\n\
             org=a1b2c3\n\
             type = pcduino\n\
             \n\
             id:b827eb010203\n\
             auth-method=token\n\
             auth-token=AbC-123_x!=:\n\
             ! legacy comment\n\
             flag\n"
        );

        assert_eq!(cfg.get("org"), Some("a1b2c3"));
        assert_eq!(cfg.get("type"), Some("pcduino"));
        assert_eq!(cfg.get("id"), Some("b827eb010203"));
        assert_eq!(cfg.get("auth-token"), Some("AbC-123_x!=:"));
        assert_eq!(cfg.get("flag"), Some(""));
        assert_eq!(cfg.get("! legacy comment"), None);

        let profile = ConnectionProfile::resolve(Some(&cfg), no_mac).unwrap();
        assert_eq!(profile.mode, ConnectionMode::Registered);
        assert_eq!(profile.client_id(), "d:a1b2c3:pcduino:b827eb010203");
    }

    #[test]
    fn test_load_properties_file() {
        let path = std::env::temp_dir().join(format!(
            "robot_exec_device_{}.cfg", 
            std::process::id()
        ));
        std::fs::write(
            &path,
            "org=a1b2c3\ntype=pcduino\nid=b827eb010203\nauth-method=token\nauth-token=AbC-123_x!\n"
        ).unwrap();

        let cfg = DeviceConfig::load(&path);
        std::fs::remove_file(&path).ok();

        let cfg = cfg.unwrap().unwrap();
        let profile = ConnectionProfile::resolve(Some(&cfg), no_mac).unwrap();
        assert!(profile.use_encryption);
        assert_eq!(
            profile.credentials.unwrap().auth_token,
            "AbC-123_x!"
        );
    }

    #[test]
    fn test_unreadable_config_is_fatal() {
        // A directory exists but can't be read as a file
        match DeviceConfig::load(std::env::temp_dir()) {
            Err(ProfileError::ConfigLoadError(_)) => (),
            r => panic!("Unexpected {:?}", r)
        }
    }

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("robot_exec_no_such_device.cfg");
        assert!(DeviceConfig::load(&path).unwrap().is_none());
    }
}

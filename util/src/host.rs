//! Host platform (linux for example) utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "ROBOT_SW_ROOT";

/// Directory in which the kernel exposes network interfaces.
const SYS_CLASS_NET: &str = "/sys/class/net";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while querying the host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable ({0}) is not set")]
    SwRootNotSet(&'static str),

    #[error("Cannot list the network interfaces: {0}")]
    InterfaceListError(std::io::Error),

    #[error("No network interface with a hardware address was found")]
    NoHardwareAddress,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the software from the environment.
pub fn get_sw_root() -> Result<PathBuf, HostError> {
    std::env::var_os(SW_ROOT_ENV_VAR)
        .map(PathBuf::from)
        .ok_or(HostError::SwRootNotSet(SW_ROOT_ENV_VAR))
}

/// Get the hardware (MAC) address of the first non-loopback network interface.
///
/// The address is returned in lower case with the `:` separators removed, so
/// `B8:27:EB:01:02:03` becomes `b827eb010203`.
pub fn get_mac_address() -> Result<String, HostError> {
    find_mac_address(Path::new(SYS_CLASS_NET))
}

/// Normalise a textual hardware address, returning `None` for the all-zero
/// address or anything that isn't six hex octets.
pub fn normalise_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.trim().split(|c: char| c == ':' || c == '-').collect();

    if octets.len() != 6
        || octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }

    let mac = octets.concat().to_ascii_lowercase();

    if mac.chars().all(|c| c == '0') {
        None
    } else {
        Some(mac)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn find_mac_address(net_dir: &Path) -> Result<String, HostError> {
    let mut ifaces: Vec<PathBuf> = fs::read_dir(net_dir)
        .map_err(HostError::InterfaceListError)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.file_name().map(|n| n != "lo").unwrap_or(false))
        .collect();

    // Sort so the same interface is picked on every start
    ifaces.sort();

    ifaces
        .iter()
        .filter_map(|p| fs::read_to_string(p.join("address")).ok())
        .find_map(|a| normalise_mac(&a))
        .ok_or(HostError::NoHardwareAddress)
}

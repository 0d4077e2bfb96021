//! Device load parameters.
//!
//! A device is configured once, when it is created. Parameters arrive as a
//! whitespace-separated list of `key=value` pairs:
//!
//! ```text
//! capacity_mib=64 name=sbdd
//! ```
//!
//! Nothing here can change after the device exists.

use sbd_error::{Result, SbdError};
use sbd_types::{Capacity, DEFAULT_CAPACITY_MIB, DEVICE_NAME};
use serde::{Deserialize, Serialize};

/// Longest disk name a host will accept.
pub const MAX_NAME_LEN: usize = 31;

/// Creation parameters for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name the disk is published under.
    pub name: String,
    /// Capacity in MiB.
    pub capacity_mib: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME.to_owned(),
            capacity_mib: DEFAULT_CAPACITY_MIB,
        }
    }
}

impl DeviceConfig {
    #[must_use]
    pub fn with_capacity_mib(mut self, capacity_mib: u64) -> Self {
        self.capacity_mib = capacity_mib;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Parse load parameters on top of the defaults.
    ///
    /// Keys are `capacity_mib` and `name`. A later occurrence of a key
    /// overrides an earlier one.
    pub fn from_params(params: &str) -> Result<Self> {
        let mut config = Self::default();
        for pair in params.split_whitespace() {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                SbdError::InvalidConfig(format!("expected key=value, got {pair:?}"))
            })?;
            match key {
                "capacity_mib" => {
                    config.capacity_mib = value.parse().map_err(|_| {
                        SbdError::InvalidConfig(format!(
                            "capacity_mib: not an unsigned integer: {value:?}"
                        ))
                    })?;
                }
                "name" => config.name = value.to_owned(),
                _ => {
                    return Err(SbdError::InvalidConfig(format!(
                        "unknown parameter {key:?}"
                    )));
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the name and capacity.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        self.capacity().map(|_| ())
    }

    /// Validated capacity.
    pub fn capacity(&self) -> Result<Capacity> {
        Capacity::from_mib(self.capacity_mib)
            .map_err(|err| SbdError::InvalidConfig(err.to_string()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SbdError::InvalidConfig("name cannot be empty".to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(SbdError::InvalidConfig(format!(
            "name longer than {MAX_NAME_LEN} bytes: {name:?}"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(SbdError::InvalidConfig(format!(
            "name may only contain [A-Za-z0-9_-]: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_driver() {
        let config = DeviceConfig::default();
        assert_eq!(config.name, "sbdd");
        assert_eq!(config.capacity_mib, 100);
        assert_eq!(config.capacity().expect("capacity").sectors(), 100 * 2048);
    }

    #[test]
    fn empty_params_give_defaults() {
        assert_eq!(
            DeviceConfig::from_params("").expect("empty"),
            DeviceConfig::default()
        );
        assert_eq!(
            DeviceConfig::from_params("  \t ").expect("blank"),
            DeviceConfig::default()
        );
    }

    #[test]
    fn params_override_defaults() {
        let config = DeviceConfig::from_params("capacity_mib=4 name=ram0").expect("parse");
        assert_eq!(config.capacity_mib, 4);
        assert_eq!(config.name, "ram0");

        let config = DeviceConfig::from_params("capacity_mib=4 capacity_mib=8").expect("parse");
        assert_eq!(config.capacity_mib, 8);
    }

    #[test]
    fn malformed_params_are_rejected() {
        for params in [
            "capacity_mib",
            "capacity_mib=",
            "capacity_mib=-1",
            "capacity_mib=ten",
            "capacity_mib=0",
            "size=10",
            "name=",
            "name=has/slash",
            "name=abcdefghijklmnopqrstuvwxyz0123456",
        ] {
            assert!(
                matches!(
                    DeviceConfig::from_params(params),
                    Err(SbdError::InvalidConfig(_))
                ),
                "{params:?} should be rejected"
            );
        }
    }

    #[test]
    fn overflowing_capacity_is_invalid() {
        let config = DeviceConfig::default().with_capacity_mib(u64::MAX);
        assert!(matches!(config.capacity(), Err(SbdError::InvalidConfig(_))));
    }

    #[test]
    fn serde_round_trip() {
        let config = DeviceConfig::default().with_name("ram1").with_capacity_mib(2);
        let json = serde_json::to_string(&config).expect("serialize");
        let back: DeviceConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }
}

//! # IPC Configuration

use core::time::Duration;

/// Default reply timeout
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_millis(500);
/// Default firmware boot timeout
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Transaction engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcConfig {
    /// How long a caller waits for a reply
    pub tx_timeout: Duration,
    /// How long boot waits for the firmware-ready notification
    pub boot_timeout: Duration,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            tx_timeout: DEFAULT_TX_TIMEOUT,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
        }
    }
}

impl IpcConfig {
    /// cAVS class devices
    pub fn cavs() -> Self {
        Self::default()
    }

    /// Meteor Lake class devices
    pub fn meteorlake() -> Self {
        Self {
            tx_timeout: Duration::from_millis(500),
            boot_timeout: Duration::from_millis(3000),
        }
    }

    /// Override the reply timeout
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = timeout;
        self
    }

    /// Override the boot timeout
    pub fn with_boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IpcConfig::default();
        assert_eq!(config.tx_timeout, Duration::from_millis(500));
        assert!(config.boot_timeout > config.tx_timeout);
    }

    #[test]
    fn test_builders() {
        let config = IpcConfig::meteorlake().with_tx_timeout(Duration::from_millis(20));
        assert_eq!(config.tx_timeout, Duration::from_millis(20));
        assert_eq!(config.boot_timeout, IpcConfig::meteorlake().boot_timeout);
    }
}

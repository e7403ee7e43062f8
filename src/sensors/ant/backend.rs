//! Radio backend capability.
//!
//! The ANT driver is not part of this crate. It is reached through the
//! [`AntNode`] and [`AntChannel`] traits, and resolved once at start-up into
//! a [`RadioBackend`] by [`probe`].

use super::AntError;
use std::sync::Arc;

/// Callback invoked on the driver's I/O thread for broadcast and burst data.
pub type DataHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// ANT channel type used when allocating a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Slave channel that can also send acknowledged data
    BidirectionalReceive,
    /// Receive-only channel, used for continuous scan
    UnidirectionalReceiveOnly,
}

/// Status of an ANT+ channel as reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Channel is unassigned
    Unassigned,
    /// Channel is assigned but not open
    Assigned,
    /// Channel is open and searching for its device
    Searching,
    /// Channel is open and receiving data
    Tracking,
}

impl ChannelStatus {
    /// Decode the state field of a channel status response.
    pub fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => ChannelStatus::Unassigned,
            1 => ChannelStatus::Assigned,
            2 => ChannelStatus::Searching,
            _ => ChannelStatus::Tracking,
        }
    }

    /// Check if channel is open (searching or tracking)
    pub fn is_open(&self) -> bool {
        matches!(self, ChannelStatus::Searching | ChannelStatus::Tracking)
    }

    /// Check if channel is closed
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }
}

/// Driver timing hint: how long the driver waits for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Configuration commands in flight
    Action,
    /// Normal periodic reception
    Period,
    /// Continuous scan mode
    Scan,
}

/// One radio channel.
///
/// Every call is a blocking command/response exchange with the radio.
pub trait AntChannel: Send + Sync {
    /// Channel number on the radio
    fn number(&self) -> u8;

    fn set_id(&self, device_id: u16, device_type: u8, transmission_type: u8)
        -> Result<(), AntError>;

    fn set_period(&self, period: u16) -> Result<(), AntError>;

    fn set_search_timeout(&self, timeout: u8) -> Result<(), AntError>;

    fn set_low_priority_search_timeout(&self, timeout: u8) -> Result<(), AntError>;

    fn set_rf_freq(&self, frequency: u8) -> Result<(), AntError>;

    fn open(&self) -> Result<(), AntError>;

    fn close(&self) -> Result<(), AntError>;

    fn status(&self) -> Result<ChannelStatus, AntError>;
}

/// The ANT node (USB stick or equivalent).
pub trait AntNode: Send + Sync {
    fn set_network_key(&self, network: u8, key: [u8; 8]) -> Result<(), AntError>;

    /// Allocate a channel. `for_search` reserves a channel suitable for
    /// wildcard searches.
    fn new_channel(
        &self,
        channel_type: ChannelType,
        for_search: bool,
        on_data: DataHandler,
    ) -> Result<Box<dyn AntChannel>, AntError>;

    /// Include the channel id in every received message
    fn set_extended_messages(&self, enabled: bool) -> Result<(), AntError>;

    fn set_lib_config(&self, flags: u8) -> Result<(), AntError>;

    /// Put the radio into continuous scan mode
    fn continuous_scan(&self) -> Result<(), AntError>;

    fn set_wait_mode(&self, _mode: WaitMode) {}

    /// Start delivering events
    fn start(&self) -> Result<(), AntError>;

    fn stop(&self) -> Result<(), AntError>;
}

/// The radio resolved at start-up.
#[derive(Clone)]
pub enum RadioBackend {
    /// A working ANT node
    Real(Arc<dyn AntNode>),
    /// No radio; readings are simulated or absent
    Simulated,
}

impl RadioBackend {
    pub fn is_simulated(&self) -> bool {
        matches!(self, RadioBackend::Simulated)
    }

    pub fn node(&self) -> Option<&Arc<dyn AntNode>> {
        match self {
            RadioBackend::Real(node) => Some(node),
            RadioBackend::Simulated => None,
        }
    }
}

impl std::fmt::Debug for RadioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadioBackend::Real(_) => write!(f, "RadioBackend::Real"),
            RadioBackend::Simulated => write!(f, "RadioBackend::Simulated"),
        }
    }
}

/// Probe for a radio once at start-up.
///
/// A disabled ANT+ setting or a failing driver lookup falls back to
/// [`RadioBackend::Simulated`]; this never fails.
pub fn probe<F>(enabled: bool, find_driver: F) -> RadioBackend
where
    F: FnOnce() -> Result<Arc<dyn AntNode>, AntError>,
{
    if !enabled {
        tracing::info!("ANT+ disabled in settings, using simulated backend");
        return RadioBackend::Simulated;
    }

    match find_driver() {
        Ok(node) => match node.set_network_key(super::NETWORK_NUMBER, super::NETWORK_KEY) {
            Ok(()) => {
                tracing::info!("ANT+ backend available");
                RadioBackend::Real(node)
            }
            Err(e) => {
                tracing::warn!("ANT+ network key rejected, using simulated backend: {}", e);
                RadioBackend::Simulated
            }
        },
        Err(e) => {
            tracing::info!("ANT+ : {} (using simulated backend)", e);
            RadioBackend::Simulated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ant::MockNode;

    #[test]
    fn test_channel_status_codes() {
        assert_eq!(ChannelStatus::from_code(0), ChannelStatus::Unassigned);
        assert!(ChannelStatus::from_code(1).is_closed());
        assert!(ChannelStatus::from_code(2).is_open());
        assert!(ChannelStatus::from_code(3).is_open());
    }

    #[test]
    fn test_probe_disabled() {
        let backend = probe(false, || Ok(Arc::new(MockNode::new()) as Arc<dyn AntNode>));
        assert!(backend.is_simulated());
    }

    #[test]
    fn test_probe_driver_missing() {
        let backend = probe(true, || Err(AntError::BackendUnavailable("no stick".into())));
        assert!(backend.is_simulated());
        assert!(backend.node().is_none());
    }

    #[test]
    fn test_probe_real() {
        let node = Arc::new(MockNode::new());
        let handle = Arc::clone(&node);
        let backend = probe(true, move || Ok(handle as Arc<dyn AntNode>));
        assert!(!backend.is_simulated());
        assert_eq!(node.network_key(), Some(super::super::NETWORK_KEY));
    }
}

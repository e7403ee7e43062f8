//! Mock ANT node for testing.
//!
//! [`MockNode`] implements [`AntNode`] entirely in memory so that channel
//! lifecycle, scanning and searching can be exercised without a USB stick.
//!
//! # Features
//!
//! - **Payload injection**: deliver broadcast data to any allocated channel
//! - **Failure injection**: make open/close/allocation fail
//! - **Counters**: observe how often each channel was opened and closed

use super::backend::{AntChannel, AntNode, ChannelStatus, ChannelType, DataHandler, WaitMode};
use super::AntError;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Configuration last applied to a mock channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockChannelConfig {
    pub device_id: u16,
    pub device_type: u8,
    pub transmission_type: u8,
    pub period: Option<u16>,
    pub search_timeout: Option<u8>,
    pub low_priority_search_timeout: Option<u8>,
    pub rf_frequency: Option<u8>,
}

struct MockChannelState {
    number: u8,
    channel_type: ChannelType,
    for_search: bool,
    status: Mutex<ChannelStatus>,
    config: Mutex<MockChannelConfig>,
    on_data: DataHandler,
    open_count: AtomicU32,
    close_count: AtomicU32,
}

/// Channel handed out by [`MockNode::new_channel`].
struct MockChannel {
    state: Arc<MockChannelState>,
    fail_commands: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
}

impl MockChannel {
    fn check(&self, operation: &'static str) -> Result<(), AntError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(AntError::channel(operation, "mock failure"))
        } else {
            Ok(())
        }
    }

    fn configure(&self, f: impl FnOnce(&mut MockChannelConfig)) -> Result<(), AntError> {
        let mut config = self
            .state
            .config
            .lock()
            .map_err(|_| AntError::channel("configure", "poisoned"))?;
        f(&mut config);
        Ok(())
    }
}

impl AntChannel for MockChannel {
    fn number(&self) -> u8 {
        self.state.number
    }

    fn set_id(&self, device_id: u16, device_type: u8, transmission_type: u8) -> Result<(), AntError> {
        self.check("set_id")?;
        self.configure(|c| {
            c.device_id = device_id;
            c.device_type = device_type;
            c.transmission_type = transmission_type;
        })
    }

    fn set_period(&self, period: u16) -> Result<(), AntError> {
        self.check("set_period")?;
        self.configure(|c| c.period = Some(period))
    }

    fn set_search_timeout(&self, timeout: u8) -> Result<(), AntError> {
        self.check("set_search_timeout")?;
        self.configure(|c| c.search_timeout = Some(timeout))
    }

    fn set_low_priority_search_timeout(&self, timeout: u8) -> Result<(), AntError> {
        self.check("set_low_priority_search_timeout")?;
        self.configure(|c| c.low_priority_search_timeout = Some(timeout))
    }

    fn set_rf_freq(&self, frequency: u8) -> Result<(), AntError> {
        self.check("set_rf_freq")?;
        self.configure(|c| c.rf_frequency = Some(frequency))
    }

    fn open(&self) -> Result<(), AntError> {
        self.check("open")?;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(AntError::channel("open", "mock failure"));
        }
        let mut status = self
            .state
            .status
            .lock()
            .map_err(|_| AntError::channel("open", "poisoned"))?;
        *status = ChannelStatus::Searching;
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), AntError> {
        self.check("close")?;
        let mut status = self
            .state
            .status
            .lock()
            .map_err(|_| AntError::channel("close", "poisoned"))?;
        *status = ChannelStatus::Assigned;
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> Result<ChannelStatus, AntError> {
        self.state
            .status
            .lock()
            .map(|s| *s)
            .map_err(|_| AntError::channel("status", "poisoned"))
    }
}

/// Read-only view of a mock channel for assertions.
#[derive(Clone)]
pub struct MockChannelHandle {
    state: Arc<MockChannelState>,
}

impl MockChannelHandle {
    pub fn number(&self) -> u8 {
        self.state.number
    }

    pub fn channel_type(&self) -> ChannelType {
        self.state.channel_type
    }

    pub fn is_search_channel(&self) -> bool {
        self.state.for_search
    }

    pub fn status(&self) -> ChannelStatus {
        self.state
            .status
            .lock()
            .map(|s| *s)
            .unwrap_or(ChannelStatus::Unassigned)
    }

    pub fn config(&self) -> MockChannelConfig {
        self.state
            .config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> u32 {
        self.state.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// Deliver a payload as if received over the air.
    pub fn deliver(&self, data: &[u8]) {
        (self.state.on_data)(data);
    }
}

/// An in-memory ANT node.
pub struct MockNode {
    channels: Mutex<Vec<Arc<MockChannelState>>>,
    max_channels: u8,
    network_key: Mutex<Option<[u8; 8]>>,
    extended_messages: AtomicBool,
    lib_config: Mutex<u8>,
    wait_mode: Mutex<Option<WaitMode>>,
    running: AtomicBool,
    fail_allocation: AtomicBool,
    fail_commands: Arc<AtomicBool>,
    fail_open: Arc<AtomicBool>,
}

impl std::fmt::Debug for MockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNode")
            .field("channels", &self.channel_count())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    /// Create a mock node with 8 channels, like a USB2 stick.
    pub fn new() -> Self {
        Self::with_channels(8)
    }

    pub fn with_channels(max_channels: u8) -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
            max_channels,
            network_key: Mutex::new(None),
            extended_messages: AtomicBool::new(false),
            lib_config: Mutex::new(0),
            wait_mode: Mutex::new(None),
            running: AtomicBool::new(false),
            fail_allocation: AtomicBool::new(false),
            fail_commands: Arc::new(AtomicBool::new(false)),
            fail_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every channel command fail until cleared.
    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Make only channel opens fail until cleared.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make channel allocation fail until cleared.
    pub fn set_fail_allocation(&self, fail: bool) {
        self.fail_allocation.store(fail, Ordering::SeqCst);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn channel(&self, number: u8) -> Option<MockChannelHandle> {
        let channels = self.channels.lock().ok()?;
        channels
            .iter()
            .find(|c| c.number == number)
            .map(|state| MockChannelHandle {
                state: Arc::clone(state),
            })
    }

    /// Find the channel configured for a specific device.
    pub fn channel_for(&self, device_id: u16, device_type: u8) -> Option<MockChannelHandle> {
        let channels = self.channels.lock().ok()?;
        channels
            .iter()
            .find(|c| {
                c.config
                    .lock()
                    .map(|cfg| cfg.device_id == device_id && cfg.device_type == device_type)
                    .unwrap_or(false)
                    && !c.for_search
                    && c.channel_type == ChannelType::BidirectionalReceive
            })
            .map(|state| MockChannelHandle {
                state: Arc::clone(state),
            })
    }

    /// The receive-only channel used for continuous scan.
    pub fn scan_channel(&self) -> Option<MockChannelHandle> {
        let channels = self.channels.lock().ok()?;
        channels
            .iter()
            .find(|c| c.channel_type == ChannelType::UnidirectionalReceiveOnly)
            .map(|state| MockChannelHandle {
                state: Arc::clone(state),
            })
    }

    /// The channel reserved for pairing searches.
    pub fn search_channel(&self) -> Option<MockChannelHandle> {
        let channels = self.channels.lock().ok()?;
        channels
            .iter()
            .find(|c| c.for_search)
            .map(|state| MockChannelHandle {
                state: Arc::clone(state),
            })
    }

    pub fn network_key(&self) -> Option<[u8; 8]> {
        self.network_key.lock().ok().and_then(|k| *k)
    }

    pub fn extended_messages(&self) -> bool {
        self.extended_messages.load(Ordering::SeqCst)
    }

    pub fn lib_config(&self) -> u8 {
        self.lib_config.lock().map(|c| *c).unwrap_or(0)
    }

    pub fn wait_mode(&self) -> Option<WaitMode> {
        self.wait_mode.lock().ok().and_then(|m| *m)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl AntNode for MockNode {
    fn set_network_key(&self, _network: u8, key: [u8; 8]) -> Result<(), AntError> {
        if let Ok(mut slot) = self.network_key.lock() {
            *slot = Some(key);
        }
        Ok(())
    }

    fn new_channel(
        &self,
        channel_type: ChannelType,
        for_search: bool,
        on_data: DataHandler,
    ) -> Result<Box<dyn AntChannel>, AntError> {
        if self.fail_allocation.load(Ordering::SeqCst) {
            return Err(AntError::ChannelAllocationFailed("mock failure".into()));
        }

        let mut channels = self
            .channels
            .lock()
            .map_err(|_| AntError::ChannelAllocationFailed("poisoned".into()))?;

        if channels.len() >= self.max_channels as usize {
            return Err(AntError::ChannelAllocationFailed(
                "No available channels".to_string(),
            ));
        }

        let state = Arc::new(MockChannelState {
            number: channels.len() as u8,
            channel_type,
            for_search,
            status: Mutex::new(ChannelStatus::Assigned),
            config: Mutex::new(MockChannelConfig::default()),
            on_data,
            open_count: AtomicU32::new(0),
            close_count: AtomicU32::new(0),
        });
        channels.push(Arc::clone(&state));

        Ok(Box::new(MockChannel {
            state,
            fail_commands: Arc::clone(&self.fail_commands),
            fail_open: Arc::clone(&self.fail_open),
        }))
    }

    fn set_extended_messages(&self, enabled: bool) -> Result<(), AntError> {
        self.extended_messages.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn set_lib_config(&self, flags: u8) -> Result<(), AntError> {
        if let Ok(mut config) = self.lib_config.lock() {
            *config = flags;
        }
        Ok(())
    }

    fn continuous_scan(&self) -> Result<(), AntError> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(AntError::channel("continuous_scan", "mock failure"));
        }
        let channels = self
            .channels
            .lock()
            .map_err(|_| AntError::channel("continuous_scan", "poisoned"))?;
        let scan = channels
            .iter()
            .find(|c| c.channel_type == ChannelType::UnidirectionalReceiveOnly)
            .ok_or_else(|| AntError::channel("continuous_scan", "no receive-only channel"))?;
        if let Ok(mut status) = scan.status.lock() {
            *status = ChannelStatus::Tracking;
        }
        scan.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_wait_mode(&self, mode: WaitMode) {
        if let Ok(mut slot) = self.wait_mode.lock() {
            *slot = Some(mode);
        }
    }

    fn start(&self) -> Result<(), AntError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), AntError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

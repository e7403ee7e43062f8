//! Wildcard search used while pairing a sensor kind.

use super::backend::{AntChannel, AntNode, ChannelType, DataHandler, RadioBackend, WaitMode};
use super::{
    extended_channel_id, simulated, AntError, AntEvent, EventSink, DEVICE_SEARCH_TIMEOUT,
    LIB_CONFIG_CHANNEL_ID, RF_FREQUENCY,
};
use crate::sensors::types::{DeviceIdentity, SensorKind};
use crate::storage::config::SharedPairing;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A device seen during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub device_type: u8,
    /// The identity is already bound to an in-use kind
    pub already_paired: bool,
}

/// Search results keyed by device number.
pub type SearchResult = BTreeMap<u16, SearchHit>;

#[derive(Debug)]
struct SearchSession {
    kind: SensorKind,
    paired: Vec<DeviceIdentity>,
    results: SearchResult,
}

impl SearchSession {
    /// Seed a session with the in-use identities the kind could pair with.
    fn seeded(kind: SensorKind, pairing: &SharedPairing) -> Self {
        let paired: Vec<DeviceIdentity> = pairing
            .read()
            .map(|table| {
                SensorKind::ALL
                    .into_iter()
                    .filter(|k| table.in_use(*k))
                    .filter_map(|k| table.bound_identity(k))
                    .collect()
            })
            .unwrap_or_default();

        let results = paired
            .iter()
            .filter(|identity| kind.accepts(identity.device_type))
            .map(|identity| {
                (
                    identity.id,
                    SearchHit {
                        device_type: identity.device_type,
                        already_paired: true,
                    },
                )
            })
            .collect();

        Self {
            kind,
            paired,
            results,
        }
    }

    /// Record a hit. Returns it when the entry is new or changed.
    fn record(&mut self, identity: DeviceIdentity) -> Option<SearchHit> {
        if !self.kind.accepts(identity.device_type) {
            return None;
        }
        let hit = SearchHit {
            device_type: identity.device_type,
            already_paired: self.paired.contains(&identity),
        };
        match self.results.insert(identity.id, hit) {
            Some(previous) if previous == hit => None,
            _ => Some(hit),
        }
    }
}

type SharedSession = Arc<RwLock<Option<SearchSession>>>;

/// The pairing-search channel.
pub struct Searcher {
    node: Option<Arc<dyn AntNode>>,
    channel: Option<Box<dyn AntChannel>>,
    session: SharedSession,
    pairing: SharedPairing,
    events: EventSink,
    settle: Duration,
}

impl Searcher {
    pub fn new(
        backend: &RadioBackend,
        pairing: SharedPairing,
        events: EventSink,
        settle: Duration,
    ) -> Self {
        let session: SharedSession = Arc::new(RwLock::new(None));
        let node = backend.node().cloned();
        let channel = node.as_ref().and_then(|node| {
            let handler = search_handler(Arc::clone(&session), events.clone());
            match node.new_channel(ChannelType::BidirectionalReceive, true, handler) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    tracing::warn!("ANT+ search channel unavailable: {}", e);
                    None
                }
            }
        });

        Self {
            node,
            channel,
            session,
            pairing,
            events,
            settle,
        }
    }

    pub fn is_searching(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Kind being searched for, if any.
    pub fn searching_kind(&self) -> Option<SensorKind> {
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.kind))
    }

    /// Start searching for devices pairable as `kind`.
    ///
    /// A search already in progress is re-targeted without touching the
    /// radio. Returns true when the search channel was opened.
    pub fn search(&self, kind: SensorKind) -> bool {
        let already_active = match self.session.write() {
            Ok(mut slot) => {
                let active = slot.is_some();
                if active {
                    *slot = Some(SearchSession::seeded(kind, &self.pairing));
                }
                active
            }
            Err(_) => return false,
        };
        if already_active {
            tracing::debug!("ANT+ search re-targeted to {}", kind);
            return false;
        }

        let session = SearchSession::seeded(kind, &self.pairing);
        let (Some(node), Some(channel)) = (&self.node, &self.channel) else {
            if let Ok(mut slot) = self.session.write() {
                *slot = Some(session);
            }
            self.events.send(AntEvent::SearchStarted { kind });
            return false;
        };

        if let Err(e) = self.open_search(node.as_ref(), channel.as_ref()) {
            tracing::warn!("ANT+ search for {} failed: {}", kind, e);
            if let Err(e) = self.close_search(node.as_ref(), channel.as_ref()) {
                tracing::debug!("ANT+ search rollback: {}", e);
            }
            return false;
        }

        if let Ok(mut slot) = self.session.write() {
            *slot = Some(session);
        }
        tracing::info!("ANT+ searching for {} on channel {}", kind, channel.number());
        self.events.send(AntEvent::SearchStarted { kind });
        true
    }

    fn open_search(&self, node: &dyn AntNode, channel: &dyn AntChannel) -> Result<(), AntError> {
        node.set_wait_mode(WaitMode::Action);
        channel.set_search_timeout(0)?;
        channel.set_rf_freq(RF_FREQUENCY)?;
        channel.set_id(0, 0, 0)?;
        node.set_extended_messages(true)?;
        channel.set_low_priority_search_timeout(DEVICE_SEARCH_TIMEOUT)?;
        node.set_lib_config(LIB_CONFIG_CHANNEL_ID)?;
        if channel.status()?.is_closed() {
            channel.open()?;
        }
        Ok(())
    }

    /// Stop the search. `reset_wait` restores the periodic wait mode; a
    /// caller about to connect a device leaves it to the connect.
    pub fn stop_search(&self, reset_wait: bool) -> bool {
        let was_active = match self.session.write() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        };
        if !was_active {
            return false;
        }

        if let (Some(node), Some(channel)) = (&self.node, &self.channel) {
            if let Err(e) = self.close_search(node.as_ref(), channel.as_ref()) {
                tracing::warn!("ANT+ stop search: {}", e);
            }
            if reset_wait {
                node.set_wait_mode(WaitMode::Period);
            }
        }

        tracing::info!("ANT+ search stopped");
        self.events.send(AntEvent::SearchStopped);
        true
    }

    fn close_search(&self, node: &dyn AntNode, channel: &dyn AntChannel) -> Result<(), AntError> {
        if channel.status()?.is_open() {
            channel.close()?;
            if !self.settle.is_zero() {
                std::thread::sleep(self.settle);
            }
        }
        node.set_extended_messages(false)?;
        node.set_lib_config(0)?;
        channel.set_low_priority_search_timeout(0)?;
        Ok(())
    }

    /// Devices seen so far; empty when no search is active.
    ///
    /// Without a radio the results are a fixed list that changes with the
    /// wall clock.
    pub fn results(&self) -> SearchResult {
        if self.node.is_none() {
            if !self.is_searching() {
                return SearchResult::new();
            }
            let now_secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            return simulated::search_results(now_secs);
        }
        self.session
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.results.clone()))
            .unwrap_or_default()
    }
}

fn search_handler(session: SharedSession, events: EventSink) -> DataHandler {
    Arc::new(move |data: &[u8]| {
        let Some(identity) = extended_channel_id(data) else {
            return;
        };
        let found = match session.write() {
            Ok(mut slot) => slot.as_mut().and_then(|s| s.record(identity)),
            Err(_) => None,
        };
        if let Some(hit) = found {
            tracing::debug!("ANT+ search found {}", identity);
            events.send(AntEvent::DeviceFound {
                identity,
                already_paired: hit.already_paired,
            });
        }
    })
}

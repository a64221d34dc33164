//! Communication between locales.
//!
//! The tracker only needs two things from the communication layer: reading a
//! peer's counters for the multi-locale statistics report and broadcasting the
//! verbose flag. [`LocaleCluster`] provides both for locales that live in the
//! same process, one comm-server thread per locale.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::ledger::MemCounters;
use super::tracker::MemTracker;
use crate::config::Config;
use crate::desc::DescriptorTable;
use crate::error::{Location, MemTrackError, Result};

/// Communication collaborator used by the tracker.
pub trait Comm: Send + Sync {
    fn locale_id(&self) -> u32;

    fn num_locales(&self) -> u32;

    /// Synchronously read `locale`'s counters. The value is a point-in-time
    /// copy and is not coordinated with any other locale's read.
    fn get_counters(&self, locale: u32, location: Location) -> Result<MemCounters>;

    /// Set the verbose flag on every other locale.
    fn broadcast_verbose(&self, enabled: bool);
}

/// A run with one locale and nobody to talk to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleLocale;

impl Comm for SingleLocale {
    fn locale_id(&self) -> u32 {
        0
    }

    fn num_locales(&self) -> u32 {
        1
    }

    fn get_counters(&self, locale: u32, location: Location) -> Result<MemCounters> {
        Err(MemTrackError::RemoteRead { locale, location })
    }

    fn broadcast_verbose(&self, _enabled: bool) {}
}

pub(crate) enum CommRequest {
    GetCounters(Sender<MemCounters>),
    SetVerbose(bool),
    Shutdown,
}

/// Handle a locale in a [`LocaleCluster`] uses to reach its peers.
pub struct ClusterComm {
    locale_id: u32,
    peers: Arc<[Sender<CommRequest>]>,
}

impl Comm for ClusterComm {
    fn locale_id(&self) -> u32 {
        self.locale_id
    }

    fn num_locales(&self) -> u32 {
        self.peers.len() as u32
    }

    fn get_counters(&self, locale: u32, location: Location) -> Result<MemCounters> {
        let peer = self
            .peers
            .get(locale as usize)
            .ok_or(MemTrackError::RemoteRead { locale, location })?;
        let (response_tx, response_rx) = bounded(1);
        peer.send(CommRequest::GetCounters(response_tx))
            .map_err(|_| MemTrackError::RemoteRead { locale, location })?;
        response_rx
            .recv()
            .map_err(|_| MemTrackError::RemoteRead { locale, location })
    }

    fn broadcast_verbose(&self, enabled: bool) {
        for (i, peer) in self.peers.iter().enumerate() {
            if i as u32 != self.locale_id {
                let _ = peer.send(CommRequest::SetVerbose(enabled));
            }
        }
    }
}

/// Several locales simulated inside one process.
///
/// Each locale gets its own [`MemTracker`] and a comm-server thread that
/// answers peers' requests against that tracker. Dropping the cluster stops
/// the servers.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use memtrack::{Config, LocaleCluster, Location, MemDesc, RuntimeDescriptors};
///
/// let cluster = LocaleCluster::new(2, Arc::new(RuntimeDescriptors::new()), |_| {
///     Config::new().track(true)
/// })
/// .unwrap();
/// cluster.locale(1).track_alloc(0x40, 512, 64, 8, MemDesc::ARRAY_ELEMENTS, Location::UNKNOWN).unwrap();
///
/// let stats = cluster.locale(0).statistics(Location::UNKNOWN).unwrap();
/// assert_eq!(stats.rows[1].counters.current, 512);
/// ```
pub struct LocaleCluster {
    trackers: Vec<Arc<MemTracker>>,
    peers: Arc<[Sender<CommRequest>]>,
    servers: Vec<JoinHandle<()>>,
}

impl LocaleCluster {
    /// Build `num_locales` trackers, configuring locale `i` with `config(i)`.
    pub fn new<F>(num_locales: u32, descs: Arc<dyn DescriptorTable>, mut config: F) -> Result<Self>
    where
        F: FnMut(u32) -> Config,
    {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..num_locales).map(|_| unbounded::<CommRequest>()).unzip();
        let peers: Arc<[Sender<CommRequest>]> = senders.into();

        let trackers = (0..num_locales)
            .map(|locale_id| {
                let comm = ClusterComm {
                    locale_id,
                    peers: Arc::clone(&peers),
                };
                MemTracker::with_collaborators(config(locale_id), Arc::new(comm), Arc::clone(&descs))
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut cluster = Self {
            trackers,
            peers,
            servers: Vec::with_capacity(num_locales as usize),
        };
        for (locale_id, rx) in receivers.into_iter().enumerate() {
            let tracker = Arc::clone(&cluster.trackers[locale_id]);
            let server = thread::Builder::new()
                .name(format!("mt-comm-{}", locale_id))
                .spawn(move || serve(tracker, rx))
                .map_err(|source| MemTrackError::Spawn {
                    locale: locale_id as u32,
                    source,
                })?;
            cluster.servers.push(server);
        }
        Ok(cluster)
    }

    pub fn num_locales(&self) -> u32 {
        self.trackers.len() as u32
    }

    /// Tracker of locale `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not below [`num_locales`](Self::num_locales).
    pub fn locale(&self, id: u32) -> &Arc<MemTracker> {
        &self.trackers[id as usize]
    }

    pub fn locales(&self) -> &[Arc<MemTracker>] {
        &self.trackers
    }
}

impl Drop for LocaleCluster {
    fn drop(&mut self) {
        for (peer, _) in self.peers.iter().zip(&self.servers) {
            let _ = peer.send(CommRequest::Shutdown);
        }
        for server in self.servers.drain(..) {
            let _ = server.join();
        }
    }
}

fn serve(tracker: Arc<MemTracker>, rx: Receiver<CommRequest>) {
    for request in rx.iter() {
        match request {
            CommRequest::GetCounters(response_tx) => {
                let _ = response_tx.send(tracker.counters_or_zero());
            }
            CommRequest::SetVerbose(enabled) => tracker.set_verbose_here(enabled),
            CommRequest::Shutdown => break,
        }
    }
}

//! Peer object (spec.md §3, §4.4): identity, capability cache, sent-request
//! table, hop-by-hop counter, outgoing queue and the state the PSM drives.
//! The process-wide peer list (`PeerTable`) is keyed by `DiameterIdentity`
//! with case-insensitive comparison, guarded by a single reader/writer lock
//! (spec.md's locking discipline, §5).

use crate::config::{AppEntry, PeerConfig};
use crate::diameter::DiameterMessage;
use crate::error::{Error, Result};
use crate::transport::Cnx;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

/// Every state in spec.md §4.4's table; `*` (stable) states are the ones a
/// peer can sit in indefinitely between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Closed,
    WaitCnxAck,
    WaitCnxAckElec,
    WaitCea,
    OpenHandshake,
    Open,
    OpenNew,
    Suspect,
    Reopen,
    Closing,
    ClosingGrace,
    Zombie,
}

impl PeerState {
    /// Candidate set for routing-out (spec.md §4.7): only fully-up peers.
    pub fn is_open(self) -> bool {
        matches!(self, PeerState::Open | PeerState::OpenNew)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Zombie)
    }
}

/// `{sockaddr, flags}` per spec.md §3; flags accumulate on merge rather
/// than overwrite, since the same endpoint can be learned from config and
/// later re-advertised in a CER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointFlags {
    pub configured: bool,
    pub discovered: bool,
    pub advertised: bool,
    pub link_layer: bool,
    pub primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub flags: EndpointFlags,
}

/// Ordered, de-duplicated-by-address endpoint list (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct EndpointList(Vec<Endpoint>);

impl EndpointList {
    pub fn new() -> EndpointList {
        EndpointList(Vec::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter()
    }

    /// Adds `addr` with `flags`, merging flags into an existing entry for
    /// the same address instead of duplicating it.
    pub fn merge(&mut self, addr: SocketAddr, flags: EndpointFlags) {
        if let Some(existing) = self.0.iter_mut().find(|e| e.addr == addr) {
            existing.flags.configured |= flags.configured;
            existing.flags.discovered |= flags.discovered;
            existing.flags.advertised |= flags.advertised;
            existing.flags.link_layer |= flags.link_layer;
            existing.flags.primary |= flags.primary;
        } else {
            self.0.push(Endpoint { addr, flags });
        }
    }

    /// Primary-first ordering for `connect` to try, per spec.md §4.3.
    pub fn ordered(&self) -> Vec<Endpoint> {
        let mut v = self.0.clone();
        v.sort_by_key(|e| !e.flags.primary);
        v
    }
}

/// Peer-advertised capability/identity data populated from CER/CEA
/// (spec.md §3 "Peer" / §4.5).
#[derive(Debug, Clone, Default)]
pub struct RuntimeInfo {
    pub host_ip_addresses: Vec<std::net::IpAddr>,
    pub vendor_id: Option<u32>,
    pub product_name: Option<String>,
    pub firmware_revision: Option<u32>,
    pub origin_state_id: Option<u32>,
    pub applications: Vec<AppEntry>,
    pub supported_vendor_ids: Vec<u32>,
    pub inband_security_ids: Vec<u32>,
    pub negotiated_tls: bool,
}

/// A single in-flight request, keyed by the hop-by-hop id assigned when it
/// was sent (spec.md §3 "Sent-request table").
pub struct SentRequestEntry {
    pub request: DiameterMessage,
    pub restore_hbh: u32,
    pub added_on: Instant,
    pub expiry: Option<Instant>,
    pub anscb: Option<AnswerCallback>,
}

/// Callback invoked with either the matched answer or (on timeout /
/// failover drop) the original request, per spec.md §4.7/§7.
pub type AnswerCallback = oneshot::Sender<AnswerOutcome>;

#[derive(Debug)]
pub enum AnswerOutcome {
    Answer(DiameterMessage),
    Timeout(DiameterMessage),
    UnableToDeliver(DiameterMessage),
}

/// Per-peer map of in-flight requests. Guarded by a single async mutex
/// (spec.md's "mutex + condvar"); since each request that carries a
/// deadline schedules its own `tokio::time::sleep_until` task (the
/// idiomatic equivalent of a dedicated expiry thread, per spec.md §9),
/// there is no separate background thread to start or stop here.
#[derive(Default)]
pub struct SentRequestTable {
    entries: Mutex<BTreeMap<u32, SentRequestEntry>>,
}

impl SentRequestTable {
    pub fn new() -> SentRequestTable {
        SentRequestTable::default()
    }

    pub async fn insert(&self, hbh: u32, entry: SentRequestEntry) {
        self.entries.lock().await.insert(hbh, entry);
    }

    pub async fn remove(&self, hbh: u32) -> Option<SentRequestEntry> {
        self.entries.lock().await.remove(&hbh)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Drains every entry (spec.md §4.4 failover): the caller classifies
    /// each as routable-and-retransmit or drop-with-unable-to-deliver.
    pub async fn drain(&self) -> Vec<(u32, SentRequestEntry)> {
        self.entries.lock().await.drain_filter_all()
    }
}

trait DrainFilterAll<K, V> {
    fn drain_filter_all(&mut self) -> Vec<(K, V)>;
}

impl<K: Ord + Copy, V> DrainFilterAll<K, V> for BTreeMap<K, V> {
    fn drain_filter_all(&mut self) -> Vec<(K, V)> {
        std::mem::take(self).into_iter().collect()
    }
}

/// Whether a request is eligible for failover retransmission (spec.md
/// §4.4): pinned to a specific `Destination-Host` or locally-generated
/// answers are not retried elsewhere.
pub fn is_routable(request: &DiameterMessage) -> bool {
    request.get_avp(293 /* Destination-Host */).is_none()
}

/// `{configured flags, runtime info, state, sent-request table, ...}`
/// (spec.md §3 "Peer"). Per-peer data is only ever mutated by the PSM task
/// that owns it (spec.md §5); other tasks communicate by sending
/// [`PsmEvent`](crate::psm::PsmEvent)s through `events`.
pub struct Peer {
    pub identity: String,
    pub realm: String,
    pub config: PeerConfig,
    pub persistent: bool,
    pub state: RwLock<PeerState>,
    pub runtime: RwLock<RuntimeInfo>,
    pub endpoints: RwLock<EndpointList>,
    /// `Arc` rather than `Box` so the PSM's reader task and OUT sender can
    /// both hold a handle to the live connection concurrently without
    /// fighting over the same lock for the lifetime of the connection
    /// (spec.md §5: "send on a given cnx preserves order" — both sides
    /// only ever need their own read or write half internally).
    pub cnx: Mutex<Option<Arc<dyn Cnx>>>,
    pub sent_requests: SentRequestTable,
    hbh_counter: AtomicU32,
    pub events: mpsc::UnboundedSender<PsmEvent>,
    pub event_rx: Mutex<Option<mpsc::UnboundedReceiver<PsmEvent>>>,
    pub out_tx: mpsc::UnboundedSender<DiameterMessage>,
    pub out_rx: Mutex<Option<mpsc::UnboundedReceiver<DiameterMessage>>>,
    pub expire_at: RwLock<Option<Instant>>,
}

/// Events the PSM consumes (spec.md §4.4 "Events consumed by PSM").
pub enum PsmEvent {
    ConnectionEstablished,
    ConnectionAccepted(Box<dyn Cnx>, DiameterMessage),
    CerReceived(DiameterMessage),
    CeaReceived(DiameterMessage),
    Dwr(DiameterMessage),
    Dwa(DiameterMessage),
    Dpr(DiameterMessage),
    Dpa(DiameterMessage),
    MessageReceived(DiameterMessage),
    SendRequest(DiameterMessage, Option<Duration>, Option<AnswerCallback>),
    TcTimeout,
    TwTimeout,
    HandshakeTimeout,
    ConnectionError(String),
    Terminate,
    AlreadyMatched,
}

impl Peer {
    pub fn new(identity: impl Into<String>, realm: impl Into<String>, config: PeerConfig) -> Arc<Peer> {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let persistent = config.persistent;
        Arc::new(Peer {
            identity: identity.into(),
            realm: realm.into(),
            config,
            persistent,
            state: RwLock::new(PeerState::New),
            runtime: RwLock::new(RuntimeInfo::default()),
            endpoints: RwLock::new(EndpointList::new()),
            cnx: Mutex::new(None),
            sent_requests: SentRequestTable::new(),
            hbh_counter: AtomicU32::new(rand::random()),
            events,
            event_rx: Mutex::new(Some(event_rx)),
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            expire_at: RwLock::new(None),
        })
    }

    pub async fn state(&self) -> PeerState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: PeerState) {
        log::debug!("peer {} -> {:?}", self.identity, state);
        *self.state.write().await = state;
    }

    /// Next hop-by-hop id on this peer's link (spec.md §4.4 "Hop-by-hop id
    /// ownership"): a monotonic 32-bit counter private to the peer.
    pub fn next_hop_by_hop_id(&self) -> u32 {
        self.hbh_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Case-insensitive `DiameterIdentity` key for the process-wide
    /// [`PeerTable`] (spec.md §3).
    pub fn table_key(identity: &str) -> String {
        identity.to_ascii_lowercase()
    }

    pub fn post(&self, event: PsmEvent) {
        if self.events.send(event).is_err() {
            log::warn!("peer {} PSM task no longer running", self.identity);
        }
    }

    /// Hands the caller's hop-by-hop id aside, stamps the peer's own next
    /// hop-by-hop id onto `request`, and records the sent-request entry
    /// (spec.md §4.4 "Hop-by-hop id ownership").
    pub async fn send_request(
        self: &Arc<Peer>,
        mut request: DiameterMessage,
        timeout: Option<Duration>,
        anscb: Option<AnswerCallback>,
    ) {
        let restore_hbh = request.get_hop_by_hop_id();
        let hbh = self.next_hop_by_hop_id();
        request.set_hop_by_hop_id(hbh);

        let expiry = timeout.map(|d| Instant::now() + d);
        self.sent_requests
            .insert(
                hbh,
                SentRequestEntry {
                    request: request.clone(),
                    restore_hbh,
                    added_on: Instant::now(),
                    expiry,
                    anscb,
                },
            )
            .await;

        if let Some(duration) = timeout {
            let peer = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(entry) = peer.sent_requests.remove(hbh).await {
                    log::info!(
                        "request hbh={} to peer {} timed out",
                        hbh,
                        peer.identity
                    );
                    if let Some(cb) = entry.anscb {
                        let _ = cb.send(AnswerOutcome::Timeout(entry.request));
                    }
                }
            });
        }

        if self.out_tx.send(request).is_err() {
            log::warn!("peer {} OUT task no longer running", self.identity);
        }
    }

    /// Matches an inbound answer to its sent request by hop-by-hop id,
    /// restoring the original hop-by-hop id before handing both back
    /// (spec.md §4.7 "Answer correlation").
    pub async fn correlate_answer(
        &self,
        mut answer: DiameterMessage,
    ) -> Result<(DiameterMessage, Option<AnswerCallback>)> {
        let hbh = answer.get_hop_by_hop_id();
        let entry = self
            .sent_requests
            .remove(hbh)
            .await
            .ok_or_else(|| Error::RoutingError(format!("unmatched answer hbh={}", hbh)))?;
        answer.set_hop_by_hop_id(entry.restore_hbh);
        Ok((answer, entry.anscb))
    }

    /// Sends an answer directly on this peer's link (spec.md §4.7: answers
    /// return via the connection they arrived on, not through routing-out),
    /// leaving its hop-by-hop id untouched.
    pub fn send_answer(&self, answer: &DiameterMessage) -> Result<()> {
        self.out_tx.send(answer.clone()).map_err(|_| {
            Error::PeerError(format!("peer {} OUT task no longer running", self.identity))
        })
    }

    /// Failover conservation (spec.md §4.4/§8): every in-flight request is
    /// either dropped (non-routable) with its callback notified, or
    /// returned here for the caller to re-post to the outgoing queue with
    /// the `T` flag set. None is silently lost.
    pub async fn failover_drain(&self) -> Vec<DiameterMessage> {
        let mut retransmit = Vec::new();
        for (_, entry) in self.sent_requests.drain().await {
            if is_routable(&entry.request) {
                let mut req = entry.request;
                req.set_hop_by_hop_id(entry.restore_hbh);
                req.set_retransmit();
                retransmit.push(req);
            } else if let Some(cb) = entry.anscb {
                let _ = cb.send(AnswerOutcome::UnableToDeliver(entry.request));
            }
        }
        retransmit
    }
}

/// Process-wide peer list keyed by case-insensitive `DiameterIdentity`
/// (spec.md §3), guarded by a single reader/writer lock.
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<BTreeMap<String, Arc<Peer>>>,
}

impl PeerTable {
    pub fn new() -> PeerTable {
        PeerTable::default()
    }

    pub async fn add(&self, peer: Arc<Peer>) {
        let key = Peer::table_key(&peer.identity);
        self.peers.write().await.insert(key, peer);
    }

    pub async fn get(&self, identity: &str) -> Option<Arc<Peer>> {
        self.peers.read().await.get(&Peer::table_key(identity)).cloned()
    }

    /// Removes a peer iff it exists and has reached `ZOMBIE` (spec.md §3
    /// "Peers ... destroyed only when explicitly removed AND state is
    /// ZOMBIE").
    pub async fn remove_if_zombie(&self, identity: &str) -> Result<()> {
        let key = Peer::table_key(identity);
        let peers = self.peers.read().await;
        let peer = peers
            .get(&key)
            .ok_or_else(|| Error::PeerError(format!("no such peer: {}", identity)))?;
        if peer.state().await.is_terminal() {
            drop(peers);
            self.peers.write().await.remove(&key);
            Ok(())
        } else {
            Err(Error::PeerError(format!(
                "peer {} is not ZOMBIE, refusing to remove",
                identity
            )))
        }
    }

    pub async fn iter(&self) -> Vec<Arc<Peer>> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Open/OpenNew peers only (spec.md §4.7 routing-out candidate set).
    pub async fn open_peers(&self) -> Vec<Arc<Peer>> {
        let mut out = Vec::new();
        for peer in self.iter().await {
            if peer.state().await.is_open() {
                out.push(peer);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_config(identity: &str) -> PeerConfig {
        PeerConfig {
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_peer_table_case_insensitive() {
        let table = PeerTable::new();
        let peer = Peer::new("NodeB.Example.Net", "example.net", peer_config("NodeB.Example.Net"));
        table.add(Arc::clone(&peer)).await;

        assert!(table.get("nodeb.example.net").await.is_some());
        assert!(table.get("NODEB.EXAMPLE.NET").await.is_some());
    }

    #[tokio::test]
    async fn test_remove_if_zombie_rejects_live_peer() {
        let table = PeerTable::new();
        let peer = Peer::new("nodeb", "example.net", peer_config("nodeb"));
        table.add(Arc::clone(&peer)).await;
        peer.set_state(PeerState::Open).await;

        assert!(table.remove_if_zombie("nodeb").await.is_err());
        peer.set_state(PeerState::Zombie).await;
        assert!(table.remove_if_zombie("nodeb").await.is_ok());
        assert!(table.get("nodeb").await.is_none());
    }

    #[tokio::test]
    async fn test_hop_by_hop_counter_monotonic() {
        let peer = Peer::new("nodeb", "example.net", peer_config("nodeb"));
        let a = peer.next_hop_by_hop_id();
        let b = peer.next_hop_by_hop_id();
        assert_eq!(b, a.wrapping_add(1));
    }

    #[tokio::test]
    async fn test_failover_drain_separates_routable_and_pinned() {
        use crate::avp;
        use crate::avp::flags::M;
        use crate::avp::identity::Identity;
        use crate::diameter::{flags, ApplicationId, CommandCode, DiameterMessage};
        use crate::dictionary::{self, Dictionary};

        let dict = Arc::new(Dictionary::new(&[&dictionary::DEFAULT_DICT_XML]));
        let peer = Peer::new("nodeb", "example.net", peer_config("nodeb"));

        let routable = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1,
            1,
            Arc::clone(&dict),
        );
        let mut pinned = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            2,
            2,
            Arc::clone(&dict),
        );
        pinned.add_avp(avp!(293, None, M, Identity::new("specific.example.net")));

        peer.send_request(routable, None, None).await;
        peer.send_request(pinned, None, None).await;

        let retransmit = peer.failover_drain().await;
        assert_eq!(retransmit.len(), 1);
        assert!(retransmit[0].get_flags() & flags::T != 0);
        assert_eq!(peer.sent_requests.len().await, 0);
    }
}

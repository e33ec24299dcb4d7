//! Routing and dispatch (spec.md §4.7): three FIFO queues (`incoming`,
//! `local`, `outgoing`), the routing-in/out/fwd stages, and the dispatch
//! pool. Queues are `tokio::sync::mpsc` channels rather than generic
//! intrusive lists (spec.md §9's guidance to prefer owned collections over
//! pointer-heavy lists); callback lists are priority-ordered `Vec`s behind
//! a `tokio::sync::RwLock`, read-locked on the hot path.

use crate::avp::flags::M;
use crate::diameter::DiameterMessage;
use crate::hooks::{HookEvent, HookType};
use crate::node::NodeContext;
use crate::peer::{AnswerCallback, AnswerOutcome, Peer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Additive score tiers (spec.md §4.7), used both by the default
/// REALM/FINALDEST scoring below and available to callbacks registered via
/// [`RoutingTables::register_out`].
pub mod score {
    pub const NO_DELIVERY: i32 = -70;
    pub const SENT_REDIRECT: i32 = -60;
    pub const INI: i32 = -2;
    pub const LOAD_BALANCE: i32 = 1;
    pub const DEFAULT: i32 = 5;
    pub const DEFAULT_REALM: i32 = 10;
    pub const REALM: i32 = 15;
    pub const REDIR_HOST: i32 = 25;
    pub const REDIR_ONCE: i32 = 55;
    pub const FINALDEST: i32 = 100;
}

/// A message in flight through routing-out, carrying the bookkeeping
/// routing-in attached: the Route-Record-derived loop guard (permanent for
/// this message's lifetime) and the per-attempt exclusion set (candidates
/// that already errored this round, cleared on the one allowed restart —
/// spec.md §4.7 "if the candidate list is exhausted the search restarts
/// once").
pub struct RoutedMessage {
    pub msg: DiameterMessage,
    pub route_record: HashSet<String>,
    pub tried_and_errored: HashSet<String>,
    pub restarted: bool,
    pub timeout: Option<Duration>,
    pub anscb: Option<AnswerCallback>,
}

/// An item on the `local` queue: the message plus, for messages that
/// arrived from a peer, that peer (so a dispatch callback producing an
/// answer can send it straight back on the connection it came from,
/// instead of re-entering routing-out).
pub struct LocalItem {
    pub msg: DiameterMessage,
    pub from_peer: Option<Arc<Peer>>,
}

/// Forwarding callbacks (spec.md §4.7 `rt_fwd_register`): see the message
/// in flight before it's enqueued to a peer. Returning `None` means the
/// callback dropped the message (took ownership); `Some` continues with
/// the (possibly mutated) message.
pub type FwdCallback = Box<dyn Fn(DiameterMessage) -> Option<DiameterMessage> + Send + Sync>;

/// Out callbacks (spec.md §4.7 `rt_out_register`): assign an additive
/// score for one candidate peer.
pub type OutCallback = Box<dyn Fn(&DiameterMessage, &Peer) -> i32 + Send + Sync>;

/// Dispatch callback specificity (spec.md §4.7: `DISP_HOW_CC`,
/// `DISP_HOW_AVP`, `DISP_HOW_APPID`), most specific first.
#[derive(Clone, Copy)]
pub enum DispHow {
    CommandCode(u32, u32),
    AvpPresence(u32),
    AppId(u32),
}

impl DispHow {
    fn specificity(&self) -> u8 {
        match self {
            DispHow::CommandCode(_, _) => 0,
            DispHow::AvpPresence(_) => 1,
            DispHow::AppId(_) => 2,
        }
    }

    fn matches(&self, msg: &DiameterMessage) -> bool {
        match *self {
            DispHow::CommandCode(code, app) => {
                msg.get_command_code() as u32 == code && msg.get_application_id() as u32 == app
            }
            DispHow::AvpPresence(avp_code) => msg.get_avp(avp_code).is_some(),
            DispHow::AppId(app) => msg.get_application_id() as u32 == app,
        }
    }
}

/// A dispatch callback may transform the message, answer it (returning the
/// answer to send back), or pass it through unmodified.
pub type DispatchCallback =
    Box<dyn Fn(DiameterMessage) -> DispatchOutcome + Send + Sync>;

pub enum DispatchOutcome {
    /// Not interested; next callback (or nothing) handles it.
    Continue(DiameterMessage),
    /// This callback produced an answer to send back immediately.
    Answer(DiameterMessage),
    /// This callback consumed the message entirely (took ownership).
    Consumed,
}

struct DispatchRegistration {
    how: DispHow,
    callback: DispatchCallback,
}

/// The three process-wide queues plus the registered callback lists
/// (spec.md §4.7/§5).
pub struct RoutingTables {
    incoming_tx: mpsc::UnboundedSender<(DiameterMessage, Arc<Peer>)>,
    incoming_rx: Mutex<Option<mpsc::UnboundedReceiver<(DiameterMessage, Arc<Peer>)>>>,
    local_tx: mpsc::UnboundedSender<LocalItem>,
    local_rx: Mutex<Option<mpsc::UnboundedReceiver<LocalItem>>>,
    outgoing_tx: mpsc::UnboundedSender<RoutedMessage>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<RoutedMessage>>>,
    fwd_callbacks: RwLock<Vec<FwdCallback>>,
    out_callbacks: RwLock<Vec<OutCallback>>,
    dispatch_callbacks: RwLock<Vec<DispatchRegistration>>,
}

impl RoutingTables {
    pub fn new() -> RoutingTables {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        RoutingTables {
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            local_tx,
            local_rx: Mutex::new(Some(local_rx)),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            fwd_callbacks: RwLock::new(Vec::new()),
            out_callbacks: RwLock::new(Vec::new()),
            dispatch_callbacks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register_fwd(&self, cb: FwdCallback) {
        self.fwd_callbacks.write().await.push(cb);
    }

    pub async fn register_out(&self, cb: OutCallback) {
        self.out_callbacks.write().await.push(cb);
    }

    pub async fn register_dispatch(&self, how: DispHow, cb: DispatchCallback) {
        let mut list = self.dispatch_callbacks.write().await;
        list.push(DispatchRegistration {
            how,
            callback: cb,
        });
        list.sort_by_key(|r| r.how.specificity());
    }

    /// A message freshly received by a peer's PSM that isn't CER/CEA/DWR/
    /// DWA/DPR/DPA and isn't a correlated answer: hands it to routing-in.
    pub fn post_incoming(&self, msg: DiameterMessage, from: Arc<Peer>) {
        let _ = self.incoming_tx.send((msg, from));
    }

    /// Directly posts to `local` (used for correlated answers that have no
    /// attached `anscb`, and by routing-in for locally-delivered requests).
    pub fn post_local(&self, msg: DiameterMessage, from_peer: Option<Arc<Peer>>) {
        let _ = self.local_tx.send(LocalItem { msg, from_peer });
    }

    /// Submits an application-originated (or forwarded) request for peer
    /// selection.
    pub fn post_outgoing(&self, routed: RoutedMessage) {
        let _ = self.outgoing_tx.send(routed);
    }

    /// Spawns the routing-in, dispatch, and routing-out tasks. `dispatch_workers`
    /// controls the dispatch pool size (spec.md §4.7 "configurable thread
    /// count"; default 4 per §5).
    pub fn spawn(node: Arc<NodeContext>, dispatch_workers: usize) {
        let routing_in_node = Arc::clone(&node);
        tokio::spawn(async move { routing_in_loop(routing_in_node).await });

        let routing_out_node = Arc::clone(&node);
        tokio::spawn(async move { routing_out_loop(routing_out_node).await });

        for _ in 0..dispatch_workers.max(1) {
            let dispatch_node = Arc::clone(&node);
            tokio::spawn(async move { dispatch_loop(dispatch_node).await });
        }
    }
}

impl Default for RoutingTables {
    fn default() -> Self {
        RoutingTables::new()
    }
}

/// routing-in (spec.md §4.7): fwd-in callbacks run first, then the
/// local-vs-forward decision.
async fn routing_in_loop(node: Arc<NodeContext>) {
    let mut rx = node
        .routing
        .incoming_rx
        .lock()
        .await
        .take()
        .expect("routing-in loop started twice");

    while let Some((mut msg, from_peer)) = rx.recv().await {
        let fwd_callbacks = node.routing.fwd_callbacks.read().await;
        let mut dropped = false;
        for cb in fwd_callbacks.iter() {
            match cb(msg) {
                Some(m) => msg = m,
                None => {
                    dropped = true;
                    break;
                }
            }
        }
        drop(fwd_callbacks);
        if dropped {
            node.hooks
                .fire(HookEvent {
                    hook_type: HookType::MessageDropped,
                    msg: None,
                    peer: Some(&from_peer),
                    other: Some("rejected by a forwarding callback"),
                })
                .await;
            continue;
        }

        if is_locally_deliverable(&node, &msg).await {
            node.hooks
                .fire(HookEvent {
                    hook_type: HookType::MessageRoutedLocally,
                    msg: Some(&msg),
                    peer: Some(&from_peer),
                    other: None,
                })
                .await;
            node.routing.post_local(msg, Some(from_peer));
        } else {
            let mut route_record: HashSet<String> = msg
                .avps
                .iter()
                .filter(|avp| avp.get_code() == 282)
                .filter_map(|avp| avp.get_identity())
                .map(|id| id.as_str().to_ascii_lowercase())
                .collect();
            route_record.insert(Peer::table_key(&from_peer.identity));
            msg.add_avp(crate::avp::Avp::new(
                282,
                None,
                M,
                crate::avp::identity::Identity::new(node.config.identity.as_bytes().to_vec())
                    .into(),
            ));
            node.hooks
                .fire(HookEvent {
                    hook_type: HookType::MessageRoutedForward,
                    msg: Some(&msg),
                    peer: Some(&from_peer),
                    other: None,
                })
                .await;
            node.routing.post_outgoing(RoutedMessage {
                msg,
                route_record,
                tried_and_errored: HashSet::new(),
                restarted: false,
                timeout: None,
                anscb: None,
            });
        }
    }
}

async fn is_locally_deliverable(node: &NodeContext, msg: &DiameterMessage) -> bool {
    let dest_host = msg.get_avp(293).and_then(|a| a.get_identity());
    let for_us = match dest_host {
        None => true,
        Some(id) => id.as_str().eq_ignore_ascii_case(&node.config.identity),
    };
    if !for_us {
        return false;
    }
    if node.config.is_relay {
        return true;
    }
    let app = msg.get_application_id() as u32;
    node.config.applications.iter().any(|a| a.app_id == app)
}

/// routing-out (spec.md §4.7): score every OPEN/OPEN_NEW candidate not
/// already in Route-Record or the error-exclusion set, hand the message to
/// the winner via `Peer::send_request` (which owns hop-by-hop assignment
/// and sent-request bookkeeping).
async fn routing_out_loop(node: Arc<NodeContext>) {
    let mut rx = node
        .routing
        .outgoing_rx
        .lock()
        .await
        .take()
        .expect("routing-out loop started twice");

    while let Some(routed) = rx.recv().await {
        route_one(&node, routed).await;
    }
}

async fn route_one(node: &Arc<NodeContext>, mut routed: RoutedMessage) {
    let candidates: Vec<Arc<Peer>> = node
        .peers
        .open_peers()
        .await
        .into_iter()
        .filter(|p| {
            let key = Peer::table_key(&p.identity);
            !routed.route_record.contains(&key) && !routed.tried_and_errored.contains(&key)
        })
        .collect();

    if candidates.is_empty() {
        if !routed.restarted {
            routed.restarted = true;
            routed.tried_and_errored.clear();
            // one more pass with only Route-Record excluded
            let retry_candidates: Vec<Arc<Peer>> = node
                .peers
                .open_peers()
                .await
                .into_iter()
                .filter(|p| !routed.route_record.contains(&Peer::table_key(&p.identity)))
                .collect();
            if let Some(winner) = pick_best(node, &routed.msg, retry_candidates).await {
                dispatch_to_peer(node, routed, winner).await;
                return;
            }
        }
        unable_to_deliver(node, routed).await;
        return;
    }

    match pick_best(node, &routed.msg, candidates).await {
        Some(winner) => dispatch_to_peer(node, routed, winner).await,
        None => unable_to_deliver(node, routed).await,
    }
}

async fn pick_best(
    node: &NodeContext,
    msg: &DiameterMessage,
    candidates: Vec<Arc<Peer>>,
) -> Option<Arc<Peer>> {
    if candidates.is_empty() {
        return None;
    }
    let out_callbacks = node.routing.out_callbacks.read().await;
    let dest_host = msg.get_avp(293).and_then(|a| a.get_identity());
    let dest_realm = msg.get_avp(283).and_then(|a| a.get_identity());

    let mut best: Option<(i32, Arc<Peer>)> = None;
    for peer in candidates {
        let mut s = score::INI;
        if let Some(host) = &dest_host {
            if host.as_str().eq_ignore_ascii_case(&peer.identity) {
                s += score::FINALDEST;
            }
        }
        if let Some(realm) = &dest_realm {
            if realm.as_str().eq_ignore_ascii_case(&peer.realm) {
                s += score::REALM;
            }
        }
        for cb in out_callbacks.iter() {
            s += cb(msg, &peer);
        }
        if best.as_ref().map(|(bs, _)| s > *bs).unwrap_or(true) {
            best = Some((s, peer));
        }
    }
    best.map(|(_, p)| p)
}

async fn dispatch_to_peer(node: &Arc<NodeContext>, routed: RoutedMessage, peer: Arc<Peer>) {
    node.hooks
        .fire(HookEvent {
            hook_type: HookType::MessageSent,
            msg: Some(&routed.msg),
            peer: Some(&peer),
            other: None,
        })
        .await;
    peer.send_request(routed.msg, routed.timeout, routed.anscb)
        .await;
}

/// No viable candidate (spec.md §4.7/§7): synthesize `UNABLE_TO_DELIVER`
/// and feed it into the response path.
async fn unable_to_deliver(node: &NodeContext, routed: RoutedMessage) {
    node.hooks
        .fire(HookEvent {
            hook_type: HookType::MessageDropped,
            msg: Some(&routed.msg),
            peer: None,
            other: Some("no candidate peer"),
        })
        .await;
    let mut answer = DiameterMessage::new_answer_from_request(&routed.msg);
    answer.rescode_set_symbolic("UNABLE_TO_DELIVER", None, None);
    if let Some(cb) = routed.anscb {
        let _ = cb.send(AnswerOutcome::UnableToDeliver(answer));
    } else {
        log::warn!(
            "message {} has no candidate peer and no answer callback; dropping",
            routed.msg.get_hop_by_hop_id()
        );
    }
}

/// dispatch pool (spec.md §4.7): pulls from `local`, invokes registered
/// callbacks in specificity order.
async fn dispatch_loop(node: Arc<NodeContext>) {
    let rx_holder = &node.routing.local_rx;
    loop {
        let item = {
            let mut guard = rx_holder.lock().await;
            match guard.as_mut() {
                Some(rx) => rx.recv().await,
                None => return,
            }
        };
        let Some(item) = item else { return };
        dispatch_one(&node, item).await;
    }
}

async fn dispatch_one(node: &NodeContext, item: LocalItem) {
    let LocalItem { mut msg, from_peer } = item;
    let callbacks = node.routing.dispatch_callbacks.read().await;

    let mut answer = None;
    for reg in callbacks.iter() {
        if !reg.how.matches(&msg) {
            continue;
        }
        match (reg.callback)(msg) {
            DispatchOutcome::Continue(m) => msg = m,
            DispatchOutcome::Answer(a) => {
                answer = Some(a);
                break;
            }
            DispatchOutcome::Consumed => return,
        }
    }

    if let Some(answer) = answer {
        if let Some(peer) = from_peer {
            if let Err(e) = peer.send_answer(&answer) {
                log::error!("failed to send answer to {}: {}", peer.identity, e);
            }
        } else {
            log::warn!("dispatch produced an answer for a locally-originated message; dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppEntry, NodeConfig};
    use crate::dictionary::Dictionary;

    fn node_with_apps() -> Arc<NodeContext> {
        let mut config = NodeConfig::default();
        config.identity = "nodeA.example.net".into();
        config.applications.push(AppEntry {
            app_id: 4, // ApplicationId::CreditControl
            vendor_id: 0,
            auth: true,
            acct: false,
        });
        NodeContext::new(config, Arc::new(Dictionary::new_default()))
    }

    #[tokio::test]
    async fn test_locally_deliverable_when_app_supported_and_no_dest_host() {
        use crate::diameter::{flags, ApplicationId, CommandCode};
        let node = node_with_apps();
        let msg = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1,
            1,
            Arc::clone(&node.dict),
        );
        assert!(is_locally_deliverable(&node, &msg).await);
    }

    #[tokio::test]
    async fn test_not_deliverable_when_dest_host_is_someone_else() {
        use crate::avp;
        use crate::avp::flags::M;
        use crate::avp::identity::Identity;
        use crate::diameter::{flags, ApplicationId, CommandCode};
        let node = node_with_apps();
        let mut msg = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1,
            1,
            Arc::clone(&node.dict),
        );
        msg.add_avp(avp!(293, None, M, Identity::new("someone-else.example.net")));
        assert!(!is_locally_deliverable(&node, &msg).await);
    }
}

//! Peer state machine (spec.md §4.4): drives a single [`Peer`] through
//! every state in the table, running capability exchange (`capability`),
//! watchdog/disconnect (`watchdog`), and handing fully-decoded application
//! messages off to routing-in (`routing::RoutingTables::post_incoming`).
//!
//! One `run` task is spawned per peer (via [`spawn`]) and is the *only*
//! writer of that peer's fields for as long as it runs (spec.md §5: "Per-
//! peer data is mutated only by its PSM thread; other threads communicate
//! by posting to the peer's event queue"). Everything else — routing-out
//! picking this peer, an application sending a request, an acceptor
//! matching an incoming connection to this identity — talks to the PSM
//! only through [`Peer::post`] or the peer's outgoing queue.

use crate::capability;
use crate::config::NodeConfig;
use crate::diameter::{CommandCode, DiameterMessage};
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::hooks::{HookEvent, HookType};
use crate::node::NodeContext;
use crate::peer::{AnswerOutcome, Peer, PeerState, PsmEvent};
use crate::routing::RoutedMessage;
use crate::transport::{Cnx, Side, TcpCnx, TlsCredentials};
use crate::watchdog;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Successive DWR/DWA round-trips required before `REOPEN` reinstates
/// `OPEN` (spec.md §4.6).
const REOPEN_ROUNDTRIPS: u32 = 3;

/// Delay spent in `CLOSING_GRACE` after DPR/DPA (spec.md §4.6: "2x Tc
/// recommended as a minimum").
fn closing_grace(node: &NodeContext) -> Duration {
    node.config.tc_timer() * 2
}

/// Spawns the PSM task for `peer`. `initiate` is true for peers this node
/// actively connects to (a configured `ConnectPeer`); false for peers only
/// ever reached by accepting an incoming connection.
pub fn spawn(node: Arc<NodeContext>, peer: Arc<Peer>, initiate: bool) {
    tokio::spawn(async move {
        run(node, peer, initiate).await;
    });
}

async fn run(node: Arc<NodeContext>, peer: Arc<Peer>, initiate: bool) {
    let mut event_rx = peer
        .event_rx
        .lock()
        .await
        .take()
        .expect("PSM started twice for the same peer");
    let mut out_rx = peer
        .out_rx
        .lock()
        .await
        .take()
        .expect("PSM started twice for the same peer");

    // A connection accepted while our own outgoing connect is still
    // in flight (spec.md §4.4 WAIT_CNX_ACK_ELEC): held here across loop
    // iterations until the election resolves one way or the other.
    let mut stashed_incoming: Option<(Arc<dyn Cnx>, DiameterMessage)> = None;
    let mut reopen_count: u32 = 0;

    loop {
        match peer.state().await {
            PeerState::Zombie => {
                log::info!("peer {} PSM exiting (ZOMBIE)", peer.identity);
                return;
            }

            PeerState::New | PeerState::Closed => {
                if peer.state().await == PeerState::Closed {
                    tokio::time::sleep(node.config.tc_timer()).await;
                }

                if !initiate {
                    // Incoming-only peer: sit idle until an accepted
                    // connection arrives.
                    match event_rx.recv().await {
                        Some(PsmEvent::ConnectionAccepted(cnx, cer)) => {
                            handle_fresh_incoming(&node, &peer, Arc::from(cnx), cer).await;
                        }
                        Some(PsmEvent::Terminate) | None => {
                            peer.set_state(PeerState::Zombie).await;
                        }
                        _ => {}
                    }
                    continue;
                }

                peer.set_state(PeerState::WaitCnxAck).await;
                let endpoints = ordered_endpoints(&peer).await;

                tokio::select! {
                    result = connect_any(&endpoints) => {
                        match result {
                            Ok(cnx) => {
                                start_outbound_cer(&node, &peer, Arc::new(cnx), &mut stashed_incoming).await;
                            }
                            Err(e) => {
                                log::warn!("peer {} connect failed: {}", peer.identity, e);
                                peer.set_state(PeerState::Closed).await;
                            }
                        }
                    }
                    Some(event) = event_rx.recv() => {
                        handle_wait_cnx_ack_event(&peer, event, &mut stashed_incoming).await;
                    }
                }
            }

            PeerState::WaitCnxAckElec => {
                let endpoints = ordered_endpoints(&peer).await;
                tokio::select! {
                    result = connect_any(&endpoints) => {
                        match result {
                            Ok(cnx) => {
                                start_outbound_cer(&node, &peer, Arc::new(cnx), &mut stashed_incoming).await;
                            }
                            Err(_) => {
                                // Our own attempt failed; the incoming
                                // connection wins by default.
                                if let Some((cnx, cer)) = stashed_incoming.take() {
                                    handle_fresh_incoming(&node, &peer, cnx, cer).await;
                                } else {
                                    peer.set_state(PeerState::Closed).await;
                                }
                            }
                        }
                    }
                    Some(event) = event_rx.recv() => {
                        handle_wait_cnx_ack_event(&peer, event, &mut stashed_incoming).await;
                    }
                }
            }

            PeerState::WaitCea => {
                tokio::select! {
                    _ = tokio::time::sleep(node.config.tc_timer()) => {
                        log::warn!("peer {} timed out awaiting CEA", peer.identity);
                        drop_connection(&node, &peer).await;
                    }
                    Some(event) = event_rx.recv() => {
                        handle_wait_cea_event(&node, &peer, event).await;
                    }
                }
            }

            PeerState::OpenHandshake => {
                // Transient (spec.md §4.4: "for debug"); the handshake
                // itself runs synchronously inside `start_outbound_cer` /
                // `handle_fresh_incoming`, so this state is never actually
                // parked on — if we do observe it, fall back to waiting.
                if let Some(event) = event_rx.recv().await {
                    handle_wait_cea_event(&node, &peer, event).await;
                }
            }

            PeerState::Open | PeerState::OpenNew | PeerState::Suspect | PeerState::Reopen => {
                connected_loop(&node, &peer, &mut event_rx, &mut out_rx, &mut reopen_count).await;
            }

            PeerState::Closing => {
                peer.set_state(PeerState::ClosingGrace).await;
            }

            PeerState::ClosingGrace => {
                tokio::time::sleep(closing_grace(&node)).await;
                drop_connection(&node, &peer).await;
            }
        }
    }
}

async fn ordered_endpoints(peer: &Peer) -> Vec<SocketAddr> {
    peer.endpoints
        .read()
        .await
        .ordered()
        .into_iter()
        .map(|e| e.addr)
        .collect()
}

/// Tries each endpoint in order (primary first), returning the first
/// successful connection (spec.md §4.3 `connect`).
async fn connect_any(endpoints: &[SocketAddr]) -> Result<TcpCnx> {
    let mut last_err = None;
    for addr in endpoints {
        match TcpCnx::connect(*addr).await {
            Ok(cnx) => return Ok(cnx),
            Err(e) => {
                log::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::PeerError("no configured endpoints".into())))
}

/// Parses `NodeConfig::listen_on` entries into the `Host-IP-Address`
/// values a CER/CEA advertises (spec.md §4.5); entries may be a bare
/// address or an `addr:port` pair.
fn local_addrs(cfg: &NodeConfig) -> Vec<IpAddr> {
    cfg.listen_on
        .iter()
        .filter_map(|s| {
            IpAddr::from_str(s)
                .ok()
                .or_else(|| SocketAddr::from_str(s).ok().map(|sa| sa.ip()))
        })
        .collect()
}

/// TLS credentials used for an inband (post-CEA) handshake.
///
/// Reads `cfg.tls_cred`'s `(cert, key)` PEM paths (spec.md §6 `TLS_Cred`)
/// into a `native_tls::Identity`. A missing or unreadable pair leaves the
/// credentials without an identity, so an inbound handshake as
/// [`Side::Acceptor`] fails fast rather than silently running without a
/// certificate; `NodeConfig::validate` already rejects configs that request
/// TLS without `tls_cred` set, so this only happens on an unreadable file.
fn node_tls_credentials(cfg: &NodeConfig) -> TlsCredentials {
    let identity = cfg.tls_cred.as_ref().and_then(|(cert_path, key_path)| {
        let cert = std::fs::read(cert_path)
            .map_err(|e| log::error!("reading TLS_Cred cert {}: {}", cert_path, e))
            .ok()?;
        let key = std::fs::read(key_path)
            .map_err(|e| log::error!("reading TLS_Cred key {}: {}", key_path, e))
            .ok()?;
        native_tls::Identity::from_pkcs8(&cert, &key)
            .map_err(|e| log::error!("parsing TLS_Cred {}/{}: {}", cert_path, key_path, e))
            .ok()
    });
    TlsCredentials {
        identity,
        accept_invalid_certs: false,
    }
}

/// Classifies a freshly decoded message into the [`PsmEvent`] its command
/// code and request bit imply (spec.md §4.4 "Events consumed by PSM").
fn classify(msg: DiameterMessage) -> PsmEvent {
    match (msg.get_command_code(), msg.is_request()) {
        (CommandCode::CapabilitiesExchange, true) => PsmEvent::CerReceived(msg),
        (CommandCode::CapabilitiesExchange, false) => PsmEvent::CeaReceived(msg),
        (CommandCode::DeviceWatchdog, true) => PsmEvent::Dwr(msg),
        (CommandCode::DeviceWatchdog, false) => PsmEvent::Dwa(msg),
        (CommandCode::DisconnectPeer, true) => PsmEvent::Dpr(msg),
        (CommandCode::DisconnectPeer, false) => PsmEvent::Dpa(msg),
        _ => PsmEvent::MessageReceived(msg),
    }
}

/// Spawns the task that keeps reading framed messages off `cnx` and
/// posting them to the peer's event queue until the connection errors.
fn spawn_reader(peer: Arc<Peer>, cnx: Arc<dyn Cnx>, dict: Arc<Dictionary>) {
    tokio::spawn(async move {
        loop {
            match cnx.recv(Arc::clone(&dict), 0).await {
                Ok(msg) => peer.post(classify(msg)),
                Err(e) => {
                    peer.post(PsmEvent::ConnectionError(e.to_string()));
                    return;
                }
            }
        }
    });
}

/// Events relevant while our own outgoing connect is still in flight
/// (spec.md §4.4 `WAITCNXACK`/`WAITCNXACK_ELEC`).
async fn handle_wait_cnx_ack_event(
    peer: &Arc<Peer>,
    event: PsmEvent,
    stashed: &mut Option<(Arc<dyn Cnx>, DiameterMessage)>,
) {
    match event {
        PsmEvent::ConnectionAccepted(cnx, cer) => {
            log::info!(
                "peer {}: incoming CER raced our outgoing connect, stashing for election",
                peer.identity
            );
            *stashed = Some((Arc::from(cnx), cer));
            peer.set_state(PeerState::WaitCnxAckElec).await;
        }
        PsmEvent::Terminate => peer.set_state(PeerState::Zombie).await,
        _ => {}
    }
}

/// Sends our CER on a newly established outgoing connection, resolving a
/// pending election first if an incoming CER was stashed while we were
/// connecting (spec.md §4.4/§4.5).
async fn start_outbound_cer(
    node: &Arc<NodeContext>,
    peer: &Arc<Peer>,
    cnx: Arc<dyn Cnx>,
    stashed: &mut Option<(Arc<dyn Cnx>, DiameterMessage)>,
) {
    if let Some((incoming_cnx, incoming_cer)) = stashed.take() {
        if capability::we_win_election(&node.config.identity, &peer.identity) {
            log::info!(
                "peer {}: won election, keeping our own connection",
                peer.identity
            );
            respond_election_lost(&incoming_cnx, &incoming_cer, node).await;
        } else {
            log::info!(
                "peer {}: lost election, accepting the incoming connection",
                peer.identity
            );
            handle_fresh_incoming(node, peer, incoming_cnx, incoming_cer).await;
            return;
        }
    }

    let addrs = local_addrs(&node.config);
    let mut cer = capability::build_cer(&node.config, Arc::clone(&node.dict), &addrs);
    let hbh = peer.next_hop_by_hop_id();
    cer.set_hop_by_hop_id(hbh);

    match cnx.send(&cer, 0).await {
        Ok(()) => {
            *peer.cnx.lock().await = Some(Arc::clone(&cnx));
            spawn_reader(Arc::clone(peer), cnx, Arc::clone(&node.dict));
            peer.set_state(PeerState::WaitCea).await;
        }
        Err(e) => {
            log::warn!("peer {} failed to send CER: {}", peer.identity, e);
            peer.set_state(PeerState::Closed).await;
        }
    }
}

async fn respond_election_lost(cnx: &Arc<dyn Cnx>, cer: &DiameterMessage, node: &NodeContext) {
    let mut cea = capability::build_cea(cer, &node.config, &[]);
    cea.rescode_set_symbolic("ELECTION_LOST", None, None);
    let _ = cnx.send(&cea, 0).await;
}

/// Events relevant while awaiting a CEA for our own CER (spec.md §4.4
/// `WAITCEA`, including the "election runs immediately" race).
async fn handle_wait_cea_event(node: &Arc<NodeContext>, peer: &Arc<Peer>, event: PsmEvent) {
    match event {
        PsmEvent::CeaReceived(cea) => {
            let success = cea.get_avp(268).and_then(|a| a.get_unsigned32())
                == Some(crate::diameter::rescode::DIAMETER_SUCCESS);
            if !success {
                log::warn!(
                    "peer {} CEA carried a non-success Result-Code",
                    peer.identity
                );
                drop_connection(node, peer).await;
                return;
            }

            let info = capability::parse_runtime_info(&cea);
            if let Err(e) = capability::negotiate_applications(
                &node.config.applications,
                &info.applications,
                node.config.is_relay,
            ) {
                log::warn!("peer {}: {}", peer.identity, e);
                drop_connection(node, peer).await;
                return;
            }

            if node.config.tls_old_method {
                match capability::negotiate_security(&node.config, &info.inband_security_ids) {
                    Ok(true) => {
                        let cnx = peer.cnx.lock().await.clone();
                        if let Some(cnx) = cnx {
                            let creds = node_tls_credentials(&node.config);
                            if let Err(e) = cnx.handshake(Side::Connector, &creds).await {
                                log::warn!("peer {} TLS handshake failed: {}", peer.identity, e);
                                drop_connection(node, peer).await;
                                return;
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!("peer {}: {}", peer.identity, e);
                        drop_connection(node, peer).await;
                        return;
                    }
                }
            }

            *peer.runtime.write().await = info;
            peer.set_state(PeerState::Open).await;
            node.hooks
                .fire(HookEvent {
                    hook_type: HookType::PeerConnected,
                    msg: None,
                    peer: Some(peer),
                    other: None,
                })
                .await;
            log::info!("peer {} OPEN", peer.identity);
        }
        PsmEvent::ConnectionAccepted(cnx, cer) => {
            if capability::we_win_election(&node.config.identity, &peer.identity) {
                respond_election_lost(&Arc::from(cnx), &cer, node).await;
            } else {
                handle_fresh_incoming(node, peer, Arc::from(cnx), cer).await;
            }
        }
        PsmEvent::ConnectionError(_) => drop_connection(node, peer).await,
        PsmEvent::Terminate => peer.set_state(PeerState::Zombie).await,
        _ => {}
    }
}

/// Processes a freshly accepted connection carrying a CER, as the
/// responder side of capability exchange (spec.md §4.5).
async fn handle_fresh_incoming(
    node: &Arc<NodeContext>,
    peer: &Arc<Peer>,
    cnx: Arc<dyn Cnx>,
    cer: DiameterMessage,
) {
    let info = capability::parse_runtime_info(&cer);

    let negotiation: Result<bool> = (|| {
        capability::negotiate_applications(
            &node.config.applications,
            &info.applications,
            node.config.is_relay,
        )?;
        capability::negotiate_security(&node.config, &info.inband_security_ids)
    })();

    match negotiation {
        Ok(use_inband_tls) => {
            let addrs = local_addrs(&node.config);
            let cea = capability::build_cea(&cer, &node.config, &addrs);
            if let Err(e) = cnx.send(&cea, 0).await {
                log::warn!("peer {} failed to send CEA: {}", peer.identity, e);
                peer.set_state(terminal_state(peer.persistent)).await;
                return;
            }

            if use_inband_tls {
                let creds = node_tls_credentials(&node.config);
                if let Err(e) = cnx.handshake(Side::Acceptor, &creds).await {
                    log::warn!("peer {} inbound TLS handshake failed: {}", peer.identity, e);
                    peer.set_state(PeerState::Zombie).await;
                    return;
                }
            }

            *peer.cnx.lock().await = Some(Arc::clone(&cnx));
            *peer.runtime.write().await = info;
            spawn_reader(Arc::clone(peer), cnx, Arc::clone(&node.dict));
            peer.set_state(PeerState::Open).await;
            node.hooks
                .fire(HookEvent {
                    hook_type: HookType::PeerConnected,
                    msg: None,
                    peer: Some(peer),
                    other: None,
                })
                .await;
            log::info!("peer {} OPEN (responder)", peer.identity);
        }
        Err(Error::Protocol(pei)) => {
            let mut cea = capability::build_cea(&cer, &node.config, &[]);
            cea.rescode_set_symbolic(pei.errcode, pei.message.as_deref(), None);
            let _ = cnx.send(&cea, 0).await;
            log::warn!("peer {} CER rejected: {}", peer.identity, pei);
            // Fatal per spec.md §4.5 (no common app / no common security).
            peer.set_state(PeerState::Zombie).await;
        }
        Err(e) => {
            log::warn!("peer {} CER negotiation error: {}", peer.identity, e);
            peer.set_state(PeerState::Zombie).await;
        }
    }
}

fn terminal_state(persistent: bool) -> PeerState {
    if persistent {
        PeerState::Closed
    } else {
        PeerState::Zombie
    }
}

/// The sub-loop run while a peer sits in `OPEN`, `OPEN_NEW`, `SUSPECT` or
/// `REOPEN`: services the connection's inbound events, flushes the
/// outgoing queue, and runs the Tw watchdog timer (spec.md §4.6).
async fn connected_loop(
    node: &Arc<NodeContext>,
    peer: &Arc<Peer>,
    event_rx: &mut mpsc::UnboundedReceiver<PsmEvent>,
    out_rx: &mut mpsc::UnboundedReceiver<DiameterMessage>,
    reopen_count: &mut u32,
) {
    let cnx = match peer.cnx.lock().await.clone() {
        Some(c) => c,
        None => {
            log::error!(
                "peer {} entered an OPEN* state with no connection",
                peer.identity
            );
            peer.set_state(PeerState::Closed).await;
            return;
        }
    };

    let mut tw_deadline = tokio::time::Instant::now() + node.config.tw_timer();
    let mut dw_pending = false;

    loop {
        let state = peer.state().await;
        if !matches!(
            state,
            PeerState::Open | PeerState::OpenNew | PeerState::Suspect | PeerState::Reopen
        ) {
            return;
        }

        tokio::select! {
            biased;

            Some(event) = event_rx.recv() => {
                match event {
                    PsmEvent::Dwr(msg) => {
                        let origin_state_id = peer.runtime.read().await.origin_state_id;
                        let dwa = watchdog::build_dwa(&msg, &node.config.identity, &node.config.realm, origin_state_id);
                        if cnx.send(&dwa, 0).await.is_err() {
                            peer.post(PsmEvent::ConnectionError("send DWA failed".into()));
                        }
                        tw_deadline = tokio::time::Instant::now() + node.config.tw_timer();
                    }
                    PsmEvent::Dwa(_) => {
                        dw_pending = false;
                        tw_deadline = tokio::time::Instant::now() + node.config.tw_timer();
                        match state {
                            PeerState::Suspect => peer.set_state(PeerState::Open).await,
                            PeerState::Reopen => {
                                *reopen_count += 1;
                                if *reopen_count >= REOPEN_ROUNDTRIPS {
                                    peer.set_state(PeerState::Open).await;
                                    *reopen_count = 0;
                                }
                            }
                            _ => {}
                        }
                    }
                    PsmEvent::Dpr(msg) => {
                        let dpa = watchdog::build_dpa(&msg, &node.config.identity, &node.config.realm);
                        let _ = cnx.send(&dpa, 0).await;
                        peer.set_state(PeerState::Closing).await;
                        return;
                    }
                    PsmEvent::Dpa(_) => {
                        peer.set_state(PeerState::Closing).await;
                        return;
                    }
                    PsmEvent::MessageReceived(msg) => {
                        handle_application_message(node, peer, msg).await;
                        tw_deadline = tokio::time::Instant::now() + node.config.tw_timer();
                    }
                    PsmEvent::SendRequest(msg, timeout, anscb) => {
                        peer.send_request(msg, timeout, anscb).await;
                    }
                    PsmEvent::ConnectionError(reason) => {
                        log::warn!("peer {} connection error: {}", peer.identity, reason);
                        drop_connection(node, peer).await;
                        return;
                    }
                    PsmEvent::Terminate => {
                        let dpr = watchdog::build_dpr(
                            &node.config.identity,
                            &node.config.realm,
                            watchdog::disconnect_cause::REBOOTING,
                            Arc::clone(&node.dict),
                        );
                        let _ = cnx.send(&dpr, 0).await;
                        peer.set_state(PeerState::Closing).await;
                        return;
                    }
                    _ => {}
                }
            }

            Some(msg) = out_rx.recv() => {
                if let Err(e) = cnx.send(&msg, 0).await {
                    log::warn!("peer {} send failed: {}", peer.identity, e);
                    peer.post(PsmEvent::ConnectionError(e.to_string()));
                }
            }

            _ = tokio::time::sleep_until(tw_deadline) => {
                if dw_pending {
                    log::warn!("peer {} missed two watchdogs, treating as connection error", peer.identity);
                    peer.post(PsmEvent::ConnectionError("watchdog timeout".into()));
                } else {
                    let origin_state_id = peer.runtime.read().await.origin_state_id;
                    let dwr = watchdog::build_dwr(&node.config.identity, &node.config.realm, origin_state_id, Arc::clone(&node.dict));
                    if cnx.send(&dwr, 0).await.is_ok() {
                        dw_pending = true;
                        if matches!(state, PeerState::Open | PeerState::OpenNew) {
                            peer.set_state(PeerState::Suspect).await;
                        }
                        tw_deadline = tokio::time::Instant::now() + node.config.tw_timer();
                    } else {
                        peer.post(PsmEvent::ConnectionError("send DWR failed".into()));
                    }
                }
            }
        }
    }
}

/// Routes a fully-decoded message that isn't CER/CEA/DWR/DWA/DPR/DPA: an
/// answer is correlated to its sent request (spec.md §4.7 "Answer
/// correlation"); a request is handed to routing-in.
async fn handle_application_message(node: &Arc<NodeContext>, peer: &Arc<Peer>, msg: DiameterMessage) {
    node.hooks
        .fire(HookEvent {
            hook_type: HookType::MessageReceived,
            msg: Some(&msg),
            peer: Some(peer),
            other: None,
        })
        .await;

    if msg.is_request() {
        node.routing.post_incoming(msg, Arc::clone(peer));
        return;
    }

    match peer.correlate_answer(msg).await {
        Ok((answer, Some(cb))) => {
            let _ = cb.send(AnswerOutcome::Answer(answer));
        }
        Ok((answer, None)) => {
            node.routing.post_local(answer, Some(Arc::clone(peer)));
        }
        Err(e) => {
            log::warn!(
                "peer {}: dropping unmatched answer: {}",
                peer.identity,
                e
            );
        }
    }
}

/// Connection loss or a peer-initiated graceful close (spec.md §4.4 "Any
/// connection error while connected"): drains the sent-request table,
/// re-posts every routable request to outgoing with the `T` flag set, and
/// moves to `CLOSED` (to retry after Tc) or `ZOMBIE` (if not persistent).
async fn drop_connection(node: &Arc<NodeContext>, peer: &Arc<Peer>) {
    *peer.cnx.lock().await = None;
    node.hooks
        .fire(HookEvent {
            hook_type: HookType::PeerDisconnected,
            msg: None,
            peer: Some(peer),
            other: None,
        })
        .await;

    let retransmits = peer.failover_drain().await;
    if !retransmits.is_empty() {
        let mut tried = HashSet::new();
        tried.insert(Peer::table_key(&peer.identity));
        for msg in retransmits {
            node.routing.post_outgoing(RoutedMessage {
                msg,
                route_record: HashSet::new(),
                tried_and_errored: tried.clone(),
                restarted: false,
                timeout: None,
                anscb: None,
            });
        }
    }

    peer.set_state(terminal_state(peer.persistent)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_grace_is_twice_tc() {
        let mut config = NodeConfig::default();
        config.tc_timer_secs = 5;
        let node = NodeContext::new(config, Arc::new(Dictionary::new_default()));
        assert_eq!(closing_grace(&node), Duration::from_secs(10));
    }

    #[test]
    fn test_local_addrs_parses_bare_and_socket_addrs() {
        let mut cfg = NodeConfig::default();
        cfg.listen_on = vec!["10.0.0.1".into(), "10.0.0.2:3868".into(), "garbage".into()];
        let addrs = local_addrs(&cfg);
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], IpAddr::from_str("10.0.0.1").unwrap());
        assert_eq!(addrs[1], IpAddr::from_str("10.0.0.2").unwrap());
    }

    #[test]
    fn test_terminal_state_respects_persistence() {
        assert_eq!(terminal_state(true), PeerState::Closed);
        assert_eq!(terminal_state(false), PeerState::Zombie);
    }
}

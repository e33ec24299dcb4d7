//! Listening acceptor (spec.md §4.4/§9: "one listening acceptor per
//! protocol family"): binds the configured port, reads the CER every
//! incoming connection must open with, and hands the connection + CER off
//! to the matching peer's PSM via [`crate::peer::PsmEvent::ConnectionAccepted`].
//!
//! A CER from an identity with no matching entry in the peer table creates
//! one on the fly (spec.md §3 "Peers: created via `peer_add` or on
//! accept"), non-persistent so it is dropped once it next reaches `ZOMBIE`.

use crate::config::PeerConfig;
use crate::diameter::{CommandCode, DiameterMessage};
use crate::node::NodeContext;
use crate::peer::{Peer, PeerState, PsmEvent};
use crate::psm;
use crate::transport::{Cnx, TcpCnx};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds `node.config.port` and accepts connections until the process
/// exits; each connection is handled on its own task so a slow or hostile
/// peer can't stall the acceptor (spec.md §4.4).
pub async fn listen(node: Arc<NodeContext>) -> std::io::Result<()> {
    if node.config.no_tcp {
        log::info!("TCP disabled, acceptor not starting");
        std::future::pending::<()>().await;
        unreachable!();
    }

    let addr = format!("0.0.0.0:{}", node.config.port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        log::debug!("accepted connection from {}", peer_addr);
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_incoming(node, stream).await {
                log::warn!("incoming connection from {} dropped: {}", peer_addr, e);
            }
        });
    }
}

async fn handle_incoming(node: Arc<NodeContext>, stream: tokio::net::TcpStream) -> crate::error::Result<()> {
    let cnx = TcpCnx::from_stream(stream);
    let first = cnx.recv(Arc::clone(&node.dict), 0).await?;

    if first.get_command_code() != CommandCode::CapabilitiesExchange || !first.is_request() {
        log::warn!("incoming connection's first message was not a CER, discarding");
        return Ok(());
    }

    let origin_host = first
        .get_avp(264)
        .and_then(|a| a.get_identity())
        .map(|id| id.as_str().to_string());

    let origin_host = match origin_host {
        Some(h) => h,
        None => {
            log::warn!("CER missing Origin-Host, discarding");
            return Ok(());
        }
    };

    let peer = match node.peers.get(&origin_host).await {
        Some(peer) => peer,
        None => {
            log::info!("CER from unknown peer {}, creating dynamically", origin_host);
            let realm = first
                .get_avp(296)
                .and_then(|a| a.get_identity())
                .map(|id| id.as_str().to_string())
                .unwrap_or_else(|| node.config.realm.clone());
            let peer = Peer::new(
                origin_host.clone(),
                realm,
                PeerConfig {
                    identity: origin_host.clone(),
                    persistent: false,
                    ..Default::default()
                },
            );
            node.peers.add(Arc::clone(&peer)).await;
            psm::spawn(Arc::clone(&node), Arc::clone(&peer), false);
            peer
        }
    };

    match peer.state().await {
        PeerState::New | PeerState::Closed | PeerState::WaitCnxAck | PeerState::WaitCea => {
            peer.post(PsmEvent::ConnectionAccepted(Box::new(cnx), first));
        }
        other => {
            log::warn!(
                "CER from peer {} arrived in state {:?}, rejecting",
                origin_host,
                other
            );
            let mut answer = DiameterMessage::new_answer_from_request(&first);
            answer.add_origin(&node.config.identity, &node.config.realm);
            answer.rescode_set_symbolic("DIAMETER_UNABLE_TO_COMPLY", None, None);
            let _ = cnx.send(&answer, 0).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_compiles() {
        // Binding a real listener needs a runtime; covered by integration
        // tests instead. This just asserts the module's helper types line up.
        let _ = PeerState::New;
    }
}

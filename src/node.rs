//! The root node context (spec.md §9 design note: "construct a root
//! context value at startup and pass it through component APIs; avoid
//! process-wide singletons"). Owns the dictionary, configuration, peer
//! table, routing tables and hook registry a running Diameter node needs,
//! and is shared via `Arc` rather than exposed as a global.

use crate::config::NodeConfig;
use crate::diameter::{ApplicationId, CommandCode, DiameterMessage};
use crate::dictionary::Dictionary;
use crate::hooks::HookRegistry;
use crate::peer::{Peer, PeerTable};
use crate::routing::RoutingTables;
use crate::{acceptor, extension, psm};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct NodeContext {
    pub config: NodeConfig,
    pub dict: Arc<Dictionary>,
    pub peers: PeerTable,
    pub routing: RoutingTables,
    pub hooks: HookRegistry,
    /// Kept alive for the process lifetime once loaded (spec.md §4.8): an
    /// extension's registered callbacks may be called at any point after
    /// `fd_ext_entry` returns, so its `Library` must stay mapped.
    pub extensions: tokio::sync::Mutex<extension::ExtensionRegistry>,
    e2e_counter: AtomicU32,
}

impl NodeContext {
    /// Builds the root context. The end-to-end id counter is seeded from a
    /// random base (spec.md §3: "assigned at message creation from a
    /// process-unique counter seeded from a random base").
    pub fn new(config: NodeConfig, dict: Arc<Dictionary>) -> Arc<NodeContext> {
        Arc::new(NodeContext {
            config,
            dict,
            peers: PeerTable::new(),
            routing: RoutingTables::new(),
            hooks: HookRegistry::new(),
            extensions: tokio::sync::Mutex::new(extension::ExtensionRegistry::new()),
            e2e_counter: AtomicU32::new(rand::random()),
        })
    }

    /// Starts a node: validates `config`, builds the root context, spawns a
    /// PSM task for every configured `ConnectPeer` (spec.md §6), loads any
    /// configured extensions, and spawns the listening acceptor
    /// (spec.md §9 "one listening acceptor per protocol family"). Returns
    /// the context immediately; the acceptor and per-peer PSM tasks keep
    /// running in the background for the life of the process.
    pub async fn start(config: NodeConfig, dict: Arc<Dictionary>) -> crate::error::Result<Arc<NodeContext>> {
        config.validate()?;
        let connect_peers = config.connect_peers.clone();
        let load_extensions = config.load_extensions.clone();
        let node = NodeContext::new(config, dict);

        for peer_config in connect_peers {
            let identity = peer_config.identity.clone();
            let realm = peer_config
                .realm
                .clone()
                .unwrap_or_else(|| node.config.realm.clone());
            let persistent = peer_config.persistent;
            let port = peer_config.port.unwrap_or(node.config.port);
            let peer = Peer::new(identity.clone(), realm, peer_config);

            // DNS resolution strategy itself is out of scope (spec.md §1
            // Non-goals); this just resolves the identity as a hostname via
            // the system resolver, the simplest strategy available.
            match tokio::net::lookup_host((identity.as_str(), port)).await {
                Ok(addrs) => {
                    let mut endpoints = peer.endpoints.write().await;
                    for (i, addr) in addrs.enumerate() {
                        endpoints.merge(
                            addr,
                            crate::peer::EndpointFlags {
                                configured: true,
                                primary: i == 0,
                                ..Default::default()
                            },
                        );
                    }
                }
                Err(e) => {
                    log::warn!("could not resolve connect peer {}: {}", identity, e);
                }
            }

            node.peers.add(Arc::clone(&peer)).await;
            psm::spawn(Arc::clone(&node), peer, true);
            log::info!("configured connect peer {} (persistent={})", identity, persistent);
        }

        if !load_extensions.is_empty() {
            let mut registry = node.extensions.lock().await;
            for (path, conf) in &load_extensions {
                if let Err(e) = unsafe { registry.load(path, conf) } {
                    log::error!("failed to load extension {}: {}", path, e);
                }
            }
        }

        // Routing-in/dispatch/routing-out (spec.md §4.7/§5): must be running
        // before any peer can post to `incoming`, since the channels have no
        // buffering guarantee beyond the mpsc queue itself.
        RoutingTables::spawn(Arc::clone(&node), node.config.app_serv_threads);

        {
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                if let Err(e) = acceptor::listen(node).await {
                    log::error!("acceptor exited: {}", e);
                }
            });
        }

        Ok(node)
    }

    pub fn next_end_to_end_id(&self) -> u32 {
        self.e2e_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// `new_request` (spec.md §4.2): allocates a fresh end-to-end id; the
    /// hop-by-hop id is left at 0 here and is stamped by the sending peer
    /// just before transmission (`Peer::send_request`).
    pub fn new_request(
        &self,
        code: CommandCode,
        application_id: ApplicationId,
        flags: u8,
    ) -> DiameterMessage {
        use crate::diameter::flags::R;
        DiameterMessage::new(
            code,
            application_id,
            flags | R,
            0,
            self.next_end_to_end_id(),
            Arc::clone(&self.dict),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_e2e_ids_are_unique_and_monotonic() {
        let node = NodeContext::new(NodeConfig::default(), Arc::new(Dictionary::new_default()));
        let a = node.next_end_to_end_id();
        let b = node.next_end_to_end_id();
        assert_eq!(b, a.wrapping_add(1));
    }
}

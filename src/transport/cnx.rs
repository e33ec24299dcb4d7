//! Connection context (spec.md §4.3): a byte-stream abstraction over TCP
//! (the only transport the corpus ships a crate for — SCTP is modeled at
//! the trait level only, see DESIGN.md) with optional TLS, exposing the
//! send/recv/handshake/endpoints primitives the peer state machine drives.
//!
//! Read and write halves are guarded by independent mutexes so a pending
//! `recv` (which can block indefinitely waiting on the next message) never
//! stalls a concurrent `send`, and vice versa; only `handshake` needs both.

use crate::diameter::DiameterMessage;
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::transport::Codec;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Which side of a handshake a connection context is playing; CER/CEA and
/// TLS negotiation both need to know (spec.md §4.5 "new" vs "inband-old").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Connector,
    Acceptor,
}

/// TLS credentials used by [`Cnx::handshake`]. Opaque beyond what
/// `native-tls` needs; kept separate from `config::NodeConfig` so a `Cnx`
/// implementation can be tested without a full node.
#[derive(Clone, Default)]
pub struct TlsCredentials {
    pub identity: Option<native_tls::Identity>,
    pub accept_invalid_certs: bool,
}

/// The connection-context surface spec.md §4.3 names. A SCTP implementation
/// would add a `stream_id` to `send`/`recv` for multi-stream support; no
/// concrete SCTP transport ships in this core (see DESIGN.md), so the trait
/// carries the parameter but `TcpCnx` always uses stream 0.
#[async_trait]
pub trait Cnx: Send + Sync {
    async fn send(&self, msg: &DiameterMessage, stream_id: u16) -> Result<()>;
    async fn recv(&self, dict: Arc<Dictionary>, stream_id: u16) -> Result<DiameterMessage>;
    async fn handshake(&self, side: Side, credentials: &TlsCredentials) -> Result<()>;
    fn remote_endpoint(&self) -> Option<SocketAddr>;
    fn is_secure(&self) -> bool;
}

enum ReadSide {
    Clear(ReadHalf<TcpStream>),
    Tls(ReadHalf<tokio_native_tls::TlsStream<TcpStream>>),
}

enum WriteSide {
    Clear(WriteHalf<TcpStream>),
    Tls(WriteHalf<tokio_native_tls::TlsStream<TcpStream>>),
}

/// The only concrete [`Cnx`] this core ships: single-stream TCP, optionally
/// upgraded to TLS via [`Cnx::handshake`].
pub struct TcpCnx {
    read: Mutex<Option<ReadSide>>,
    write: Mutex<Option<WriteSide>>,
    remote: Option<SocketAddr>,
    secure: AtomicBool,
}

impl TcpCnx {
    pub fn from_stream(stream: TcpStream) -> TcpCnx {
        let remote = stream.peer_addr().ok();
        let (r, w) = tokio::io::split(stream);
        TcpCnx {
            read: Mutex::new(Some(ReadSide::Clear(r))),
            write: Mutex::new(Some(WriteSide::Clear(w))),
            remote,
            secure: AtomicBool::new(false),
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<TcpCnx> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TcpCnx::from_stream(stream))
    }
}

#[async_trait]
impl Cnx for TcpCnx {
    async fn send(&self, msg: &DiameterMessage, _stream_id: u16) -> Result<()> {
        let mut write = self.write.lock().await;
        match write.as_mut() {
            Some(WriteSide::Clear(w)) => Codec::encode(w, msg).await,
            Some(WriteSide::Tls(w)) => Codec::encode(w, msg).await,
            None => Err(Error::PeerError("connection mid-handshake".into())),
        }
    }

    async fn recv(&self, dict: Arc<Dictionary>, _stream_id: u16) -> Result<DiameterMessage> {
        // Only one reader per cnx in practice (the PSM's receive loop), but
        // the lock is held only for the duration of one decode, so a
        // concurrent send is never blocked by a pending recv.
        let mut read = self.read.lock().await;
        match read.as_mut() {
            Some(ReadSide::Clear(r)) => Codec::decode(r, dict).await,
            Some(ReadSide::Tls(r)) => Codec::decode(r, dict).await,
            None => Err(Error::PeerError("connection mid-handshake".into())),
        }
    }

    async fn handshake(&self, side: Side, credentials: &TlsCredentials) -> Result<()> {
        // Lock both halves (read then write, a fixed order, so a concurrent
        // handshake attempt can't deadlock against this one) and take them
        // out for the duration of the upgrade; send/recv see `None` and
        // return a "mid-handshake" error rather than blocking.
        let mut read_guard = self.read.lock().await;
        let mut write_guard = self.write.lock().await;

        let read_side = read_guard
            .take()
            .ok_or_else(|| Error::PeerError("connection mid-handshake".into()))?;
        let write_side = write_guard
            .take()
            .ok_or_else(|| Error::PeerError("connection mid-handshake".into()))?;

        let stream = match (read_side, write_side) {
            (ReadSide::Clear(r), WriteSide::Clear(w)) => r.unsplit(w),
            (r, w) => {
                *read_guard = Some(r);
                *write_guard = Some(w);
                return Err(Error::PeerError("connection already TLS-secured".into()));
            }
        };

        let tls_stream = match side {
            Side::Connector => {
                let connector = tokio_native_tls::TlsConnector::from(
                    native_tls::TlsConnector::builder()
                        .danger_accept_invalid_certs(credentials.accept_invalid_certs)
                        .build()?,
                );
                connector.connect("", stream).await?
            }
            Side::Acceptor => {
                let identity = credentials
                    .identity
                    .clone()
                    .ok_or_else(|| Error::PeerError("no TLS identity configured".into()))?;
                let acceptor =
                    tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity)?);
                acceptor.accept(stream).await?
            }
        };

        let (r, w) = tokio::io::split(tls_stream);
        *read_guard = Some(ReadSide::Tls(r));
        *write_guard = Some(WriteSide::Tls(w));
        self.secure.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn remote_endpoint(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn is_secure(&self) -> bool {
        self.secure.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _cnx_is_object_safe(_: &dyn Cnx) {}
}

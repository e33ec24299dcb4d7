//! Node configuration: the in-memory product of parsing the directives
//! spec.md §6 names (`Identity`, `Realm`, `Port`, ...). The core does not
//! parse the YACC grammar itself (out of scope per spec.md §1); it accepts
//! a `NodeConfig` built either by `NodeConfig::default()`, a small
//! line-oriented loader good enough for tests and embedding
//! (`NodeConfig::from_str`), or `serde::Deserialize` from TOML/JSON.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// A single `ConnectPeer` / locally-supported-application entry
/// (spec.md §3 "Application entry").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppEntry {
    pub app_id: u32,
    pub vendor_id: u32,
    pub auth: bool,
    pub acct: bool,
}

/// Per-peer override block inside a `ConnectPeer` directive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerConfig {
    pub identity: String,
    pub realm: Option<String>,
    pub port: Option<u16>,
    pub tc_timer: Option<u64>,
    pub tw_timer: Option<u64>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub no_tls: bool,
}

/// The local node's full configuration, per spec.md §6.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub identity: String,
    pub realm: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sec_port")]
    pub sec_port: u16,
    #[serde(default)]
    pub no_ip: bool,
    #[serde(default)]
    pub no_ipv6: bool,
    #[serde(default)]
    pub no_tcp: bool,
    #[serde(default)]
    pub no_sctp: bool,
    #[serde(default)]
    pub prefer_tcp: bool,
    #[serde(default)]
    pub tls_old_method: bool,
    pub tls_cred: Option<(String, String)>,
    pub tls_ca: Option<String>,
    pub tls_crl: Option<String>,
    pub tls_prio: Option<String>,
    #[serde(default)]
    pub listen_on: Vec<String>,
    #[serde(default = "default_tc_timer")]
    pub tc_timer_secs: u64,
    #[serde(default = "default_tw_timer")]
    pub tw_timer_secs: u64,
    #[serde(default = "default_app_serv_threads")]
    pub app_serv_threads: usize,
    #[serde(default)]
    pub applications: Vec<AppEntry>,
    #[serde(default)]
    pub connect_peers: Vec<PeerConfig>,
    #[serde(default)]
    pub load_extensions: Vec<(String, String)>,
    #[serde(default)]
    pub is_relay: bool,
}

fn default_port() -> u16 {
    3868
}
fn default_sec_port() -> u16 {
    3869
}
fn default_tc_timer() -> u64 {
    30
}
fn default_tw_timer() -> u64 {
    30
}
fn default_app_serv_threads() -> usize {
    4
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            identity: "localhost".into(),
            realm: "localhost".into(),
            port: default_port(),
            sec_port: default_sec_port(),
            no_ip: false,
            no_ipv6: false,
            no_tcp: false,
            no_sctp: true, // no SCTP implementation ships (see DESIGN.md)
            prefer_tcp: true,
            tls_old_method: false,
            tls_cred: None,
            tls_ca: None,
            tls_crl: None,
            tls_prio: None,
            listen_on: Vec::new(),
            tc_timer_secs: default_tc_timer(),
            tw_timer_secs: default_tw_timer(),
            app_serv_threads: default_app_serv_threads(),
            applications: Vec::new(),
            connect_peers: Vec::new(),
            load_extensions: Vec::new(),
            is_relay: false,
        }
    }
}

impl NodeConfig {
    pub fn tc_timer(&self) -> Duration {
        Duration::from_secs(self.tc_timer_secs)
    }

    pub fn tw_timer(&self) -> Duration {
        Duration::from_secs(self.tw_timer_secs)
    }

    /// Checks the invariants spec.md §6 names: TLS key/cert presence when
    /// TLS is in use, IP/IPv6 not both disabled, TCP/SCTP not both
    /// disabled.
    pub fn validate(&self) -> Result<()> {
        if self.no_ip && self.no_ipv6 {
            return Err(Error::DictionaryError(
                "configuration disables both IP and IPv6".into(),
            ));
        }
        if self.no_tcp && self.no_sctp {
            return Err(Error::DictionaryError(
                "configuration disables both TCP and SCTP".into(),
            ));
        }
        if (self.tls_old_method || self.tls_prio.is_some()) && self.tls_cred.is_none() {
            return Err(Error::DictionaryError(
                "TLS requested but TLS_Cred is missing".into(),
            ));
        }
        Ok(())
    }

    /// Parses a minimal line-oriented rendition of spec.md §6's directives:
    /// `Key = "value"` or `Key = value`, one per line, `#` comments,
    /// blank lines ignored. Not a YACC-equivalent grammar (explicitly out
    /// of scope); good enough for tests and simple embedding.
    pub fn from_str(text: &str) -> Result<NodeConfig> {
        let mut cfg = NodeConfig::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), unquote(v.trim())),
                None => (line, String::new()),
            };
            match key {
                "Identity" => cfg.identity = value,
                "Realm" => cfg.realm = value,
                "Port" => cfg.port = value.parse().unwrap_or(cfg.port),
                "SecPort" => cfg.sec_port = value.parse().unwrap_or(cfg.sec_port),
                "No_IP" => cfg.no_ip = true,
                "No_IPv6" => cfg.no_ipv6 = true,
                "No_TCP" => cfg.no_tcp = true,
                "No_SCTP" => cfg.no_sctp = true,
                "Prefer_TCP" => cfg.prefer_tcp = true,
                "TLS_old_method" => cfg.tls_old_method = true,
                "TLS_Cred" => {
                    let parts: Vec<String> = value
                        .split_whitespace()
                        .map(|p| unquote(p))
                        .collect();
                    if parts.len() == 2 {
                        cfg.tls_cred = Some((parts[0].clone(), parts[1].clone()));
                    } else {
                        log::warn!("TLS_Cred expects two quoted paths, got: {}", value);
                    }
                }
                "TLS_CA" => cfg.tls_ca = Some(value),
                "TLS_CRL" => cfg.tls_crl = Some(value),
                "TLS_Prio" => cfg.tls_prio = Some(value),
                "ListenOn" => cfg.listen_on.push(value),
                "TcTimer" => cfg.tc_timer_secs = value.parse().unwrap_or(cfg.tc_timer_secs),
                "TwTimer" => cfg.tw_timer_secs = value.parse().unwrap_or(cfg.tw_timer_secs),
                "AppServThreads" => {
                    cfg.app_serv_threads = value.parse().unwrap_or(cfg.app_serv_threads)
                }
                _ => {
                    log::debug!("ignoring unrecognized config directive: {}", key);
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn unquote(s: &str) -> String {
    s.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_no_ip_and_no_ipv6() {
        let mut cfg = NodeConfig::default();
        cfg.no_ip = true;
        cfg.no_ipv6 = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_no_tcp_and_no_sctp() {
        let mut cfg = NodeConfig::default();
        cfg.no_tcp = true;
        cfg.no_sctp = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_tls_without_cred() {
        let mut cfg = NodeConfig::default();
        cfg.tls_old_method = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_str_parses_tls_cred() {
        let text = r#"
            Identity = "nodeA.example.net"
            Realm = "example.net"
            TLS_Cred = "cert.pem" "key.pem"
        "#;
        let cfg = NodeConfig::from_str(text).unwrap();
        assert_eq!(
            cfg.tls_cred,
            Some(("cert.pem".to_string(), "key.pem".to_string()))
        );
    }

    #[test]
    fn test_from_str_parses_directives() {
        let text = r#"
            Identity = "nodeA.example.net"
            Realm = "example.net"
            Port = 3868
            TcTimer = 10
            Prefer_TCP
        "#;
        let cfg = NodeConfig::from_str(text).unwrap();
        assert_eq!(cfg.identity, "nodeA.example.net");
        assert_eq!(cfg.realm, "example.net");
        assert_eq!(cfg.tc_timer_secs, 10);
        assert!(cfg.prefer_tcp);
    }
}

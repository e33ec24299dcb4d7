//! Capability exchange (spec.md §4.5): building CER/CEA, parsing a peer's
//! advertisement into a [`RuntimeInfo`], the election comparator used on a
//! simultaneous-connect race, and the security/application negotiation the
//! PSM runs once both sides' capabilities are known.

use crate::avp::address::{Address, Value as AddressValue};
use crate::avp::enumerated::Enumerated;
use crate::avp::flags::M;
use crate::avp::group::Grouped;
use crate::avp::identity::Identity;
use crate::avp::unsigned32::Unsigned32;
use crate::avp::utf8string::UTF8String;
use crate::avp::Avp;
use crate::config::{AppEntry, NodeConfig};
use crate::diameter::{flags, rescode, ApplicationId, CommandCode, DiameterMessage};
use crate::dictionary::Dictionary;
use crate::error::{Error, Pei, Result};
use crate::peer::RuntimeInfo;
use std::net::IpAddr;
use std::sync::Arc;

pub const PRODUCT_NAME: &str = "freeDiameter-rs";
const FIRMWARE_REVISION: u32 = 1;

/// Legacy RFC3588-style "TLS after CER/CEA" negotiation value for
/// Inband-Security-Id (299).
const INBAND_SECURITY_TLS: i32 = 1;

/// Builds a CER (spec.md §4.5): Origin-Host/Realm, one Host-IP-Address per
/// listening address, Vendor-Id/Product-Name/Firmware-Revision, one
/// Auth/Acct-Application-Id or Vendor-Specific-Application-Id per locally
/// supported application, and (only when `tls_old_method` is set)
/// Inband-Security-Id.
pub fn build_cer(node: &NodeConfig, dict: Arc<Dictionary>, local_addrs: &[IpAddr]) -> DiameterMessage {
    let mut msg = DiameterMessage::new(
        CommandCode::CapabilitiesExchange,
        ApplicationId::Common,
        flags::R,
        0,
        rand::random(),
        dict,
    );
    add_capabilities_avps(&mut msg, node, local_addrs);
    msg
}

/// Builds the CEA answering `request`; caller sets the final Result-Code
/// separately if negotiation failed (spec.md §4.5's CER/CEA handler does
/// the negotiation after this shell is built).
pub fn build_cea(request: &DiameterMessage, node: &NodeConfig, local_addrs: &[IpAddr]) -> DiameterMessage {
    let mut msg = DiameterMessage::new_answer_from_request(request);
    add_capabilities_avps(&mut msg, node, local_addrs);
    msg.rescode_set(rescode::DIAMETER_SUCCESS);
    msg
}

fn add_capabilities_avps(msg: &mut DiameterMessage, node: &NodeConfig, local_addrs: &[IpAddr]) {
    msg.add_origin(&node.identity, &node.realm);

    for addr in local_addrs {
        let value = match addr {
            IpAddr::V4(v) => AddressValue::IPv4(*v),
            IpAddr::V6(v) => AddressValue::IPv6(*v),
        };
        msg.add_avp(Avp::new(257, None, M, Address::new(value).into()));
    }

    msg.add_avp(Avp::new(269, None, M, UTF8String::new(PRODUCT_NAME).into()));
    msg.add_avp(Avp::new(
        267,
        None,
        M,
        Unsigned32::new(FIRMWARE_REVISION).into(),
    ));

    let dict = Arc::clone(msg.dict());
    let mut supported_vendors: Vec<u32> = Vec::new();
    for app in &node.applications {
        let app_avp_code = if app.auth { 258 } else { 259 };
        if app.vendor_id == 0 {
            msg.add_avp(Avp::new(
                app_avp_code,
                None,
                M,
                Unsigned32::new(app.app_id).into(),
            ));
        } else {
            let mut group = Grouped::new(vec![], Arc::clone(&dict));
            group.add_avp(266, None, M, Unsigned32::new(app.vendor_id).into());
            group.add_avp(app_avp_code, None, M, Unsigned32::new(app.app_id).into());
            msg.add_avp(Avp::new(260, None, M, group.into()));
            if !supported_vendors.contains(&app.vendor_id) {
                supported_vendors.push(app.vendor_id);
            }
        }
    }
    for vendor_id in supported_vendors {
        msg.add_avp(Avp::new(265, None, M, Unsigned32::new(vendor_id).into()));
    }

    if node.tls_old_method {
        msg.add_avp(Avp::new(
            299,
            None,
            M,
            Enumerated::new(INBAND_SECURITY_TLS).into(),
        ));
    }
}

/// Parses a peer's CER/CEA into the [`RuntimeInfo`] cached on its `Peer`
/// (spec.md §4.5). Unrecognized AVPs are ignored; malformed ones are
/// skipped rather than rejected, since capability parsing itself is not
/// ABNF-validated here (`DiameterMessage::parse_dict` covers that).
pub fn parse_runtime_info(msg: &DiameterMessage) -> RuntimeInfo {
    let mut info = RuntimeInfo::default();

    for avp in &msg.avps {
        match avp.get_code() {
            257 => {
                if let Some(addr) = avp.get_address() {
                    info.host_ip_addresses.push(addr.ip());
                }
            }
            266 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.vendor_id = Some(v);
                }
            }
            269 => {
                if let Some(s) = avp.get_utf8string() {
                    info.product_name = Some(s.to_string());
                }
            }
            267 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.firmware_revision = Some(v);
                }
            }
            278 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.origin_state_id = Some(v);
                }
            }
            258 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.applications.push(AppEntry {
                        app_id: v,
                        vendor_id: 0,
                        auth: true,
                        acct: false,
                    });
                }
            }
            259 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.applications.push(AppEntry {
                        app_id: v,
                        vendor_id: 0,
                        auth: false,
                        acct: true,
                    });
                }
            }
            260 => {
                if let Some(group) = avp.get_grouped() {
                    let vendor_id = group
                        .avps()
                        .iter()
                        .find(|a| a.get_code() == 266)
                        .and_then(|a| a.get_unsigned32())
                        .unwrap_or(0);
                    if let Some(app_id) = group
                        .avps()
                        .iter()
                        .find(|a| a.get_code() == 258)
                        .and_then(|a| a.get_unsigned32())
                    {
                        info.applications.push(AppEntry {
                            app_id,
                            vendor_id,
                            auth: true,
                            acct: false,
                        });
                    }
                    if let Some(app_id) = group
                        .avps()
                        .iter()
                        .find(|a| a.get_code() == 259)
                        .and_then(|a| a.get_unsigned32())
                    {
                        info.applications.push(AppEntry {
                            app_id,
                            vendor_id,
                            auth: false,
                            acct: true,
                        });
                    }
                }
            }
            265 => {
                if let Some(v) = avp.get_unsigned32() {
                    info.supported_vendor_ids.push(v);
                }
            }
            299 => {
                if let Some(v) = avp.get_enumerated() {
                    info.inband_security_ids.push(v as u32);
                }
            }
            _ => {}
        }
    }

    info
}

/// Simultaneous-connect election (spec.md §4.4 "WAIT_CNX_ACK_ELEC"): the
/// side whose `DiameterIdentity` sorts less (case-insensitive) keeps its
/// connection; the other side closes the one it initiated.
pub fn we_win_election(local_identity: &str, peer_identity: &str) -> bool {
    let local = Identity::new(local_identity.as_bytes().to_vec());
    let peer = Identity::new(peer_identity.as_bytes().to_vec());
    local.election_cmp(&peer) == std::cmp::Ordering::Less
}

/// Security method negotiation (spec.md §4.5). Returns `Ok(true)` if the
/// legacy inband-TLS method was agreed, `Ok(false)` if this node uses the
/// separate-port TLS method (nothing to negotiate inband), or
/// `DIAMETER_NO_COMMON_SECURITY` if this node requires the legacy method
/// and the peer didn't advertise it.
pub fn negotiate_security(local: &NodeConfig, peer_inband_security_ids: &[u32]) -> Result<bool> {
    if !local.tls_old_method {
        return Ok(false);
    }
    if peer_inband_security_ids.contains(&(INBAND_SECURITY_TLS as u32)) {
        Ok(true)
    } else {
        Err(Error::Protocol(Pei::new("DIAMETER_NO_COMMON_SECURITY")))
    }
}

/// Application overlap negotiation (spec.md §4.5). Relays bypass this
/// check entirely (spec.md §4.7 "a relay forwards regardless of whether it
/// locally supports an application").
pub fn negotiate_applications(
    local_apps: &[AppEntry],
    peer_apps: &[AppEntry],
    is_relay: bool,
) -> Result<()> {
    if is_relay || local_apps.is_empty() {
        return Ok(());
    }
    let common = local_apps
        .iter()
        .any(|local| peer_apps.iter().any(|peer| peer.app_id == local.app_id));
    if common {
        Ok(())
    } else {
        Err(Error::Protocol(Pei::new("DIAMETER_NO_COMMON_APPLICATION")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    fn dict() -> Arc<Dictionary> {
        Arc::new(Dictionary::new_default())
    }

    fn node() -> NodeConfig {
        let mut cfg = NodeConfig::default();
        cfg.identity = "nodeA.example.net".into();
        cfg.realm = "example.net".into();
        cfg.applications.push(AppEntry {
            app_id: 4,
            vendor_id: 0,
            auth: true,
            acct: false,
        });
        cfg
    }

    #[test]
    fn test_build_cer_round_trips_through_parse_runtime_info() {
        let cfg = node();
        let addrs = [IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1))];
        let cer = build_cer(&cfg, dict(), &addrs);

        let info = parse_runtime_info(&cer);
        assert_eq!(info.product_name.as_deref(), Some(PRODUCT_NAME));
        assert_eq!(info.host_ip_addresses, vec![addrs[0]]);
        assert_eq!(info.applications.len(), 1);
        assert_eq!(info.applications[0].app_id, 4);
        assert!(info.applications[0].auth);
    }

    #[test]
    fn test_vendor_specific_application_round_trips() {
        let mut cfg = node();
        cfg.applications.push(AppEntry {
            app_id: 16777238,
            vendor_id: 10415,
            auth: true,
            acct: false,
        });
        let cer = build_cer(&cfg, dict(), &[]);
        let info = parse_runtime_info(&cer);

        assert!(info
            .applications
            .iter()
            .any(|a| a.app_id == 16777238 && a.vendor_id == 10415));
        assert!(info.supported_vendor_ids.contains(&10415));
    }

    #[test]
    fn test_election_is_case_insensitive_and_deterministic() {
        assert!(we_win_election("aaa.example.net", "zzz.example.net"));
        assert!(!we_win_election("zzz.example.net", "aaa.example.net"));
        assert!(!we_win_election("HOST.example.net", "host.example.net"));
    }

    #[test]
    fn test_election_matches_spec_scenario() {
        // spec.md §8 scenario 3: local identity "peer1" vs remote "peer2";
        // peer1 < peer2 so the local side (peer1) wins.
        assert!(we_win_election("peer1", "peer2"));
    }

    #[test]
    fn test_negotiate_security_requires_peer_support() {
        let mut cfg = node();
        cfg.tls_old_method = true;
        assert!(negotiate_security(&cfg, &[1]).is_ok());
        assert!(negotiate_security(&cfg, &[]).is_err());
    }

    #[test]
    fn test_negotiate_security_skips_when_new_method() {
        let cfg = node();
        assert_eq!(negotiate_security(&cfg, &[]).unwrap(), false);
    }

    #[test]
    fn test_negotiate_applications_rejects_no_overlap() {
        let cfg = node();
        let peer_apps = vec![AppEntry {
            app_id: 999,
            vendor_id: 0,
            auth: true,
            acct: false,
        }];
        assert!(negotiate_applications(&cfg.applications, &peer_apps, false).is_err());
        assert!(negotiate_applications(&cfg.applications, &peer_apps, true).is_ok());
    }
}

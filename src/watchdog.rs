//! Watchdog and disconnect (spec.md §4.6): RFC 3539 DWR/DWA keepalive
//! logic and DPR/DPA teardown, implemented as PSM sub-behavior rather than
//! a second state machine (spec.md §4.6: "the PSM is the sole owner of
//! peer state").

use crate::avp::enumerated::Enumerated;
use crate::avp::flags::M;
use crate::avp::Avp;
use crate::diameter::{flags, ApplicationId, CommandCode, DiameterMessage};
use crate::dictionary::Dictionary;
use std::sync::Arc;

/// Disconnect-Cause (273) enumerated values (RFC 6733 §5.4.3).
pub mod disconnect_cause {
    pub const REBOOTING: i32 = 0;
    pub const BUSY: i32 = 1;
    pub const DO_NOT_WANT_TO_TALK_TO_YOU: i32 = 2;
}

/// Builds a DWR (spec.md §4.6): stamped with Origin-Host/Realm and,
/// optionally, Origin-State-Id.
pub fn build_dwr(
    identity: &str,
    realm: &str,
    origin_state_id: Option<u32>,
    dict: Arc<Dictionary>,
) -> DiameterMessage {
    let mut msg = DiameterMessage::new(
        CommandCode::DeviceWatchdog,
        ApplicationId::Common,
        flags::R,
        0,
        rand::random(),
        dict,
    );
    msg.add_origin(identity, realm);
    if let Some(id) = origin_state_id {
        use crate::avp::unsigned32::Unsigned32;
        msg.add_avp(Avp::new(278, None, M, Unsigned32::new(id).into()));
    }
    msg
}

/// Builds the DWA answering `request` (spec.md §4.4 "On DWR (in OPEN*):
/// reply DWA with Origin-State-Id").
pub fn build_dwa(
    request: &DiameterMessage,
    identity: &str,
    realm: &str,
    origin_state_id: Option<u32>,
) -> DiameterMessage {
    let mut msg = DiameterMessage::new_answer_from_request(request);
    msg.add_origin(identity, realm);
    msg.rescode_set_symbolic("DIAMETER_SUCCESS", None, None);
    if let Some(id) = origin_state_id {
        use crate::avp::unsigned32::Unsigned32;
        msg.add_avp(Avp::new(278, None, M, Unsigned32::new(id).into()));
    }
    msg
}

/// Builds a DPR (spec.md §4.6) carrying `cause` (see [`disconnect_cause`]).
pub fn build_dpr(
    identity: &str,
    realm: &str,
    cause: i32,
    dict: Arc<Dictionary>,
) -> DiameterMessage {
    let mut msg = DiameterMessage::new(
        CommandCode::DisconnectPeer,
        ApplicationId::Common,
        flags::R,
        0,
        rand::random(),
        dict,
    );
    msg.add_origin(identity, realm);
    msg.add_avp(Avp::new(273, None, M, Enumerated::new(cause).into()));
    msg
}

/// Builds the DPA answering `request`.
pub fn build_dpa(request: &DiameterMessage, identity: &str, realm: &str) -> DiameterMessage {
    let mut msg = DiameterMessage::new_answer_from_request(request);
    msg.add_origin(identity, realm);
    msg.rescode_set_symbolic("DIAMETER_SUCCESS", None, None);
    msg
}

/// Reads the Disconnect-Cause (273) carried on a DPR/DPA, if any.
pub fn disconnect_cause_of(msg: &DiameterMessage) -> Option<i32> {
    msg.get_avp(273).and_then(|a| a.get_enumerated())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    fn dict() -> Arc<Dictionary> {
        Arc::new(Dictionary::new_default())
    }

    #[test]
    fn test_dwr_dwa_round_trip_origin_state_id() {
        let dwr = build_dwr("nodeA.example.net", "example.net", Some(7), dict());
        let dwa = build_dwa(&dwr, "nodeB.example.net", "example.net", Some(9));
        assert_eq!(dwa.get_avp(278).and_then(|a| a.get_unsigned32()), Some(9));
        assert!(!dwa.is_request());
        assert_eq!(dwa.get_hop_by_hop_id(), dwr.get_hop_by_hop_id());
    }

    #[test]
    fn test_dpr_carries_cause_and_dpa_answers_it() {
        let dpr = build_dpr(
            "nodeA.example.net",
            "example.net",
            disconnect_cause::REBOOTING,
            dict(),
        );
        assert_eq!(disconnect_cause_of(&dpr), Some(disconnect_cause::REBOOTING));
        let dpa = build_dpa(&dpr, "nodeB.example.net", "example.net");
        assert_eq!(
            dpa.get_avp(268).and_then(|a| a.get_unsigned32()),
            Some(2001)
        );
    }
}

/*
 * Diameter Header.
 *
 * Raw packet format:
 *   0                   1                   2                   3
 *   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |    Version    |                 Message Length                |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  | command flags |                  Command-Code                 |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                         Application-ID                        |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                      Hop-by-Hop Identifier                    |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                      End-to-End Identifier                    |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *
 * Command Flags:
 *   0 1 2 3 4 5 6 7
 *  +-+-+-+-+-+-+-+-+  R(equest), P(roxyable), E(rror)
 *  |R P E T r r r r|  T(Potentially re-transmitted message), r(eserved)
 *  +-+-+-+-+-+-+-+-+
 *
 */

pub mod flags {
    pub const REQUEST: u8 = 0x80;
    pub const PROXYABLE: u8 = 0x40;
    pub const ERROR: u8 = 0x20;
    pub const RETRANSMIT: u8 = 0x10;

    // Single-letter aliases matching the RFC 6733 header diagram.
    pub const R: u8 = REQUEST;
    pub const P: u8 = PROXYABLE;
    pub const E: u8 = ERROR;
    pub const T: u8 = RETRANSMIT;
}

use crate::avp::{Avp, AvpValue};
use crate::dictionary::Dictionary;
use crate::error::{Error, Pei, Result};
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DiameterMessage {
    pub header: DiameterHeader,
    pub avps: Vec<Avp>,
    dict: Arc<Dictionary>,
}

/// Where to insert an AVP relative to a message's existing children, mirroring
/// the add-before/add-after positioning freeDiameter exposes on `fd_msg_avp_add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    FirstChild,
    LastChild,
    Before(usize),
    After(usize),
}

#[derive(Debug, Clone)]
pub struct DiameterHeader {
    pub version: u8,
    pub length: u32,
    pub flags: CommandFlags,
    pub code: CommandCode,
    pub application_id: ApplicationId,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    Error = 0,
    CapabilitiesExchange = 257,
    DeviceWatchdog = 280,
    DisconnectPeer = 282,
    ReAuth = 258,
    SessionTerminate = 275,
    AbortSession = 274,
    CreditControl = 272,
    SpendingLimit = 8388635,
    SpendingStatusNotification = 8388636,
    Accounting = 271,
    AA = 265,
}

impl CommandCode {
    fn from_u32(code: u32) -> CommandCode {
        match code {
            257 => CommandCode::CapabilitiesExchange,
            280 => CommandCode::DeviceWatchdog,
            282 => CommandCode::DisconnectPeer,
            258 => CommandCode::ReAuth,
            275 => CommandCode::SessionTerminate,
            274 => CommandCode::AbortSession,
            272 => CommandCode::CreditControl,
            8388635 => CommandCode::SpendingLimit,
            8388636 => CommandCode::SpendingStatusNotification,
            271 => CommandCode::Accounting,
            265 => CommandCode::AA,
            _ => CommandCode::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFlags {
    pub request: bool,
    pub proxyable: bool,
    pub error: bool,
    pub retransmit: bool,
}

impl CommandFlags {
    pub fn from_bits(b: u8) -> CommandFlags {
        CommandFlags {
            request: (b & flags::R) != 0,
            proxyable: (b & flags::P) != 0,
            error: (b & flags::E) != 0,
            retransmit: (b & flags::T) != 0,
        }
    }

    pub fn to_bits(self) -> u8 {
        let mut b = 0u8;
        if self.request {
            b |= flags::R;
        }
        if self.proxyable {
            b |= flags::P;
        }
        if self.error {
            b |= flags::E;
        }
        if self.retransmit {
            b |= flags::T;
        }
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationId {
    Common = 0,
    Accounting = 3,
    CreditControl = 4,
    Gx = 16777238,
    Rx = 16777236,
    Sy = 16777302,
}

impl ApplicationId {
    fn from_u32(id: u32) -> ApplicationId {
        match id {
            3 => ApplicationId::Accounting,
            4 => ApplicationId::CreditControl,
            16777238 => ApplicationId::Gx,
            16777236 => ApplicationId::Rx,
            16777302 => ApplicationId::Sy,
            _ => ApplicationId::Common,
        }
    }
}

const HEADER_LENGTH: u32 = 20;

impl DiameterMessage {
    pub fn new(
        code: CommandCode,
        application_id: ApplicationId,
        flags: u8,
        hop_by_hop_id: u32,
        end_to_end_id: u32,
        dict: Arc<Dictionary>,
    ) -> DiameterMessage {
        DiameterMessage {
            header: DiameterHeader {
                version: 1,
                length: HEADER_LENGTH,
                flags: CommandFlags::from_bits(flags),
                code,
                application_id,
                hop_by_hop_id,
                end_to_end_id,
            },
            avps: Vec::new(),
            dict,
        }
    }

    /// Builds an answer shell from `request`: same command code and
    /// application, hop-by-hop/end-to-end ids copied, request bit cleared.
    pub fn new_answer_from_request(request: &DiameterMessage) -> DiameterMessage {
        let mut answer_flags = request.header.flags;
        answer_flags.request = false;

        DiameterMessage {
            header: DiameterHeader {
                version: request.header.version,
                length: HEADER_LENGTH,
                flags: answer_flags,
                code: request.header.code,
                application_id: request.header.application_id,
                hop_by_hop_id: request.header.hop_by_hop_id,
                end_to_end_id: request.header.end_to_end_id,
            },
            avps: Vec::new(),
            dict: Arc::clone(&request.dict),
        }
    }

    pub fn dict(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    pub fn get_hop_by_hop_id(&self) -> u32 {
        self.header.hop_by_hop_id
    }

    pub fn set_hop_by_hop_id(&mut self, hop_by_hop_id: u32) {
        self.header.hop_by_hop_id = hop_by_hop_id;
    }

    pub fn get_end_to_end_id(&self) -> u32 {
        self.header.end_to_end_id
    }

    pub fn get_command_code(&self) -> CommandCode {
        self.header.code
    }

    pub fn get_application_id(&self) -> ApplicationId {
        self.header.application_id
    }

    pub fn get_flags(&self) -> u8 {
        self.header.flags.to_bits()
    }

    pub fn is_request(&self) -> bool {
        self.header.flags.request
    }

    pub fn set_retransmit(&mut self) -> &mut Self {
        self.header.flags.retransmit = true;
        self
    }

    /// Session-Id (263) if present, for message-log correlation.
    pub fn session_id(&self) -> Option<&str> {
        self.get_avp(263).and_then(|a| a.get_utf8string())
    }

    pub fn add_avp(&mut self, avp: Avp) -> &mut Self {
        self.avp_add(avp, Position::LastChild)
    }

    pub fn avp_add(&mut self, avp: Avp, position: Position) -> &mut Self {
        self.header.length += avp.get_length() + avp.get_padding() as u32;
        match position {
            Position::FirstChild => self.avps.insert(0, avp),
            Position::LastChild => self.avps.push(avp),
            Position::Before(i) => self.avps.insert(i, avp),
            Position::After(i) => self.avps.insert(i + 1, avp),
        }
        self
    }

    pub fn get_avp(&self, code: u32) -> Option<&Avp> {
        self.avps.iter().find(|avp| avp.get_code() == code)
    }

    /// Depth-first search for `code`, descending into Grouped AVPs.
    pub fn msg_search_avp(&self, code: u32) -> Option<&Avp> {
        fn search(avps: &[Avp], code: u32) -> Option<&Avp> {
            for avp in avps {
                if avp.get_code() == code {
                    return Some(avp);
                }
                if let Some(group) = avp.get_grouped() {
                    if let Some(found) = search(group.avps(), code) {
                        return Some(found);
                    }
                }
            }
            None
        }
        search(&self.avps, code)
    }

    /// Sets (or replaces) the Result-Code AVP (268) with `code`.
    pub fn rescode_set(&mut self, code: u32) -> &mut Self {
        use crate::avp::flags::M;
        use crate::avp::unsigned32::Unsigned32;
        self.avps.retain(|avp| avp.get_code() != 268);
        self.add_avp(Avp::new(268, None, M, Unsigned32::new(code).into()));
        self
    }

    /// Symbolic counterpart of [`rescode_set`]: looks `symbol` up in
    /// [`rescode`], sets Result-Code, stamps the E-bit for non-2xxx/3xxx
    /// codes, and optionally attaches Error-Message (281) / Failed-AVP (279).
    pub fn rescode_set_symbolic(
        &mut self,
        symbol: &str,
        message: Option<&str>,
        failed_avp: Option<Avp>,
    ) -> &mut Self {
        use crate::avp::flags::M;
        use crate::avp::group::Grouped;
        use crate::avp::utf8string::UTF8String;

        let code = rescode::code_of(symbol).unwrap_or(rescode::DIAMETER_UNABLE_TO_COMPLY);
        self.rescode_set(code);
        self.header.flags.error = code >= 3000;

        if let Some(msg) = message {
            self.avps.retain(|avp| avp.get_code() != 281);
            self.add_avp(Avp::new(281, None, 0, UTF8String::new(msg).into()));
        }
        if let Some(avp) = failed_avp {
            self.avps.retain(|avp| avp.get_code() != 279);
            let mut group = Grouped::new(vec![], Arc::clone(&self.dict));
            group.add(avp);
            self.add_avp(Avp::new(279, None, M, group.into()));
        }
        self
    }

    /// Builds a Diameter error answer from a codec/ABNF [`Pei`], ready to send
    /// back to the peer that triggered it (spec.md's `parse_or_error`).
    pub fn error_answer_from_pei(request: &DiameterMessage, pei: &Pei) -> DiameterMessage {
        let mut answer = DiameterMessage::new_answer_from_request(request);
        let failed = pei.avp_code.map(|code| {
            use crate::avp::octetstring::OctetString;
            Avp::new(code, pei.avp_vendor, 0, OctetString::new(Vec::new()).into())
        });
        answer.rescode_set_symbolic(pei.errcode, pei.message.as_deref(), failed);
        answer
    }

    /// Adds Origin-Host (264) and Origin-Realm (296) from this node's identity.
    pub fn add_origin(&mut self, origin_host: &str, origin_realm: &str) -> &mut Self {
        use crate::avp::flags::M;
        use crate::avp::identity::Identity;
        self.add_avp(Avp::new(
            264,
            None,
            M,
            Identity::new(origin_host.as_bytes().to_vec()).into(),
        ));
        self.add_avp(Avp::new(
            296,
            None,
            M,
            Identity::new(origin_realm.as_bytes().to_vec()).into(),
        ));
        self
    }

    /// Adds a freshly-generated Session-Id (263) AVP: spec.md §4.2's
    /// `<Origin-Host>;<high32>;<low32>;<random>[;opt]`. `hi`/`lo` are the
    /// two 32-bit halves of a monotonic clock reading; `opt` is the
    /// implementation-defined optional suffix (`new_session(msg, opt,
    /// optlen)`).
    pub fn new_session(&mut self, origin_host: &str, hi: u32, lo: u32, opt: Option<&str>) -> &mut Self {
        use crate::avp::flags::M;
        use crate::avp::utf8string::UTF8String;
        let random: u32 = rand::random();
        let session_id = match opt {
            Some(opt) => format!("{};{};{};{};{}", origin_host, hi, lo, random, opt),
            None => format!("{};{};{};{}", origin_host, hi, lo, random),
        };
        self.add_avp(Avp::new(263, None, M, UTF8String::new(session_id).into()));
        self
    }

    pub fn decode_from<R: Read + Seek>(
        reader: &mut R,
        dict: Arc<Dictionary>,
    ) -> Result<DiameterMessage> {
        let header = DiameterHeader::decode_from(reader)?;

        let mut avps = Vec::new();
        let mut offset = HEADER_LENGTH;
        while offset < header.length {
            let avp = Avp::decode_from(reader, Arc::clone(&dict))?;
            offset += avp.get_length() + avp.get_padding() as u32;
            avps.push(avp);
        }

        Ok(DiameterMessage { header, avps, dict })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode_to(writer)?;
        for avp in &self.avps {
            avp.encode_to(writer)?;
        }
        Ok(())
    }

    /// Validates this message's AVPs against the dictionary's rule set for
    /// its command, returning a [`Pei`] describing the first violation.
    pub fn parse_dict(&self) -> Result<()> {
        let command = self
            .dict
            .get_command(self.header.code as u32, self.header.flags.request);

        let command = match command {
            Some(c) => c,
            None => return Ok(()), // unknown command: nothing to validate against
        };

        // Fixed-head rules must appear, in declared order, as the leading
        // AVPs (spec.md §4.2); checked before the per-rule arity pass so a
        // misplaced fixed AVP is reported as a position error rather than
        // masquerading as a missing one.
        let fixed: Vec<&crate::dictionary::Rule> = command
            .rules()
            .iter()
            .filter(|r| r.position == crate::dictionary::RulePosition::Fixed)
            .collect();
        for (i, rule) in fixed.iter().enumerate() {
            match self.avps.get(i) {
                Some(avp) if avp.get_code() == rule.avp_code => {}
                _ => {
                    return Err(Error::Protocol(
                        Pei::new("DIAMETER_AVP_NOT_ALLOWED").with_avp(rule.avp_code, None),
                    ))
                }
            }
        }

        for rule in command.rules() {
            let count = self
                .avps
                .iter()
                .filter(|avp| avp.get_code() == rule.avp_code)
                .count();
            if rule.required && count == 0 {
                return Err(Error::Protocol(
                    Pei::new("DIAMETER_MISSING_AVP").with_avp(rule.avp_code, None),
                ));
            }
            if let Some(max) = rule.max {
                if count > max {
                    return Err(Error::Protocol(
                        Pei::new("DIAMETER_AVP_OCCURS_TOO_MANY_TIMES")
                            .with_avp(rule.avp_code, None),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Symbolic Result-Code table (spec.md §6/§7). Only the codes the core
/// itself emits (CER/CEA, ABNF validation, routing) are named; application
/// protocols define their own above 5xxx/4xxx ranges as needed.
pub mod rescode {
    pub const DIAMETER_MULTI_ROUND_AUTH: u32 = 1001;
    pub const DIAMETER_SUCCESS: u32 = 2001;
    pub const DIAMETER_LIMITED_SUCCESS: u32 = 2002;
    pub const DIAMETER_COMMAND_UNSUPPORTED: u32 = 3001;
    pub const DIAMETER_UNABLE_TO_DELIVER: u32 = 3002;
    pub const DIAMETER_REALM_NOT_SERVED: u32 = 3003;
    pub const DIAMETER_APPLICATION_UNSUPPORTED: u32 = 3007;
    pub const DIAMETER_ELECTION_LOST: u32 = 4003;
    pub const DIAMETER_NO_COMMON_APPLICATION: u32 = 4010;
    pub const DIAMETER_AVP_UNSUPPORTED: u32 = 5001;
    pub const DIAMETER_UNKNOWN_SESSION_ID: u32 = 5002;
    pub const DIAMETER_AUTHORIZATION_REJECTED: u32 = 5003;
    pub const DIAMETER_UNABLE_TO_COMPLY: u32 = 5012;
    pub const DIAMETER_INVALID_AVP_VALUE: u32 = 5014;
    pub const DIAMETER_MISSING_AVP: u32 = 5015;
    pub const DIAMETER_AVP_OCCURS_TOO_MANY_TIMES: u32 = 5009;
    pub const DIAMETER_AVP_NOT_ALLOWED: u32 = 5008;
    pub const DIAMETER_NO_COMMON_SECURITY: u32 = 5017;

    /// Maps a symbolic name (with or without the `DIAMETER_` prefix) to its
    /// numeric Result-Code, as used by [`Pei`](crate::error::Pei) and
    /// [`rescode_set_symbolic`](super::DiameterMessage::rescode_set_symbolic).
    pub fn code_of(symbol: &str) -> Option<u32> {
        let name = symbol.trim_start_matches("DIAMETER_");
        Some(match name {
            "MULTI_ROUND_AUTH" => DIAMETER_MULTI_ROUND_AUTH,
            "SUCCESS" => DIAMETER_SUCCESS,
            "LIMITED_SUCCESS" => DIAMETER_LIMITED_SUCCESS,
            "COMMAND_UNSUPPORTED" => DIAMETER_COMMAND_UNSUPPORTED,
            "UNABLE_TO_DELIVER" => DIAMETER_UNABLE_TO_DELIVER,
            "REALM_NOT_SERVED" => DIAMETER_REALM_NOT_SERVED,
            "APPLICATION_UNSUPPORTED" => DIAMETER_APPLICATION_UNSUPPORTED,
            "ELECTION_LOST" => DIAMETER_ELECTION_LOST,
            "NO_COMMON_APPLICATION" => DIAMETER_NO_COMMON_APPLICATION,
            "AVP_UNSUPPORTED" => DIAMETER_AVP_UNSUPPORTED,
            "UNKNOWN_SESSION_ID" => DIAMETER_UNKNOWN_SESSION_ID,
            "AUTHORIZATION_REJECTED" => DIAMETER_AUTHORIZATION_REJECTED,
            "UNABLE_TO_COMPLY" => DIAMETER_UNABLE_TO_COMPLY,
            "INVALID_AVP_VALUE" => DIAMETER_INVALID_AVP_VALUE,
            "MISSING_AVP" => DIAMETER_MISSING_AVP,
            "AVP_OCCURS_TOO_MANY_TIMES" => DIAMETER_AVP_OCCURS_TOO_MANY_TIMES,
            "AVP_NOT_ALLOWED" => DIAMETER_AVP_NOT_ALLOWED,
            "NO_COMMON_SECURITY" => DIAMETER_NO_COMMON_SECURITY,
            _ => return None,
        })
    }
}

impl DiameterHeader {
    pub fn decode_from<R: Read>(reader: &mut R) -> Result<DiameterHeader> {
        let mut b = [0; 20];
        reader.read_exact(&mut b)?;

        let version = b[0];
        let length = u32::from_be_bytes([0, b[1], b[2], b[3]]);
        let flags = CommandFlags::from_bits(b[4]);
        let code = u32::from_be_bytes([0, b[5], b[6], b[7]]);
        let application_id = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
        let hop_by_hop_id = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
        let end_to_end_id = u32::from_be_bytes([b[16], b[17], b[18], b[19]]);

        Ok(DiameterHeader {
            version,
            length,
            flags,
            code: CommandCode::from_u32(code),
            application_id: ApplicationId::from_u32(application_id),
            hop_by_hop_id,
            end_to_end_id,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.version])?;
        writer.write_all(&self.length.to_be_bytes()[1..4])?;
        writer.write_all(&[self.flags.to_bits()])?;
        writer.write_all(&(self.code as u32).to_be_bytes()[1..4])?;
        writer.write_all(&(self.application_id as u32).to_be_bytes())?;
        writer.write_all(&self.hop_by_hop_id.to_be_bytes())?;
        writer.write_all(&self.end_to_end_id.to_be_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp;
    use crate::avp::flags::M;
    use crate::avp::identity::Identity;
    use crate::dictionary::{self, Dictionary};
    use std::io::Cursor;

    fn dict() -> Arc<Dictionary> {
        Arc::new(Dictionary::new(&[&dictionary::DEFAULT_DICT_XML]))
    }

    #[test]
    fn test_encode_decode() {
        let dict = dict();
        let mut message = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1123158610,
            3102381851,
            Arc::clone(&dict),
        );
        message.add_avp(avp!(
            264,
            None,
            M,
            Identity::new("host.example.com".as_bytes().to_vec())
        ));

        let mut encoded = Vec::new();
        message.encode_to(&mut encoded).unwrap();

        let mut cursor = Cursor::new(&encoded);
        let decoded = DiameterMessage::decode_from(&mut cursor, dict).unwrap();

        assert_eq!(decoded.header.hop_by_hop_id, 1123158610);
        assert_eq!(decoded.avps.len(), 1);
        assert_eq!(decoded.get_avp(264).unwrap().get_code(), 264);
    }

    #[test]
    fn test_rescode_set_replaces_existing() {
        let mut message = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            0,
            1,
            1,
            dict(),
        );
        message.rescode_set(2001);
        message.rescode_set(5012);
        assert_eq!(
            message
                .avps
                .iter()
                .filter(|avp| avp.get_code() == 268)
                .count(),
            1
        );
        assert_eq!(message.get_avp(268).unwrap().get_unsigned32(), Some(5012));
    }

    #[test]
    fn test_msg_search_avp_descends_into_groups() {
        use crate::avp::group::Grouped;
        use crate::avp::unsigned32::Unsigned32;

        let mut message = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            0,
            1,
            1,
            dict(),
        );
        let mut group = Grouped::new(vec![], dict());
        group.add_avp(415, None, 0, Unsigned32::new(7).into());
        message.add_avp(avp!(873, Some(10415), M, group));

        let found = message.msg_search_avp(415).unwrap();
        assert_eq!(found.get_unsigned32(), Some(7));
    }

    #[test]
    fn test_new_session_includes_random_component() {
        let mut message =
            DiameterMessage::new(CommandCode::CreditControl, ApplicationId::CreditControl, 0, 1, 1, dict());
        message.new_session("host.example.com", 1, 2, None);
        let session_id = message.get_avp(263).unwrap().get_utf8string().unwrap();
        let parts: Vec<&str> = session_id.split(';').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "host.example.com");
        assert_eq!(parts[1], "1");
        assert_eq!(parts[2], "2");
        assert!(parts[3].parse::<u32>().is_ok());
    }

    #[test]
    fn test_new_session_appends_optional_suffix() {
        let mut message =
            DiameterMessage::new(CommandCode::CreditControl, ApplicationId::CreditControl, 0, 1, 1, dict());
        message.new_session("host.example.com", 1, 2, Some("extra"));
        let session_id = message.get_avp(263).unwrap().get_utf8string().unwrap();
        let parts: Vec<&str> = session_id.split(';').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[4], "extra");
    }

    #[test]
    fn test_parse_dict_rejects_misplaced_fixed_head_avp() {
        use crate::avp::unsigned32::Unsigned32;

        // Reuses the Credit-Control command code (272) against a fresh,
        // otherwise-empty dictionary so only this test's rules apply.
        let dict = Arc::new(Dictionary::empty());
        dict.add_avp(1, None, "First-Avp".into(), crate::avp::AvpType::Unsigned32);
        dict.add_avp(2, None, "Second-Avp".into(), crate::avp::AvpType::Unsigned32);
        dict.add_command(
            272,
            "Credit-Control".into(),
            vec![
                dictionary::Rule {
                    avp_name: "First-Avp".into(),
                    avp_code: 1,
                    required: true,
                    max: Some(1),
                    min: Some(1),
                    position: dictionary::RulePosition::Fixed,
                },
                dictionary::Rule {
                    avp_name: "Second-Avp".into(),
                    avp_code: 2,
                    required: false,
                    max: None,
                    min: None,
                    position: dictionary::RulePosition::Optional,
                },
            ],
            vec![],
        );

        let mut out_of_order = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1,
            1,
            Arc::clone(&dict),
        );
        out_of_order.add_avp(avp!(2, None, M, Unsigned32::new(1)));
        out_of_order.add_avp(avp!(1, None, M, Unsigned32::new(1)));
        assert!(out_of_order.parse_dict().is_err());

        let mut in_order = DiameterMessage::new(
            CommandCode::CreditControl,
            ApplicationId::CreditControl,
            flags::R,
            1,
            1,
            dict,
        );
        in_order.add_avp(avp!(1, None, M, Unsigned32::new(1)));
        in_order.add_avp(avp!(2, None, M, Unsigned32::new(1)));
        assert!(in_order.parse_dict().is_ok());
    }
}

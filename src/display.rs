use crate::diameter::{ApplicationId, CommandCode, DiameterHeader, DiameterMessage};
use std::fmt;

impl fmt::Display for DiameterMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        writeln!(
            f,
            "  {:<40} {:>8} {:>5}  {} {} {}  {:<16}  {}",
            "AVP", "Vendor", "Code", "V", "M", "P", "Type", "Value"
        )?;

        for avp in &self.avps {
            avp.fmt_with_dict(f, 0, self.dict())?;
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for DiameterHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request_flag = if self.flags.request {
            "Request"
        } else {
            "Answer"
        };
        let error_flag = if self.flags.error { "Error" } else { "" };
        let proxyable_flag = if self.flags.proxyable {
            "Proxyable"
        } else {
            ""
        };
        let retransmit_flag = if self.flags.retransmit {
            "Retransmit"
        } else {
            ""
        };

        write!(
            f,
            "{}({}) {}({}) {}{}{}{} {}, {}",
            self.code,
            self.code as u32,
            self.application_id,
            self.application_id as u32,
            request_flag,
            error_flag,
            proxyable_flag,
            retransmit_flag,
            self.hop_by_hop_id,
            self.end_to_end_id
        )
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp;
    use crate::avp::flags::M;
    use crate::avp::identity::Identity;
    use crate::diameter::{flags, ApplicationId, CommandCode, DiameterMessage};
    use crate::dictionary::{self, Dictionary};
    use std::sync::Arc;

    #[test]
    fn test_display_message() {
        let dict = Arc::new(Dictionary::new(&[&dictionary::DEFAULT_DICT_XML]));
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

        let rendered = message.to_string();
        assert!(rendered.contains("Origin-Host"));
        assert!(rendered.contains("host.example.com"));
    }
}

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol Error Info.
///
/// Carries enough context to build a Diameter error answer: the symbolic
/// Result-Code (e.g. "DIAMETER_MISSING_AVP"), an optional human-readable
/// message, and the offending AVP code/vendor when one can be pinpointed.
#[derive(Debug, Clone)]
pub struct Pei {
    pub errcode: &'static str,
    pub message: Option<String>,
    pub avp_code: Option<u32>,
    pub avp_vendor: Option<u32>,
}

impl Pei {
    pub fn new(errcode: &'static str) -> Pei {
        Pei {
            errcode,
            message: None,
            avp_code: None,
            avp_vendor: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Pei {
        self.message = Some(message.into());
        self
    }

    pub fn with_avp(mut self, code: u32, vendor: Option<u32>) -> Pei {
        self.avp_code = Some(code);
        self.avp_vendor = vendor;
        self
    }
}

impl fmt::Display for Pei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {}", self.errcode, msg),
            None => write!(f, "{}", self.errcode),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    DecodeError(String),
    EncodeError(String),
    UnknownAvpCode(u32),
    DictionaryError(String),
    ClientError(String),
    ServerError(String),
    /// A message failed ABNF/type validation against the dictionary; the
    /// caller can turn this into a Diameter error answer via `rescode_set`.
    Protocol(Pei),
    /// The peer state machine hit a condition that forces a state
    /// transition (connection loss, CEA rejection, election outcome).
    PeerError(String),
    /// No viable candidate peer for an outgoing message, or routing
    /// exhausted its candidate set.
    RoutingError(String),
    IoError(std::io::Error),
    TryFromSliceError(std::array::TryFromSliceError),
    TlsError(native_tls::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DecodeError(msg) => write!(f, "{}", msg),
            Error::EncodeError(msg) => write!(f, "{}", msg),
            Error::UnknownAvpCode(code) => write!(f, "Unknown AVP code: {}", code),
            Error::DictionaryError(msg) => write!(f, "{}", msg),
            Error::ClientError(msg) => write!(f, "{}", msg),
            Error::ServerError(msg) => write!(f, "{}", msg),
            Error::Protocol(pei) => write!(f, "{}", pei),
            Error::PeerError(msg) => write!(f, "{}", msg),
            Error::RoutingError(msg) => write!(f, "{}", msg),
            Error::IoError(e) => write!(f, "{}", e),
            Error::TryFromSliceError(e) => write!(f, "{}", e),
            Error::TlsError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(err: std::array::TryFromSliceError) -> Error {
        Error::TryFromSliceError(err)
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Error {
        Error::TlsError(err)
    }
}

impl From<Pei> for Error {
    fn from(pei: Pei) -> Error {
        Error::Protocol(pei)
    }
}

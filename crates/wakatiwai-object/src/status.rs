use std::fmt;

use serde::Serialize;

/// A CoAP response code as carried in one byte on the bridge wire
/// (`class << 5 | detail`).
///
/// Codes the peer returns that have no named constant are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StatusCode(u8);

impl StatusCode {
    /// 2.01
    pub const CREATED: Self = Self(0x41);
    /// 2.02
    pub const DELETED: Self = Self(0x42);
    /// 2.04
    pub const CHANGED: Self = Self(0x44);
    /// 2.05
    pub const CONTENT: Self = Self(0x45);
    /// 4.00
    pub const BAD_REQUEST: Self = Self(0x80);
    /// 4.04
    pub const NOT_FOUND: Self = Self(0x84);
    /// 4.05
    pub const METHOD_NOT_ALLOWED: Self = Self(0x85);
    /// 5.00
    pub const INTERNAL_SERVER_ERROR: Self = Self(0xA0);
    /// 5.01
    pub const NOT_IMPLEMENTED: Self = Self(0xA1);

    pub const fn from_u8(code: u8) -> Self {
        Self(code)
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Response class (2 = success, 4 = client error, 5 = server error).
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub const fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Symbolic name for known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::CREATED => "Created",
            Self::DELETED => "Deleted",
            Self::CHANGED => "Changed",
            Self::CONTENT => "Content",
            Self::BAD_REQUEST => "BadRequest",
            Self::NOT_FOUND => "NotFound",
            Self::METHOD_NOT_ALLOWED => "MethodNotAllowed",
            Self::INTERNAL_SERVER_ERROR => "InternalServerError",
            Self::NOT_IMPLEMENTED => "NotImplemented",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u8> for StatusCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())?;
        if let Some(name) = self.name() {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

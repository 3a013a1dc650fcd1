//! Client API error codes.
//!
//! Every error that can cross the client API boundary has a stable
//! negative integer code, so embedders and language bindings can match
//! on numbers that never change between releases. `0` means success
//! and is not represented here; fallible calls return
//! `Result<T, Error>` instead.

use thiserror::Error;

/// Client API version: high 16 bits are the ABI generation, low 16
/// bits count backwards-compatible additions.
pub const CLIENT_API_VERSION: u32 = 0x0000_0000;

/// Return the client API version this library was built with.
#[inline]
pub fn client_api_version() -> u32 {
    CLIENT_API_VERSION
}

/// Errors returned by the client API.
///
/// The discriminants are part of the wire contract and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum Error {
    /// The client's event ring has no free slot left for a reply
    /// reservation. Asynchronous requests fail with this until an
    /// outstanding reply is consumed.
    #[error("request buffer full")]
    EventBufferFull = -1,
    /// Malformed input, or the call is not valid in the current state.
    #[error("invalid parameter")]
    InvalidParameter = -2,
    /// Resource allocation failed (e.g. the playback thread could not
    /// be spawned, or no free client name was left).
    #[error("memory allocation failed")]
    Nomem = -3,
    /// Unknown client, property or option name.
    #[error("not found")]
    NotFound = -4,
    /// Generic property access failure.
    #[error("error accessing property")]
    Property = -5,
    /// The property exists but the subsystem backing it is inactive.
    #[error("property unavailable")]
    PropertyUnavailable = -6,
    /// The engine core has not been initialized yet.
    #[error("core not initialized")]
    Uninitialized = -7,
}

impl Error {
    /// Stable integer code for this error.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a stable integer code back to an error. Returns `None` for
    /// `0` (success) and for codes this version does not know.
    pub fn from_code(code: i32) -> Option<Error> {
        match code {
            -1 => Some(Error::EventBufferFull),
            -2 => Some(Error::InvalidParameter),
            -3 => Some(Error::Nomem),
            -4 => Some(Error::NotFound),
            -5 => Some(Error::Property),
            -6 => Some(Error::PropertyUnavailable),
            -7 => Some(Error::Uninitialized),
            _ => None,
        }
    }
}

/// Human-readable description for a raw status code, including `0`
/// (success). Unknown codes yield `"unknown error"`.
pub fn error_string(code: i32) -> &'static str {
    match code {
        0 => "success",
        -1 => "request buffer full",
        -2 => "invalid parameter",
        -3 => "memory allocation failed",
        -4 => "not found",
        -5 => "error accessing property",
        -6 => "property unavailable",
        -7 => "core not initialized",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::EventBufferFull.code(), -1);
        assert_eq!(Error::InvalidParameter.code(), -2);
        assert_eq!(Error::Nomem.code(), -3);
        assert_eq!(Error::NotFound.code(), -4);
        assert_eq!(Error::Property.code(), -5);
        assert_eq!(Error::PropertyUnavailable.code(), -6);
        assert_eq!(Error::Uninitialized.code(), -7);
    }

    #[test]
    fn test_from_code_roundtrip() {
        for code in -7..=-1 {
            let err = Error::from_code(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert_eq!(Error::from_code(0), None);
        assert_eq!(Error::from_code(-100), None);
        assert_eq!(Error::from_code(1), None);
    }

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(0), "success");
        assert_eq!(error_string(-1), "request buffer full");
        assert_eq!(error_string(-7), "core not initialized");
        assert_eq!(error_string(-42), "unknown error");
        assert_eq!(error_string(5), "unknown error");
    }

    #[test]
    fn test_display_matches_table() {
        assert_eq!(Error::Property.to_string(), "error accessing property");
        assert_eq!(
            Error::Uninitialized.to_string(),
            error_string(Error::Uninitialized.code())
        );
    }

    #[test]
    fn test_api_version_layout() {
        let v = client_api_version();
        let abi = v >> 16;
        let minor = v & 0xffff;
        assert_eq!(v, (abi << 16) | minor);
    }
}

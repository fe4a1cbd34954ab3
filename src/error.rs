// Copyright (c) 2026 The TimelyCC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error type for flow operations.
//!
//! Only configuration and lifecycle errors are fatal to a flow. Per-packet
//! anomalies (short headers, clock skew, bad trace lines) are absorbed where
//! they occur and degrade the flow to a more conservative rate instead of
//! tearing it down.

/// An error produced while building or running a flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The provided buffer is too short for the requested read or write.
    BufferTooShort,

    /// The received datagram is shorter than the fixed probe header and
    /// cannot carry a sequence number and timestamp.
    MalformedPacket,

    /// The flow configuration violates a construction-time invariant,
    /// e.g. the low delay-gradient threshold is not below the high one.
    InvalidConfig(String),

    /// The operation cannot be completed because it was attempted in an
    /// invalid state, e.g. starting an already running flow.
    InvalidState(String),

    /// The underlying transport failed to accept an outgoing packet. The
    /// flow state is left intact and the caller may retry.
    TransportFail(String),

    /// I/O error, e.g. while reading a trace file.
    IoError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(format!("{}", err))
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn io_error() {
        use std::error::Error;
        let e = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        let e = super::Error::from(e);

        assert_eq!(format!("{}", e), "IoError(\"unexpected end of file\")");
        assert!(e.source().is_none());
    }

    #[test]
    fn display_matches_debug() {
        let e = super::Error::InvalidConfig("min rate above max rate".into());
        assert_eq!(format!("{}", e), format!("{:?}", e));
    }
}

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

use std::fmt;

use crate::codec::Decoder;
use crate::codec::Encoder;
use crate::error::Error;
use crate::Result;

/// Size of the fixed probe header: a 32 bit sequence number followed by a
/// 64 bit send timestamp in microseconds, both big-endian.
pub const HEADER_SIZE: usize = 12;

/// Header of a probe/data packet.
///
/// The sequence number strictly increases per flow and the send timestamp
/// is monotonic within a flow; both invariants are maintained by the sender,
/// not enforced here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet sequence number.
    pub seq: u32,

    /// Send time in microseconds since the flow epoch.
    pub send_time_us: u64,
}

impl PacketHeader {
    /// Encode the header into the beginning of `out`.
    pub fn to_bytes(&self, mut out: &mut [u8]) -> Result<usize> {
        let mut len = 0;
        len += out.write_u32(self.seq)?;
        len += out.write_u64(self.send_time_us)?;
        Ok(len)
    }

    /// Decode a header from `buf`.
    ///
    /// A buffer shorter than [`HEADER_SIZE`] yields `Error::MalformedPacket`.
    pub fn from_bytes(buf: &[u8]) -> Result<PacketHeader> {
        let mut buf = buf;
        if buf.len() < HEADER_SIZE {
            return Err(Error::MalformedPacket);
        }
        let seq = buf.read_u32()?;
        let send_time_us = buf.read_u64()?;
        Ok(PacketHeader { seq, send_time_us })
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "seq={} ts={}us", self.seq, self.send_time_us)
    }
}

/// Encode a full probe packet: the fixed header followed by `payload_size`
/// filler bytes. `out` must hold at least `HEADER_SIZE + payload_size` bytes.
/// Returns the total encoded length.
pub fn encode_packet(hdr: &PacketHeader, payload_size: usize, out: &mut [u8]) -> Result<usize> {
    if out.len() < HEADER_SIZE + payload_size {
        return Err(Error::BufferTooShort);
    }
    let len = hdr.to_bytes(out)?;
    // Payload content carries no information; zero filler.
    out[len..len + payload_size].fill(0);
    Ok(len + payload_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() -> Result<()> {
        let hdr = PacketHeader {
            seq: 42,
            send_time_us: 1_000_000_000_007,
        };
        let mut buf = [0_u8; HEADER_SIZE];
        assert_eq!(hdr.to_bytes(&mut buf[..])?, HEADER_SIZE);
        assert_eq!(PacketHeader::from_bytes(&buf[..])?, hdr);
        Ok(())
    }

    #[test]
    fn short_header_is_malformed() {
        let buf = [0_u8; HEADER_SIZE - 1];
        assert_eq!(
            PacketHeader::from_bytes(&buf[..]),
            Err(Error::MalformedPacket)
        );
        assert_eq!(PacketHeader::from_bytes(&[]), Err(Error::MalformedPacket));
    }

    #[test]
    fn encode_with_payload() -> Result<()> {
        let hdr = PacketHeader {
            seq: 7,
            send_time_us: 123,
        };
        let mut buf = [0xff_u8; 64];
        let len = encode_packet(&hdr, 20, &mut buf[..])?;
        assert_eq!(len, HEADER_SIZE + 20);
        assert_eq!(PacketHeader::from_bytes(&buf[..len])?, hdr);
        assert!(buf[HEADER_SIZE..len].iter().all(|b| *b == 0));

        // Trailing payload bytes do not confuse the decoder.
        assert_eq!(PacketHeader::from_bytes(&buf[..len])?.seq, 7);
        Ok(())
    }

    #[test]
    fn encode_needs_room_for_payload() {
        let hdr = PacketHeader {
            seq: 0,
            send_time_us: 0,
        };
        let mut buf = [0_u8; HEADER_SIZE + 3];
        assert_eq!(
            encode_packet(&hdr, 4, &mut buf[..]),
            Err(Error::BufferTooShort)
        );
    }
}

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::{Buf, BufMut};

use crate::codec::ensure;
use crate::error::RakNetError;

/// Address family marker RakNet writes for IPv6 (Windows `AF_INET6`).
const AF_INET6: u16 = 23;

/// A socket address in RakNet wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireAddress(pub SocketAddr);

impl WireAddress {
    /// `0.0.0.0:0`, used to pad the system address lists.
    pub const UNSPECIFIED: Self = Self(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)));

    /// Bytes this address occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self.0 {
            SocketAddr::V4(_) => 7,
            SocketAddr::V6(_) => 29,
        }
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        match self.0 {
            SocketAddr::V4(addr) => {
                buf.put_u8(4);
                // octets are sent bitwise-inverted
                for &b in &addr.ip().octets() {
                    buf.put_u8(!b);
                }
                buf.put_u16(addr.port());
            }
            SocketAddr::V6(addr) => {
                buf.put_u8(6);
                buf.put_u16_le(AF_INET6);
                buf.put_u16(addr.port());
                buf.put_u32(addr.flowinfo());
                buf.put_slice(&addr.ip().octets());
                buf.put_u32(addr.scope_id());
            }
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, RakNetError> {
        ensure(buf, 1)?;
        match buf.get_u8() {
            4 => {
                ensure(buf, 6)?;
                let mut octets = [0u8; 4];
                for b in &mut octets {
                    *b = !buf.get_u8();
                }
                let port = buf.get_u16();
                Ok(Self(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(octets),
                    port,
                ))))
            }
            6 => {
                ensure(buf, 28)?;
                let _family = buf.get_u16_le();
                let port = buf.get_u16();
                let flow_info = buf.get_u32();
                let mut octets = [0u8; 16];
                buf.copy_to_slice(&mut octets);
                let scope_id = buf.get_u32();
                Ok(Self(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    port,
                    flow_info,
                    scope_id,
                ))))
            }
            v => Err(RakNetError::InvalidAddressVersion(v)),
        }
    }
}

impl From<SocketAddr> for WireAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<WireAddress> for SocketAddr {
    fn from(addr: WireAddress) -> Self {
        addr.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    #[test]
    fn ipv4_octets_inverted() {
        let addr = WireAddress(SocketAddr::new("192.168.1.20".parse().unwrap(), 19132));
        let mut buf = BytesMut::new();
        addr.encode(&mut buf);
        assert_eq!(buf.len(), addr.encoded_len());
        assert_eq!(buf[0], 4);
        assert_eq!(&buf[1..5], &[!192, !168, !1, !20]);
        assert_eq!(&buf[5..7], &19132u16.to_be_bytes());

        let decoded = WireAddress::decode(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn ipv6_layout() {
        let addr = WireAddress(SocketAddr::new("fe80::1".parse().unwrap(), 19133));
        let mut buf = BytesMut::new();
        addr.encode(&mut buf);
        assert_eq!(buf.len(), addr.encoded_len());
        let decoded = WireAddress::decode(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded.port(), 19133);
        assert_eq!(decoded, addr);
    }

    #[test]
    fn truncated_ipv6_rejected() {
        let data = [6u8, 23, 0, 0x4A];
        assert!(WireAddress::decode(&mut Cursor::new(&data[..])).is_err());
    }

    #[test]
    fn unknown_version_rejected() {
        let data = [5u8, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            WireAddress::decode(&mut Cursor::new(&data[..])),
            Err(RakNetError::InvalidAddressVersion(5))
        ));
    }
}

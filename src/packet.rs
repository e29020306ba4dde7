use std::fmt;
use std::io::{BufRead, Cursor, Read};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::PacketError;

/// Test whether bit `bit` of `x` is set.
fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Number of bytes left to read in `bytes`.
fn remaining(bytes: &Cursor<Vec<u8>>) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

pub fn bytes_of_mac(addr: u64) -> [u8; 6] {
    let mut arr = [0; 6];
    for (i, b) in arr.iter_mut().enumerate() {
        *b = ((addr >> (8 * (5 - i))) & 0xff) as u8;
    }
    arr
}

pub fn mac_of_bytes(addr: [u8; 6]) -> u64 {
    addr.iter().fold(0, |acc, b| (acc << 8) | *b as u64)
}

/// 48-bit Ethernet hardware address.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(u64);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr(0xffff_ffff_ffff);

    /// Create an address from its integer value. Bits above 48 are discarded.
    pub const fn new(addr: u64) -> MacAddr {
        MacAddr(addr & 0xffff_ffff_ffff)
    }

    pub fn from_bytes(addr: [u8; 6]) -> MacAddr {
        MacAddr(mac_of_bytes(addr))
    }

    pub fn bytes(&self) -> [u8; 6] {
        bytes_of_mac(self.0)
    }

    pub fn to_int(&self) -> u64 {
        self.0
    }

    /// Group addresses (broadcast included) have the least significant bit of the first octet set.
    pub fn is_multicast(&self) -> bool {
        test_bit(40, self.0)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes();
        write!(f,
               "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               b[0],
               b[1],
               b[2],
               b[3],
               b[4],
               b[5])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<MacAddr, PacketError> {
        let mut arr = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for b in arr.iter_mut() {
            let part = parts.next().ok_or_else(|| PacketError::InvalidMac(s.to_string()))?;
            *b = u8::from_str_radix(part, 16).map_err(|_| PacketError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(PacketError::InvalidMac(s.to_string()));
        }
        Ok(MacAddr::from_bytes(arr))
    }
}

/// The type of IPv4 flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    pub dont_fragment: bool,
    pub more_fragments: bool,
}

impl Flags {
    fn of_int(flags: u32) -> Flags {
        Flags {
            dont_fragment: test_bit(1, flags as u64),
            more_fragments: test_bit(0, flags as u64),
        }
    }
}

const IPV4_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const ARP_LEN: usize = 28;
const ETH_HEADER_LEN: usize = 14;

/// IPv4 frame of a packet. The transport payload is kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ip {
    pub tos: u8,
    pub ident: u16,
    pub flags: Flags,
    pub frag: u16,
    pub ttl: u8,
    pub proto: u8,
    pub chksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub options: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Ip {
    fn parse(bytes: &mut Cursor<Vec<u8>>) -> Result<Ip, PacketError> {
        let len = remaining(bytes);
        if len < IPV4_HEADER_LEN {
            return Err(PacketError::Truncated { layer: "IPv4", len });
        }
        let vhl = bytes.read_u8()?;
        let ihl = (vhl & 0x0f) as usize * 4;
        if (vhl >> 4) != 4 || ihl < IPV4_HEADER_LEN || len < ihl {
            return Err(PacketError::Truncated { layer: "IPv4", len });
        }
        let tos = bytes.read_u8()?;
        bytes.consume(2);
        let ident = bytes.read_u16::<BigEndian>()?;
        let frag = bytes.read_u16::<BigEndian>()?;
        let flags = Flags::of_int((frag as u32) >> 13);
        let ttl = bytes.read_u8()?;
        let proto = bytes.read_u8()?;
        let chksum = bytes.read_u16::<BigEndian>()?;
        let src = Ipv4Addr::from(bytes.read_u32::<BigEndian>()?);
        let dst = Ipv4Addr::from(bytes.read_u32::<BigEndian>()?);
        let mut options = vec![0; ihl - IPV4_HEADER_LEN];
        bytes.read_exact(&mut options)?;
        let mut payload = vec![];
        bytes.read_to_end(&mut payload)?;
        Ok(Ip {
            tos,
            ident,
            flags,
            frag: frag & 0x1fff,
            ttl,
            proto,
            chksum,
            src,
            dst,
            options,
            payload,
        })
    }
}

/// Fixed IPv6 header. Extension headers are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6 {
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6 {
    fn parse(bytes: &mut Cursor<Vec<u8>>) -> Result<Ipv6, PacketError> {
        let len = remaining(bytes);
        if len < IPV6_HEADER_LEN {
            return Err(PacketError::Truncated { layer: "IPv6", len });
        }
        bytes.consume(6);
        let next_header = bytes.read_u8()?;
        let hop_limit = bytes.read_u8()?;
        let src = Ipv6Addr::from(bytes.read_u128::<BigEndian>()?);
        let dst = Ipv6Addr::from(bytes.read_u128::<BigEndian>()?);
        Ok(Ipv6 {
            next_header,
            hop_limit,
            src,
            dst,
        })
    }
}

/// Address resolution protocol (ARP) packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arp {
    Query(MacAddr, Ipv4Addr, Ipv4Addr),
    Reply(MacAddr, Ipv4Addr, MacAddr, Ipv4Addr),
}

impl Arp {
    fn parse(bytes: &mut Cursor<Vec<u8>>) -> Result<Option<Arp>, PacketError> {
        let len = remaining(bytes);
        if len < ARP_LEN {
            return Err(PacketError::Truncated { layer: "ARP", len });
        }
        bytes.consume(6);
        let oper = bytes.read_u16::<BigEndian>()?;
        let mut sha = [0u8; 6];
        bytes.read_exact(&mut sha)?;
        let spa = Ipv4Addr::from(bytes.read_u32::<BigEndian>()?);
        let mut tha = [0u8; 6];
        bytes.read_exact(&mut tha)?;
        let tpa = Ipv4Addr::from(bytes.read_u32::<BigEndian>()?);
        Ok(match oper {
            0x0001 => Some(Arp::Query(MacAddr::from_bytes(sha), spa, tpa)),
            0x0002 => Some(Arp::Reply(MacAddr::from_bytes(sha), spa, MacAddr::from_bytes(tha), tpa)),
            _ => None,
        })
    }
}

/// Represents a packet at the network protocol level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nw {
    Ip(Ip),
    Ipv6(Ipv6),
    Arp(Arp),
    /// A known network protocol whose header is cut short.
    Incomplete(u16),
    /// A protocol we do not interpret, with its raw bytes.
    Unparsable(u16, Vec<u8>),
}

#[repr(u16)]
pub enum EthTyp {
    EthTypIP = 0x0800,
    EthTypARP = 0x0806,
    EthTypVLAN = 0x8100,
    EthTypIPv6 = 0x86dd,
}

/// Represents a packet at the ethernet protocol level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_dei: bool,
    pub dl_vlan_pcp: u8,
    pub dl_typ: u16,
    pub nw: Nw,
}

impl Packet {
    /// Parse an Ethernet frame. Only a frame too short for its link-layer header is an error;
    /// a cut-short network header yields `Nw::Incomplete`.
    pub fn parse(buf: &[u8]) -> Result<Packet, PacketError> {
        if buf.len() < ETH_HEADER_LEN {
            return Err(PacketError::Truncated {
                layer: "Ethernet",
                len: buf.len(),
            });
        }
        let mut bytes = Cursor::new(buf.to_vec());
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        bytes.read_exact(&mut dst)?;
        bytes.read_exact(&mut src)?;
        let typ = bytes.read_u16::<BigEndian>()?;
        let (tag, dei, pcp, typ) = match typ {
            t if t == (EthTyp::EthTypVLAN as u16) => {
                if remaining(&bytes) < 4 {
                    return Err(PacketError::Truncated {
                        layer: "802.1Q",
                        len: buf.len(),
                    });
                }
                let tag_and_pcp = bytes.read_u16::<BigEndian>()?;
                let tag = tag_and_pcp & 0xfff;
                let dei = (tag_and_pcp & 0x1000) > 0;
                let pcp = tag_and_pcp >> 13;
                let typ = bytes.read_u16::<BigEndian>()?;
                (Some(tag), dei, pcp as u8, typ)
            }
            _ => (None, false, 0x0, typ),
        };
        let nw = match typ {
            t if t == (EthTyp::EthTypIP as u16) => {
                Ip::parse(&mut bytes).map(Nw::Ip).unwrap_or(Nw::Incomplete(typ))
            }
            t if t == (EthTyp::EthTypIPv6 as u16) => {
                Ipv6::parse(&mut bytes).map(Nw::Ipv6).unwrap_or(Nw::Incomplete(typ))
            }
            t if t == (EthTyp::EthTypARP as u16) => {
                let pos = bytes.position() as usize;
                match Arp::parse(&mut bytes) {
                    Ok(Some(arp)) => Nw::Arp(arp),
                    Ok(None) => Nw::Unparsable(typ, bytes.get_ref()[pos..].to_vec()),
                    Err(_) => Nw::Incomplete(typ),
                }
            }
            _ => {
                let mut rest = vec![];
                bytes.read_to_end(&mut rest)?;
                Nw::Unparsable(typ, rest)
            }
        };
        Ok(Packet {
            dl_src: MacAddr::from_bytes(src),
            dl_dst: MacAddr::from_bytes(dst),
            dl_vlan: tag,
            dl_vlan_dei: dei,
            dl_vlan_pcp: pcp,
            dl_typ: typ,
            nw,
        })
    }

    /// Whether every header we know how to read was present in full.
    pub fn is_complete(&self) -> bool {
        !matches!(self.nw, Nw::Incomplete(_))
    }

    pub fn is_ipv6(&self) -> bool {
        self.dl_typ == EthTyp::EthTypIPv6 as u16
    }
}

/// Return an untagged Ethernet frame carrying `payload`.
pub fn ethernet_frame(dst: MacAddr, src: MacAddr, typ: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&dst.bytes());
    bytes.extend_from_slice(&src.bytes());
    bytes.extend_from_slice(&typ.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Return an Ethernet frame carrying a minimal IPv4 header followed by `payload`.
/// The header checksum is left zero.
pub fn ipv4_frame(dst: MacAddr,
                  src: MacAddr,
                  ip_src: Ipv4Addr,
                  ip_dst: Ipv4Addr,
                  proto: u8,
                  payload: &[u8])
                  -> Vec<u8> {
    let mut ip = Vec::with_capacity(IPV4_HEADER_LEN + payload.len());
    let total_len = (IPV4_HEADER_LEN + payload.len()) as u16;
    ip.extend_from_slice(&[0x45, 0]);
    ip.extend_from_slice(&total_len.to_be_bytes());
    // ident 0, don't fragment
    ip.extend_from_slice(&[0, 0, 0x40, 0]);
    ip.extend_from_slice(&[64, proto, 0, 0]);
    ip.extend_from_slice(&ip_src.octets());
    ip.extend_from_slice(&ip_dst.octets());
    ip.extend_from_slice(payload);
    ethernet_frame(dst, src, EthTyp::EthTypIP as u16, &ip)
}

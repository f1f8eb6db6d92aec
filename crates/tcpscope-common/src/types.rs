//! Domain primitive types used across the tcpscope workspace.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_till1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res},
    sequence::delimited,
};
use serde::{Deserialize, Serialize};

use crate::error::TcpscopeError;

/// The 4-tuple used to match a connection between successive snapshots.
///
/// Carries no counters: two reports agree on identity even when the byte
/// and packet totals have moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    /// Source address of the original direction.
    pub src_ip: IpAddr,
    /// Source port of the original direction.
    pub src_port: u16,
    /// Destination address of the original direction.
    pub dst_ip: IpAddr,
    /// Destination port of the original direction.
    pub dst_port: u16,
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            std::net::SocketAddr::new(self.src_ip, self.src_port),
            std::net::SocketAddr::new(self.dst_ip, self.dst_port)
        )
    }
}

/// One connection parsed from a report line, with counters for both
/// traffic directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionObservation {
    /// Source address of the original direction.
    pub src_ip: IpAddr,
    /// Destination address of the original direction.
    pub dst_ip: IpAddr,
    /// Source port of the original direction.
    pub src_port: u16,
    /// Destination port of the original direction.
    pub dst_port: u16,
    /// Bytes seen in the original direction.
    pub send_bytes: u64,
    /// Bytes seen in the reply direction.
    pub resp_bytes: u64,
    /// Packets seen in the original direction.
    pub send_packets: u64,
    /// Packets seen in the reply direction.
    pub resp_packets: u64,
}

impl ConnectionObservation {
    /// Returns the counter-free identity of this connection.
    #[must_use]
    pub const fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity {
            src_ip: self.src_ip,
            src_port: self.src_port,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
        }
    }
}

/// Identity of one published metric series.
///
/// Pod names are resolved at publication time, so the same connection can
/// map to different keys across pod table refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelKey {
    /// Source address.
    pub src_ip: IpAddr,
    /// Pod owning the source address, or empty.
    pub src_pod: String,
    /// Destination address.
    pub dst_ip: IpAddr,
    /// Pod owning the destination address, or empty.
    pub dst_pod: String,
    /// Source port.
    pub src_port: u16,
    /// Destination port.
    pub dst_port: u16,
}

impl LabelKey {
    /// Returns label values ordered as [`crate::constants::LABEL_NAMES`].
    #[must_use]
    pub fn label_values(&self) -> [String; 6] {
        [
            self.src_ip.to_string(),
            self.src_pod.clone(),
            self.src_port.to_string(),
            self.dst_ip.to_string(),
            self.dst_pod.clone(),
            self.dst_port.to_string(),
        ]
    }
}

/// Writes an address, bracketing IPv6 so `:` stays a field separator.
fn write_ip(f: &mut fmt::Formatter<'_>, ip: IpAddr) -> fmt::Result {
    match ip {
        IpAddr::V4(v4) => write!(f, "{v4}"),
        IpAddr::V6(v6) => write!(f, "[{v6}]"),
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ip(f, self.src_ip)?;
        write!(f, ":{}:", self.src_pod)?;
        write_ip(f, self.dst_ip)?;
        write!(f, ":{}:{}:{}", self.dst_pod, self.src_port, self.dst_port)
    }
}

fn ip_field(input: &str) -> IResult<&str, IpAddr> {
    map_res(
        alt((
            delimited(char('['), take_till1(|c: char| c == ']'), char(']')),
            take_till1(|c: char| c == ':'),
        )),
        str::parse::<IpAddr>,
    )
    .parse(input)
}

fn pod_field(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == ':')(input)
}

fn port_field(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>).parse(input)
}

fn label_key(input: &str) -> IResult<&str, LabelKey> {
    let (input, src_ip) = ip_field(input)?;
    let (input, _) = char(':')(input)?;
    let (input, src_pod) = pod_field(input)?;
    let (input, _) = char(':')(input)?;
    let (input, dst_ip) = ip_field(input)?;
    let (input, _) = char(':')(input)?;
    let (input, dst_pod) = pod_field(input)?;
    let (input, _) = char(':')(input)?;
    let (input, src_port) = port_field(input)?;
    let (input, _) = char(':')(input)?;
    let (input, dst_port) = port_field(input)?;
    Ok((
        input,
        LabelKey {
            src_ip,
            src_pod: src_pod.to_owned(),
            dst_ip,
            dst_pod: dst_pod.to_owned(),
            src_port,
            dst_port,
        },
    ))
}

impl FromStr for LabelKey {
    type Err = TcpscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(label_key)
            .parse(s)
            .map(|(_, key)| key)
            .map_err(|_| TcpscopeError::Parse {
                what: "label key",
                input: s.to_owned(),
            })
    }
}

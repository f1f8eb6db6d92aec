//! Parsing of `conntrack -L` report lines using `nom`.
//!
//! A line of interest looks like
//!
//! ```text
//! tcp 6 431999 ESTABLISHED src=10.0.0.1 dst=10.0.0.2 sport=1111 dport=80 packets=10 bytes=2048 src=10.0.0.2 dst=10.0.0.1 sport=80 dport=1111 packets=8 bytes=512 [ASSURED] mark=0 use=1
//! ```
//!
//! The first address group describes the original direction, the second
//! the reply direction. Everything after the reply counters is ignored.

use std::collections::HashSet;
use std::net::IpAddr;

use nom::{
    IResult, Parser,
    bytes::complete::{tag, take_till1},
    character::complete::{digit1, space1},
    combinator::map_res,
    sequence::preceded,
};
use tcpscope_common::constants::ESTABLISHED_KEYWORD;
use tcpscope_common::error::{Result, TcpscopeError};
use tcpscope_common::types::{ConnectionIdentity, ConnectionObservation};

fn ip_value(input: &str) -> IResult<&str, IpAddr> {
    map_res(take_till1(|c: char| c.is_ascii_whitespace()), str::parse::<IpAddr>).parse(input)
}

fn port_value(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>).parse(input)
}

fn counter_value(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse::<u64>).parse(input)
}

/// Parses `src=.. dst=.. sport=.. dport=..`.
fn address_group(input: &str) -> IResult<&str, ConnectionIdentity> {
    let (input, src_ip) = preceded(tag("src="), ip_value).parse(input)?;
    let (input, _) = space1(input)?;
    let (input, dst_ip) = preceded(tag("dst="), ip_value).parse(input)?;
    let (input, _) = space1(input)?;
    let (input, src_port) = preceded(tag("sport="), port_value).parse(input)?;
    let (input, _) = space1(input)?;
    let (input, dst_port) = preceded(tag("dport="), port_value).parse(input)?;
    Ok((
        input,
        ConnectionIdentity {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        },
    ))
}

/// Parses `packets=N bytes=N`, returning `(packets, bytes)`.
fn counters(input: &str) -> IResult<&str, (u64, u64)> {
    let (input, packets) = preceded(tag("packets="), counter_value).parse(input)?;
    let (input, _) = space1(input)?;
    let (input, bytes) = preceded(tag("bytes="), counter_value).parse(input)?;
    Ok((input, (packets, bytes)))
}

/// Parses one direction: address group followed by its counters.
fn direction(input: &str) -> IResult<&str, (ConnectionIdentity, u64, u64)> {
    let (input, identity) = address_group(input)?;
    let (input, _) = space1(input)?;
    let (input, (packets, bytes)) = counters(input)?;
    Ok((input, (identity, packets, bytes)))
}

fn observation(input: &str) -> IResult<&str, ConnectionObservation> {
    let (input, _) = space1(input)?;
    let (input, (original, send_packets, send_bytes)) = direction(input)?;
    let (input, _) = space1(input)?;
    let (input, (_reply, resp_packets, resp_bytes)) = direction(input)?;
    Ok((
        input,
        ConnectionObservation {
            src_ip: original.src_ip,
            dst_ip: original.dst_ip,
            src_port: original.src_port,
            dst_port: original.dst_port,
            send_bytes,
            resp_bytes,
            send_packets,
            resp_packets,
        },
    ))
}

/// Returns the text following the state keyword, if present.
fn after_keyword(line: &str) -> Option<&str> {
    line.find(ESTABLISHED_KEYWORD)
        .map(|idx| &line[idx + ESTABLISHED_KEYWORD.len()..])
}

/// Extracts the original-direction 4-tuple of an established connection.
///
/// Returns `None` for blank, truncated, or non-established lines.
#[must_use]
pub fn parse_identity(line: &str) -> Option<ConnectionIdentity> {
    let rest = after_keyword(line)?;
    let (rest, _) = space1::<_, nom::error::Error<&str>>(rest).ok()?;
    address_group(rest).ok().map(|(_, identity)| identity)
}

/// Parses the full eight-field observation from a report line.
///
/// # Errors
///
/// Returns [`TcpscopeError::Parse`] if the line lacks the state keyword or
/// either direction's address and counter fields.
pub fn parse_observation(line: &str) -> Result<ConnectionObservation> {
    let invalid = || TcpscopeError::Parse {
        what: "conntrack line",
        input: line.to_owned(),
    };
    let rest = after_keyword(line).ok_or_else(invalid)?;
    observation(rest).map(|(_, obs)| obs).map_err(|_| invalid())
}

/// Collects the identities of every well-formed line in a report.
#[must_use]
pub fn identities(report: &str) -> HashSet<ConnectionIdentity> {
    report.lines().filter_map(parse_identity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "tcp      6 431999 ESTABLISHED src=10.0.0.1 dst=10.0.0.2 sport=1111 dport=80 packets=10 bytes=2048 src=10.0.0.2 dst=10.0.0.1 sport=80 dport=1111 packets=8 bytes=512 [ASSURED] mark=0 use=1";

    #[test]
    fn parse_observation_reads_both_directions() {
        let obs = parse_observation(LINE).unwrap();
        assert_eq!(obs.src_ip, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(obs.dst_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(obs.src_port, 1111);
        assert_eq!(obs.dst_port, 80);
        assert_eq!(obs.send_packets, 10);
        assert_eq!(obs.send_bytes, 2048);
        assert_eq!(obs.resp_packets, 8);
        assert_eq!(obs.resp_bytes, 512);
    }

    #[test]
    fn parse_identity_matches_observation() {
        let id = parse_identity(LINE).unwrap();
        assert_eq!(id, parse_observation(LINE).unwrap().identity());
    }

    #[test]
    fn parse_identity_without_counters() {
        let line = "tcp 6 300 ESTABLISHED src=10.0.0.1 dst=10.0.0.2 sport=1111 dport=80 src=10.0.0.2 dst=10.0.0.1 sport=80 dport=1111 [ASSURED] mark=0 use=1";
        assert!(parse_identity(line).is_some());
        assert!(parse_observation(line).is_err());
    }

    #[test]
    fn parse_identity_rejects_other_states() {
        let line = "tcp 6 10 TIME_WAIT src=10.0.0.1 dst=10.0.0.2 sport=1111 dport=80 packets=1 bytes=60";
        assert!(parse_identity(line).is_none());
    }

    #[test]
    fn parse_identity_rejects_short_lines() {
        assert!(parse_identity("").is_none());
        assert!(parse_identity("tcp 6 431999 ESTABLISHED src=10.0.0.1").is_none());
    }

    #[test]
    fn parse_observation_accepts_ipv6() {
        let line = "tcp 6 431999 ESTABLISHED src=fd00::1 dst=fd00::2 sport=40000 dport=443 packets=3 bytes=1500 src=fd00::2 dst=fd00::1 sport=443 dport=40000 packets=2 bytes=3000 [ASSURED] mark=0 use=1";
        let obs = parse_observation(line).unwrap();
        assert_eq!(obs.src_ip, "fd00::1".parse::<IpAddr>().unwrap());
        assert_eq!(obs.resp_bytes, 3000);
    }

    #[test]
    fn parse_observation_rejects_port_overflow() {
        let line = LINE.replace("sport=1111", "sport=99999");
        assert!(parse_observation(&line).is_err());
    }

    #[test]
    fn identities_skip_summary_and_blank_lines() {
        let report = format!(
            "{LINE}\n\nconntrack v1.4.6 (conntrack-tools): 1 flow entries have been shown.\n"
        );
        assert_eq!(identities(&report).len(), 1);
    }
}

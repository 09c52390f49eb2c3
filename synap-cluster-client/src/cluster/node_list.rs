//! `CLUSTER NODES` reply parsing
//!
//! Each line describes one node:
//! `<id> <ip:port@cport[,hostname]> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ... <slot>`

use super::topology::ClusterTopology;
use super::types::{ClusterNode, LinkState, NodeFlags, NodeRole, SlotRange, SlotSpan, TOTAL_SLOTS};
use crate::error::{ClusterError, ClusterResult};

const MIN_FIELDS: usize = 8;

impl ClusterTopology {
    /// Build a snapshot from a `CLUSTER NODES` reply. Blank lines are skipped.
    pub fn from_cluster_nodes(reply: &str) -> ClusterResult<Self> {
        let nodes = reply
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_node_line)
            .collect::<ClusterResult<Vec<_>>>()?;
        Ok(Self::new(nodes))
    }
}

/// Parse one `CLUSTER NODES` line
pub fn parse_node_line(line: &str) -> ClusterResult<ClusterNode> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return Err(invalid(line, "expected at least 8 fields"));
    }

    let (host, port) = parse_address(fields[1]).ok_or_else(|| invalid(line, "bad address"))?;
    let (role, flags) = parse_flags(fields[2]);
    let master_id = match fields[3] {
        "-" => None,
        id => Some(id.to_string()),
    };
    let link_state = match fields[7] {
        "connected" => LinkState::Connected,
        _ => LinkState::Disconnected,
    };

    let mut spans = Vec::new();
    for token in &fields[MIN_FIELDS..] {
        // [slot->-node] / [slot-<-node] describe migrations, not ownership
        if token.starts_with('[') {
            continue;
        }
        spans.push(parse_span(token).ok_or_else(|| invalid(line, "bad slot range"))?);
    }

    Ok(ClusterNode {
        id: Some(fields[0].to_string()),
        host,
        port,
        role,
        link_state,
        flags,
        slots: SlotRange::from_spans(spans),
        master_id,
    })
}

fn parse_address(field: &str) -> Option<(Option<String>, Option<u16>)> {
    let addr = field.split(['@', ',']).next().unwrap_or_default();
    let (host, port) = addr.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port: u16 = port.parse().ok()?;

    // noaddr nodes report ":0"
    if host.is_empty() {
        return Some((None, None));
    }
    Some((Some(host.to_string()), Some(port)))
}

fn parse_flags(field: &str) -> (NodeRole, NodeFlags) {
    let mut role = NodeRole::Master;
    let mut flags = NodeFlags::default();
    for flag in field.split(',') {
        match flag {
            "myself" => flags.is_myself = true,
            "master" => role = NodeRole::Master,
            "slave" | "replica" => role = NodeRole::Replica,
            "fail" => flags.is_fail = true,
            "fail?" => flags.is_pfail = true,
            "handshake" => flags.is_handshake = true,
            "noaddr" => flags.is_noaddr = true,
            "nofailover" => flags.is_nofailover = true,
            _ => {}
        }
    }
    (role, flags)
}

fn parse_span(token: &str) -> Option<SlotSpan> {
    let (start, end) = match token.split_once('-') {
        Some((start, end)) => (start.parse().ok()?, end.parse().ok()?),
        None => {
            let slot = token.parse().ok()?;
            (slot, slot)
        }
    };
    (start <= end && end < TOTAL_SLOTS).then(|| SlotSpan::new(start, end))
}

fn invalid(line: &str, reason: &str) -> ClusterError {
    ClusterError::StateFailure(format!("Invalid CLUSTER NODES line ({}): {}", reason, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004,host-4 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30006@31006 slave,fail? 292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 0 1426238317741 6 disconnected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460 [5461->-67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1]
";

    #[test]
    fn test_parse_reply() {
        let topology = ClusterTopology::from_cluster_nodes(REPLY).unwrap();
        assert_eq!(topology.len(), 6);
        assert_eq!(topology.master_nodes().len(), 3);
        assert_eq!(topology.active_nodes().len(), 5);
        assert!(topology.has_full_coverage());

        let me = topology.lookup_address("127.0.0.1", 30001).unwrap();
        assert!(me.flags.is_myself);
        assert!(me.is_master());
        assert_eq!(me.slots.len(), 5461);
        assert!(!me.serves_slot(5461));

        let failing = topology.lookup_address("127.0.0.1", 30006).unwrap();
        assert!(failing.is_replica());
        assert!(failing.flags.is_pfail);
        assert_eq!(failing.link_state, LinkState::Disconnected);
        assert_eq!(
            failing.master_id.as_deref(),
            Some("292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f")
        );
    }

    #[test]
    fn test_parse_single_slots_and_noaddr() {
        let node = parse_node_line("abc :0@0 master,noaddr - 0 0 0 disconnected 1 3-4").unwrap();
        assert!(node.address().is_none());
        assert!(node.flags.is_noaddr);
        assert_eq!(node.slots.slots().collect::<Vec<_>>(), vec![1, 3, 4]);
    }

    #[test]
    fn test_parse_ipv6_address() {
        let node = parse_node_line("abc [::1]:7000@17000 master - 0 0 0 connected").unwrap();
        assert_eq!(node.address(), Some(("::1", 7000)));
    }

    #[test]
    fn test_reject_malformed_lines() {
        assert!(parse_node_line("abc 127.0.0.1:7000 master").is_err());
        assert!(parse_node_line("abc nope master - 0 0 0 connected").is_err());
        assert!(parse_node_line("abc 127.0.0.1:7000 master - 0 0 0 connected 9-2").is_err());
        assert!(parse_node_line("abc 127.0.0.1:7000 master - 0 0 0 connected 99999").is_err());
    }
}

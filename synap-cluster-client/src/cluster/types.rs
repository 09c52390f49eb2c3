use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Total number of hash slots (Redis-compatible)
pub const TOTAL_SLOTS: u16 = 16384;

/// Node role within a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    Master,
    #[serde(alias = "slave")]
    Replica,
}

/// State of the cluster bus link to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Connected,
    Disconnected,
}

/// Node flags as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeFlags {
    pub is_myself: bool,
    pub is_fail: bool,
    /// Possibly failing: one node's view, not yet agreed by a majority
    pub is_pfail: bool,
    pub is_handshake: bool,
    pub is_noaddr: bool,
    pub is_nofailover: bool,
}

impl NodeFlags {
    /// Either confirmed or suspected failure
    pub fn is_failing(&self) -> bool {
        self.is_fail || self.is_pfail
    }
}

/// Inclusive span of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotSpan {
    pub start: u16,
    pub end: u16,
}

impl SlotSpan {
    pub fn new(start: u16, end: u16) -> Self {
        assert!(start <= end && end < TOTAL_SLOTS);
        Self { start, end }
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }
}

impl fmt::Display for SlotSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Set of slots served by a node, kept as sorted, disjoint, non-adjacent spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SlotSpan>", into = "Vec<SlotSpan>")]
pub struct SlotRange {
    spans: Vec<SlotSpan>,
}

impl SlotRange {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Slots `start..=end`
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            spans: vec![SlotSpan::new(start, end)],
        }
    }

    /// Build from arbitrary slots; out-of-range values are ignored.
    pub fn from_slots(slots: impl IntoIterator<Item = u16>) -> Self {
        let mut sorted: Vec<u16> = slots.into_iter().filter(|s| *s < TOTAL_SLOTS).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut spans: Vec<SlotSpan> = Vec::new();
        for slot in sorted {
            match spans.last_mut() {
                Some(last) if last.end + 1 == slot => last.end = slot,
                _ => spans.push(SlotSpan { start: slot, end: slot }),
            }
        }
        Self { spans }
    }

    pub fn from_spans(spans: impl IntoIterator<Item = SlotSpan>) -> Self {
        let mut spans: Vec<SlotSpan> = spans.into_iter().collect();
        spans.sort_unstable_by_key(|s| s.start);

        let mut merged: Vec<SlotSpan> = Vec::with_capacity(spans.len());
        for span in spans {
            match merged.last_mut() {
                Some(last) if span.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(span.end);
                }
                _ => merged.push(span),
            }
        }
        Self { spans: merged }
    }

    pub fn contains(&self, slot: u16) -> bool {
        let idx = self.spans.partition_point(|s| s.end < slot);
        self.spans.get(idx).is_some_and(|s| s.contains(slot))
    }

    /// Number of slots in the set
    pub fn len(&self) -> usize {
        self.spans.iter().map(|s| s.count() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[SlotSpan] {
        &self.spans
    }

    pub fn slots(&self) -> impl Iterator<Item = u16> + '_ {
        self.spans.iter().flat_map(|s| s.start..=s.end)
    }
}

impl From<Vec<SlotSpan>> for SlotRange {
    fn from(spans: Vec<SlotSpan>) -> Self {
        Self::from_spans(spans)
    }
}

impl From<SlotRange> for Vec<SlotSpan> {
    fn from(range: SlotRange) -> Self {
        range.spans
    }
}

/// Cluster node descriptor.
///
/// Callers may pass partial descriptors (only `host`/`port`, or only `id`); the
/// executor resolves them against the current topology before use.
///
/// Two nodes are equal when their addresses match. Nodes without an address
/// fall back to comparing ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default)]
    pub link_state: LinkState,
    #[serde(default)]
    pub flags: NodeFlags,
    #[serde(default)]
    pub slots: SlotRange,
    /// Master node ID (if this is a replica)
    pub master_id: Option<String>,
}

impl ClusterNode {
    /// Descriptor carrying only an address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    /// Descriptor carrying only a node id
    pub fn with_id_only(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Fully described master serving `slots`
    pub fn master(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        slots: SlotRange,
    ) -> Self {
        Self {
            id: Some(id.into()),
            host: Some(host.into()),
            port: Some(port),
            role: NodeRole::Master,
            slots,
            ..Default::default()
        }
    }

    /// Replica of `master`, mirroring its slots
    pub fn replica_of(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        master: &ClusterNode,
    ) -> Self {
        Self {
            id: Some(id.into()),
            host: Some(host.into()),
            port: Some(port),
            role: NodeRole::Replica,
            slots: master.slots.clone(),
            master_id: master.id.clone(),
            ..Default::default()
        }
    }

    pub fn with_link_state(mut self, link_state: LinkState) -> Self {
        self.link_state = link_state;
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn is_replica(&self) -> bool {
        self.role == NodeRole::Replica
    }

    /// Link is up and no failure is flagged
    pub fn is_active(&self) -> bool {
        self.link_state == LinkState::Connected && !self.flags.is_failing()
    }

    pub fn serves_slot(&self, slot: u16) -> bool {
        self.slots.contains(slot)
    }

    /// `(host, port)` when both are present and the host is non-blank
    pub fn address(&self) -> Option<(&str, u16)> {
        match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) if !host.trim().is_empty() => Some((host, port)),
            _ => None,
        }
    }

    /// Non-blank node id
    pub fn node_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

impl PartialEq for ClusterNode {
    fn eq(&self, other: &Self) -> bool {
        let address = self.address();
        address == other.address() && (address.is_some() || self.node_id() == other.node_id())
    }
}

impl Eq for ClusterNode {}

impl Hash for ClusterNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.address() {
            Some(address) => address.hash(state),
            None => self.node_id().hash(state),
        }
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.address(), self.node_id()) {
            (Some((host, port)), Some(id)) => write!(f, "{}:{} ({})", host, port, id),
            (Some((host, port)), None) => write!(f, "{}:{}", host, port),
            (None, Some(id)) => write!(f, "{}", id),
            (None, None) => write!(f, "<unidentified node>"),
        }
    }
}

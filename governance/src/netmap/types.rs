//! Records stored by the network map.

use bytes::{Buf, BufMut};
use commonware_codec::{
    EncodeSize, Error as CodecError, RangeCfg, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::PublicKey;

/// Status of a candidate.
///
/// The status is authoritative: any state embedded in a node's descriptor is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// The node participates in the network.
    Online,
    /// The node left the network (it is never included in a snapshot).
    Offline,
    /// The node is temporarily unavailable but remains in the network map.
    Maintenance,
}

impl NodeState {
    fn tag(&self) -> u8 {
        match self {
            Self::Online => 1,
            Self::Offline => 2,
            Self::Maintenance => 3,
        }
    }
}

impl Write for NodeState {
    fn write(&self, buf: &mut impl BufMut) {
        self.tag().write(buf);
    }
}

impl Read for NodeState {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            1 => Ok(Self::Online),
            2 => Ok(Self::Offline),
            3 => Ok(Self::Maintenance),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

impl EncodeSize for NodeState {
    fn encode_size(&self) -> usize {
        self.tag().encode_size()
    }
}

/// A topology entry: the node's key, its opaque descriptor, and its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node<P: PublicKey> {
    pub key: P,
    pub descriptor: Vec<u8>,
    pub state: NodeState,
}

impl<P: PublicKey> Write for Node<P> {
    fn write(&self, buf: &mut impl BufMut) {
        self.key.write(buf);
        self.descriptor.write(buf);
        self.state.write(buf);
    }
}

impl<P: PublicKey> Read for Node<P> {
    /// Maximum size of the descriptor.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_descriptor: &usize) -> Result<Self, CodecError> {
        let key = P::read(buf)?;
        let descriptor = Vec::<u8>::read_range(buf, ..=*max_descriptor)?;
        let state = NodeState::read(buf)?;
        Ok(Self {
            key,
            descriptor,
            state,
        })
    }
}

impl<P: PublicKey> EncodeSize for Node<P> {
    fn encode_size(&self) -> usize {
        self.key.encode_size() + self.descriptor.encode_size() + self.state.encode_size()
    }
}

/// The candidates that were online or in maintenance at an epoch boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<P: PublicKey> {
    nodes: Vec<Node<P>>,
}

impl<P: PublicKey> Snapshot<P> {
    /// Build a snapshot from `candidates`, dropping every `Offline` entry.
    pub fn new(candidates: Vec<Node<P>>) -> Self {
        let nodes = candidates
            .into_iter()
            .filter(|node| node.state != NodeState::Offline)
            .collect();
        Self { nodes }
    }

    /// Returns the nodes of the snapshot.
    pub fn nodes(&self) -> &[Node<P>] {
        &self.nodes
    }

    /// Returns the number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the snapshot has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<P: PublicKey> Default for Snapshot<P> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<P: PublicKey> Write for Snapshot<P> {
    fn write(&self, buf: &mut impl BufMut) {
        self.nodes.write(buf);
    }
}

impl<P: PublicKey> Read for Snapshot<P> {
    /// Maximum number of nodes and maximum size of each descriptor.
    type Cfg = (usize, usize);

    fn read_cfg(
        buf: &mut impl Buf,
        (max_nodes, max_descriptor): &(usize, usize),
    ) -> Result<Self, CodecError> {
        let range: RangeCfg = (..=*max_nodes).into();
        let nodes = Vec::<Node<P>>::read_cfg(buf, &(range, *max_descriptor))?;
        if nodes.iter().any(|node| node.state == NodeState::Offline) {
            return Err(CodecError::Invalid(
                "governance::netmap::Snapshot",
                "offline node in snapshot",
            ));
        }
        Ok(Self { nodes })
    }
}

impl<P: PublicKey> EncodeSize for Snapshot<P> {
    fn encode_size(&self) -> usize {
        self.nodes.encode_size()
    }
}

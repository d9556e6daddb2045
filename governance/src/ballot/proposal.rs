//! Derive ballot identifiers from a method and its arguments.

use commonware_codec::{varint::UInt, Encode};
use commonware_cryptography::Hasher;

/// Derives the deterministic identifier of a proposal.
///
/// The identifier is a digest over the namespace, the method name, and every argument (in the
/// order provided). Each component is length-prefixed before hashing, so two proposals collide
/// only if they agree on every component.
pub struct Proposal<H: Hasher> {
    method: &'static str,
    hasher: H,
}

impl<H: Hasher> Proposal<H> {
    /// Start a proposal for `method` within `namespace`.
    pub fn new(namespace: &[u8], method: &'static str) -> Self {
        let mut proposal = Self {
            method,
            hasher: H::new(),
        };
        proposal.field(namespace);
        proposal.field(method.as_bytes());
        proposal
    }

    /// Returns the method the proposal was created for.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Append an argument to the proposal.
    pub fn with<T: Encode>(mut self, arg: &T) -> Self {
        let encoded = arg.encode();
        self.field(&encoded);
        self
    }

    /// Returns the identifier of the proposal.
    pub fn id(mut self) -> H::Digest {
        self.hasher.finalize()
    }

    fn field(&mut self, bytes: &[u8]) {
        self.hasher.update(&UInt(bytes.len() as u64).encode());
        self.hasher.update(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Epoch;
    use commonware_cryptography::Sha256;

    fn id(method: &'static str, args: &[u64]) -> <Sha256 as Hasher>::Digest {
        let mut proposal = Proposal::<Sha256>::new(b"ns", method);
        for arg in args {
            proposal = proposal.with(&Epoch::new(*arg));
        }
        proposal.id()
    }

    #[test]
    fn test_identical_arguments_collapse() {
        assert_eq!(id("put", &[1, 2]), id("put", &[1, 2]));
    }

    #[test]
    fn test_any_difference_is_distinct() {
        let base = id("put", &[1, 2]);
        assert_ne!(base, id("delete", &[1, 2]));
        assert_ne!(base, id("put", &[2, 1]));
        assert_ne!(base, id("put", &[1]));
        assert_ne!(base, id("put", &[1, 2, 3]));
        assert_ne!(
            base,
            Proposal::<Sha256>::new(b"other", "put")
                .with(&Epoch::new(1))
                .with(&Epoch::new(2))
                .id()
        );
    }

    #[test]
    fn test_component_boundaries_are_unambiguous() {
        let split = Proposal::<Sha256>::new(b"ns", "ab").with(&vec![1u8]).id();
        let shifted = Proposal::<Sha256>::new(b"ns", "a").with(&vec![b'b', 1u8]).id();
        assert_ne!(split, shifted);
    }
}

//! Decide who is allowed to act on behalf of the validator set.
//!
//! Membership ([Validators]) and authorization ([Witness]) are supplied by the host. The
//! [Signatures] witness is a concrete implementation that treats a call as authorized by a key
//! if the call carries a valid signature from that key over the transaction payload.

use crate::{types::quorum, Error};
use commonware_cryptography::{PublicKey, Signer, Verifier};
use std::collections::BTreeSet;

/// Source of the current validator set.
///
/// The set may change between calls, so it is re-read whenever a threshold is derived.
pub trait Validators<P: PublicKey> {
    /// Returns the ordered list of current validator keys.
    fn validators(&self) -> Vec<P>;
}

impl<P: PublicKey> Validators<P> for Vec<P> {
    fn validators(&self) -> Vec<P> {
        self.clone()
    }
}

/// Authorization context of the call currently being executed.
pub trait Witness {
    /// Key type that may authorize a call.
    type PublicKey: PublicKey;

    /// Returns true if the current call is authorized by `key`.
    fn check(&self, key: &Self::PublicKey) -> bool;

    /// Returns true if at least `threshold` distinct members of `keys` authorized the current
    /// call (an aggregate multi-signature check).
    fn check_multisig(&self, keys: &[Self::PublicKey], threshold: usize) -> bool {
        let distinct: BTreeSet<&Self::PublicKey> = keys.iter().collect();
        distinct.into_iter().filter(|key| self.check(key)).count() >= threshold
    }
}

/// Returns the first member of `validators` (in order) that authorized the current call.
///
/// Returns `None` if the caller is not a member of `validators`, in which case the call is not
/// eligible to vote.
pub fn invoker<W: Witness>(witness: &W, validators: &[W::PublicKey]) -> Option<W::PublicKey> {
    validators.iter().find(|key| witness.check(key)).cloned()
}

/// Require that a quorum of `validators` jointly authorized the current call.
///
/// This is the aggregate multi-signature check used by operations that are not ballot-gated
/// (epoch transitions, candidate management, capacity changes).
pub fn require_quorum<W: Witness>(witness: &W, validators: &[W::PublicKey]) -> Result<(), Error> {
    if !witness.check_multisig(validators, quorum(validators.len())) {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// A [Witness] backed by signatures over a transaction payload.
#[derive(Clone, Debug)]
pub struct Signatures<P: PublicKey> {
    namespace: Vec<u8>,
    payload: Vec<u8>,
    signatures: Vec<(P, <P as Verifier>::Signature)>,
}

impl<P: PublicKey> Signatures<P> {
    /// Create a witness for `payload` that carries no signatures.
    pub fn new(namespace: &[u8], payload: &[u8]) -> Self {
        Self {
            namespace: namespace.to_vec(),
            payload: payload.to_vec(),
            signatures: Vec::new(),
        }
    }

    /// Sign the payload with `signer` and attach the signature.
    pub fn sign<C: Signer<PublicKey = P, Signature = <P as Verifier>::Signature>>(
        &mut self,
        signer: &C,
    ) {
        let signature = signer.sign(Some(&self.namespace), &self.payload);
        self.signatures.push((signer.public_key(), signature));
    }

    /// Attach a signature produced elsewhere. It is verified on use, not on insertion.
    pub fn attach(&mut self, key: P, signature: <P as Verifier>::Signature) {
        self.signatures.push((key, signature));
    }

    /// Returns the number of attached signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    /// Returns true if no signatures are attached.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl<P: PublicKey> Witness for Signatures<P> {
    type PublicKey = P;

    fn check(&self, key: &P) -> bool {
        self.signatures.iter().any(|(signer, signature)| {
            signer == key && signer.verify(Some(&self.namespace), &self.payload, signature)
        })
    }
}

//! Shape checks for proof inputs.
//!
//! Proof generation is expensive and happens outside the vault, so requests
//! are rejected early when the Merkle material they carry is obviously
//! malformed. Validators come in two flavors: the chained `validate_proof`
//! stops at the first violated rule, `validate_all` reports every violation.

mod artifact;
mod merkle;

pub use artifact::{ArtifactsProofValidator, MerkleProofArtifacts};
pub use merkle::{MerkleProof, MerkleProofValidator};

use strum::IntoStaticStr;
use thiserror::Error;

/// A violated proof-shape rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofValidationError {
    /// The Merkle root is missing or falsy.
    #[error("invalid-root")]
    InvalidRoot,
    /// The proof carries no siblings.
    #[error("invalid-siblings")]
    InvalidSiblings,
    /// The proof carries no path indices.
    #[error("invalid-path-indices")]
    InvalidPathIndices,
    /// The leaf is missing or falsy.
    #[error("invalid-leaf")]
    InvalidLeaf,
    /// The tree depth is not positive.
    #[error("invalid-depth")]
    InvalidDepth,
    /// The artifact carries no leaves.
    #[error("invalid-leaves")]
    InvalidLeaves,
    /// The arity is not positive.
    #[error("invalid-leaves-per-node")]
    InvalidLeavesPerNode,
}

impl ProofValidationError {
    /// Stable rule identifier, e.g. `INVALID_ROOT`.
    #[must_use]
    pub fn code(self) -> &'static str {
        self.into()
    }
}

/// Runs every rule and collects the failures, in rule order.
pub(crate) fn collect_failures<V>(
    validator: &V,
    rules: &[for<'b> fn(&'b V) -> Result<&'b V, ProofValidationError>],
) -> Vec<ProofValidationError> {
    rules
        .iter()
        .filter_map(|rule| rule(validator).err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ProofValidationError::InvalidRoot.code(), "INVALID_ROOT");
        assert_eq!(
            ProofValidationError::InvalidPathIndices.code(),
            "INVALID_PATH_INDICES"
        );
        assert_eq!(
            ProofValidationError::InvalidLeavesPerNode.code(),
            "INVALID_LEAVES_PER_NODE"
        );
    }
}

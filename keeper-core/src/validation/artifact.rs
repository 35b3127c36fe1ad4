use serde::{Deserialize, Serialize};

use super::{collect_failures, ProofValidationError};

/// Tree description from which the prover rebuilds the Merkle proof itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProofArtifacts {
    /// Tree depth.
    #[serde(default)]
    pub depth: i64,
    /// Every leaf in insertion order.
    #[serde(default)]
    pub leaves: Vec<String>,
    /// Tree arity.
    #[serde(default)]
    pub leaves_per_node: i64,
}

/// Checks that a [`MerkleProofArtifacts`] descriptor is usable.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactsProofValidator<'a> {
    artifacts: &'a MerkleProofArtifacts,
}

impl<'a> ArtifactsProofValidator<'a> {
    /// Wraps `artifacts`.
    #[must_use]
    pub const fn new(artifacts: &'a MerkleProofArtifacts) -> Self {
        Self { artifacts }
    }

    /// Applies every rule in order and stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate_proof(&self) -> Result<&Self, ProofValidationError> {
        self.validate_depth()?
            .validate_leaves()?
            .validate_leaves_per_node()
    }

    /// Collects every violated rule.
    #[must_use]
    pub fn validate_all(&self) -> Vec<ProofValidationError> {
        collect_failures(
            self,
            &[
                Self::validate_depth,
                Self::validate_leaves,
                Self::validate_leaves_per_node,
            ],
        )
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidDepth`] unless `depth > 0`.
    pub const fn validate_depth(&self) -> Result<&Self, ProofValidationError> {
        if self.artifacts.depth <= 0 {
            return Err(ProofValidationError::InvalidDepth);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidLeaves`] when there are no leaves.
    pub fn validate_leaves(&self) -> Result<&Self, ProofValidationError> {
        if self.artifacts.leaves.is_empty() {
            return Err(ProofValidationError::InvalidLeaves);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidLeavesPerNode`] unless `leaves_per_node > 0`.
    pub const fn validate_leaves_per_node(&self) -> Result<&Self, ProofValidationError> {
        if self.artifacts.leaves_per_node <= 0 {
            return Err(ProofValidationError::InvalidLeavesPerNode);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn artifacts(depth: i64, leaves: &[&str], leaves_per_node: i64) -> MerkleProofArtifacts {
        MerkleProofArtifacts {
            depth,
            leaves: leaves.iter().map(ToString::to_string).collect(),
            leaves_per_node,
        }
    }

    #[test]
    fn test_valid_descriptor_passes() {
        let descriptor = artifacts(1, &["leaf-1"], 1);
        assert!(ArtifactsProofValidator::new(&descriptor)
            .validate_proof()
            .is_ok());
    }

    #[test_case(artifacts(0, &["leaf-1"], 1), ProofValidationError::InvalidDepth ; "zero depth")]
    #[test_case(artifacts(-3, &["leaf-1"], 1), ProofValidationError::InvalidDepth ; "negative depth")]
    #[test_case(artifacts(1, &[], 1), ProofValidationError::InvalidLeaves ; "no leaves")]
    #[test_case(artifacts(1, &["leaf-1"], 0), ProofValidationError::InvalidLeavesPerNode ; "zero arity")]
    fn test_rejected(descriptor: MerkleProofArtifacts, expected: ProofValidationError) {
        assert_eq!(
            ArtifactsProofValidator::new(&descriptor)
                .validate_proof()
                .err(),
            Some(expected)
        );
    }

    #[test]
    fn test_validate_all_reports_every_failure() {
        let descriptor = artifacts(0, &[], 0);
        assert_eq!(
            ArtifactsProofValidator::new(&descriptor).validate_all(),
            vec![
                ProofValidationError::InvalidDepth,
                ProofValidationError::InvalidLeaves,
                ProofValidationError::InvalidLeavesPerNode,
            ]
        );
    }
}

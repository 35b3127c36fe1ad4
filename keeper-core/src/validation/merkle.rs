use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{collect_failures, ProofValidationError};

/// Inclusion proof supplied by the requesting host.
///
/// Values are kept as raw JSON since hosts send field elements either as
/// decimal strings, hex strings or numbers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    /// Tree root.
    #[serde(default)]
    pub root: Value,
    /// The proven leaf.
    #[serde(default)]
    pub leaf: Value,
    /// Sibling nodes from leaf to root.
    #[serde(default)]
    pub siblings: Vec<Value>,
    /// Position of the path at each level.
    #[serde(default)]
    pub path_indices: Vec<u32>,
}

/// Checks that a [`MerkleProof`] has every part a prover needs.
#[derive(Debug, Clone, Copy)]
pub struct MerkleProofValidator<'a> {
    proof: &'a MerkleProof,
}

impl<'a> MerkleProofValidator<'a> {
    /// Wraps `proof`.
    #[must_use]
    pub const fn new(proof: &'a MerkleProof) -> Self {
        Self { proof }
    }

    /// Applies every rule in order and stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate_proof(&self) -> Result<&Self, ProofValidationError> {
        self.validate_root()?
            .validate_siblings()?
            .validate_path_indices()?
            .validate_leaf()
    }

    /// Collects every violated rule.
    #[must_use]
    pub fn validate_all(&self) -> Vec<ProofValidationError> {
        collect_failures(
            self,
            &[
                Self::validate_root,
                Self::validate_siblings,
                Self::validate_path_indices,
                Self::validate_leaf,
            ],
        )
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidRoot`] when the root is missing or falsy.
    pub fn validate_root(&self) -> Result<&Self, ProofValidationError> {
        if is_falsy(&self.proof.root) {
            return Err(ProofValidationError::InvalidRoot);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidSiblings`] when there are no siblings.
    pub fn validate_siblings(&self) -> Result<&Self, ProofValidationError> {
        if self.proof.siblings.is_empty() {
            return Err(ProofValidationError::InvalidSiblings);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidPathIndices`] when there are no path indices.
    pub fn validate_path_indices(&self) -> Result<&Self, ProofValidationError> {
        if self.proof.path_indices.is_empty() {
            return Err(ProofValidationError::InvalidPathIndices);
        }
        Ok(self)
    }

    /// # Errors
    ///
    /// [`ProofValidationError::InvalidLeaf`] when the leaf is missing or falsy.
    pub fn validate_leaf(&self) -> Result<&Self, ProofValidationError> {
        if is_falsy(&self.proof.leaf) {
            return Err(ProofValidationError::InvalidLeaf);
        }
        Ok(self)
    }
}

/// Hosts encode "no value" as `null`, `false`, `0` or `""`.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n.abs() < f64::EPSILON),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn valid() -> MerkleProof {
        MerkleProof {
            root: json!("0x1a2b"),
            leaf: json!("42"),
            siblings: vec![json!("1"), json!("2")],
            path_indices: vec![0, 1],
        }
    }

    #[test]
    fn test_valid_proof_passes() {
        let proof = valid();
        assert!(MerkleProofValidator::new(&proof).validate_proof().is_ok());
        assert!(MerkleProofValidator::new(&proof).validate_all().is_empty());
    }

    #[test_case(json!(null) ; "null root")]
    #[test_case(json!("") ; "empty string root")]
    #[test_case(json!(0) ; "zero root")]
    #[test_case(json!(false) ; "false root")]
    fn test_falsy_root_rejected(root: Value) {
        let proof = MerkleProof { root, ..valid() };
        assert_eq!(
            MerkleProofValidator::new(&proof).validate_root().err(),
            Some(ProofValidationError::InvalidRoot)
        );
    }

    #[test]
    fn test_first_failure_wins_in_chain() {
        let proof = MerkleProof {
            siblings: vec![],
            leaf: Value::Null,
            ..valid()
        };
        assert_eq!(
            MerkleProofValidator::new(&proof).validate_proof().err(),
            Some(ProofValidationError::InvalidSiblings)
        );
    }

    #[test]
    fn test_validate_all_reports_every_failure() {
        let proof = MerkleProof::default();
        assert_eq!(
            MerkleProofValidator::new(&proof).validate_all(),
            vec![
                ProofValidationError::InvalidRoot,
                ProofValidationError::InvalidSiblings,
                ProofValidationError::InvalidPathIndices,
                ProofValidationError::InvalidLeaf,
            ]
        );
    }

    #[test]
    fn test_deserializes_camel_case() {
        let proof: MerkleProof = serde_json::from_value(json!({
            "root": "1",
            "leaf": 2,
            "siblings": ["3"],
            "pathIndices": [1]
        }))
        .expect("deserialize");
        assert_eq!(proof.path_indices, vec![1]);
        assert!(MerkleProofValidator::new(&proof).validate_proof().is_ok());
    }
}

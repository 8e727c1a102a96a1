//! Proving seam. The real circuits run out of process; [`EchoProver`] stands in for them locally.

use crate::errors::{Result, WalletError};
use ark_serialize::CanonicalSerialize;
use base64::Engine;
use tracing::debug;
use zk_ledger::hash::{domain_tag, hash};
use zk_ledger::{CircuitInputs, CircuitKind, Scalar};

/// Executed circuit: the full input map plus the public inputs it declares.
#[derive(Clone, Debug)]
pub struct Witness {
    pub kind: CircuitKind,
    pub inputs: CircuitInputs,
    pub public_inputs: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofArtifacts {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<String>,
}

impl ProofArtifacts {
    pub fn proof_b64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.proof)
    }
}

#[allow(async_fn_in_trait)]
pub trait Prover {
    async fn execute(&self, inputs: &CircuitInputs) -> Result<Witness>;
    async fn generate_proof(&self, witness: &Witness) -> Result<ProofArtifacts>;
}

/// Reflects the layout's public inputs and "proves" with a Poseidon digest of the whole map.
#[derive(Clone, Debug, Default)]
pub struct EchoProver {
    drop_public_inputs: usize,
}

impl EchoProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `n` fewer public inputs than declared, as a miscompiled circuit would.
    pub fn dropping_public_inputs(mut self, n: usize) -> Self {
        self.drop_public_inputs = n;
        self
    }
}

impl Prover for EchoProver {
    async fn execute(&self, inputs: &CircuitInputs) -> Result<Witness> {
        let public_inputs = inputs
            .public_inputs()
            .map_err(|e| WalletError::Proof(format!("{} execution failed: {e}", inputs.kind())))?;
        Ok(Witness {
            kind: inputs.kind(),
            inputs: inputs.clone(),
            public_inputs,
        })
    }

    async fn generate_proof(&self, witness: &Witness) -> Result<ProofArtifacts> {
        let elements: Vec<Scalar> = witness
            .inputs
            .iter()
            .flat_map(|(k, v)| [domain_tag(k.as_bytes()), domain_tag(v.as_bytes())])
            .collect();
        let digest = hash(&elements);

        let mut proof = Vec::new();
        digest
            .serialize_compressed(&mut proof)
            .map_err(|e| WalletError::Proof(format!("proof encoding: {e}")))?;

        let keep = witness.public_inputs.len().saturating_sub(self.drop_public_inputs);
        debug!(kind = %witness.kind, inputs = witness.inputs.len(), "generated proof");
        Ok(ProofArtifacts {
            proof,
            public_inputs: witness.public_inputs[..keep].to_vec(),
        })
    }
}

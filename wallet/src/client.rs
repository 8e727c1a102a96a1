//! Per-user shielded wallet: discovery, assembly, proving and submission in nonce order.

use crate::assembler::{assemble, AssembledOperation, Operation, OperationContext, TransferData};
use crate::config::WalletConfig;
use crate::db::AccountCache;
use crate::discovery::discover;
use crate::errors::{Result, WalletError};
use crate::ledger::{self, LedgerClient, LedgerReceipt};
use crate::models::{BalanceHistory, CachedAccount};
use crate::prover::{ProofArtifacts, Prover};
use crate::snapshot;
use crate::state::PersonalStateManager;
use ark_serialize::CanonicalSerialize;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use zk_ledger::notes::{note_stack, open_note, plan_absorb, seal_note, DecryptedNote};
use zk_ledger::{Address, Amount, CurvePoint, PersonalCommitmentState, UserKeys};

/// An assembled and proved operation, not yet submitted.
#[derive(Clone, Debug)]
pub struct PreparedOperation {
    pub operation: Operation,
    pub assembled: AssembledOperation,
    pub artifacts: ProofArtifacts,
}

pub struct ShieldedClient<L, P, C> {
    ledger: Arc<L>,
    prover: P,
    cache: C,
    config: WalletConfig,
    keys: UserKeys,
    states: PersonalStateManager,
    nonce: u64,
}

fn user_key_hash_hex(keys: &UserKeys) -> Result<String> {
    let mut bytes = Vec::new();
    keys.user_key_hash
        .serialize_compressed(&mut bytes)
        .map_err(|e| WalletError::Cache(format!("user key hash encoding: {e}")))?;
    Ok(hex::encode(bytes))
}

impl<L: LedgerClient, P: Prover, C: AccountCache> ShieldedClient<L, P, C> {
    /// Derive keys from `signature` and sync with the ledger.
    pub async fn open(ledger: Arc<L>, prover: P, cache: C, config: WalletConfig, signature: &[u8]) -> Result<Self> {
        let keys = UserKeys::from_signature(signature)?;
        let states = PersonalStateManager::new(keys.clone(), BalanceHistory::default());
        let mut client = Self {
            ledger,
            prover,
            cache,
            config,
            keys,
            states,
            nonce: 0,
        };
        client.refresh().await?;
        Ok(client)
    }

    pub fn keys(&self) -> &UserKeys {
        &self.keys
    }

    pub fn zk_address(&self) -> String {
        self.keys.zk_address()
    }

    pub fn public_key(&self) -> CurvePoint {
        self.keys.public_key
    }

    /// Next unused nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn history(&self) -> &BalanceHistory {
        self.states.history()
    }

    pub fn balance(&self, token: &Address) -> Amount {
        self.states.balance_at(u64::MAX, token).0
    }

    pub fn nullifier(&self, token: &Address) -> Amount {
        self.states.balance_at(u64::MAX, token).1
    }

    /// Personal commitment state of `token` after the operation at `nonce`.
    pub fn personal_state(&mut self, nonce: u64, token: Address) -> PersonalCommitmentState {
        self.states.get(nonce, token)
    }

    /// Re-discover the account position, resuming from the cache when it belongs to these keys.
    pub async fn refresh(&mut self) -> Result<u64> {
        let zk_address = self.keys.zk_address();
        let ukh = user_key_hash_hex(&self.keys)?;

        let resume = match self.cache.load(&zk_address).await? {
            Some(cached) if cached.user_key_hash == ukh => self.validate_resume(cached).await?,
            Some(_) => {
                warn!(%zk_address, "cached account belongs to different keys, rescanning");
                None
            }
            None => None,
        };

        let found = discover(self.ledger.as_ref(), &self.keys, resume, self.config.discovery_cap).await?;
        self.nonce = found.current_nonce;
        self.states.reset(found.history);
        self.persist().await?;

        info!(%zk_address, nonce = self.nonce, probes = found.probes, "account synced");
        Ok(self.nonce)
    }

    /// A cached position is only trusted if the ledger still holds its last reference.
    async fn validate_resume(&self, cached: CachedAccount) -> Result<Option<(u64, BalanceHistory)>> {
        let Some(last) = cached.current_nonce.checked_sub(1) else {
            return Ok(None);
        };
        let present = self
            .ledger
            .get_personal_c_tot_reference(&self.keys.nonce_commitment(last))
            .await?
            .is_some_and(|r| !r.is_unused_sentinel());
        if present {
            Ok(Some((cached.current_nonce, cached.balance_entries)))
        } else {
            warn!(nonce = last, "cached nonce is not on the ledger, rescanning");
            Ok(None)
        }
    }

    async fn persist(&self) -> Result<()> {
        let account = CachedAccount {
            zk_address: self.keys.zk_address(),
            current_nonce: self.nonce,
            balance_entries: self.states.history().clone(),
            user_key_hash: user_key_hash_hex(&self.keys)?,
            last_updated: Utc::now(),
        };
        self.cache.store(&account).await
    }

    /// Every note received so far, decrypted.
    pub async fn received_notes(&self) -> Result<Vec<DecryptedNote>> {
        let encrypted = self.ledger.get_user_encrypted_notes(&self.keys.public_key).await?;
        encrypted
            .iter()
            .map(|n| open_note(&self.keys, n).map_err(WalletError::from))
            .collect()
    }

    async fn send_data(&self, receiver: &CurvePoint, amount: Amount, token: Address) -> Result<TransferData> {
        let note = seal_note(&self.keys, receiver, amount, token)?;
        let receiver_stack = self.ledger.get_user_note_commitment_stack(receiver).await?;
        let receiver_note_count = self.ledger.get_user_encrypted_notes(receiver).await?.len() as u64;
        Ok(TransferData::Send {
            note,
            receiver_stack,
            receiver_note_count,
        })
    }

    async fn absorb_data(&self, token: Address, nullifier: Amount) -> Result<TransferData> {
        let notes = self.received_notes().await?;
        let own_stack = self.ledger.get_user_note_commitment_stack(&self.keys.public_key).await?;
        if note_stack(notes.iter().map(|n| &n.commitment)) != own_stack {
            return Err(WalletError::Consistency(
                "decrypted notes do not sum to the ledger note stack".into(),
            ));
        }
        let plan = plan_absorb(&notes, token, nullifier)?;
        Ok(TransferData::Absorb {
            plan,
            own_stack,
            note_count: notes.len() as u64,
        })
    }

    /// Assemble and prove `op` against the current snapshot.
    pub async fn prepare(&mut self, op: Operation) -> Result<PreparedOperation> {
        let nonce = self.nonce;
        let token = op.token();

        let snapshot = snapshot::read(self.ledger.as_ref()).await?;
        let previous_opening =
            snapshot::resolve_previous_opening(self.ledger.as_ref(), &self.keys, &mut self.states, nonce).await?;

        let (previous, previous_nullifier) = match nonce.checked_sub(1) {
            Some(prev) => (Some(self.states.get(prev, token)), self.states.balance_at(prev, &token).1),
            None => (None, 0),
        };

        let transfer = match op {
            Operation::Send { token, amount, receiver } => Some(self.send_data(&receiver, amount, token).await?),
            Operation::Absorb { token } => Some(self.absorb_data(token, previous_nullifier).await?),
            _ => None,
        };

        let mut ctx = OperationContext::new(&self.keys, nonce, snapshot)
            .previous_nullifier(previous_nullifier)
            .previous_opening(previous_opening);
        if let Some(state) = previous {
            ctx = ctx.previous_state(state);
        }
        let assembled = assemble(&op, &ctx, transfer.as_ref())?;

        let witness = self.prover.execute(&assembled.inputs).await?;
        let artifacts = self.prover.generate_proof(&witness).await?;
        info!(kind = %op.kind(), nonce, proof = %artifacts.proof_b64(), "operation proved");

        Ok(PreparedOperation {
            operation: op,
            assembled,
            artifacts,
        })
    }

    /// Submit a prepared operation.
    ///
    /// A proof bound to a snapshot the ledger has since moved past is discarded here and never
    /// reaches the ledger; prepare it again.
    pub async fn submit(&mut self, prepared: PreparedOperation) -> Result<LedgerReceipt> {
        let kind = prepared.assembled.kind;
        let entry = prepared.assembled.next_entry;
        if entry.nonce != self.nonce {
            return Err(WalletError::State(format!(
                "operation was prepared for nonce {}, account is at {}",
                entry.nonce, self.nonce
            )));
        }

        let public_inputs = &prepared.artifacts.public_inputs;
        let expected = kind.expected_public_inputs();
        if public_inputs.len() != expected {
            return Err(WalletError::PublicInputCount {
                kind,
                expected,
                got: public_inputs.len(),
            });
        }
        if *public_inputs != prepared.assembled.public_inputs {
            return Err(WalletError::Proof(format!(
                "{kind} proof public inputs differ from the assembled layout"
            )));
        }

        let current = snapshot::read(self.ledger.as_ref()).await?;
        if current != prepared.assembled.snapshot {
            warn!(%kind, nonce = entry.nonce, "accumulator moved since the proof was generated");
            return Err(WalletError::State(format!(
                "{kind} proof is bound to a superseded accumulator snapshot, prepare it again"
            )));
        }

        let receipt = ledger::submit(
            self.ledger.as_ref(),
            &prepared.operation,
            &prepared.artifacts.proof,
            public_inputs,
        )
        .await?;

        self.states.record(entry);
        self.states.put(entry.nonce, entry.token, prepared.assembled.next_state);
        self.nonce += 1;
        // The ledger has committed; a cache failure must not report the operation as failed.
        if let Err(e) = self.persist().await {
            warn!(nonce = entry.nonce, error = %e, "operation committed but the account cache was not updated");
        }

        info!(%kind, nonce = entry.nonce, token = %entry.token, sequence = receipt.sequence, "operation committed");
        Ok(receipt)
    }

    pub async fn execute(&mut self, op: Operation) -> Result<LedgerReceipt> {
        let prepared = self.prepare(op).await?;
        self.submit(prepared).await
    }

    /// Open the account with `amount` of `token` paid from the public `account`.
    pub async fn entry(&mut self, token: Address, amount: Amount, account: Address) -> Result<LedgerReceipt> {
        self.execute(Operation::Entry { token, amount, account }).await
    }

    pub async fn deposit(&mut self, token: Address, amount: Amount, account: Address) -> Result<LedgerReceipt> {
        self.execute(Operation::Deposit { token, amount, account }).await
    }

    pub async fn withdraw(&mut self, token: Address, amount: Amount, account: Address) -> Result<LedgerReceipt> {
        self.execute(Operation::Withdraw { token, amount, account }).await
    }

    pub async fn send(&mut self, token: Address, amount: Amount, receiver: CurvePoint) -> Result<LedgerReceipt> {
        self.execute(Operation::Send { token, amount, receiver }).await
    }

    pub async fn absorb(&mut self, token: Address) -> Result<LedgerReceipt> {
        self.execute(Operation::Absorb { token }).await
    }
}

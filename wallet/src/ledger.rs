//! Ledger seam and an in-process ledger.
//!
//! [`InMemoryLedger`] enforces what the on-chain verifier can see: public-input counts,
//! nonce-commitment freshness and linkage, snapshot binding, note-stack continuity and
//! public token balances. Proof validity itself belongs to the verifier and is not checked.
//!
//! Entry funds come from the submitting account, which is the transaction sender on chain
//! and not part of the entry circuit's public inputs.

use crate::assembler::Operation;
use crate::errors::{Result, WalletError};
use base64::Engine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use zk_ledger::layout::{TRANSFER_KIND_ABSORB, TRANSFER_KIND_SEND};
use zk_ledger::{Address, Amount, CircuitKind, Commitment, CurvePoint, EncryptedNote, MainAccumulatorState, Opening, PublicInputs, Scalar};

use ark_ff::Zero;

/// Encrypted openings stored under a nonce commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersonalReference {
    pub enc_m: Scalar,
    pub enc_r: Scalar,
    pub enc_nullifier: Scalar,
}

impl PersonalReference {
    pub fn zero() -> Self {
        Self {
            enc_m: Scalar::zero(),
            enc_r: Scalar::zero(),
            enc_nullifier: Scalar::zero(),
        }
    }

    /// An all-zero pair reads as "never written".
    pub fn is_unused_sentinel(&self) -> bool {
        self.enc_m.is_zero() && self.enc_r.is_zero()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub kind: CircuitKind,
    /// Position of the submission in the ledger's total order.
    pub sequence: u64,
    pub accumulator: Commitment,
}

/// Reads and writes against the public ledger.
#[allow(async_fn_in_trait)]
pub trait LedgerClient {
    async fn get_state_commitment(&self) -> Result<Commitment>;
    async fn get_state_commitment_opening_values(&self) -> Result<Opening>;
    async fn get_personal_c_tot_reference(&self, nonce_commitment: &Scalar) -> Result<Option<PersonalReference>>;
    async fn get_user_encrypted_notes(&self, owner: &CurvePoint) -> Result<Vec<EncryptedNote>>;
    async fn get_user_note_commitment_stack(&self, owner: &CurvePoint) -> Result<Commitment>;

    /// `payer` is the public account the entry amount is taken from.
    async fn init_commit(&self, payer: &Address, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt>;
    async fn deposit(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt>;
    async fn withdraw(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt>;
    async fn send(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt>;
    async fn absorb(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt>;
}

/// Route a submission to the entry point for its circuit.
pub async fn submit<L: LedgerClient>(ledger: &L, op: &Operation, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
    match op {
        Operation::Entry { account, .. } => ledger.init_commit(account, proof, public_inputs).await,
        Operation::Deposit { .. } => ledger.deposit(proof, public_inputs).await,
        Operation::Withdraw { .. } => ledger.withdraw(proof, public_inputs).await,
        Operation::Send { .. } => ledger.send(proof, public_inputs).await,
        Operation::Absorb { .. } => ledger.absorb(proof, public_inputs).await,
    }
}

struct LedgerState {
    accumulator: MainAccumulatorState,
    references: HashMap<Scalar, PersonalReference>,
    notes: HashMap<CurvePoint, Vec<EncryptedNote>>,
    stacks: HashMap<CurvePoint, Commitment>,
    /// Public token balances, keyed by (account, token).
    public_balances: HashMap<(Address, Address), Amount>,
    /// Amount of each token held by the shielded pool.
    pool: HashMap<Address, Amount>,
    sequence: u64,
}

pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    probes: AtomicU64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn revert(kind: CircuitKind, reason: impl std::fmt::Display) -> WalletError {
    WalletError::Chain(format!("{kind} reverted: {reason}"))
}

/// A slot holding the all-zero sentinel counts as free, matching discovery.
fn used(st: &LedgerState, nonce_commitment: &Scalar) -> bool {
    st.references
        .get(nonce_commitment)
        .is_some_and(|r| !r.is_unused_sentinel())
}

/// Mutations a validated submission will perform.
struct Effects {
    nonce_commitment: Scalar,
    reference: PersonalReference,
    delta: Opening,
    pool: Option<(Address, Amount, bool)>,
    public_balance: Option<((Address, Address), Amount)>,
    note: Option<(CurvePoint, EncryptedNote, Commitment)>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                accumulator: MainAccumulatorState::genesis(),
                references: HashMap::new(),
                notes: HashMap::new(),
                stacks: HashMap::new(),
                public_balances: HashMap::new(),
                pool: HashMap::new(),
                sequence: 0,
            }),
            probes: AtomicU64::new(0),
        }
    }

    /// Credit a public account, standing in for an ERC-20 balance.
    pub async fn fund(&self, account: Address, token: Address, amount: Amount) {
        let mut st = self.state.write().await;
        let bal = st.public_balances.entry((account, token)).or_insert(0);
        *bal = bal.saturating_add(amount);
    }

    pub async fn public_balance(&self, account: Address, token: Address) -> Amount {
        let st = self.state.read().await;
        st.public_balances.get(&(account, token)).copied().unwrap_or(0)
    }

    pub async fn pool_balance(&self, token: Address) -> Amount {
        let st = self.state.read().await;
        st.pool.get(&token).copied().unwrap_or(0)
    }

    pub async fn accumulator(&self) -> MainAccumulatorState {
        self.state.read().await.accumulator
    }

    /// Number of submissions accepted so far.
    pub async fn sequence(&self) -> u64 {
        self.state.read().await.sequence
    }

    /// Reference reads served so far.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn reset_probes(&self) {
        self.probes.store(0, Ordering::Relaxed);
    }

    /// Store the all-zero reference at `nonce_commitment`.
    pub async fn write_sentinel(&self, nonce_commitment: Scalar) {
        self.state
            .write()
            .await
            .references
            .insert(nonce_commitment, PersonalReference::zero());
    }

    /// Rewrite a stored reference in place. Returns false when nothing is stored there.
    pub async fn tamper_reference(&self, nonce_commitment: &Scalar, f: impl FnOnce(&mut PersonalReference)) -> bool {
        let mut st = self.state.write().await;
        match st.references.get_mut(nonce_commitment) {
            Some(r) => {
                f(r);
                true
            }
            None => false,
        }
    }

    fn validate(
        st: &LedgerState,
        kind: CircuitKind,
        payer: Option<&Address>,
        proof: &[u8],
        public_inputs: &[String],
    ) -> Result<Effects> {
        if proof.is_empty() {
            return Err(revert(kind, "empty proof"));
        }
        let public = PublicInputs::new(kind, public_inputs.to_vec()).map_err(|e| revert(kind, e))?;
        let read = |e: zk_ledger::ProtocolError| revert(kind, e);

        let nonce_commitment = public.scalar("nonce_commitment").map_err(read)?;
        if used(st, &nonce_commitment) {
            return Err(revert(kind, "nonce commitment already used"));
        }

        if kind != CircuitKind::Entry {
            let prev = public.scalar("prev_nonce_commitment").map_err(read)?;
            if !used(st, &prev) {
                return Err(revert(kind, "previous nonce commitment is unknown"));
            }
            let tot = public.point("main_c_tot").map_err(read)?;
            let opening = Opening::new(
                public.scalar("main_m").map_err(read)?,
                public.scalar("main_r").map_err(read)?,
                public.scalar("main_d").map_err(read)?,
            );
            if tot != st.accumulator.tot || opening != st.accumulator.opening {
                return Err(revert(kind, "stale accumulator snapshot"));
            }
        }

        let mut effects = Effects {
            nonce_commitment,
            reference: PersonalReference {
                enc_m: public.scalar("enc_m").map_err(read)?,
                enc_r: public.scalar("enc_r").map_err(read)?,
                enc_nullifier: public.scalar("enc_nullifier").map_err(read)?,
            },
            delta: Opening::new(
                public.scalar("delta_m").map_err(read)?,
                public.scalar("delta_r").map_err(read)?,
                public.scalar("delta_d").map_err(read)?,
            ),
            pool: None,
            public_balance: None,
            note: None,
        };

        match kind {
            CircuitKind::Entry => {
                let token = Address::from_scalar(&public.scalar("token").map_err(read)?).map_err(read)?;
                let amount = public.u128("amount").map_err(read)?;
                let payer = *payer.ok_or_else(|| revert(kind, "no paying account"))?;
                let key = (payer, token);
                let public_bal = st.public_balances.get(&key).copied().unwrap_or(0);
                let left = public_bal
                    .checked_sub(amount)
                    .ok_or_else(|| revert(kind, format!("{payer} holds {public_bal} of {token}, needs {amount}")))?;
                effects.public_balance = Some((key, left));
                effects.pool = Some((token, amount, true));
            }
            CircuitKind::Deposit | CircuitKind::Withdraw => {
                let token = Address::from_scalar(&public.scalar("token").map_err(read)?).map_err(read)?;
                let account = Address::from_scalar(&public.scalar("account").map_err(read)?).map_err(read)?;
                let amount = public.u128("amount").map_err(read)?;
                let key = (account, token);
                let public_bal = st.public_balances.get(&key).copied().unwrap_or(0);
                let pooled = st.pool.get(&token).copied().unwrap_or(0);
                if kind == CircuitKind::Deposit {
                    let left = public_bal
                        .checked_sub(amount)
                        .ok_or_else(|| revert(kind, format!("{account} holds {public_bal} of {token}, needs {amount}")))?;
                    effects.public_balance = Some((key, left));
                    effects.pool = Some((token, amount, true));
                } else {
                    if pooled < amount {
                        return Err(revert(kind, format!("pool holds {pooled} of {token}, needs {amount}")));
                    }
                    effects.public_balance = Some((key, public_bal.saturating_add(amount)));
                    effects.pool = Some((token, amount, false));
                }
            }
            CircuitKind::Send | CircuitKind::Absorb => {
                let owner = public.point("owner_pk").map_err(read)?;
                let peer = public.point("peer_pk").map_err(read)?;
                let peer_stack = public.point("peer_stack").map_err(read)?;
                let new_stack = public.point("new_peer_stack").map_err(read)?;
                let note_count = public.u64("peer_note_count").map_err(read)?;
                let transfer_kind = public.u64("transfer_kind").map_err(read)?;

                let stored_stack = st.stacks.get(&peer).copied().unwrap_or_else(CurvePoint::identity);
                let stored_count = st.notes.get(&peer).map_or(0, |n| n.len() as u64);
                if peer_stack != stored_stack || note_count != stored_count {
                    return Err(revert(kind, "note commitment stack moved"));
                }

                if kind == CircuitKind::Send {
                    if transfer_kind != TRANSFER_KIND_SEND {
                        return Err(revert(kind, format!("transfer kind {transfer_kind}")));
                    }
                    if peer.is_identity() {
                        return Err(revert(kind, "receiver is the identity"));
                    }
                    let commitment = public.point("note_commitment").map_err(read)?;
                    if new_stack != stored_stack + commitment {
                        return Err(revert(kind, "new stack is not old stack plus note commitment"));
                    }
                    let note = EncryptedNote {
                        sender_public_key: owner,
                        encrypted_amount: public.scalar("note_enc_amount").map_err(read)?,
                        encrypted_token_address: public.scalar("note_enc_token").map_err(read)?,
                    };
                    effects.note = Some((peer, note, new_stack));
                } else {
                    if transfer_kind != TRANSFER_KIND_ABSORB {
                        return Err(revert(kind, format!("transfer kind {transfer_kind}")));
                    }
                    if peer != owner {
                        return Err(revert(kind, "absorb must target the owner's own stack"));
                    }
                    if new_stack != stored_stack {
                        return Err(revert(kind, "absorb cannot change the note stack"));
                    }
                }
            }
        }
        Ok(effects)
    }

    async fn apply(
        &self,
        kind: CircuitKind,
        payer: Option<&Address>,
        proof: &[u8],
        public_inputs: &[String],
    ) -> Result<LedgerReceipt> {
        let mut st = self.state.write().await;
        let effects = Self::validate(&st, kind, payer, proof, public_inputs)?;

        st.accumulator = st.accumulator.apply(&effects.delta);
        st.references.insert(effects.nonce_commitment, effects.reference);
        if let Some((token, amount, credit)) = effects.pool {
            let pooled = st.pool.entry(token).or_insert(0);
            *pooled = if credit {
                pooled.saturating_add(amount)
            } else {
                pooled.saturating_sub(amount)
            };
        }
        if let Some((key, balance)) = effects.public_balance {
            st.public_balances.insert(key, balance);
        }
        if let Some((receiver, note, stack)) = effects.note {
            st.notes.entry(receiver).or_default().push(note);
            st.stacks.insert(receiver, stack);
        }
        st.sequence += 1;

        let proof_b64 = base64::engine::general_purpose::STANDARD.encode(proof);
        info!(%kind, sequence = st.sequence, proof = %proof_b64, "ledger accepted submission");

        Ok(LedgerReceipt {
            kind,
            sequence: st.sequence,
            accumulator: st.accumulator.tot,
        })
    }
}

impl LedgerClient for InMemoryLedger {
    async fn get_state_commitment(&self) -> Result<Commitment> {
        Ok(self.state.read().await.accumulator.tot)
    }

    async fn get_state_commitment_opening_values(&self) -> Result<Opening> {
        Ok(self.state.read().await.accumulator.opening)
    }

    async fn get_personal_c_tot_reference(&self, nonce_commitment: &Scalar) -> Result<Option<PersonalReference>> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self.state.read().await.references.get(nonce_commitment).copied())
    }

    async fn get_user_encrypted_notes(&self, owner: &CurvePoint) -> Result<Vec<EncryptedNote>> {
        Ok(self.state.read().await.notes.get(owner).cloned().unwrap_or_default())
    }

    async fn get_user_note_commitment_stack(&self, owner: &CurvePoint) -> Result<Commitment> {
        let st = self.state.read().await;
        let stack = st.stacks.get(owner).copied().unwrap_or_else(CurvePoint::identity);
        debug!(owner = %owner.to_hex(), notes = st.notes.get(owner).map_or(0, Vec::len), "note stack read");
        Ok(stack)
    }

    async fn init_commit(&self, payer: &Address, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
        self.apply(CircuitKind::Entry, Some(payer), proof, public_inputs).await
    }

    async fn deposit(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
        self.apply(CircuitKind::Deposit, None, proof, public_inputs).await
    }

    async fn withdraw(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
        self.apply(CircuitKind::Withdraw, None, proof, public_inputs).await
    }

    async fn send(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
        self.apply(CircuitKind::Send, None, proof, public_inputs).await
    }

    async fn absorb(&self, proof: &[u8], public_inputs: &[String]) -> Result<LedgerReceipt> {
        self.apply(CircuitKind::Absorb, None, proof, public_inputs).await
    }
}

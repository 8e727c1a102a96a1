//! Circuit input assembly.
//!
//! Every operation shares one [`OperationContext`]: keys, nonce, the personal state being
//! replaced, the accumulator snapshot and the caller's previous contribution. The
//! [`Operation`] variant adds only what differs. Every commitment emitted is checked
//! against its opening before the map leaves this module.

use crate::errors::{Result, WalletError};
use crate::models::BalanceEntry;
use zk_ledger::accumulator::{derive_outer, transition, AccumulatorPartition, AccumulatorTransition};
use zk_ledger::cipher::encrypt;
use zk_ledger::constants::{COUNTER_AMOUNT, COUNTER_NULLIFIER, COUNTER_TOKEN};
use zk_ledger::hash::hash;
use zk_ledger::layout::{TRANSFER_KIND_ABSORB, TRANSFER_KIND_SEND};
use zk_ledger::notes::{note_commitment, AbsorbPlan, OutgoingNote};
use zk_ledger::types::amount_to_scalar;
use zk_ledger::{
    Address, Amount, CircuitInputs, CircuitKind, Commitment, CurvePoint, MainAccumulatorState, Opening,
    PersonalCommitmentState, UserKeys,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// First operation of an account; moves `amount` of `token` from the public `account`.
    Entry { token: Address, amount: Amount, account: Address },
    /// Move `amount` from the public `account` into the shielded balance.
    Deposit { token: Address, amount: Amount, account: Address },
    /// Release `amount` from the shielded balance to the public `account`.
    Withdraw { token: Address, amount: Amount, account: Address },
    Send { token: Address, amount: Amount, receiver: CurvePoint },
    /// Merge every unabsorbed received note for `token`.
    Absorb { token: Address },
}

impl Operation {
    pub fn kind(&self) -> CircuitKind {
        match self {
            Operation::Entry { .. } => CircuitKind::Entry,
            Operation::Deposit { .. } => CircuitKind::Deposit,
            Operation::Withdraw { .. } => CircuitKind::Withdraw,
            Operation::Send { .. } => CircuitKind::Send,
            Operation::Absorb { .. } => CircuitKind::Absorb,
        }
    }

    pub fn token(&self) -> Address {
        match self {
            Operation::Entry { token, .. }
            | Operation::Deposit { token, .. }
            | Operation::Withdraw { token, .. }
            | Operation::Send { token, .. }
            | Operation::Absorb { token } => *token,
        }
    }
}

/// Ledger-side transfer data gathered before assembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferData {
    Send {
        note: OutgoingNote,
        receiver_stack: Commitment,
        receiver_note_count: u64,
    },
    Absorb {
        plan: AbsorbPlan,
        own_stack: Commitment,
        note_count: u64,
    },
}

pub struct OperationContext<'a> {
    keys: &'a UserKeys,
    nonce: u64,
    snapshot: MainAccumulatorState,
    previous: Option<PersonalCommitmentState>,
    previous_nullifier: Amount,
    previous_opening: Option<Opening>,
}

impl<'a> OperationContext<'a> {
    pub fn new(keys: &'a UserKeys, nonce: u64, snapshot: MainAccumulatorState) -> Self {
        Self {
            keys,
            nonce,
            snapshot,
            previous: None,
            previous_nullifier: 0,
            previous_opening: None,
        }
    }

    /// Personal state of the operation's token before this nonce. Defaults to the new-token state.
    pub fn previous_state(mut self, state: PersonalCommitmentState) -> Self {
        self.previous = Some(state);
        self
    }

    pub fn previous_nullifier(mut self, nullifier: Amount) -> Self {
        self.previous_nullifier = nullifier;
        self
    }

    /// Contribution committed at `nonce - 1`, as resolved against the ledger.
    pub fn previous_opening(mut self, opening: Option<Opening>) -> Self {
        self.previous_opening = opening;
        self
    }
}

#[derive(Clone, Debug)]
pub struct AssembledOperation {
    pub kind: CircuitKind,
    pub inputs: CircuitInputs,
    pub public_inputs: Vec<String>,
    /// Accumulator snapshot the inputs are bound to.
    pub snapshot: MainAccumulatorState,
    /// History entry to record once the ledger accepts the submission.
    pub next_entry: BalanceEntry,
    pub next_state: PersonalCommitmentState,
    pub transition: AccumulatorTransition,
}

fn positive(amount: Amount, kind: CircuitKind) -> Result<Amount> {
    if amount == 0 {
        return Err(WalletError::Input(format!("{kind} amount must be positive")));
    }
    Ok(amount)
}

fn debit(previous: &PersonalCommitmentState, amount: Amount) -> Result<Amount> {
    previous.amount.checked_sub(amount).ok_or_else(|| {
        WalletError::State(format!(
            "insufficient shielded balance of {}: have {}, need {amount}",
            previous.token, previous.amount
        ))
    })
}

fn credit(previous: &PersonalCommitmentState, amount: Amount) -> Result<Amount> {
    previous
        .amount
        .checked_add(amount)
        .ok_or_else(|| WalletError::Input(format!("balance of {} overflows 128 bits", previous.token)))
}

/// Resulting (amount, nullifier) for the operation's token.
fn next_balance(
    op: &Operation,
    previous: &PersonalCommitmentState,
    previous_nullifier: Amount,
    transfer: Option<&TransferData>,
) -> Result<(Amount, Amount)> {
    let kind = op.kind();
    match (op, transfer) {
        (Operation::Entry { amount, .. }, _) => Ok((credit(previous, *amount)?, previous_nullifier)),
        (Operation::Deposit { amount, .. }, _) => Ok((credit(previous, positive(*amount, kind)?)?, previous_nullifier)),
        (Operation::Withdraw { amount, .. }, _) | (Operation::Send { amount, .. }, Some(TransferData::Send { .. })) => {
            Ok((debit(previous, positive(*amount, kind)?)?, previous_nullifier))
        }
        (Operation::Absorb { token }, Some(TransferData::Absorb { plan, .. })) => {
            if plan.token != *token {
                return Err(WalletError::Input(format!("absorb plan is for {}, not {token}", plan.token)));
            }
            if plan.nullifier != previous_nullifier {
                return Err(WalletError::Consistency(format!(
                    "absorb plan nullifier {} differs from recorded nullifier {previous_nullifier}",
                    plan.nullifier
                )));
            }
            Ok((credit(previous, plan.delta)?, plan.total))
        }
        _ => Err(WalletError::Input(format!("{kind} needs matching transfer data"))),
    }
}

fn push_personal(inputs: &mut CircuitInputs, prefix: &str, s: &PersonalCommitmentState) {
    inputs
        .push_point(&format!("{prefix}_c_tot"), &s.tot)
        .push_point(&format!("{prefix}_c_inner"), &s.inner)
        .push_point(&format!("{prefix}_c_outer"), &s.outer)
        .push_point(
            &format!("{prefix}_c_initializer"),
            &s.initializer.unwrap_or_else(CurvePoint::identity),
        )
        .push_field(format!("{prefix}_c_inner_m"), &s.inner_m)
        .push_field(format!("{prefix}_c_inner_r"), &s.inner_r)
        .push_field(format!("{prefix}_c_outer_m"), &s.outer_m)
        .push_field(format!("{prefix}_c_outer_r"), &s.outer_r);
}

fn push_opening(inputs: &mut CircuitInputs, prefix: &str, o: &Opening) {
    inputs
        .push_field(format!("{prefix}_m"), &o.m)
        .push_field(format!("{prefix}_r"), &o.r)
        .push_field(format!("{prefix}_d"), &o.d);
}

fn push_partition(inputs: &mut CircuitInputs, p: &AccumulatorPartition) {
    inputs.push_point("main_c_tot", &p.snapshot.tot);
    push_opening(inputs, "main", &p.snapshot.opening);
    inputs.push_point("main_c_inner", &p.inner);
    push_opening(inputs, "main_c_inner", &p.inner_opening);
    inputs.push_point("main_c_outer", &p.outer);
    push_opening(inputs, "main_c_outer", &p.outer_opening);
}

/// Build the circuit inputs for `op` on top of `ctx`.
pub fn assemble(op: &Operation, ctx: &OperationContext<'_>, transfer: Option<&TransferData>) -> Result<AssembledOperation> {
    let kind = op.kind();
    let token = op.token();
    let keys = ctx.keys;
    let nonce = ctx.nonce;

    match (kind, nonce) {
        (CircuitKind::Entry, n) if n != 0 => {
            return Err(WalletError::State(format!("account already initialized, next nonce is {n}")));
        }
        (k, 0) if k != CircuitKind::Entry => {
            return Err(WalletError::State(format!("{k} needs an initialized account")));
        }
        _ => {}
    }

    let previous = ctx
        .previous
        .clone()
        .unwrap_or_else(|| PersonalCommitmentState::reconstruct(0, token, keys, true));
    if previous.token != token {
        return Err(WalletError::Input(format!(
            "previous state is for {}, operation is for {token}",
            previous.token
        )));
    }
    previous.verify(keys)?;

    let (next_amount, next_nullifier) = next_balance(op, &previous, ctx.previous_nullifier, transfer)?;
    let next = PersonalCommitmentState::reconstruct(next_amount, token, keys, false);
    next.verify(keys)?;

    let nc = keys.nonce_commitment(nonce);
    let contribution = next.contribution_opening(nc);
    // Entry has no previous contribution, so its split takes the seed as the outer half.
    let partition = match kind {
        CircuitKind::Entry => derive_outer(&ctx.snapshot, 0, None)?,
        _ => derive_outer(&ctx.snapshot, nonce, ctx.previous_opening.as_ref())?,
    };
    let step = transition(&ctx.snapshot, ctx.previous_opening.as_ref(), &contribution);
    if !step.next.is_consistent() {
        return Err(WalletError::Consistency("accumulator snapshot does not match its opening".into()));
    }

    let ek = keys.encryption_key(nonce);
    let mut inputs = CircuitInputs::new(kind);
    inputs
        .push_field("user_key", &keys.user_key)
        .push_field("user_key_hash", &keys.user_key_hash)
        .push_field("view_key", &keys.view_key)
        .push_field("encryption_key", &ek)
        .push_u64("nonce", nonce)
        .push_field("token", &token.to_scalar())
        .push_u128("prev_amount", previous.amount)
        .push_u128("new_amount", next_amount)
        .push_u128("prev_nullifier", ctx.previous_nullifier)
        .push_u128("nullifier", next_nullifier)
        .push_bool("first_use", previous.first_use);
    push_personal(&mut inputs, "personal", &previous);
    push_personal(&mut inputs, "new_personal", &next);

    inputs.push_field("nonce_commitment", &nc);
    if let Some(prev) = nonce.checked_sub(1) {
        inputs.push_field("prev_nonce_commitment", &keys.nonce_commitment(prev));
    }
    inputs
        .push_field("enc_m", &encrypt(&amount_to_scalar(next_amount), &ek, COUNTER_AMOUNT))
        .push_field("enc_r", &encrypt(&token.to_scalar(), &ek, COUNTER_TOKEN))
        .push_field("enc_nullifier", &encrypt(&amount_to_scalar(next_nullifier), &ek, COUNTER_NULLIFIER));
    push_opening(&mut inputs, "delta", &step.delta);
    push_opening(&mut inputs, "contribution", &contribution);
    push_partition(&mut inputs, &partition);

    let nullifier_commitment = hash(&[amount_to_scalar(next_nullifier), keys.user_key_hash]);
    match (op, transfer) {
        (Operation::Entry { amount, account, .. }, _)
        | (Operation::Deposit { amount, account, .. }, _)
        | (Operation::Withdraw { amount, account, .. }, _) => {
            inputs.push_u128("amount", *amount).push_field("account", &account.to_scalar());
        }
        (
            Operation::Send { amount, receiver, .. },
            Some(TransferData::Send {
                note,
                receiver_stack,
                receiver_note_count,
            }),
        ) => {
            if note.receiver_public_key != *receiver || note.amount != *amount || note.token != token {
                return Err(WalletError::Input("note does not match the send operation".into()));
            }
            if note.commitment != note_commitment(note.amount, note.token, &note.shared_key) {
                return Err(WalletError::Consistency("note commitment does not match its opening".into()));
            }
            let new_stack = *receiver_stack + note.commitment;
            inputs
                .push_u128("amount", *amount)
                .push_field("shared_key", &note.shared_key)
                .push_point("owner_pk", &keys.public_key)
                .push_point("peer_pk", receiver)
                .push_point("peer_stack", receiver_stack)
                .push_u64("peer_note_count", *receiver_note_count)
                .push_field("note_enc_amount", &note.note.encrypted_amount)
                .push_field("note_enc_token", &note.note.encrypted_token_address)
                .push_point("note_commitment", &note.commitment)
                .push_point("new_peer_stack", &new_stack)
                .push_u64("transfer_kind", TRANSFER_KIND_SEND)
                .push_field("nullifier_commitment", &nullifier_commitment);
        }
        (Operation::Absorb { .. }, Some(TransferData::Absorb { plan, own_stack, note_count })) => {
            inputs
                .push_u128("absorb_total", plan.total)
                .push_u128("absorb_delta", plan.delta)
                .push_point("owner_pk", &keys.public_key)
                .push_point("peer_pk", &keys.public_key)
                .push_point("peer_stack", own_stack)
                .push_u64("peer_note_count", *note_count)
                .push_u64("note_enc_amount", 0)
                .push_u64("note_enc_token", 0)
                .push_point("note_commitment", &CurvePoint::identity())
                .push_point("new_peer_stack", own_stack)
                .push_u64("transfer_kind", TRANSFER_KIND_ABSORB)
                .push_field("nullifier_commitment", &nullifier_commitment);
        }
        _ => return Err(WalletError::Input(format!("{kind} needs matching transfer data"))),
    }

    let public_inputs = inputs.public_inputs()?;
    Ok(AssembledOperation {
        kind,
        inputs,
        public_inputs,
        snapshot: ctx.snapshot,
        next_entry: BalanceEntry {
            nonce,
            token,
            amount: next_amount,
            nullifier: next_nullifier,
        },
        next_state: next,
        transition: step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zk_ledger::cipher::decrypt;
    use zk_ledger::notes::{open_note, plan_absorb, seal_note};
    use zk_ledger::types::to_decimal;
    use zk_ledger::{PublicInputs, Scalar};

    const TOKEN: Address = Address([0xaa; 20]);
    const ACCOUNT: Address = Address([0xbb; 20]);

    fn alice() -> UserKeys {
        UserKeys::from_user_key(Scalar::from(1001u64))
    }

    fn bob() -> UserKeys {
        UserKeys::from_user_key(Scalar::from(2002u64))
    }

    /// Accumulator after `keys` entered with `amount`, plus that contribution.
    fn after_entry(keys: &UserKeys, amount: Amount) -> (MainAccumulatorState, AssembledOperation) {
        let ctx = OperationContext::new(keys, 0, MainAccumulatorState::genesis());
        let op = Operation::Entry {
            token: TOKEN,
            amount,
            account: ACCOUNT,
        };
        let a = assemble(&op, &ctx, None).unwrap();
        (a.transition.next, a)
    }

    fn next_ctx<'a>(keys: &'a UserKeys, snapshot: MainAccumulatorState, prev: &AssembledOperation) -> OperationContext<'a> {
        let nonce = prev.next_entry.nonce;
        OperationContext::new(keys, nonce + 1, snapshot)
            .previous_state(prev.next_state.clone())
            .previous_nullifier(prev.next_entry.nullifier)
            .previous_opening(Some(prev.next_state.contribution_opening(keys.nonce_commitment(nonce))))
    }

    #[test]
    fn entry_fills_the_entry_layout() {
        let k = alice();
        let (_, a) = after_entry(&k, 100);
        assert_eq!(a.public_inputs.len(), 9);
        assert_eq!(a.inputs.get("amount"), Some("100"));
        assert_eq!(a.inputs.get("first_use"), Some("1"));
        assert_eq!(a.next_entry.amount, 100);
        assert_eq!(a.transition.delta, a.next_state.contribution_opening(k.nonce_commitment(0)));

        let public = PublicInputs::new(CircuitKind::Entry, a.public_inputs.clone()).unwrap();
        let ek = k.encryption_key(0);
        assert_eq!(decrypt(&public.scalar("enc_m").unwrap(), &ek, COUNTER_AMOUNT), Scalar::from(100u64));
        assert_eq!(decrypt(&public.scalar("enc_r").unwrap(), &ek, COUNTER_TOKEN), TOKEN.to_scalar());
        // The paying account is a private input; the ledger learns it from the transaction.
        assert_eq!(a.inputs.get("account"), Some(to_decimal(&ACCOUNT.to_scalar()).as_str()));
        assert!(a.public_inputs.iter().all(|v| *v != to_decimal(&ACCOUNT.to_scalar())));
    }

    #[test]
    fn entry_splits_the_snapshot_around_the_seed() {
        let (a, b) = (alice(), bob());
        let (snapshot, _) = after_entry(&a, 100);
        let ctx = OperationContext::new(&b, 0, snapshot);
        let op = Operation::Entry {
            token: TOKEN,
            amount: 7,
            account: ACCOUNT,
        };
        let entered = assemble(&op, &ctx, None).unwrap();
        assert_eq!(entered.snapshot, snapshot);

        let seed = Opening::seed();
        let (x, y) = seed.commit().to_decimal();
        assert_eq!(entered.inputs.get("main_c_outer_x"), Some(x.as_str()));
        assert_eq!(entered.inputs.get("main_c_outer_y"), Some(y.as_str()));
        assert_eq!(entered.inputs.get("main_c_outer_m"), Some("1"));
        let (x, y) = (snapshot.tot - seed.commit()).to_decimal();
        assert_eq!(entered.inputs.get("main_c_inner_x"), Some(x.as_str()));
        assert_eq!(entered.inputs.get("main_c_inner_y"), Some(y.as_str()));
        assert_eq!(entered.public_inputs.len(), 9);

        let mut broken = snapshot;
        broken.tot = MainAccumulatorState::genesis().tot;
        let ctx = OperationContext::new(&b, 0, broken);
        assert!(matches!(assemble(&op, &ctx, None), Err(WalletError::Consistency(_))));
    }

    #[test]
    fn deposit_binds_the_snapshot() {
        let k = alice();
        let (snapshot, entry) = after_entry(&k, 100);
        let op = Operation::Deposit {
            token: TOKEN,
            amount: 50,
            account: ACCOUNT,
        };
        let a = assemble(&op, &next_ctx(&k, snapshot, &entry), None).unwrap();
        assert_eq!(a.public_inputs.len(), 16);
        assert_eq!(a.next_entry.amount, 150);

        let public = PublicInputs::new(CircuitKind::Deposit, a.public_inputs.clone()).unwrap();
        assert_eq!(public.point("main_c_tot").unwrap(), snapshot.tot);
        assert_eq!(public.scalar("main_m").unwrap(), snapshot.opening.m);
        assert_eq!(public.scalar("prev_nonce_commitment").unwrap(), k.nonce_commitment(0));
        assert_eq!(public.scalar("account").unwrap(), ACCOUNT.to_scalar());
        assert!(a.transition.next.is_consistent());
        assert_eq!(
            a.next_state.tot,
            PersonalCommitmentState::reconstruct(150, TOKEN, &k, false).tot
        );
    }

    #[test]
    fn withdraw_more_than_balance_is_a_state_error() {
        let k = alice();
        let (snapshot, entry) = after_entry(&k, 100);
        let op = Operation::Withdraw {
            token: TOKEN,
            amount: 101,
            account: ACCOUNT,
        };
        assert!(matches!(
            assemble(&op, &next_ctx(&k, snapshot, &entry), None),
            Err(WalletError::State(_))
        ));
    }

    #[test]
    fn nonce_rules() {
        let k = alice();
        let ctx = OperationContext::new(&k, 1, MainAccumulatorState::genesis());
        let entry = Operation::Entry {
            token: TOKEN,
            amount: 1,
            account: ACCOUNT,
        };
        assert!(matches!(assemble(&entry, &ctx, None), Err(WalletError::State(_))));
        let ctx = OperationContext::new(&k, 0, MainAccumulatorState::genesis());
        let op = Operation::Deposit {
            token: TOKEN,
            amount: 1,
            account: ACCOUNT,
        };
        assert!(matches!(assemble(&op, &ctx, None), Err(WalletError::State(_))));
    }

    #[test]
    fn inconsistent_snapshot_is_rejected() {
        let k = alice();
        let (mut snapshot, entry) = after_entry(&k, 100);
        snapshot.tot = MainAccumulatorState::genesis().tot;
        let ctx = next_ctx(&k, snapshot, &entry);
        let op = Operation::Deposit {
            token: TOKEN,
            amount: 1,
            account: ACCOUNT,
        };
        assert!(matches!(assemble(&op, &ctx, None), Err(WalletError::Consistency(_))));
    }

    #[test]
    fn send_and_absorb_fill_the_transfer_layout() {
        let (a, b) = (alice(), bob());
        let (snapshot, entry) = after_entry(&a, 100);

        let note = seal_note(&a, &b.public_key, 30, TOKEN).unwrap();
        let send = Operation::Send {
            token: TOKEN,
            amount: 30,
            receiver: b.public_key,
        };
        let data = TransferData::Send {
            note,
            receiver_stack: CurvePoint::identity(),
            receiver_note_count: 0,
        };
        let sent = assemble(&send, &next_ctx(&a, snapshot, &entry), Some(&data)).unwrap();
        assert_eq!(sent.public_inputs.len(), 28);
        assert_eq!(sent.next_entry.amount, 70);
        let public = PublicInputs::new(CircuitKind::Send, sent.public_inputs.clone()).unwrap();
        assert_eq!(public.point("new_peer_stack").unwrap(), note.commitment);
        assert_eq!(public.u64("transfer_kind").unwrap(), TRANSFER_KIND_SEND);

        assert!(assemble(&send, &next_ctx(&a, snapshot, &entry), None).is_err());

        let (b_snapshot, b_entry) = after_entry(&b, 0);
        let received = open_note(&b, &note.note).unwrap();
        let plan = plan_absorb(&[received], TOKEN, 0).unwrap();
        let data = TransferData::Absorb {
            plan,
            own_stack: note.commitment,
            note_count: 1,
        };
        let absorbed = assemble(
            &Operation::Absorb { token: TOKEN },
            &next_ctx(&b, b_snapshot, &b_entry),
            Some(&data),
        )
        .unwrap();
        assert_eq!((absorbed.next_entry.amount, absorbed.next_entry.nullifier), (30, 30));
        let public = PublicInputs::new(CircuitKind::Absorb, absorbed.public_inputs.clone()).unwrap();
        assert_eq!(public.point("peer_pk").unwrap(), b.public_key);
        assert!(public.point("note_commitment").unwrap().is_identity());
        assert_eq!(
            public.scalar("nullifier_commitment").unwrap(),
            hash(&[Scalar::from(30u64), b.user_key_hash])
        );
    }

    #[test]
    fn absorb_with_a_stale_plan_is_rejected() {
        let (a, b) = (alice(), bob());
        let note = seal_note(&a, &b.public_key, 30, TOKEN).unwrap();
        let received = open_note(&b, &note.note).unwrap();
        let (b_snapshot, b_entry) = after_entry(&b, 0);
        let data = TransferData::Absorb {
            plan: plan_absorb(&[received], TOKEN, 5).unwrap(),
            own_stack: note.commitment,
            note_count: 1,
        };
        assert!(matches!(
            assemble(&Operation::Absorb { token: TOKEN }, &next_ctx(&b, b_snapshot, &b_entry), Some(&data)),
            Err(WalletError::Consistency(_))
        ));
    }
}

//! Point-to-point value transfer notes.
//!
//! ```text
//! sender:   shared = sender_key * receiver_pk      key = hash(shared.x, shared.y)
//! receiver: shared = receiver_key * sender_pk      (same point by DH symmetry)
//! note:     (sender_pk, amount + hash(key, 0), token + hash(key, 1))
//! ```
//!
//! Each note also has a commitment `pedersen_positive(amount, token, key)`. The ledger keeps
//! the running sum of a receiver's note commitments (the note stack).

use crate::cipher::{decrypt, encrypt};
use crate::constants::{COUNTER_AMOUNT, COUNTER_TOKEN};
use crate::curve::{pedersen_positive, Commitment, CurvePoint};
use crate::error::{ProtocolError, Result};
use crate::hash::hash;
use crate::keys::UserKeys;
use crate::types::{amount_to_scalar, fq_to_fr, scalar_to_amount, Address, Amount, Scalar};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptedNote {
    pub sender_public_key: CurvePoint,
    pub encrypted_amount: Scalar,
    pub encrypted_token_address: Scalar,
}

/// A note as built by the sender, with its plaintext and commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutgoingNote {
    pub note: EncryptedNote,
    pub receiver_public_key: CurvePoint,
    pub shared_key: Scalar,
    pub amount: Amount,
    pub token: Address,
    pub commitment: Commitment,
}

/// A received note after decryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecryptedNote {
    pub sender_public_key: CurvePoint,
    pub shared_key: Scalar,
    pub amount: Amount,
    pub token: Address,
    pub commitment: Commitment,
}

pub fn shared_key(secret: &Scalar, peer_public_key: &CurvePoint) -> Scalar {
    let (x, y) = peer_public_key.mul(secret).coords();
    hash(&[fq_to_fr(&x), fq_to_fr(&y)])
}

pub fn note_commitment(amount: Amount, token: Address, key: &Scalar) -> Commitment {
    pedersen_positive(&amount_to_scalar(amount), &token.to_scalar(), key)
}

pub fn seal_note(sender: &UserKeys, receiver_public_key: &CurvePoint, amount: Amount, token: Address) -> Result<OutgoingNote> {
    if receiver_public_key.is_identity() {
        return Err(ProtocolError::Input("receiver public key is the identity".into()));
    }
    let key = shared_key(&sender.user_key, receiver_public_key);
    let note = EncryptedNote {
        sender_public_key: sender.public_key,
        encrypted_amount: encrypt(&amount_to_scalar(amount), &key, COUNTER_AMOUNT),
        encrypted_token_address: encrypt(&token.to_scalar(), &key, COUNTER_TOKEN),
    };
    Ok(OutgoingNote {
        note,
        receiver_public_key: *receiver_public_key,
        shared_key: key,
        amount,
        token,
        commitment: note_commitment(amount, token, &key),
    })
}

pub fn open_note(receiver: &UserKeys, note: &EncryptedNote) -> Result<DecryptedNote> {
    let key = shared_key(&receiver.user_key, &note.sender_public_key);
    let amount = scalar_to_amount(&decrypt(&note.encrypted_amount, &key, COUNTER_AMOUNT))?;
    let token = Address::from_scalar(&decrypt(&note.encrypted_token_address, &key, COUNTER_TOKEN))?;
    Ok(DecryptedNote {
        sender_public_key: note.sender_public_key,
        shared_key: key,
        amount,
        token,
        commitment: note_commitment(amount, token, &key),
    })
}

/// Sum of note commitments, as the ledger accumulates it.
pub fn note_stack<'a>(commitments: impl IntoIterator<Item = &'a Commitment>) -> Commitment {
    commitments
        .into_iter()
        .fold(CurvePoint::identity(), |acc, c| acc + *c)
}

/// What an absorb for one token would merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbsorbPlan {
    pub token: Address,
    /// Sum of every received note for the token.
    pub total: Amount,
    /// Cumulative amount already absorbed.
    pub nullifier: Amount,
    pub delta: Amount,
    pub notes_for_token: usize,
}

pub fn plan_absorb(notes: &[DecryptedNote], token: Address, nullifier: Amount) -> Result<AbsorbPlan> {
    let mut total: Amount = 0;
    let mut notes_for_token = 0;
    for n in notes.iter().filter(|n| n.token == token) {
        total = total
            .checked_add(n.amount)
            .ok_or_else(|| ProtocolError::Consistency("note total overflows 128 bits".into()))?;
        notes_for_token += 1;
    }
    let delta = total.checked_sub(nullifier).ok_or_else(|| {
        ProtocolError::Consistency(format!("nullifier {nullifier} exceeds received total {total} for {token}"))
    })?;
    if delta == 0 {
        return Err(ProtocolError::State(format!("nothing to absorb for {token}")));
    }
    Ok(AbsorbPlan {
        token,
        total,
        nullifier,
        delta,
        notes_for_token,
    })
}

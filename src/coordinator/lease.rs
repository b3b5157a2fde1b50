//! Leader lease protocol
//!
//! Classic lease-based mutual exclusion over the shared store: exactly one
//! valid (non-expired) lease may exist per match, and ownership is decided
//! purely by comparing `lease_until` against the caller's clock and `owner`
//! against the caller's identity. Both operations are read-then-conditional-
//! write; a rejected commit means another instance moved first, which is the
//! designed signal to back off — never an error.
//!
//! `now_ms` is always passed in explicitly so tests can drive skewed clocks
//! deterministically.

use crate::store::keys::leader_key;
use crate::store::models::LeaderLease;
use crate::store::{KvStore, StoreError};

/// Lease TTL. A crashed leader blocks a match for at most this long.
pub const LEADER_LEASE_MS: u64 = 10_000;

/// Renewal cadence — ~30% of the TTL, so a healthy leader survives several
/// missed renewals and bounded clock drift before its lease can lapse.
pub const LEADER_RENEW_EVERY_MS: u64 = 3_000;

/// Attempt to acquire the lease for `match_id`.
///
/// Succeeds when no lease exists, the existing lease has expired, or the
/// caller already owns an unexpired lease (self-renewal, no write needed).
/// `Ok(false)` on a held lease or a lost write race.
pub async fn try_claim(
    store: &KvStore,
    match_id: &str,
    owner: &str,
    now_ms: u64,
) -> Result<bool, StoreError> {
    let key = leader_key(match_id);
    let entry = store.get::<LeaderLease>(&key).await?;

    if let Some(lease) = &entry.value {
        if lease.lease_until > now_ms {
            return Ok(lease.owner == owner);
        }
    }

    let next = LeaderLease {
        owner: owner.to_string(),
        lease_until: now_ms + LEADER_LEASE_MS,
    };
    store
        .atomic()
        .check(&key, entry.version)
        .set(&key, &next)?
        .commit()
        .await
}

/// Extend a lease the caller already holds.
///
/// `Ok(false)` whenever the lease is missing, expired, owned by someone
/// else, or the conditional write loses a race — the caller must abandon
/// leadership immediately in every one of those cases.
pub async fn try_renew(
    store: &KvStore,
    match_id: &str,
    owner: &str,
    now_ms: u64,
) -> Result<bool, StoreError> {
    let key = leader_key(match_id);
    let entry = store.get::<LeaderLease>(&key).await?;

    let Some(lease) = &entry.value else {
        return Ok(false);
    };
    if lease.owner != owner || lease.lease_until < now_ms {
        return Ok(false);
    }

    let next = LeaderLease {
        owner: owner.to_string(),
        lease_until: now_ms + LEADER_LEASE_MS,
    };
    store
        .atomic()
        .check(&key, entry.version)
        .set(&key, &next)?
        .commit()
        .await
}

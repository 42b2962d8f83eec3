//! Durable counting semaphore.
//!
//! `semaphores.current_lock_count` always equals the number of `semaphore_owners` rows for the
//! same lock. Every mutation updates both inside one transaction, and the increment carries its
//! own `current_lock_count < limit` precondition so concurrent acquirers cannot overshoot.

use super::db::{now_ms, quote, require_non_empty, StoreDb};
use super::types::{AcquireAttempt, ClearOutcome, SemaphoreState, StoreError};

/// Creates the semaphore row with a zero count if it does not exist yet.
pub fn ensure_semaphore<C>(conn: &mut C, lock_name: &str) -> Result<(), StoreError>
where
    C: StoreDb,
{
    require_non_empty("lock_name", lock_name)?;
    let sql = format!(
        "INSERT INTO semaphores (lock_name, current_lock_count) VALUES ({}, 0) \
         ON CONFLICT (lock_name) DO NOTHING",
        quote(lock_name)
    );
    conn.execute_sql(&sql)?;
    Ok(())
}

/// Makes one conditional attempt to take a slot for `owner_id`.
///
/// Never waits. Callers poll with backoff while the result is `Full`.
pub fn try_acquire_slot<C>(
    conn: &mut C,
    lock_name: &str,
    owner_id: &str,
    limit: i64,
) -> Result<AcquireAttempt, StoreError>
where
    C: StoreDb,
{
    require_non_empty("owner_id", owner_id)?;
    if limit <= 0 {
        return Err(StoreError::InvalidInput(format!(
            "concurrency limit must be > 0, got {limit}"
        )));
    }

    conn.in_transaction(|conn| {
        ensure_semaphore(conn, lock_name)?;

        if owner_exists(conn, lock_name, owner_id)? {
            return Ok(AcquireAttempt::AlreadyHeld);
        }

        let increment_sql = format!(
            "UPDATE semaphores \
             SET current_lock_count = current_lock_count + 1 \
             WHERE lock_name = {} AND current_lock_count < {limit}",
            quote(lock_name)
        );
        if conn.execute_sql(&increment_sql)? == 0 {
            let current_lock_count = current_count(conn, lock_name)?;
            return Ok(AcquireAttempt::Full { current_lock_count });
        }

        let owner_sql = format!(
            "INSERT INTO semaphore_owners (lock_name, owner_id, acquired_at_ms) \
             VALUES ({}, {}, {})",
            quote(lock_name),
            quote(owner_id),
            now_ms()
        );
        conn.execute_sql(&owner_sql)?;
        Ok(AcquireAttempt::Acquired)
    })
}

/// Gives back the slot held by `owner_id`. Returns `false` (and changes nothing) when the owner
/// holds no slot.
pub fn release_slot<C>(conn: &mut C, lock_name: &str, owner_id: &str) -> Result<bool, StoreError>
where
    C: StoreDb,
{
    Ok(remove_owner(conn, lock_name, owner_id)?.removed)
}

/// Removes a stale owner on behalf of a process that can no longer release it.
pub fn force_clear_owner<C>(
    conn: &mut C,
    lock_name: &str,
    owner_id: &str,
) -> Result<ClearOutcome, StoreError>
where
    C: StoreDb,
{
    remove_owner(conn, lock_name, owner_id)
}

fn remove_owner<C>(conn: &mut C, lock_name: &str, owner_id: &str) -> Result<ClearOutcome, StoreError>
where
    C: StoreDb,
{
    conn.in_transaction(|conn| {
        let delete_sql = format!(
            "DELETE FROM semaphore_owners WHERE lock_name = {} AND owner_id = {}",
            quote(lock_name),
            quote(owner_id)
        );
        let removed = conn.execute_sql(&delete_sql)? > 0;

        if removed {
            let decrement_sql = format!(
                "UPDATE semaphores \
                 SET current_lock_count = current_lock_count - 1 \
                 WHERE lock_name = {} AND current_lock_count > 0",
                quote(lock_name)
            );
            conn.execute_sql(&decrement_sql)?;
        }

        Ok(ClearOutcome {
            removed,
            current_lock_count: current_count(conn, lock_name)?,
        })
    })
}

/// Resets `current_lock_count` to the number of recorded owners.
///
/// Returns `(before, after)` when the row exists.
pub fn reconcile_semaphore_count<C>(
    conn: &mut C,
    lock_name: &str,
) -> Result<Option<(i64, i64)>, StoreError>
where
    C: StoreDb,
{
    conn.in_transaction(|conn| {
        let Some(state) = get_semaphore(conn, lock_name)? else {
            return Ok(None);
        };

        let owners = state.owner_ids.len() as i64;
        if owners != state.current_lock_count {
            let sql = format!(
                "UPDATE semaphores SET current_lock_count = {owners} WHERE lock_name = {}",
                quote(lock_name)
            );
            conn.execute_sql(&sql)?;
        }
        Ok(Some((state.current_lock_count, owners)))
    })
}

pub fn get_semaphore<C>(conn: &mut C, lock_name: &str) -> Result<Option<SemaphoreState>, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT lock_name, current_lock_count FROM semaphores WHERE lock_name = {} LIMIT 1",
        quote(lock_name)
    );
    let Some(row) = conn.load_semaphores(&sql)?.pop() else {
        return Ok(None);
    };

    let owners_sql = format!(
        "SELECT owner_id FROM semaphore_owners WHERE lock_name = {} \
         ORDER BY acquired_at_ms ASC, owner_id ASC",
        quote(lock_name)
    );
    let owner_ids = conn
        .load_owners(&owners_sql)?
        .into_iter()
        .map(|owner| owner.owner_id)
        .collect();

    Ok(Some(SemaphoreState {
        lock_name: row.lock_name,
        current_lock_count: row.current_lock_count,
        owner_ids,
    }))
}

fn owner_exists<C>(conn: &mut C, lock_name: &str, owner_id: &str) -> Result<bool, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT COUNT(*) AS count FROM semaphore_owners WHERE lock_name = {} AND owner_id = {}",
        quote(lock_name),
        quote(owner_id)
    );
    Ok(conn.load_count(&sql)? > 0)
}

fn current_count<C>(conn: &mut C, lock_name: &str) -> Result<i64, StoreError>
where
    C: StoreDb,
{
    let sql = format!(
        "SELECT COALESCE(MAX(current_lock_count), 0) AS count FROM semaphores WHERE lock_name = {}",
        quote(lock_name)
    );
    Ok(conn.load_count(&sql)?)
}

use chrono::{Duration, Utc};
use log::*;

use crate::traits::{DamagedStore, PendingStore, StoreError};

/// Moves up to `limit` damaged messages whose retry date is at or before `now_ms` back onto their original queues.
/// Returns the number requeued.
pub async fn requeue_due_messages<B: DamagedStore>(db: &B, now_ms: i64, limit: u32) -> Result<u64, StoreError> {
    let due = db.fetch_retryable(now_ms, limit).await?;
    let mut count = 0;
    for message in due {
        match db.requeue_damaged(message.id).await? {
            Some(new_id) => {
                debug!("🚑️ Damaged message #{} is back on {} as #{new_id}", message.id, message.original_queue);
                count += 1;
            },
            None => trace!("🚑️ Damaged message #{} was requeued by someone else", message.id),
        }
    }
    Ok(count)
}

/// Deletes pending records older than `max_age`. Records with a capture claim are left alone.
pub async fn expire_pending<B: PendingStore>(db: &B, gateway: Option<&str>, max_age: Duration) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - max_age;
    let count = db.delete_pending_older_than(gateway, cutoff).await?;
    if count > 0 {
        info!("🕰️ {count} pending records created before {cutoff} deleted");
    }
    Ok(count)
}

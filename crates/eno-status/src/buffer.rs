use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use eno_client::{ClientError, ControlPlaneClient};
use eno_core::{ManifestRef, Nsn, ResourceState};
use eno_queue::WorkQueue;

/// Cap on resource updates per HTTP patch. Two ops per update plus the
/// two initialization ops stay under 10k ops total, bounding apiserver
/// request size and per-patch CPU.
pub const MAX_UPDATES_PER_PATCH: usize = (10_000 / 2) - 2;

/// Computes a resource's new status from the current one. Returning
/// `None` makes the update a no-op.
pub type PatchFn = Box<dyn Fn(Option<&ResourceState>) -> Option<ResourceState> + Send + Sync>;

enum DrainOutcome {
    /// Nothing left to write (or the slice is gone): reset the backoff.
    Forget,
    /// Wrote successfully: come around again so steady streams throttle.
    Requeue,
    /// Failed: batch restored, retry under the rate limiter.
    RetryBackoff,
}

/// Buffer of pending status patches, keyed by slice.
pub struct WriteBuffer {
    client: Arc<dyn ControlPlaneClient>,
    state: Mutex<HashMap<Nsn, Vec<(ManifestRef, PatchFn)>>>,
    queue: WorkQueue<Nsn>,
}

impl WriteBuffer {
    pub fn new(client: Arc<dyn ControlPlaneClient>) -> Self {
        Self {
            client,
            state: Mutex::new(HashMap::new()),
            queue: WorkQueue::with_backoff(Duration::from_millis(250), Duration::from_secs(30)),
        }
    }

    /// Record a status update for one resource index. A pending update
    /// for the same index is overwritten: last write wins, the earlier
    /// function is never applied.
    pub fn patch_status_async(&self, manifest_ref: ManifestRef, patch_fn: PatchFn) {
        let slice = manifest_ref.slice.clone();
        {
            let mut state = self.state.lock().unwrap();
            let pending = state.entry(slice.clone()).or_default();
            if let Some(entry) = pending.iter_mut().find(|(r, _)| *r == manifest_ref) {
                entry.1 = patch_fn;
            } else {
                pending.push((manifest_ref, patch_fn));
            }
        }
        self.queue.add(slice);
    }

    /// Drain one slice's batch. Returns false once the buffer is shut
    /// down; workers loop on this.
    pub async fn process_next(&self) -> bool {
        let Some(slice) = self.queue.get().await else {
            return false;
        };
        match self.drain(&slice).await {
            DrainOutcome::Forget => self.queue.forget(&slice),
            DrainOutcome::Requeue => self.queue.add(slice.clone()),
            DrainOutcome::RetryBackoff => self.queue.add_rate_limited(slice.clone()),
        }
        self.queue.done(&slice);
        true
    }

    /// Worker loop; run one task per worker.
    pub async fn run(&self) {
        while self.process_next().await {}
    }

    /// Stop accepting work and wake the workers. Abandoned batches are
    /// recoverable from the next informer event.
    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    async fn drain(&self, slice_nsn: &Nsn) -> DrainOutcome {
        let mut batch = self
            .state
            .lock()
            .unwrap()
            .remove(slice_nsn)
            .unwrap_or_default();
        if batch.is_empty() {
            return DrainOutcome::Forget;
        }
        // A deferred overflow means this slice still has pending work, so
        // every batch-dropping path below must requeue instead of forget:
        // nothing else would come back for it.
        let mut deferred = false;
        if batch.len() > MAX_UPDATES_PER_PATCH {
            let overflow = batch.split_off(MAX_UPDATES_PER_PATCH);
            debug!(slice = %slice_nsn, deferred = overflow.len(), "patch cap hit, deferring updates");
            self.restore(slice_nsn, overflow);
            deferred = true;
        }
        let dropped = |deferred: bool| {
            if deferred {
                DrainOutcome::Requeue
            } else {
                DrainOutcome::Forget
            }
        };

        let slice = match self.client.get_slice(slice_nsn.clone()).await {
            Ok(slice) => slice,
            Err(e) if e.is_not_found() => {
                debug!(slice = %slice_nsn, "slice is gone, dropping batch");
                return dropped(deferred);
            }
            Err(e) => {
                warn!(slice = %slice_nsn, error = %e, "failed to fetch slice");
                self.restore(slice_nsn, batch);
                return DrainOutcome::RetryBackoff;
            }
        };

        // Current snapshot of the parallel status array; absent or empty
        // means this patch must initialize it atomically.
        let (initialized, current) = match slice.status.resources {
            Some(states) if !states.is_empty() => (true, states),
            _ => (
                false,
                vec![ResourceState::default(); slice.spec.resources.len()],
            ),
        };

        let mut ops: Vec<Value> = Vec::new();
        let mut updates = 0usize;
        for (manifest_ref, patch_fn) in &batch {
            let index = manifest_ref.index;
            let Some(snapshot) = current.get(index) else {
                warn!(slice = %slice_nsn, index, "status index out of bounds, dropping update");
                continue;
            };
            let observed = initialized.then_some(snapshot);
            let Some(next) = patch_fn(observed) else {
                continue;
            };
            let path = format!("/status/resources/{index}");
            // The test guards against concurrent writers; a rejection
            // falls through to the retry path.
            ops.push(json!({"op": "test", "path": path, "value": snapshot}));
            ops.push(json!({"op": "replace", "path": path, "value": next}));
            updates += 1;
        }
        if updates == 0 {
            return dropped(deferred);
        }

        let mut patch: Vec<Value> = Vec::with_capacity(ops.len() + 2);
        if !initialized {
            patch.push(json!({"op": "test", "path": "/status/resources", "value": null}));
            patch.push(json!({"op": "add", "path": "/status/resources", "value": current}));
        }
        patch.extend(ops);

        match self
            .client
            .patch_slice_status(slice_nsn.clone(), Value::Array(patch))
            .await
        {
            Ok(()) => {
                debug!(slice = %slice_nsn, updates, "status batch written");
                DrainOutcome::Requeue
            }
            Err(e) if e.is_not_found() => {
                debug!(slice = %slice_nsn, "slice deleted mid-patch, dropping batch");
                dropped(deferred)
            }
            Err(e) => {
                log_patch_failure(slice_nsn, &e);
                self.restore(slice_nsn, batch);
                DrainOutcome::RetryBackoff
            }
        }
    }

    /// Put a batch back at the front of the slice's pending list. Updates
    /// enqueued while we were draining are newer and win on collision.
    fn restore(&self, slice_nsn: &Nsn, batch: Vec<(ManifestRef, PatchFn)>) {
        let mut state = self.state.lock().unwrap();
        let newer = state.remove(slice_nsn).unwrap_or_default();
        let mut merged: Vec<(ManifestRef, PatchFn)> = batch
            .into_iter()
            .filter(|(r, _)| !newer.iter().any(|(nr, _)| nr == r))
            .collect();
        merged.extend(newer);
        state.insert(slice_nsn.clone(), merged);
    }
}

fn log_patch_failure(slice_nsn: &Nsn, err: &ClientError) {
    if err.is_conflict() {
        debug!(slice = %slice_nsn, "status precondition failed, will retry");
    } else {
        warn!(slice = %slice_nsn, error = %err, "status patch failed, will retry");
    }
}

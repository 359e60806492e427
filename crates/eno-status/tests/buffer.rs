use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eno_client::{ClientError, MemoryClient};
use eno_core::{ManifestRef, Nsn, ObjectMeta, ResourceSlice, ResourceState, SliceManifest};
use eno_status::WriteBuffer;

fn slice_nsn() -> Nsn {
    Nsn::new("default", "slice-a")
}

fn manifest_ref(index: usize) -> ManifestRef {
    ManifestRef {
        slice: slice_nsn(),
        index,
    }
}

fn put_slice(client: &MemoryClient, resources: usize) {
    client.put_slice(ResourceSlice {
        metadata: ObjectMeta {
            name: "slice-a".into(),
            namespace: "default".into(),
            ..ObjectMeta::default()
        },
        spec: eno_core::ResourceSliceSpec {
            synthesis_uuid: None,
            resources: (0..resources).map(|_| SliceManifest::default()).collect(),
        },
        status: Default::default(),
    });
}

fn set_reconciled() -> eno_status::PatchFn {
    Box::new(|current| {
        let mut state = current.cloned().unwrap_or_default();
        state.reconciled = true;
        Some(state)
    })
}

#[tokio::test]
async fn coalesces_updates_into_a_single_initializing_patch() {
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, 3);
    let buffer = WriteBuffer::new(client.clone());

    buffer.patch_status_async(manifest_ref(1), set_reconciled());
    buffer.patch_status_async(manifest_ref(2), set_reconciled());

    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 1, "one patch for both indices");

    let slice = client.slice(&slice_nsn()).unwrap();
    let states = slice.status.resources.as_ref().unwrap();
    assert_eq!(states.len(), 3, "status array initialized to spec length");
    assert!(!states[0].reconciled);
    assert!(states[1].reconciled);
    assert!(states[2].reconciled);

    // A later update patches in place without re-initializing.
    buffer.patch_status_async(
        manifest_ref(0),
        Box::new(|current| {
            let mut state = current.cloned().unwrap_or_default();
            state.ready = Some(jiff::Timestamp::UNIX_EPOCH);
            Some(state)
        }),
    );
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 2);
    let slice = client.slice(&slice_nsn()).unwrap();
    assert!(slice.resource_state(0).unwrap().is_ready());
    assert!(slice.resource_state(1).unwrap().reconciled, "earlier write survives");
}

#[tokio::test]
async fn last_write_wins_per_resource_index() {
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, 1);
    let buffer = WriteBuffer::new(client.clone());

    let first_applied = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&first_applied);
    buffer.patch_status_async(
        manifest_ref(0),
        Box::new(move |current| {
            flag.store(true, Ordering::SeqCst);
            let mut state = current.cloned().unwrap_or_default();
            state.deleted = true;
            Some(state)
        }),
    );
    buffer.patch_status_async(manifest_ref(0), set_reconciled());

    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 1);
    assert!(!first_applied.load(Ordering::SeqCst), "overwritten fn never runs");

    let state = client.slice(&slice_nsn()).unwrap().resource_state(0).cloned().unwrap();
    assert!(state.reconciled);
    assert!(!state.deleted);
}

#[tokio::test(start_paused = true)]
async fn interference_retries_after_backoff() {
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, 1);
    client.fail_next_slice_patch(ClientError::Conflict("another field manager".into()));
    let buffer = WriteBuffer::new(client.clone());

    buffer.patch_status_async(manifest_ref(0), set_reconciled());

    assert!(buffer.process_next().await, "first pass fails and requeues");
    assert_eq!(client.slice_patch_attempts(), 1);

    // The retry arrives only after the rate limiter's delay.
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 2);
    assert!(client.slice(&slice_nsn()).unwrap().resource_state(0).unwrap().reconciled);
}

#[tokio::test]
async fn missing_slice_drops_the_batch() {
    let client = Arc::new(MemoryClient::new());
    let buffer = WriteBuffer::new(client.clone());

    buffer.patch_status_async(manifest_ref(0), set_reconciled());
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 0, "404 on fetch, nothing to patch");
}

#[tokio::test]
async fn slice_deleted_mid_patch_drops_the_batch() {
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, 2);
    client.fail_next_slice_patch(ClientError::NotFound("resource slice".into()));
    let buffer = WriteBuffer::new(client.clone());

    buffer.patch_status_async(manifest_ref(0), set_reconciled());
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 1);

    // The dropped batch stays dropped: a fresh update only carries itself.
    buffer.patch_status_async(manifest_ref(1), set_reconciled());
    assert!(buffer.process_next().await);
    let slice = client.slice(&slice_nsn()).unwrap();
    assert!(!slice.resource_state(0).unwrap().reconciled);
    assert!(slice.resource_state(1).unwrap().reconciled);
}

#[tokio::test]
async fn noop_patch_fns_issue_no_request() {
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, 1);
    let buffer = WriteBuffer::new(client.clone());

    buffer.patch_status_async(manifest_ref(0), Box::new(|_| None));
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 0);
    assert!(client.slice(&slice_nsn()).unwrap().status.resources.is_none());
}

#[tokio::test]
async fn oversized_batches_spill_into_the_next_cycle() {
    let count = eno_status::MAX_UPDATES_PER_PATCH + 2;
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, count);
    let buffer = WriteBuffer::new(client.clone());

    for index in 0..count {
        buffer.patch_status_async(manifest_ref(index), set_reconciled());
    }

    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 1);
    let slice = client.slice(&slice_nsn()).unwrap();
    let reconciled = slice
        .status
        .resources
        .as_ref()
        .unwrap()
        .iter()
        .filter(|s| s.reconciled)
        .count();
    assert_eq!(reconciled, eno_status::MAX_UPDATES_PER_PATCH);

    assert!(buffer.process_next().await);
    let slice = client.slice(&slice_nsn()).unwrap();
    assert!(
        slice.status.resources.as_ref().unwrap().iter().all(|s| s.reconciled),
        "spilled updates land on the next pass"
    );
}

#[tokio::test]
async fn deferred_overflow_survives_an_all_noop_chunk() {
    let count = eno_status::MAX_UPDATES_PER_PATCH + 2;
    let client = Arc::new(MemoryClient::new());
    put_slice(&client, count);
    let buffer = WriteBuffer::new(client.clone());

    // The first full chunk is entirely no-ops; only the deferred tail
    // carries real updates.
    for index in 0..eno_status::MAX_UPDATES_PER_PATCH {
        buffer.patch_status_async(manifest_ref(index), Box::new(|_| None));
    }
    buffer.patch_status_async(manifest_ref(count - 2), set_reconciled());
    buffer.patch_status_async(manifest_ref(count - 1), set_reconciled());

    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 0, "no-op chunk issues no patch");

    // The requeue brings the deferred updates around without any new
    // enqueue for the slice.
    assert!(buffer.process_next().await);
    assert_eq!(client.slice_patch_attempts(), 1);
    let slice = client.slice(&slice_nsn()).unwrap();
    assert!(slice.resource_state(count - 2).unwrap().reconciled);
    assert!(slice.resource_state(count - 1).unwrap().reconciled);
}

#[tokio::test]
async fn shutdown_stops_the_workers() {
    let client = Arc::new(MemoryClient::new());
    let buffer = Arc::new(WriteBuffer::new(client));
    let worker = {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move { buffer.run().await })
    };
    tokio::task::yield_now().await;
    buffer.shut_down();
    worker.await.unwrap();
}

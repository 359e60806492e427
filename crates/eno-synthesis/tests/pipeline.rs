//! End-to-end flow across the core: the executor synthesizes slices, the
//! cache builds the tree and gates visibility, the write buffer carries
//! the reconciler's observations back, and the next informer event
//! unblocks the following readiness group.

use std::sync::Arc;

use eno_client::MemoryClient;
use eno_core::{Composition, ManifestRef, Nsn, Ref, ResourceList, Synthesis, Synthesizer};
use eno_queue::WorkQueue;
use eno_status::WriteBuffer;
use eno_synthesis::{Executor, SynthesisEnv, SynthesisOutcome, SynthesizerHandler};
use eno_tree::{ReconcileRequest, ResourceCache};
use serde_json::json;
use uuid::Uuid;

struct CannedHandler(ResourceList);

impl SynthesizerHandler for CannedHandler {
    fn synthesize(
        &self,
        _synthesizer: Synthesizer,
        _inputs: ResourceList,
    ) -> eno_synthesis::handler::BoxFuture<'_, Result<ResourceList, eno_synthesis::SynthesisError>>
    {
        let output = self.0.clone();
        Box::pin(async move { Ok(output) })
    }
}

fn config_map_ref(name: &str) -> Ref {
    Ref {
        group: "".into(),
        kind: "ConfigMap".into(),
        namespace: "default".into(),
        name: name.into(),
    }
}

#[tokio::test]
async fn synthesis_flows_through_cache_and_status_updates() {
    let nsn = Nsn::new("default", "demo");
    let uuid = Uuid::new_v4();

    let client = Arc::new(MemoryClient::new());
    let mut composition = Composition::default();
    composition.metadata.name = "demo".into();
    composition.metadata.namespace = "default".into();
    composition.spec.synthesizer = "pipeline-synth".into();
    composition.status.in_flight_synthesis = Some(Synthesis {
        uuid,
        ..Synthesis::default()
    });
    client.put_composition(composition);
    let mut synthesizer = Synthesizer::default();
    synthesizer.metadata.name = "pipeline-synth".into();
    client.put_synthesizer(synthesizer);

    // The synthesizer emits a base object and a dependent one in the next
    // readiness group.
    let handler = Arc::new(CannedHandler(ResourceList::new(vec![
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "base", "namespace": "default"},
        }),
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "dependent",
                "namespace": "default",
                "annotations": {"eno.azure.io/readiness-group": "1"},
            },
        }),
    ])));

    let env = SynthesisEnv {
        composition: nsn.clone(),
        synthesis_uuid: uuid,
        image: String::new(),
    };
    let outcome = Executor::new(client.clone(), handler, env)
        .synthesize()
        .await
        .unwrap();
    assert_eq!(outcome, SynthesisOutcome::Completed);

    // The committed synthesis points at the authoritative slices.
    let composition = client.composition(&nsn).unwrap();
    let current = composition.status.current_synthesis.as_ref().unwrap();
    assert_eq!(current.uuid, uuid);
    let slice_nsn = current.resource_slices[0].clone();
    let slice = client.slice(&slice_nsn).unwrap();

    // The cache builds the tree; only the base group is visible.
    let queue: WorkQueue<ReconcileRequest> = WorkQueue::new();
    let cache = ResourceCache::new(queue.clone());
    cache.fill(&nsn, uuid, &[slice.clone()]).unwrap();
    assert!(cache.get(uuid, &config_map_ref("base")).unwrap().1);
    assert!(!cache.get(uuid, &config_map_ref("dependent")).unwrap().1);

    // The reconciler observes the base object ready; the write buffer
    // carries that back to the slice status.
    let buffer = WriteBuffer::new(client.clone());
    buffer.patch_status_async(
        ManifestRef {
            slice: slice_nsn.clone(),
            index: 0,
        },
        Box::new(|current| {
            let mut state = current.cloned().unwrap_or_default();
            state.ready = Some(jiff::Timestamp::UNIX_EPOCH);
            state.reconciled = true;
            Some(state)
        }),
    );
    assert!(buffer.process_next().await);

    // The informer reports the updated slice; the dependent group opens
    // up and both resources are enqueued for another reconcile pass.
    let updated = client.slice(&slice_nsn).unwrap();
    assert!(cache.visit(&nsn, uuid, &[updated]));
    assert!(cache.get(uuid, &config_map_ref("dependent")).unwrap().1);

    let mut enqueued = Vec::new();
    while let Ok(Some(request)) =
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.get()).await
    {
        queue.done(&request);
        enqueued.push(request.resource);
        if enqueued.len() == 2 {
            break;
        }
    }
    assert!(enqueued.contains(&config_map_ref("base")));
    assert!(enqueued.contains(&config_map_ref("dependent")));
}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use eno_client::{retry_on_server_timeout, ClientError, ControlPlaneClient};
use eno_core::{
    annotations, Composition, Gvk, InputRevisions, Nsn, ResourceList, ResourceSlice,
    ResultSeverity, SliceRef, Synthesizer, SynthesisResult,
};
use eno_resource::{ParseMode, Resource};
use eno_slice::SliceConfig;

use crate::env::SynthesisEnv;
use crate::error::SynthesisError;
use crate::handler::SynthesizerHandler;

/// Bounded retry for slice writes hitting apiserver timeouts.
const SLICE_WRITE_ATTEMPTS: u32 = 4;
const SLICE_WRITE_BASE_DELAY: Duration = Duration::from_millis(250);

/// Why a synthesis attempt was skipped. Checked before any work and again
/// immediately before the status commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSynthesis,
    UuidMismatch,
    SynthesisCanceled,
    InputsOutOfLockstep,
    ImageMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self {
            SkipReason::MissingSynthesis => "no in-flight synthesis",
            SkipReason::UuidMismatch => "synthesis UUID mismatch",
            SkipReason::SynthesisCanceled => "synthesis canceled",
            SkipReason::InputsOutOfLockstep => "inputs out of lockstep",
            SkipReason::ImageMismatch => "synthesizer image mismatch",
        };
        f.write_str(reason)
    }
}

/// What one executor run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Completed,
    Skipped(SkipReason),
}

/// Drives one synthesis attempt end to end: guard, gather inputs, invoke
/// the synthesizer, validate, slice, and commit the composition status.
pub struct Executor {
    client: Arc<dyn ControlPlaneClient>,
    handler: Arc<dyn SynthesizerHandler>,
    env: SynthesisEnv,
    slice_config: SliceConfig,
}

impl Executor {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        handler: Arc<dyn SynthesizerHandler>,
        env: SynthesisEnv,
    ) -> Self {
        Self {
            client,
            handler,
            env,
            slice_config: SliceConfig::default(),
        }
    }

    pub fn with_slice_config(mut self, slice_config: SliceConfig) -> Self {
        self.slice_config = slice_config;
        self
    }

    /// Run the synthesis attempt this process was started for.
    pub async fn synthesize(&self) -> Result<SynthesisOutcome, SynthesisError> {
        let composition = match self.client.get_composition(self.env.composition.clone()).await {
            Ok(composition) => composition,
            Err(e) if e.is_not_found() => {
                debug!(composition = %self.env.composition, "composition is gone, nothing to do");
                return Ok(SynthesisOutcome::Skipped(SkipReason::MissingSynthesis));
            }
            Err(e) => return Err(e.into()),
        };
        let synthesizer = match self
            .client
            .get_synthesizer(composition.spec.synthesizer.clone())
            .await
        {
            Ok(synthesizer) => synthesizer,
            Err(e) if e.is_not_found() => {
                debug!(
                    composition = %self.env.composition,
                    synthesizer = %composition.spec.synthesizer,
                    "synthesizer is gone, nothing to do"
                );
                return Ok(SynthesisOutcome::Skipped(SkipReason::MissingSynthesis));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(reason) = skip_synthesis(&composition, &synthesizer, &self.env) {
            info!(composition = %composition.nsn(), %reason, "skipping synthesis");
            return Ok(SynthesisOutcome::Skipped(reason));
        }

        let (inputs, input_revisions) =
            match self.gather_inputs(&composition, &synthesizer).await {
                Ok(gathered) => gathered,
                Err(e) => {
                    warn!(composition = %composition.nsn(), error = %e, "input gathering failed");
                    self.commit(&synthesizer, vec![error_result(&e)], vec![], vec![])
                        .await?;
                    return Err(e);
                }
            };

        let output = match self
            .handler
            .synthesize(synthesizer.clone(), ResourceList::new(inputs))
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(composition = %composition.nsn(), error = %e, "synthesizer failed");
                self.commit(&synthesizer, vec![error_result(&e)], vec![], input_revisions)
                    .await?;
                return Err(e);
            }
        };

        if let Err(e) = validate_outputs(&self.env, &output.items) {
            warn!(composition = %composition.nsn(), error = %e, "synthesizer output failed validation");
            self.commit(&synthesizer, vec![error_result(&e)], vec![], input_revisions)
                .await?;
            return Err(e);
        }

        let previous = self.previous_slices(&composition).await?;
        let slices = eno_slice::slice(
            &composition,
            &previous,
            &output.items,
            self.env.synthesis_uuid,
            &self.slice_config,
        )?;

        let mut slice_refs: Vec<SliceRef> = Vec::with_capacity(slices.len());
        for slice in slices {
            let written = retry_on_server_timeout(
                SLICE_WRITE_ATTEMPTS,
                SLICE_WRITE_BASE_DELAY,
                || self.client.create_slice(slice.clone()),
            )
            .await?;
            slice_refs.push(written.metadata.nsn());
        }
        info!(
            composition = %composition.nsn(),
            synthesis_uuid = %self.env.synthesis_uuid,
            slices = slice_refs.len(),
            results = output.results.len(),
            "synthesized"
        );

        self.commit(&synthesizer, output.results, slice_refs, input_revisions)
            .await
    }

    /// Fetch every declared input, preferring the composition's binding
    /// over the ref's defaults, and record the revisions observed.
    async fn gather_inputs(
        &self,
        composition: &Composition,
        synthesizer: &Synthesizer,
    ) -> Result<(Vec<Value>, Vec<InputRevisions>), SynthesisError> {
        let mut items = Vec::with_capacity(synthesizer.spec.refs.len());
        let mut revisions = Vec::with_capacity(synthesizer.spec.refs.len());

        for input_ref in &synthesizer.spec.refs {
            let nsn = match composition.binding(&input_ref.key) {
                Some(binding) => binding.resource.clone(),
                None => input_ref.resource.default_nsn(),
            };
            if nsn.name.is_empty() {
                return Err(SynthesisError::Input(format!(
                    "input {:?} has no binding and no default",
                    input_ref.key
                )));
            }
            let gvk = Gvk {
                group: input_ref.resource.group.clone(),
                version: input_ref.resource.version.clone(),
                kind: input_ref.resource.kind.clone(),
            };
            let mut object = self
                .client
                .get_input(gvk, nsn.clone())
                .await
                .map_err(|e| match e {
                    ClientError::NotFound(what) => {
                        SynthesisError::Input(format!("input {:?}: {what} not found", input_ref.key))
                    }
                    other => SynthesisError::Client(other),
                })?;

            revisions.push(input_revisions(&input_ref.key, &object));
            stamp_input_key(&mut object, &input_ref.key);
            items.push(object);
        }

        Ok((items, revisions))
    }

    async fn previous_slices(
        &self,
        composition: &Composition,
    ) -> Result<Vec<ResourceSlice>, SynthesisError> {
        // Today's current synthesis becomes the previous one after the
        // swap; its slices are the baseline for the tombstone diff.
        let Some(current) = &composition.status.current_synthesis else {
            return Ok(Vec::new());
        };
        let mut slices = Vec::with_capacity(current.resource_slices.len());
        for slice_ref in &current.resource_slices {
            match self.client.get_slice(slice_ref.clone()).await {
                Ok(slice) => slices.push(slice),
                Err(e) if e.is_not_found() => {
                    warn!(slice = %slice_ref, "previous slice is gone, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(slices)
    }

    /// Commit the attempt under optimistic concurrency: re-fetch, re-run
    /// the skip guard, write the synthesis record, and rotate the slots
    /// unless a result reports an error.
    async fn commit(
        &self,
        synthesizer: &Synthesizer,
        results: Vec<SynthesisResult>,
        slice_refs: Vec<SliceRef>,
        input_revisions: Vec<InputRevisions>,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        loop {
            let composition = match self.client.get_composition(self.env.composition.clone()).await
            {
                Ok(composition) => composition,
                Err(e) if e.is_not_found() => {
                    debug!(composition = %self.env.composition, "composition vanished before commit");
                    return Ok(SynthesisOutcome::Skipped(SkipReason::MissingSynthesis));
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(reason) = skip_synthesis(&composition, synthesizer, &self.env) {
                info!(composition = %composition.nsn(), %reason, "skipping synthesis commit");
                return Ok(SynthesisOutcome::Skipped(reason));
            }

            let mut updated = composition;
            let failed = results
                .iter()
                .any(|r| r.severity == ResultSeverity::Error);
            {
                let in_flight = updated
                    .status
                    .in_flight_synthesis
                    .as_mut()
                    .expect("guard verified the in-flight synthesis");
                in_flight.synthesized = Some(jiff::Timestamp::now());
                in_flight.attempts += 1;
                in_flight.observed_generation = updated.metadata.generation;
                in_flight.results = results.clone();
                in_flight.resource_slices = slice_refs.clone();
                in_flight.input_revisions = input_revisions.clone();
            }
            if !failed {
                updated.status.previous_synthesis = updated.status.current_synthesis.take();
                updated.status.current_synthesis = updated.status.in_flight_synthesis.take();
            }

            match self.client.update_composition_status(updated).await {
                Ok(_) => return Ok(SynthesisOutcome::Completed),
                Err(e) if e.is_conflict() => {
                    let jitter = rand::thread_rng().gen_range(10..100);
                    debug!(
                        composition = %self.env.composition,
                        "composition status conflict, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Err(e) if e.is_not_found() => {
                    return Ok(SynthesisOutcome::Skipped(SkipReason::MissingSynthesis));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// The skip oracle. Both guard sites call this.
pub fn skip_synthesis(
    composition: &Composition,
    synthesizer: &Synthesizer,
    env: &SynthesisEnv,
) -> Option<SkipReason> {
    let Some(in_flight) = &composition.status.in_flight_synthesis else {
        return Some(SkipReason::MissingSynthesis);
    };
    if in_flight.uuid != env.synthesis_uuid {
        return Some(SkipReason::UuidMismatch);
    }
    if in_flight.canceled.is_some() {
        return Some(SkipReason::SynthesisCanceled);
    }
    if inputs_out_of_lockstep(
        &in_flight.input_revisions,
        synthesizer.metadata.generation,
        composition.metadata.generation,
    ) {
        return Some(SkipReason::InputsOutOfLockstep);
    }
    if !env.image.is_empty()
        && !synthesizer.spec.image.is_empty()
        && env.image != synthesizer.spec.image
    {
        return Some(SkipReason::ImageMismatch);
    }
    None
}

/// Inputs are in lockstep when every declared revision agrees and every
/// input has caught up to the generations it tracks.
pub fn inputs_out_of_lockstep(
    revisions: &[InputRevisions],
    synthesizer_generation: i64,
    composition_generation: i64,
) -> bool {
    let declared: Vec<i64> = revisions.iter().filter_map(|r| r.revision).collect();
    if declared.windows(2).any(|pair| pair[0] != pair[1]) {
        return true;
    }
    revisions.iter().any(|r| {
        r.synthesizer_generation
            .is_some_and(|g| g < synthesizer_generation)
            || r.composition_generation
                .is_some_and(|g| g < composition_generation)
    })
}

fn validate_outputs(env: &SynthesisEnv, items: &[Value]) -> Result<(), SynthesisError> {
    for (index, item) in items.iter().enumerate() {
        let manifest_ref = eno_core::ManifestRef {
            slice: Nsn::new(env.composition.namespace.clone(), "pending"),
            index,
        };
        Resource::from_value(item, manifest_ref, ParseMode::Strict)
            .map_err(|source| SynthesisError::InvalidOutput { index, source })?;
    }
    Ok(())
}

fn error_result(err: &SynthesisError) -> SynthesisResult {
    SynthesisResult {
        message: err.to_string(),
        severity: ResultSeverity::Error,
        tags: BTreeMap::new(),
    }
}

fn input_revisions(key: &str, object: &Value) -> InputRevisions {
    let annotation = |key: &str| -> Option<i64> {
        object
            .pointer("/metadata/annotations")
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
    };
    InputRevisions {
        key: key.to_string(),
        resource_version: object
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        revision: annotation(annotations::REVISION),
        synthesizer_generation: annotation(annotations::SYNTHESIZER_GENERATION),
        composition_generation: annotation(annotations::COMPOSITION_GENERATION),
    }
}

fn stamp_input_key(object: &mut Value, key: &str) {
    let Some(root) = object.as_object_mut() else {
        return;
    };
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    let annotations_map = metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Some(annotations_map) = annotations_map.as_object_mut() {
        annotations_map.insert(
            annotations::INPUT_KEY.to_string(),
            Value::String(key.to_string()),
        );
    }
}

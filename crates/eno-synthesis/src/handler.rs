use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use jiff::SignedDuration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use eno_core::{ResourceList, Synthesizer};

use crate::error::SynthesisError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default binary looked up on PATH when the synthesizer spec does not
/// carry a command vector.
pub const DEFAULT_COMMAND: &str = "synthesize";

/// Wall-clock cap when the synthesizer spec does not set one.
pub const DEFAULT_EXEC_TIMEOUT: SignedDuration = SignedDuration::from_secs(60);

/// Contract for invoking a synthesizer: inputs in, outputs out, with the
/// failure classes the executor turns into error results.
pub trait SynthesizerHandler: Send + Sync {
    fn synthesize(
        &self,
        synthesizer: Synthesizer,
        inputs: ResourceList,
    ) -> BoxFuture<'_, Result<ResourceList, SynthesisError>>;
}

/// Production handler that runs the synthesizer as a child process,
/// piping a `ResourceList` JSON document through stdin/stdout.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandler;

impl ProcessHandler {
    pub fn new() -> Self {
        Self
    }
}

impl SynthesizerHandler for ProcessHandler {
    fn synthesize(
        &self,
        synthesizer: Synthesizer,
        inputs: ResourceList,
    ) -> BoxFuture<'_, Result<ResourceList, SynthesisError>> {
        Box::pin(async move { run_process(&synthesizer, &inputs).await })
    }
}

async fn run_process(
    synthesizer: &Synthesizer,
    inputs: &ResourceList,
) -> Result<ResourceList, SynthesisError> {
    let command = if synthesizer.spec.command.is_empty() {
        vec![DEFAULT_COMMAND.to_string()]
    } else {
        synthesizer.spec.command.clone()
    };
    let timeout = synthesizer
        .spec
        .exec_timeout
        .unwrap_or(DEFAULT_EXEC_TIMEOUT);

    debug!(
        synthesizer = %synthesizer.metadata.name,
        command = %command[0],
        timeout = %timeout,
        "invoking synthesizer"
    );

    let mut child = tokio::process::Command::new(&command[0])
        .args(&command[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SynthesisError::MissingCommand(command[0].clone())
            } else {
                SynthesisError::Io(e)
            }
        })?;

    let mut stdin = child.stdin.take().expect("stdin was piped");
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    // Forward synthesizer stderr to our stdout so it cannot interleave
    // with structured log output on stderr.
    tokio::spawn(async move {
        let mut own_stdout = tokio::io::stdout();
        let _ = tokio::io::copy(&mut stderr, &mut own_stdout).await;
    });

    let input_bytes = serde_json::to_vec(inputs)?;
    let mut output_bytes = Vec::new();

    // Pump stdin and stdout together: a synthesizer may interleave
    // reading inputs with writing outputs, and either pipe stalls at its
    // buffer size if the other end is not drained. Write errors are left
    // to the exit status; a synthesizer may exit without reading stdin.
    let run = async {
        let write = async {
            let _ = stdin.write_all(&input_bytes).await;
            drop(stdin);
        };
        let (_, read) = tokio::join!(write, stdout.read_to_end(&mut output_bytes));
        read?;
        child.wait().await
    };

    let status = match tokio::time::timeout(timeout.unsigned_abs(), run).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return Err(SynthesisError::Io(e)),
        Err(_) => {
            warn!(synthesizer = %synthesizer.metadata.name, "synthesizer timed out, killing");
            let _ = child.start_kill();
            return Err(SynthesisError::SynthesizerTimeout(timeout));
        }
    };

    if !status.success() {
        return Err(SynthesisError::SynthesizerExit(status.to_string()));
    }

    serde_json::from_slice(&output_bytes).map_err(|e| {
        warn!(synthesizer = %synthesizer.metadata.name, error = %e, "unparseable synthesizer output");
        SynthesisError::SynthesizerBadOutput
    })
}

//! One-shot subprocess generator.
//!
//! The prompt goes to a uniquely named temp file that is reopened as the
//! child's stdin. The file is a [`NamedTempFile`], so it is removed when the
//! call returns on every path. The child runs in its own process group so a
//! timeout can kill anything it spawned.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use presswork_shared::{GatewayError, GatewayMode, SubprocessConfig};

use crate::{GenerateOptions, Generator, truncate_tail};

const PROMPT_FILE_PREFIX: &str = "presswork-prompt-";
const MAX_STDERR_CHARS: usize = 2000;

/// Runs an external program once per prompt.
#[derive(Debug, Clone)]
pub struct SubprocessGenerator {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl SubprocessGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, temp_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            temp_dir,
        }
    }

    pub fn from_config(config: &SubprocessConfig, temp_dir: PathBuf) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            temp_dir,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Generator for SubprocessGenerator {
    #[instrument(skip_all, fields(program = %self.program, prompt_len = prompt.len()))]
    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<String, GatewayError> {
        // Dropped at the end of this call, which deletes the file.
        let prompt_file = write_prompt(&self.temp_dir, prompt)?;
        let stdin = prompt_file
            .reopen()
            .map_err(|e| GatewayError::TempResource(format!("reopen prompt file: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| GatewayError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child.id();

        let outcome = tokio::time::timeout(opts.timeout, collect_output(&mut child)).await;

        let (status, stdout, stderr) = match outcome {
            Ok(Ok(collected)) => collected,
            Ok(Err(e)) => {
                return Err(GatewayError::Transport(format!("reading child output: {e}")));
            }
            Err(_) => {
                warn!(timeout_ms = opts.timeout.as_millis() as u64, "generation timed out, killing process group");
                kill_process_group(pid);
                // kill() also waits, which reaps the child.
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "child already exited");
                }
                return Err(GatewayError::Timeout {
                    after: opts.timeout,
                });
            }
        };

        if !status.success() {
            return Err(GatewayError::NonZeroExit {
                code: status.code(),
                stderr: truncate_tail(&String::from_utf8_lossy(&stderr), MAX_STDERR_CHARS),
            });
        }

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        if text.is_empty() {
            return Err(GatewayError::EmptyOutput);
        }

        debug!(output_len = text.len(), "subprocess generation complete");
        Ok(text)
    }

    fn mode(&self) -> GatewayMode {
        GatewayMode::Subprocess
    }
}

fn write_prompt(dir: &Path, prompt: &str) -> Result<NamedTempFile, GatewayError> {
    let mut file = tempfile::Builder::new()
        .prefix(PROMPT_FILE_PREFIX)
        .suffix(".txt")
        .tempfile_in(dir)
        .map_err(|e| GatewayError::TempResource(format!("create prompt file in {}: {e}", dir.display())))?;
    file.write_all(prompt.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| GatewayError::TempResource(format!("write prompt file: {e}")))?;
    Ok(file)
}

/// Read stdout and stderr concurrently while waiting for exit, so a chatty
/// child cannot block on a full pipe.
async fn collect_output(child: &mut Child) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            out.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };
    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(err) = stderr.as_mut() {
            err.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let (out, err, status) = tokio::join!(read_stdout, read_stderr, child.wait());
    Ok((status?, out?, err?))
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    // The child leads its own group, so its pid is the group id.
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str, temp_dir: &Path) -> SubprocessGenerator {
        SubprocessGenerator::new("sh", vec!["-c".into(), script.into()], temp_dir.to_path_buf())
    }

    fn opts(ms: u64) -> GenerateOptions {
        GenerateOptions::with_timeout(Duration::from_millis(ms))
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn prompt_is_piped_to_stdin() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = SubprocessGenerator::new("cat", vec![], tmp.path().to_path_buf());
        let out = generator.generate("hello gateway", &opts(5000)).await.unwrap();
        assert_eq!(out, "hello gateway");
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn timeout_kills_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = sh("sleep 0.5; echo late", tmp.path());

        let started = Instant::now();
        let err = generator.generate("prompt", &opts(100)).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, GatewayError::Timeout { .. }), "got {err:?}");
        assert!(err.is_transient());
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = sh("echo boom >&2; exit 3", tmp.path());

        match generator.generate("prompt", &opts(5000)).await.unwrap_err() {
            GatewayError::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn blank_output_is_empty_output() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = sh("printf '  \\n'", tmp.path());
        let err = generator.generate("prompt", &opts(5000)).await.unwrap_err();
        assert!(matches!(err, GatewayError::EmptyOutput));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = SubprocessGenerator::new(
            "presswork-no-such-program",
            vec![],
            tmp.path().to_path_buf(),
        );
        let err = generator.generate("prompt", &opts(1000)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Spawn { .. }));
        assert!(!err.is_transient());
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn working_dir_is_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("marker.txt"), "here").unwrap();

        let generator = sh("cat marker.txt", tmp.path()).with_working_dir(work.path());
        assert_eq!(generator.generate("x", &opts(5000)).await.unwrap(), "here");
    }
}

#[cfg(test)]
pub mod recording;
#[cfg(test)]
mod launch_test;

use std::{
    fs::{File, OpenOptions},
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn {exec:?}: {source}")]
    Spawn { exec: PathBuf, source: io::Error },
    #[error("Failed to open {path:?} for child output: {source}")]
    Redirect { path: PathBuf, source: io::Error },
    #[error("Failed to wait for a child proccess: {0}")]
    Wait(#[from] io::Error),
    #[error("Child {exec:?} exceeded timeout of {timeout:?}")]
    Timeout { exec: PathBuf, timeout: Duration },
}

/// where the output streams of a child end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// share the terminal of the harness
    Inherit,
    /// append stdout to a file, stderr stays on the terminal
    Append(PathBuf),
    /// truncate a file and send both stdout and stderr into it
    Log(PathBuf),
    /// pipe both streams back into `RunOutput`
    Capture,
}

/// a single blocking call of an external executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub exec: PathBuf,
    pub args: Vec<String>,
    pub sink: Sink,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self {
            exec: exec.into(),
            args: Vec::new(),
            sink: Sink::Inherit,
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// shell-like rendering, only used for logging
    pub fn command_line(&self) -> String {
        let mut line = self.exec.to_string_lossy().into_owned();

        for arg in self.args.iter() {
            line.push(' ');
            line.push_str(arg);
        }

        line
    }
}

#[derive(Debug, Clone)]
/// container for information extracted from running a benchmark binary
pub struct RunOutput {
    pub runtime: Duration,
    pub stdout: String,
    pub stderr: String,
    /// `None` if the child was terminated by a signal
    pub status: Option<i32>,
}

impl RunOutput {
    pub fn new() -> Self {
        Self {
            runtime: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl Default for RunOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs invocations to completion, one at a time.
pub trait Launcher {
    fn launch(&mut self, invocation: &Invocation) -> Result<RunOutput, LaunchError>;
}

impl<L: Launcher + ?Sized> Launcher for &mut L {
    fn launch(&mut self, invocation: &Invocation) -> Result<RunOutput, LaunchError> {
        (**self).launch(invocation)
    }
}

/// Launcher backed by real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

fn open_sink(path: &Path, append: bool) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.create(true);

    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }

    options.open(path).map_err(|source| LaunchError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();

        if let Some(mut pipe) = pipe {
            if let Err(error) = pipe.read_to_string(&mut buffer) {
                warn!(error = ?error, "Failed to read child output");
            }
        }

        buffer
    })
}

/// kill and reap a child that is abandoned, so it neither keeps running nor lingers as a zombie
fn reap(child: &mut Child) {
    if let Err(error) = child.kill() {
        warn!(error = ?error, "Failed to kill child {}", child.id());
    }

    if let Err(error) = child.wait() {
        warn!(error = ?error, "Failed to reap child {}", child.id());
    }
}

fn wait(child: &mut Child, invocation: &Invocation) -> Result<Option<i32>, LaunchError> {
    let waited = match invocation.timeout {
        Some(timeout) => child.wait_timeout(timeout),
        None => child.wait().map(Some),
    };

    match waited {
        Ok(Some(status)) => Ok(status.code()),
        Ok(None) => {
            reap(child);

            Err(LaunchError::Timeout {
                exec: invocation.exec.clone(),
                timeout: invocation.timeout.unwrap_or_default(),
            })
        }
        Err(error) => {
            reap(child);

            Err(LaunchError::Wait(error))
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, invocation: &Invocation) -> Result<RunOutput, LaunchError> {
        let mut command = Command::new(&invocation.exec);
        command.args(invocation.args.iter());

        match &invocation.sink {
            Sink::Inherit => {}
            Sink::Append(path) => {
                command.stdout(open_sink(path, true)?);
            }
            Sink::Log(path) => {
                let file = open_sink(path, false)?;
                let stderr = file.try_clone().map_err(|source| LaunchError::Redirect {
                    path: path.clone(),
                    source,
                })?;
                command.stdout(file).stderr(stderr);
            }
            Sink::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            exec: invocation.exec.clone(),
            source,
        })?;

        // pipes are drained concurrently, a chatty child would block on a full pipe otherwise
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait(&mut child, invocation);
        let runtime = start.elapsed();
        // the pipes close once the child is gone, so the drains finish on every path
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        let output = RunOutput {
            runtime,
            stdout,
            stderr,
            status: status?,
        };

        debug!(
            "Finished in {} ms | status: {:?}",
            output.runtime.as_millis(),
            output.status
        );
        trace!("Output: {}", output.stdout);

        Ok(output)
    }
}

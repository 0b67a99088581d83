use super::{Invocation, LaunchError, Launcher, RunOutput};
use std::{fs, io, path::PathBuf};

type Behavior = Box<dyn FnMut(&Invocation) -> Result<RunOutput, LaunchError>>;

/// Launcher double that records every invocation instead of spawning processes
pub struct RecordingLauncher {
    pub invocations: Vec<Invocation>,
    behavior: Behavior,
}

impl RecordingLauncher {
    pub fn new(
        behavior: impl FnMut(&Invocation) -> Result<RunOutput, LaunchError> + 'static,
    ) -> Self {
        Self {
            invocations: Vec::new(),
            behavior: Box::new(behavior),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(RunOutput::new()))
    }

    /// behaves like a binary that is not installed
    pub fn missing() -> Self {
        Self::new(|invocation| {
            Err(LaunchError::Spawn {
                exec: invocation.exec.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })
        })
    }

    /// behaves like the database binary: writes its arguments to the file following `-o`
    pub fn writing_output() -> Self {
        Self::new(|invocation| {
            if let Some(path) = output_path(invocation) {
                fs::write(&path, format!("{}\n", invocation.args[2..].join(" ")))
                    .expect("failed to write fake output");
            }

            Ok(RunOutput::new())
        })
    }

    pub fn args(&self) -> Vec<Vec<String>> {
        self.invocations
            .iter()
            .map(|invocation| invocation.args.clone())
            .collect()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&mut self, invocation: &Invocation) -> Result<RunOutput, LaunchError> {
        self.invocations.push(invocation.clone());
        (self.behavior)(invocation)
    }
}

pub fn output_path(invocation: &Invocation) -> Option<PathBuf> {
    invocation
        .args
        .iter()
        .position(|arg| arg == "-o")
        .and_then(|index| invocation.args.get(index + 1))
        .map(PathBuf::from)
}

use super::ExecutorError;
use std::{
    io,
    path::Path,
    process::{Child, Command, ExitStatus},
};
use tracing::debug;

/// How a simulation process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    /// non-zero exit, `None` if the process was killed by a signal
    Failure(Option<i32>),
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failure(status.code())
        }
    }
}

/// A launched simulation that can be polled without blocking
pub trait Process {
    fn id(&self) -> u32;

    /// `None` while the process is still running
    fn try_finish(&mut self) -> io::Result<Option<Termination>>;

    /// terminate the process and wait for it
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts the simulation executable against a written input file
pub trait Launcher {
    type Process: Process;

    fn launch(&mut self, executable: &str, input: &Path) -> Result<Self::Process, ExecutorError>;
}

impl Process for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn try_finish(&mut self) -> io::Result<Option<Termination>> {
        Ok(self.try_wait()?.map(Termination::from))
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)?;
        self.wait().map(|_| ())
    }
}

/// Launches detached child processes, stdio is inherited
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    type Process = Child;

    fn launch(&mut self, executable: &str, input: &Path) -> Result<Child, ExecutorError> {
        debug!(executable, input = ?input, "Spawning simulation");

        Command::new(executable)
            .arg(input)
            .spawn()
            .map_err(|error| ExecutorError::Launch {
                executable: executable.to_owned(),
                error,
            })
    }
}

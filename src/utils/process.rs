use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// One external tool invocation, kept as data until it is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Short name of the step, used in errors and logs.
    pub step: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(step: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            step,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// True if `flag` appears as a whole argument.
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Run to completion. Output is captured and only logged on failure.
    pub fn run(&self) -> Result<()> {
        info!("Running {}", self.step);
        debug!("{}", self);

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            error!("{} output:\n{}", self.step, captured.trim_end());
            return Err(Error::ToolFailed {
                step: self.step,
                program: self.program.clone(),
                status: output.status,
                output: captured,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Run each invocation in order, stopping at the first failure.
pub fn run_all(plan: &[Invocation]) -> Result<()> {
    for invocation in plan {
        invocation.run()?;
    }
    Ok(())
}

//! Host capability probing.
//!
//! Every backend and boot-image regenerator declares what it needs from the
//! host: a set of machine architectures it runs on, executables that must
//! be on the search path, and data files that must exist. [`Probe::check`]
//! turns those [`Requirements`] into either the resolved tool paths or the
//! first reason the candidate cannot run.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Why a candidate failed its probe.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unavailable {
    #[error("machine type {0} is not supported")]
    Arch(String),
    #[error("{0} was not found in PATH")]
    Tool(String),
    #[error("required file {} is missing", .0.display())]
    File(PathBuf),
}

/// What a candidate needs from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Machine types (`uname -m`) the candidate runs on. Empty means any.
    pub arches: Vec<&'static str>,
    /// Executables resolved through the search path.
    pub tools: Vec<&'static str>,
    /// Data files that must exist. Order matters, callers index into it.
    pub files: Vec<PathBuf>,
}

/// Absolute tool paths recorded by a successful probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    programs: BTreeMap<&'static str, PathBuf>,
}

impl Resolved {
    /// Path recorded for `tool`, or the bare name if it was never probed.
    pub fn program(&self, tool: &str) -> PathBuf {
        self.programs
            .get(tool)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tool))
    }
}

/// Checks [`Requirements`] against one host.
#[derive(Debug, Clone)]
pub struct Probe {
    machine: String,
    search_path: Option<OsString>,
    cwd: PathBuf,
}

impl Probe {
    /// Probe the running host: its `uname -m` and `$PATH`.
    pub fn host() -> Self {
        Self::new(host_machine(), std::env::var_os("PATH"))
    }

    /// Probe with an explicit machine type and search path.
    pub fn new(machine: impl Into<String>, search_path: Option<OsString>) -> Self {
        Self {
            machine: machine.into(),
            search_path,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Check every requirement. Nothing is recorded unless all of them pass.
    pub fn check(&self, req: &Requirements) -> Result<Resolved, Unavailable> {
        if !req.arches.is_empty() && !req.arches.iter().any(|a| *a == self.machine) {
            return Err(Unavailable::Arch(self.machine.clone()));
        }

        let mut programs = BTreeMap::new();
        for tool in &req.tools {
            let path = which::which_in(tool, self.search_path.as_ref(), &self.cwd)
                .map_err(|_| Unavailable::Tool(tool.to_string()))?;
            debug!("Resolved {} -> {}", tool, path.display());
            programs.insert(*tool, path);
        }

        if let Some(missing) = req.files.iter().find(|f| !Path::new(f).exists()) {
            return Err(Unavailable::File(missing.clone()));
        }

        Ok(Resolved { programs })
    }
}

/// Machine hardware name, as `uname -m` prints it.
#[cfg(unix)]
pub fn host_machine() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => uts.machine().to_string_lossy().into_owned(),
        Err(_) => std::env::consts::ARCH.to_string(),
    }
}

#[cfg(not(unix))]
pub fn host_machine() -> String {
    std::env::consts::ARCH.to_string()
}

//! Drivers for the compiled C++ simulation of generated code.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::{AttentionError, Result};

/// Runs a compiled simulation inside its code generation directory.
///
/// Implementations must leave `out.npy` in `code_gen_dir` on success. The
/// call blocks until the simulation finishes.
pub trait PrecompiledSimulator {
    fn run(&self, code_gen_dir: &Path) -> Result<()>;
}

/// Executes the compiled simulation binary as a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSimulator {
    executable: PathBuf,
}

impl ProcessSimulator {
    /// Binary name produced when compiling the generated simulation.
    pub const DEFAULT_EXECUTABLE: &'static str = "node_model";

    /// Simulator running `executable`, resolved against the code generation
    /// directory when relative.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl Default for ProcessSimulator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EXECUTABLE)
    }
}

impl PrecompiledSimulator for ProcessSimulator {
    fn run(&self, code_gen_dir: &Path) -> Result<()> {
        let program = code_gen_dir.join(&self.executable);
        log::info!("attention::simulator running {}", program.display());

        let output = Command::new(&program)
            .current_dir(code_gen_dir)
            .output()
            .map_err(|err| {
                AttentionError::Simulation(format!(
                    "failed to launch {}: {err}",
                    program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AttentionError::Simulation(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }
        log::debug!(
            "attention::simulator finished: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

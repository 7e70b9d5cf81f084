//! How an operator computes its output when the graph is executed.
//!
//! The mode is chosen per call from its string name and never stored on the
//! operator, so the same operator can be checked in reference mode and then
//! against its compiled simulation.

pub mod artifacts;
pub mod simulator;

use std::{fmt, str::FromStr};

use crate::core::{AttentionError, Result};

pub use artifacts::{clear_output, read_output, write_folded_input};
pub use simulator::{PrecompiledSimulator, ProcessSimulator};

/// Execution backends of an attention operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// In-process numeric attention.
    Reference,
    /// Compiled C++ simulation of the generated code.
    Precompiled,
    /// Simulation of the synthesized hardware.
    HardwareSim,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Reference => "reference",
            ExecutionMode::Precompiled => "precompiled",
            ExecutionMode::HardwareSim => "hardwareSim",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = AttentionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reference" => Ok(ExecutionMode::Reference),
            "precompiled" => Ok(ExecutionMode::Precompiled),
            "hardwareSim" => Ok(ExecutionMode::HardwareSim),
            other => Err(AttentionError::invalid_config(
                "exec_mode",
                format!("'{other}' is not one of reference, precompiled, hardwareSim"),
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

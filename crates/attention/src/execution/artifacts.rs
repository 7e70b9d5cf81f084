//! `.npy` files exchanged with the compiled simulation.
//!
//! Inputs are written pre-folded as `[outer, fold, lanes]` so the simulation
//! can stream them word by word; the output comes back folded the same way.
//! All artifacts hold `f32` elements.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use candle_core::{DType, Tensor};

use crate::core::{AttentionError, Result};
use crate::folding::FoldedShape;

/// Name of the output artifact written by the simulation.
pub const OUTPUT_ARTIFACT: &str = "out.npy";

fn reshape_checked(tensor: &Tensor, dims: &[usize], name: &str) -> Result<Tensor> {
    let expected: usize = dims.iter().product();
    if tensor.elem_count() != expected {
        return Err(AttentionError::InvalidShape {
            context: format!(
                "{name} has {} elements ({:?}), expected {expected} ({dims:?})",
                tensor.elem_count(),
                tensor.dims()
            ),
        });
    }
    Ok(tensor.to_dtype(DType::F32)?.reshape(dims)?)
}

/// Writes `tensor` folded to `folded` as `<dir>/<stream>.npy`.
pub fn write_folded_input(
    dir: &Path,
    stream: &str,
    tensor: &Tensor,
    folded: FoldedShape,
) -> Result<PathBuf> {
    let folded_tensor = reshape_checked(tensor, &folded.dims(), stream)?;
    let path = dir.join(format!("{stream}.npy"));
    folded_tensor.write_npy(&path)?;
    log::debug!(
        "attention::artifacts wrote {} with shape {:?}",
        path.display(),
        folded.dims()
    );
    Ok(path)
}

/// Removes an output left behind by an earlier simulation run.
pub fn clear_output(dir: &Path) -> Result<()> {
    let path = dir.join(OUTPUT_ARTIFACT);
    match fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("attention::artifacts removed stale {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Reads `<dir>/out.npy` and unfolds it to `normal_shape`.
pub fn read_output(dir: &Path, normal_shape: (usize, usize)) -> Result<Tensor> {
    let path = dir.join(OUTPUT_ARTIFACT);
    if !path.is_file() {
        return Err(AttentionError::Simulation(format!(
            "simulation produced no output at {}",
            path.display()
        )));
    }
    let folded = Tensor::read_npy(&path)?;
    reshape_checked(&folded, &[normal_shape.0, normal_shape.1], OUTPUT_ARTIFACT)
}

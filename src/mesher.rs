//! External mesh-format conversion via ElmerGrid
//!
//! ElmerGrid must be installed and on the PATH. The call is synchronous:
//! the converter runs to completion before deck generation proceeds.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{ExportError, ExportResult};

pub const ELMERGRID_BIN: &str = "ElmerGrid";

/// Convert `<project>.msh` (Gmsh format) into an Elmer mesh directory at
/// `<project>/`. Format codes 14 -> 2 select Gmsh input and Elmer output.
pub fn convert_mesh(project: &Path) -> ExportResult<()> {
    convert_mesh_with(ELMERGRID_BIN, project)
}

/// The `.msh` suffix is appended, so dotted project names keep their stem
fn gmsh_path(project: &Path) -> PathBuf {
    let mut name = project.as_os_str().to_os_string();
    name.push(".msh");
    PathBuf::from(name)
}

pub fn convert_mesh_with(converter: &str, project: &Path) -> ExportResult<()> {
    let gmsh_file = gmsh_path(project);
    let mut cmd = Command::new(converter);
    cmd.arg("14")
        .arg("2")
        .arg(&gmsh_file)
        .arg("-2d")
        .arg("-out")
        .arg(project);
    debug!(command = ?cmd, "calling ElmerGrid");

    let output = cmd
        .output()
        .map_err(|source| ExportError::MeshConverterUnavailable {
            command: converter.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(%stderr, "ElmerGrid failed");
        return Err(ExportError::MeshConvert {
            status: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    debug!("ElmerGrid call complete");
    Ok(())
}

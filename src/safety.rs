//! Guards against overwriting collected snapshots.
//!
//! Archive and channel snapshots are expensive to re-collect, so every
//! file the pipeline writes is validated against them first.

use anyhow::{bail, Result};
use std::path::Path;

/// Snapshot names produced by the collection layer; never valid outputs.
const INPUT_SNAPSHOT_NAMES: [&str; 2] = ["scenes.json", "channel_videos.json"];

/// Validates that an output path is safe to overwrite.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g., "full_data", "report")
/// - Output cannot be the same as any of the provided source paths
/// - Output cannot be named like an input snapshot
///
/// # Arguments
/// * `output` - The output path that will be created/overwritten
/// * `required_pattern` - Pattern that must appear in the output filename
/// * `source_paths` - Slice of source paths that must not match the output
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        let same = match (output.canonicalize(), source.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => output == *source,
        };
        if same {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    for name in INPUT_SNAPSHOT_NAMES {
        if output_name == name {
            bail!(
                "Safety check failed: output '{}' would overwrite the {} snapshot",
                output.display(),
                name
            );
        }
    }

    Ok(())
}

//! Read → apply → write once → report.

use crate::config::{self, ConfigError, LoadedPatchSet};
use crate::document::Document;
use crate::edit::{apply_edits, Edit};
use crate::file::{self, FileError};
use crate::report::{PatchReport, WriteMode};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal failures. Unresolved anchors are not errors; they show up in the report.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Destination; `None` overwrites the input.
    pub output: Option<PathBuf>,
    /// Report only, never write.
    pub dry_run: bool,
    /// Save `<input>.backup` before overwriting the input.
    pub backup: bool,
}

/// Everything a caller needs to print a summary or a diff.
#[derive(Debug, Clone)]
pub struct PatchRun {
    pub report: PatchReport,
    pub before: Document,
    pub after: Document,
}

/// Apply `edits` to the file at `input`.
///
/// The destination is written at most once, after every edit has been
/// applied in memory, and only through an atomic replace.
pub fn patch_file(
    input: &Path,
    edits: &[Edit],
    options: &PatchOptions,
) -> Result<PatchRun, PatchError> {
    let before = file::read_document(input)?;
    let patched = apply_edits(&before, edits);

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| input.to_path_buf());
    let in_place = same_file(&output, input);
    let changed = patched.document != before;

    let mode = if options.dry_run {
        WriteMode::DryRun
    } else if in_place && !changed {
        WriteMode::Unchanged
    } else {
        WriteMode::Written
    };

    let mut backup = None;
    if mode == WriteMode::Written {
        if options.backup && in_place {
            backup = Some(file::write_backup(input)?);
        }
        file::atomic_write(&output, patched.document.as_str().as_bytes())?;
        tracing::info!(
            output = %output.display(),
            bytes = patched.document.len(),
            "patched document written"
        );
    }

    let report = PatchReport::new(
        input.to_path_buf(),
        output,
        &before,
        &patched.document,
        patched.manifest,
        mode,
    )
    .with_backup(backup);

    Ok(PatchRun {
        report,
        before,
        after: patched.document,
    })
}

/// Whether two paths name the same file, looking through `.`/`..` and links.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Find and load patch sets: `patches` when given, otherwise the default
/// locations next to `input` and in the working directory.
pub fn load_patch_sets(
    patches: Option<&Path>,
    input: Option<&Path>,
) -> Result<Vec<LoadedPatchSet>, PatchError> {
    let paths = config::locate_patch_sets(patches, input)?;
    let sets = config::load_all(&paths)?;
    for set in &sets {
        tracing::debug!(name = %set.name, edits = set.edits.len(), "patch set loaded");
    }
    Ok(sets)
}

/// Apply every edit of `sets`, set by set, in file order.
pub fn patch_with_sets(
    input: &Path,
    sets: &[LoadedPatchSet],
    options: &PatchOptions,
) -> Result<PatchRun, PatchError> {
    let edits: Vec<Edit> = sets.iter().flat_map(|set| set.edits.iter().cloned()).collect();
    patch_file(input, &edits, options)
}

/// Locate and load patch sets, then apply all of their edits in file order.
pub fn run(
    input: &Path,
    patches: Option<&Path>,
    options: &PatchOptions,
) -> Result<PatchRun, PatchError> {
    let sets = load_patch_sets(patches, Some(input))?;
    patch_with_sets(input, &sets, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;
    use crate::report::ExitStatus;
    use std::fs;

    #[test]
    fn writes_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let run = patch_file(&input, &edits, &PatchOptions::default()).unwrap();

        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>XY</div>");
        assert_eq!(run.report.mode, WriteMode::Written);
        assert_eq!(run.report.status(), ExitStatus::Clean);
    }

    #[test]
    fn dry_run_leaves_file_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let run = patch_file(&input, &edits, &options).unwrap();

        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>X</div>");
        assert_eq!(run.after.as_str(), "<div>XY</div>");
        assert_eq!(run.report.mode, WriteMode::DryRun);
    }

    #[test]
    fn separate_output_keeps_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        let output = temp_dir.path().join("game.patched.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            output: Some(output.clone()),
            ..Default::default()
        };
        patch_file(&input, &edits, &options).unwrap();

        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>X</div>");
        assert_eq!(fs::read_to_string(&output).unwrap(), "<div>XY</div>");
    }

    #[test]
    fn unchanged_document_is_not_rewritten() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("z", Anchor::literal("Z"), "!")];
        let run = patch_file(&input, &edits, &PatchOptions::default()).unwrap();

        assert_eq!(run.report.mode, WriteMode::Unchanged);
        assert_eq!(run.report.status(), ExitStatus::Incomplete);
    }

    #[test]
    fn backup_written_before_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            backup: true,
            ..Default::default()
        };
        let run = patch_file(&input, &edits, &options).unwrap();

        let backup = temp_dir.path().join("game.jsx.backup");
        assert_eq!(run.report.backup.as_deref(), Some(backup.as_path()));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "<div>X</div>");
        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>XY</div>");
    }

    #[test]
    fn output_alias_of_input_counts_as_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            output: Some(temp_dir.path().join("sub/../game.jsx")),
            backup: true,
            ..Default::default()
        };
        let run = patch_file(&input, &edits, &options).unwrap();

        assert_eq!(run.report.mode, WriteMode::Written);
        assert!(run.report.backup.is_some());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("game.jsx.backup")).unwrap(),
            "<div>X</div>"
        );

        let again = patch_file(&input, &edits, &options).unwrap();
        assert_eq!(again.report.mode, WriteMode::Unchanged);
    }

    #[test]
    fn missing_source_is_fatal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("missing.jsx");
        let err = patch_file(&input, &[], &PatchOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PatchError::File(FileError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn failed_write_keeps_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            output: Some(temp_dir.path().join("missing-dir/out.jsx")),
            ..Default::default()
        };
        let err = patch_file(&input, &edits, &options).unwrap_err();

        assert!(matches!(err, PatchError::File(FileError::WriteFailed { .. })));
        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>X</div>");
    }

    #[test]
    fn failed_backup_keeps_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();
        // A directory squatting on the backup name makes the copy fail.
        fs::create_dir(temp_dir.path().join("game.jsx.backup")).unwrap();

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let options = PatchOptions {
            backup: true,
            ..Default::default()
        };
        let err = patch_file(&input, &edits, &options).unwrap_err();

        assert!(matches!(err, PatchError::File(FileError::BackupFailed { .. })));
        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>X</div>");
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_directory_keeps_source_in_place() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("locked");
        fs::create_dir(&dir).unwrap();
        let input = dir.join("game.jsx");
        fs::write(&input, "<div>X</div>").unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users bypass directory permissions; nothing to check then.
        let canary = dir.join("canary");
        if fs::write(&canary, "").is_ok() {
            fs::remove_file(&canary).unwrap();
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let result = patch_file(&input, &edits, &PatchOptions::default());
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, PatchError::File(FileError::WriteFailed { .. })));
        assert_eq!(fs::read_to_string(&input).unwrap(), "<div>X</div>");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }
}

//! Patch summaries.
//!
//! A [`PatchReport`] is built from the before/after documents and the edit
//! manifest. It always lists every edit by name so a human can decide what to
//! hand-patch when something was skipped.

use crate::document::Document;
use crate::edit::{EditOutcome, EditRecord};
use colored::Colorize;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Process exit status for a patch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Every edit applied or was already present.
    Clean,
    /// At least one edit was skipped.
    Incomplete,
    /// I/O failure or unusable patch set.
    Fatal,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Incomplete => 1,
            ExitStatus::Fatal => 2,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}

/// Size metrics for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocStats {
    pub bytes: usize,
    pub chars: usize,
    pub lines: usize,
    #[serde(serialize_with = "hex_fingerprint")]
    pub xxh3: u64,
}

fn hex_fingerprint<S: serde::Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{value:016x}"))
}

impl DocStats {
    pub fn of(document: &Document) -> Self {
        Self {
            bytes: document.len(),
            chars: document.char_count(),
            lines: document.line_count(),
            xxh3: document.fingerprint(),
        }
    }
}

/// How the run treated the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Destination written.
    Written,
    /// Dry run; nothing written.
    DryRun,
    /// Nothing changed and destination is the source; nothing written.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: WriteMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub original: DocStats,
    pub patched: DocStats,
    pub edits: Vec<EditRecord>,
}

impl PatchReport {
    pub fn new(
        input: PathBuf,
        output: PathBuf,
        before: &Document,
        after: &Document,
        edits: Vec<EditRecord>,
        mode: WriteMode,
    ) -> Self {
        Self {
            input,
            output,
            mode,
            backup: None,
            original: DocStats::of(before),
            patched: DocStats::of(after),
            edits,
        }
    }

    pub fn with_backup(mut self, backup: Option<PathBuf>) -> Self {
        self.backup = backup;
        self
    }

    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, EditOutcome::Applied { .. }))
    }

    pub fn already_applied(&self) -> usize {
        self.count(|o| matches!(o, EditOutcome::AlreadyApplied { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(EditOutcome::is_skipped)
    }

    fn count(&self, pred: impl Fn(&EditOutcome) -> bool) -> usize {
        self.edits.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn byte_delta(&self) -> i64 {
        self.patched.bytes as i64 - self.original.bytes as i64
    }

    pub fn char_delta(&self) -> i64 {
        self.patched.chars as i64 - self.original.chars as i64
    }

    pub fn lines_added(&self) -> i64 {
        self.patched.lines as i64 - self.original.lines as i64
    }

    pub fn status(&self) -> ExitStatus {
        if self.skipped() > 0 {
            ExitStatus::Incomplete
        } else {
            ExitStatus::Clean
        }
    }

    /// Human-readable summary, one line per edit followed by the totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let dry = self.mode == WriteMode::DryRun;

        for record in &self.edits {
            match &record.outcome {
                EditOutcome::Applied { offset, bytes } => {
                    let verb = if dry { "Would insert" } else { "Inserted" };
                    let _ = writeln!(
                        out,
                        "{} {}: {verb} {bytes} bytes at {offset}",
                        "✓".green(),
                        record.id
                    );
                }
                EditOutcome::AlreadyApplied { .. } => {
                    let _ = writeln!(out, "{} {}: Already applied", "⊙".yellow(), record.id);
                }
                EditOutcome::Skipped { error, suggestion } => {
                    let _ = writeln!(out, "{} {}: Skipped - {}", "✗".red(), record.id, error);
                    if let Some(line) = suggestion {
                        let _ = writeln!(out, "  closest: {}", line.dimmed());
                    }
                }
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Summary:".bold());
        let _ = writeln!(out, "  {} applied", self.applied().to_string().green());
        let _ = writeln!(
            out,
            "  {} already applied",
            self.already_applied().to_string().yellow()
        );
        let _ = writeln!(out, "  {} skipped", self.skipped().to_string().red());
        let _ = writeln!(
            out,
            "  size: {} -> {} bytes ({:+}), {} -> {} chars ({:+})",
            self.original.bytes,
            self.patched.bytes,
            self.byte_delta(),
            self.original.chars,
            self.patched.chars,
            self.char_delta()
        );
        let _ = writeln!(out, "  lines added: {}", self.lines_added());
        let _ = writeln!(
            out,
            "  xxh3: {:016x} -> {:016x}",
            self.original.xxh3, self.patched.xxh3
        );

        match self.mode {
            WriteMode::Written => {
                let _ = writeln!(out, "  wrote {}", self.output.display());
            }
            WriteMode::DryRun => {
                let _ = writeln!(out, "  {}", "dry run: nothing written".cyan());
            }
            WriteMode::Unchanged => {
                let _ = writeln!(out, "  {} unchanged", self.output.display());
            }
        }
        if let Some(backup) = &self.backup {
            let _ = writeln!(out, "  backup saved to {}", backup.display());
        }

        out
    }
}

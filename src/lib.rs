//! Anchor Patch: one-shot, idempotent text-anchor patching
//!
//! Splices fixed text fragments into a UTF-8 document at locations found by
//! substring or regex search. No parsing; the document is an opaque blob.
//!
//! # Architecture
//!
//! - [`Anchor`] describes where: a needle, which occurrence, and an optional
//!   search window built from raw bounds or other anchors.
//! - [`Edit`] describes what: a fragment placed before, after, or in place of
//!   an anchor's match.
//! - [`apply_edits`] runs edits in declared order, re-resolving every anchor
//!   against the document produced so far, and returns a per-edit manifest.
//! - [`patch_file`] reads the source once, applies everything in memory, and
//!   writes the result once.
//!
//! # Safety
//!
//! - An unresolved anchor skips its edit and never aborts the others
//! - Edits already present are detected and reported, not duplicated
//! - Atomic file writes (tempfile + fsync + rename)
//! - UTF-8 validation on read
//!
//! # Example
//!
//! ```
//! use anchor_patch::{apply_edits, Anchor, Document, Edit};
//!
//! let doc = Document::new("<div>X</div>");
//! let edits = [Edit::new("after-x", Anchor::literal("X"), "Y")];
//!
//! let patched = apply_edits(&doc, &edits);
//! assert_eq!(patched.document.as_str(), "<div>XY</div>");
//! assert_eq!(patched.applied(), 1);
//! ```

pub mod anchor;
pub mod config;
pub mod document;
pub mod edit;
pub mod file;
pub mod patcher;
pub mod report;

// Re-exports
pub use anchor::{Anchor, Needle, Occurrence, ResolveError, ScopeSide, Span};
pub use config::{load_from_path, load_from_str, ConfigError, LoadedPatchSet, PatchSet};
pub use document::{Document, DocumentError};
pub use edit::{apply_edits, Edit, EditOutcome, EditRecord, Patched, Placement};
pub use file::FileError;
pub use patcher::{patch_file, PatchError, PatchOptions, PatchRun};
pub use report::{DocStats, ExitStatus, PatchReport, WriteMode};

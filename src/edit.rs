use crate::anchor::{Anchor, ResolveError, Span};
use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an edit's text goes relative to its resolved anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Immediately before the matched text.
    Before,
    /// Immediately after the matched text.
    #[default]
    After,
    /// In place of the matched text.
    Replace,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Before => write!(f, "before"),
            Placement::After => write!(f, "after"),
            Placement::Replace => write!(f, "replace"),
        }
    }
}

/// The patch primitive: insert a fixed fragment relative to an anchor.
///
/// Edits never carry precomputed offsets. The anchor is resolved against the
/// document as it stands when the edit's turn comes, so earlier insertions
/// cannot shift it onto the wrong text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until applied with apply_edits()"]
pub struct Edit {
    /// Name shown in the summary.
    pub id: String,
    pub anchor: Anchor,
    /// Tried in order when `anchor` does not resolve.
    pub fallbacks: Vec<Anchor>,
    pub placement: Placement,
    pub text: String,
    /// When this text already occurs anywhere, the edit counts as applied.
    pub unless_present: Option<String>,
}

/// Per-edit outcome recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[must_use = "EditOutcome should be checked for applied/skipped"]
pub enum EditOutcome {
    /// Text was spliced in at `offset`.
    Applied { offset: usize, bytes: usize },
    /// The document already carries this edit.
    AlreadyApplied { offset: Option<usize> },
    /// No candidate anchor resolved; the document is unchanged by this edit.
    Skipped {
        error: ResolveError,
        suggestion: Option<String>,
    },
}

impl EditOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, EditOutcome::Skipped { .. })
    }
}

impl fmt::Display for EditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOutcome::Applied { offset, bytes } => {
                write!(f, "inserted {bytes} bytes at {offset}")
            }
            EditOutcome::AlreadyApplied { offset: Some(offset) } => {
                write!(f, "already applied at {offset}")
            }
            EditOutcome::AlreadyApplied { offset: None } => write!(f, "already applied"),
            EditOutcome::Skipped { error, .. } => write!(f, "anchor not resolved: {error}"),
        }
    }
}

/// One manifest line: which edit, and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRecord {
    pub id: String,
    #[serde(flatten)]
    pub outcome: EditOutcome,
}

/// The final document plus the manifest of every edit, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub document: Document,
    pub manifest: Vec<EditRecord>,
}

impl Patched {
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
        self.manifest.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl Edit {
    /// Insert `text` after the first occurrence of `anchor`.
    pub fn new(id: impl Into<String>, anchor: Anchor, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            anchor,
            fallbacks: Vec::new(),
            placement: Placement::After,
            text: text.into(),
            unless_present: None,
        }
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn before(self) -> Self {
        self.placement(Placement::Before)
    }

    pub fn replacing(self) -> Self {
        self.placement(Placement::Replace)
    }

    pub fn fallback(mut self, anchor: Anchor) -> Self {
        self.fallbacks.push(anchor);
        self
    }

    pub fn unless_present(mut self, marker: impl Into<String>) -> Self {
        self.unless_present = Some(marker.into());
        self
    }

    /// Resolve the primary anchor, then each fallback in turn.
    ///
    /// On total failure the primary anchor's error is returned.
    fn locate(&self, text: &str) -> Result<Span, ResolveError> {
        let primary = match self.anchor.resolve(text) {
            Ok(span) => return Ok(span),
            Err(e) => e,
        };
        for (idx, fallback) in self.fallbacks.iter().enumerate() {
            if let Ok(span) = fallback.resolve(text) {
                tracing::debug!(edit = %self.id, fallback = idx, "primary anchor missed; fallback resolved");
                return Ok(span);
            }
        }
        Err(primary)
    }

    /// Work out what this edit would do to `document`.
    fn plan(&self, document: &Document) -> Plan {
        let text = document.as_str();

        if let Some(marker) = &self.unless_present {
            if document.contains(marker) {
                return Plan::Done(EditOutcome::AlreadyApplied { offset: None });
            }
        }

        let span = match self.locate(text) {
            Ok(span) => span,
            Err(error) => {
                if self.placement == Placement::Replace
                    && !self.text.is_empty()
                    && document.contains(&self.text)
                {
                    return Plan::Done(EditOutcome::AlreadyApplied {
                        offset: text.find(self.text.as_str()),
                    });
                }
                let suggestion = self.anchor.suggest(text);
                return Plan::Done(EditOutcome::Skipped { error, suggestion });
            }
        };

        match self.placement {
            Placement::After => self.insert_at(text, span.end),
            Placement::Before => self.insert_at(text, span.start),
            Placement::Replace => {
                if text[span.start..span.end] == self.text {
                    Plan::Done(EditOutcome::AlreadyApplied {
                        offset: Some(span.start),
                    })
                } else {
                    Plan::Splice(span)
                }
            }
        }
    }

    /// Insert at `at` unless the fragment is already in the document.
    ///
    /// The spot next to the anchor is checked first for an exact offset. Any
    /// other occurrence also counts: a neighbouring edit may have landed in
    /// between, or the fragment may carry a copy of its own anchor.
    fn insert_at(&self, text: &str, at: usize) -> Plan {
        let adjacent = match self.placement {
            Placement::Before => text[..at]
                .ends_with(self.text.as_str())
                .then(|| at - self.text.len()),
            _ => text[at..].starts_with(self.text.as_str()).then_some(at),
        };
        match adjacent.or_else(|| text.find(self.text.as_str())) {
            Some(offset) => Plan::Done(EditOutcome::AlreadyApplied {
                offset: Some(offset),
            }),
            None => Plan::Splice(Span::new(at, at)),
        }
    }
}

enum Plan {
    Done(EditOutcome),
    Splice(Span),
}

/// Apply `edits` to `document` strictly in order.
///
/// Each edit sees the document produced by every edit before it. An edit whose
/// anchor cannot be resolved is recorded as skipped and the rest still run.
/// Nothing touches the filesystem.
pub fn apply_edits(document: &Document, edits: &[Edit]) -> Patched {
    let mut current = document.clone();
    let mut manifest = Vec::with_capacity(edits.len());

    for edit in edits {
        let outcome = match edit.plan(&current) {
            Plan::Done(outcome) => outcome,
            Plan::Splice(span) => match current.replace(span, &edit.text) {
                Ok(next) => {
                    current = next;
                    EditOutcome::Applied {
                        offset: span.start,
                        bytes: edit.text.len(),
                    }
                }
                // resolve() only yields in-range, char-aligned spans.
                Err(_) => EditOutcome::Skipped {
                    error: ResolveError::InvalidBound {
                        offset: span.start,
                        len: current.len(),
                    },
                    suggestion: None,
                },
            },
        };

        match &outcome {
            EditOutcome::Skipped { error, suggestion } => {
                tracing::warn!(edit = %edit.id, %error, suggestion = ?suggestion, "edit skipped");
            }
            other => tracing::debug!(edit = %edit.id, outcome = %other, "edit planned"),
        }

        manifest.push(EditRecord {
            id: edit.id.clone(),
            outcome,
        });
    }

    Patched {
        document: current,
        manifest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text)
    }

    #[test]
    fn insert_after_anchor() {
        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let patched = apply_edits(&doc("<div>X</div>"), &edits);

        assert_eq!(patched.document.as_str(), "<div>XY</div>");
        assert_eq!(patched.applied(), 1);
        assert_eq!(patched.skipped(), 0);
        assert_eq!(
            patched.manifest[0].outcome,
            EditOutcome::Applied { offset: 6, bytes: 1 }
        );
    }

    #[test]
    fn missing_anchor_is_skipped() {
        let original = doc("<div>X</div>");
        let edits = [Edit::new("z", Anchor::literal("Z"), "Y")];
        let patched = apply_edits(&original, &edits);

        assert_eq!(patched.document, original);
        assert_eq!(patched.applied(), 0);
        assert_eq!(patched.skipped(), 1);
    }

    #[test]
    fn insert_before_anchor() {
        let edits = [Edit::new("w", Anchor::literal("</div>"), "W").before()];
        let patched = apply_edits(&doc("<div>X</div>"), &edits);
        assert_eq!(patched.document.as_str(), "<div>XW</div>");
    }

    #[test]
    fn replace_matched_text() {
        let edits = [
            Edit::new("xp", Anchor::literal("emoji: 'a' }"), "emoji: 'a', xp: 25 }").replacing(),
        ];
        let patched = apply_edits(&doc("{ name: 'A', emoji: 'a' }"), &edits);
        assert_eq!(patched.document.as_str(), "{ name: 'A', emoji: 'a', xp: 25 }");
    }

    #[test]
    fn replace_is_idempotent() {
        let edits = [
            Edit::new("xp", Anchor::literal("emoji: 'a' }"), "emoji: 'a', xp: 25 }").replacing(),
        ];
        let once = apply_edits(&doc("{ emoji: 'a' }"), &edits);
        let twice = apply_edits(&once.document, &edits);

        assert_eq!(twice.document, once.document);
        assert_eq!(twice.already_applied(), 1);
        assert_eq!(twice.skipped(), 0);
    }

    #[test]
    fn later_anchor_survives_earlier_insertions() {
        let edits = [
            Edit::new("a", Anchor::literal("<a>"), "11111"),
            Edit::new("b", Anchor::literal("<b>"), "2222222222").before(),
            Edit::new("c", Anchor::literal("<c>"), "!"),
        ];
        let patched = apply_edits(&doc("<a><b><c>"), &edits);
        assert_eq!(patched.document.as_str(), "<a>111112222222222<b><c>!");
        assert_eq!(patched.applied(), 3);
    }

    #[test]
    fn skip_does_not_stop_later_edits() {
        let edits = [
            Edit::new("missing", Anchor::literal("nope"), "?"),
            Edit::new("present", Anchor::literal("X"), "Y"),
        ];
        let patched = apply_edits(&doc("X"), &edits);
        assert_eq!(patched.document.as_str(), "XY");
        assert!(patched.manifest[0].outcome.is_skipped());
        assert!(matches!(
            patched.manifest[1].outcome,
            EditOutcome::Applied { .. }
        ));
    }

    #[test]
    fn second_pass_reports_already_applied() {
        let edits = [
            Edit::new("after", Anchor::literal("X"), "Y"),
            Edit::new("before", Anchor::literal("</div>"), "W").before(),
        ];
        let once = apply_edits(&doc("<div>X</div>"), &edits);
        let twice = apply_edits(&once.document, &edits);

        assert_eq!(twice.document, once.document);
        assert_eq!(twice.applied(), 0);
        assert_eq!(twice.already_applied(), 2);
    }

    #[test]
    fn second_pass_with_shared_anchor() {
        let edits = [
            Edit::new("a", Anchor::literal("X"), "A"),
            Edit::new("b", Anchor::literal("X"), "B"),
        ];
        let once = apply_edits(&doc("<div>X</div>"), &edits);
        assert_eq!(once.document.as_str(), "<div>XBA</div>");

        let twice = apply_edits(&once.document, &edits);
        assert_eq!(twice.document, once.document);
        assert_eq!(twice.applied(), 0);
        assert_eq!(twice.already_applied(), 2);
        assert_eq!(
            twice.manifest[0].outcome,
            EditOutcome::AlreadyApplied { offset: Some(7) }
        );
    }

    #[test]
    fn second_pass_when_fragment_repeats_its_anchor() {
        let edits = [Edit::new("p", Anchor::literal("</div>").last(), "<p/></div>")];
        let once = apply_edits(&doc("<div>X</div>"), &edits);
        assert_eq!(once.document.as_str(), "<div>X</div><p/></div>");

        let twice = apply_edits(&once.document, &edits);
        assert_eq!(twice.document, once.document);
        assert_eq!(twice.already_applied(), 1);
    }

    #[test]
    fn fallback_used_when_primary_missing() {
        let edits = [Edit::new(
            "state",
            Anchor::literal("const [expandedCategory"),
            "\n  const [xp, setXp] = useState(0);",
        )
        .fallback(
            Anchor::literal(";").after(Anchor::literal("const [activeItems")),
        )];
        let patched = apply_edits(&doc("  const [activeItems, set] = useState([]);\n"), &edits);
        assert_eq!(
            patched.document.as_str(),
            "  const [activeItems, set] = useState([]);\n  const [xp, setXp] = useState(0);\n"
        );
    }

    #[test]
    fn primary_error_reported_when_all_candidates_fail() {
        let edits = [Edit::new("e", Anchor::literal("one"), "!").fallback(Anchor::literal("two"))];
        let patched = apply_edits(&doc("three"), &edits);
        match &patched.manifest[0].outcome {
            EditOutcome::Skipped { error, .. } => {
                assert!(error.to_string().contains("\"one\""));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn unless_present_marker_short_circuits() {
        let edits = [Edit::new("levels", Anchor::literal("};"), "\nconst CHEF_LEVELS = [];")
            .unless_present("const CHEF_LEVELS")];
        let patched = apply_edits(&doc("const R = {};\nconst CHEF_LEVELS = [];"), &edits);
        assert_eq!(patched.already_applied(), 1);
        assert_eq!(
            patched.manifest[0].outcome,
            EditOutcome::AlreadyApplied { offset: None }
        );
    }

    #[test]
    fn skipped_edit_carries_suggestion() {
        let edits = [Edit::new("n", Anchor::literal("const showNotification"), "x").before()];
        let patched = apply_edits(&doc("const showNotificaton = x;\n"), &edits);
        match &patched.manifest[0].outcome {
            EditOutcome::Skipped { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("const showNotificaton = x;"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn manifest_serializes_with_status_tag() {
        let edits = [Edit::new("y", Anchor::literal("X"), "Y")];
        let patched = apply_edits(&doc("X"), &edits);
        let json = serde_json::to_value(&patched.manifest[0]).unwrap();
        assert_eq!(json["id"], "y");
        assert_eq!(json["status"], "applied");
        assert_eq!(json["offset"], 1);
    }
}

use crate::anchor::{Anchor, Needle, Occurrence};
use crate::edit::{Edit, Placement};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PatchSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub edits: Vec<EditDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement on the tool version, e.g. ">=0.1, <0.3".
    #[serde(default)]
    pub requires: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EditDefinition {
    pub id: String,
    pub anchor: AnchorDefinition,
    #[serde(default)]
    pub fallback: Vec<AnchorDefinition>,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub text: Option<String>,
    /// Path to a file holding the text, relative to the patch-set file.
    #[serde(default)]
    pub text_file: Option<String>,
    #[serde(default)]
    pub unless_present: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct AnchorDefinition {
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub occurrence: Occurrence,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub after: Option<Box<AnchorDefinition>>,
    #[serde(default)]
    pub before: Option<Box<AnchorDefinition>>,
}

impl PatchSet {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.edits.is_empty() {
            issues.push(ValidationIssue::EmptyEditList);
        }

        let mut seen = HashSet::new();
        for edit in &self.edits {
            let id = edit.id.trim();
            if id.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    edit_id: None,
                    field: "id",
                });
            } else if !seen.insert(id) {
                issues.push(ValidationIssue::DuplicateId(id.to_string()));
            }
            let edit_id = (!id.is_empty()).then(|| id.to_string());

            edit.anchor.collect_issues(&edit_id, "anchor", &mut issues);
            for (idx, fallback) in edit.fallback.iter().enumerate() {
                fallback.collect_issues(&edit_id, &format!("fallback[{idx}]"), &mut issues);
            }

            match (&edit.text, &edit.text_file) {
                (None, None) => issues.push(ValidationIssue::MissingField {
                    edit_id: edit_id.clone(),
                    field: "text",
                }),
                (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                    edit_id: edit_id.clone(),
                    message: "text and text_file are mutually exclusive".to_string(),
                }),
                (Some(text), None) if text.is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        edit_id: edit_id.clone(),
                        field: "text",
                    })
                }
                (None, Some(path)) if path.trim().is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        edit_id: edit_id.clone(),
                        field: "text_file",
                    })
                }
                _ => {}
            }

            if matches!(&edit.unless_present, Some(marker) if marker.is_empty()) {
                issues.push(ValidationIssue::MissingField {
                    edit_id,
                    field: "unless_present",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl AnchorDefinition {
    fn collect_issues(
        &self,
        edit_id: &Option<String>,
        at: &str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match (&self.literal, &self.regex) {
            (None, None) => issues.push(ValidationIssue::InvalidCombo {
                edit_id: edit_id.clone(),
                message: format!("{at} needs one of literal or regex"),
            }),
            (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                edit_id: edit_id.clone(),
                message: format!("{at} sets both literal and regex"),
            }),
            (Some(lit), None) if lit.is_empty() => issues.push(ValidationIssue::InvalidCombo {
                edit_id: edit_id.clone(),
                message: format!("{at}.literal is empty"),
            }),
            (None, Some(re)) => {
                if let Err(e) = Regex::new(re) {
                    issues.push(ValidationIssue::InvalidRegex {
                        edit_id: edit_id.clone(),
                        pattern: re.clone(),
                        message: e.to_string(),
                    });
                }
            }
            _ => {}
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                issues.push(ValidationIssue::InvalidCombo {
                    edit_id: edit_id.clone(),
                    message: format!("{at} start {start} is past end {end}"),
                });
            }
        }

        if let Some(scope) = &self.after {
            scope.collect_issues(edit_id, &format!("{at}.after"), issues);
        }
        if let Some(scope) = &self.before {
            scope.collect_issues(edit_id, &format!("{at}.before"), issues);
        }
    }

    /// Build the runtime anchor. Call only on a validated definition.
    pub fn compile(&self) -> Result<Anchor, regex::Error> {
        let needle = match (&self.literal, &self.regex) {
            (_, Some(re)) => Needle::Regex(Regex::new(re)?),
            (Some(lit), None) => Needle::Literal(lit.clone()),
            (None, None) => Needle::Literal(String::new()),
        };
        Ok(Anchor {
            needle,
            occurrence: self.occurrence,
            start: self.start,
            end: self.end,
            after: self.after.as_ref().map(|a| a.compile()).transpose()?.map(Box::new),
            before: self.before.as_ref().map(|a| a.compile()).transpose()?.map(Box::new),
        })
    }
}

impl EditDefinition {
    /// Build the runtime edit with `text` already resolved.
    pub fn compile(&self, text: String) -> Result<Edit, regex::Error> {
        Ok(Edit {
            id: self.id.trim().to_string(),
            anchor: self.anchor.compile()?,
            fallbacks: self
                .fallback
                .iter()
                .map(AnchorDefinition::compile)
                .collect::<Result<_, _>>()?,
            placement: self.placement,
            text,
            unless_present: self.unless_present.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyEditList,
    DuplicateId(String),
    MissingField {
        edit_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        edit_id: Option<String>,
        message: String,
    },
    InvalidRegex {
        edit_id: Option<String>,
        pattern: String,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyEditList => write!(f, "patch set contains no edits"),
            ValidationIssue::DuplicateId(id) => write!(f, "edit id '{id}' is used more than once"),
            ValidationIssue::MissingField { edit_id, field } => match edit_id {
                Some(id) => write!(f, "edit '{id}' missing required field '{field}'"),
                None => write!(f, "edit missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { edit_id, message } => match edit_id {
                Some(id) => write!(f, "edit '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid edit configuration: {message}"),
            },
            ValidationIssue::InvalidRegex {
                edit_id,
                pattern,
                message,
            } => {
                let id = edit_id.as_deref().unwrap_or("?");
                write!(f, "edit '{id}' has invalid regex /{pattern}/: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> PatchSet {
        toml_edit::de::from_str(input).expect("patch set parses")
    }

    #[test]
    fn nested_scopes_parse() {
        let set = parse(
            r#"
[[edits]]
id = "xp-bar"
text = "<XpBar />"

[edits.anchor]
literal = "</div>"
[edits.anchor.after]
literal = '<div className="px-4 py-2 flex'
occurrence = "last"
[edits.anchor.after.before]
literal = "Kitchen Explorer</h1>"
"#,
        );
        set.validate().unwrap();

        let anchor = &set.edits[0].anchor;
        let after = anchor.after.as_ref().unwrap();
        assert_eq!(after.occurrence, Occurrence::Last);
        assert_eq!(
            after.before.as_ref().unwrap().literal.as_deref(),
            Some("Kitchen Explorer</h1>")
        );
        assert_eq!(set.edits[0].placement, Placement::After);
    }

    #[test]
    fn collects_every_issue() {
        let set = parse(
            r#"
[[edits]]
id = "a"
[edits.anchor]

[[edits]]
id = "a"
text = "x"
text_file = "x.js"
[edits.anchor]
literal = "y"
regex = "y"
"#,
        );
        let err = set.validate().unwrap_err();
        assert!(err
            .issues
            .contains(&ValidationIssue::DuplicateId("a".to_string())));
        assert!(err.issues.contains(&ValidationIssue::MissingField {
            edit_id: Some("a".to_string()),
            field: "text",
        }));
        assert_eq!(err.issues.len(), 5);
    }

    #[test]
    fn bad_regex_is_reported() {
        let set = parse(
            r#"
[[edits]]
id = "r"
text = "x"
[edits.anchor]
regex = "const [("
"#,
        );
        let err = set.validate().unwrap_err();
        assert!(matches!(
            err.issues[0],
            ValidationIssue::InvalidRegex { .. }
        ));
    }

    #[test]
    fn inverted_bounds_are_reported() {
        let set = parse(
            r#"
[[edits]]
id = "b"
text = "x"
[edits.anchor]
literal = "y"
start = 10
end = 2
"#,
        );
        let err = set.validate().unwrap_err();
        assert!(err.to_string().contains("start 10 is past end 2"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<PatchSet, _> = toml_edit::de::from_str(
            r#"
[[edits]]
id = "u"
text = "x"
positon = "after"
[edits.anchor]
literal = "y"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn compile_builds_fallbacks() {
        let set = parse(
            r#"
[[edits]]
id = "state"
placement = "before"
text = "x"
unless_present = "setXp"
[edits.anchor]
literal = "a"
[[edits.fallback]]
regex = "b+"
occurrence = "unique"
"#,
        );
        set.validate().unwrap();
        let edit = set.edits[0].compile("x".to_string()).unwrap();
        assert_eq!(edit.placement, Placement::Before);
        assert_eq!(edit.fallbacks.len(), 1);
        assert_eq!(edit.fallbacks[0].occurrence, Occurrence::Unique);
        assert_eq!(edit.unless_present.as_deref(), Some("setXp"));
    }
}

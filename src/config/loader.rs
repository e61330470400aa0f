use crate::config::schema::{PatchSet, ValidationError, ValidationIssue};
use crate::config::version::{check_tool_requirement, VersionError};
use crate::edit::Edit;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A validated patch set with every edit compiled and its text loaded.
#[derive(Debug, Clone)]
pub struct LoadedPatchSet {
    /// File it came from, when loaded from disk.
    pub source: Option<PathBuf>,
    pub name: String,
    pub description: Option<String>,
    pub edits: Vec<Edit>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Version {
        path: Option<PathBuf>,
        source: VersionError,
    },
    TextFile {
        edit_id: String,
        path: PathBuf,
        source: std::io::Error,
    },
    NoPatchSets {
        searched: Vec<PathBuf>,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            ConfigError::Version { path: None, source } => ConfigError::Version {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read patch set {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch set TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch set TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch set ({}): {}", path.display(), source),
                None => write!(f, "invalid patch set: {}", source),
            },
            ConfigError::Version { path, source } => match path {
                Some(path) => write!(f, "patch set {} not usable: {}", path.display(), source),
                None => write!(f, "patch set not usable: {}", source),
            },
            ConfigError::TextFile {
                edit_id,
                path,
                source,
            } => write!(
                f,
                "edit '{}': failed to read text_file {}: {}",
                edit_id,
                path.display(),
                source
            ),
            ConfigError::NoPatchSets { searched } => {
                write!(f, "no .toml patch sets found in")?;
                for (idx, dir) in searched.iter().enumerate() {
                    let sep = if idx == 0 { " " } else { " or " };
                    write!(f, "{sep}{}", dir.display())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Version { source, .. } => Some(source),
            ConfigError::TextFile { source, .. } => Some(source),
            ConfigError::NoPatchSets { .. } => None,
        }
    }
}

/// Parse and validate a patch set without compiling it.
pub fn parse_str(input: &str) -> Result<PatchSet, ConfigError> {
    let set: PatchSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    set.validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    check_tool_requirement(set.meta.requires.as_deref())
        .map_err(|source| ConfigError::Version { path: None, source })?;
    Ok(set)
}

/// Load a patch set from a string.
///
/// `text_file` entries resolve against `base_dir`, or the current directory
/// when none is given.
pub fn load_from_str(input: &str, base_dir: Option<&Path>) -> Result<LoadedPatchSet, ConfigError> {
    let set = parse_str(input)?;
    compile(set, None, base_dir.unwrap_or_else(|| Path::new(".")))
}

/// Load a patch set file; `text_file` entries resolve next to it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<LoadedPatchSet, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let set = parse_str(&contents).map_err(|error| error.with_path(path))?;
    let base_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    compile(set, Some(path.to_path_buf()), base_dir)
}

fn compile(
    set: PatchSet,
    source: Option<PathBuf>,
    base_dir: &Path,
) -> Result<LoadedPatchSet, ConfigError> {
    let mut edits = Vec::with_capacity(set.edits.len());

    for def in &set.edits {
        let text = match (&def.text, &def.text_file) {
            (Some(text), _) => text.clone(),
            (None, Some(rel)) => {
                let text_path = base_dir.join(rel);
                fs::read_to_string(&text_path).map_err(|source| ConfigError::TextFile {
                    edit_id: def.id.clone(),
                    path: text_path,
                    source,
                })?
            }
            (None, None) => String::new(),
        };
        if text.is_empty() {
            return Err(ConfigError::Validation {
                path: source.clone(),
                source: ValidationError {
                    issues: vec![ValidationIssue::MissingField {
                        edit_id: Some(def.id.clone()),
                        field: "text_file",
                    }],
                },
            });
        }

        // Regexes were already checked by validate().
        let edit = def.compile(text).map_err(|e| ConfigError::Validation {
            path: source.clone(),
            source: ValidationError {
                issues: vec![ValidationIssue::InvalidCombo {
                    edit_id: Some(def.id.clone()),
                    message: e.to_string(),
                }],
            },
        })?;
        edits.push(edit);
    }

    Ok(LoadedPatchSet {
        source,
        name: set.meta.name,
        description: set.meta.description,
        edits,
    })
}

/// All `.toml` files directly inside `dir`, sorted by name.
pub fn discover_in(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve which patch-set files to load.
///
/// An explicit path may be a file or a directory. Without one, the first
/// non-empty of `<input dir>/patches` and `./patches` wins.
pub fn locate_patch_sets(
    explicit: Option<&Path>,
    input: Option<&Path>,
) -> Result<Vec<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if path.is_dir() {
            let files = discover_in(path)?;
            if files.is_empty() {
                return Err(ConfigError::NoPatchSets {
                    searched: vec![path.to_path_buf()],
                });
            }
            return Ok(files);
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut candidates = Vec::new();
    if let Some(dir) = input.and_then(Path::parent) {
        let base = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        candidates.push(base.join("patches"));
    }
    let cwd_patches = PathBuf::from("patches");
    if !candidates.contains(&cwd_patches) {
        candidates.push(cwd_patches);
    }

    for dir in &candidates {
        if !dir.is_dir() {
            continue;
        }
        let files = discover_in(dir)?;
        if !files.is_empty() {
            return Ok(files);
        }
    }

    Err(ConfigError::NoPatchSets {
        searched: candidates,
    })
}

/// Load every patch set at `paths`, in order.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<LoadedPatchSet>, ConfigError> {
    paths.iter().map(load_from_path).collect()
}

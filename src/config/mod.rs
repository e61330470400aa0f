pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{
    discover_in, load_all, load_from_path, load_from_str, locate_patch_sets, parse_str,
    ConfigError, LoadedPatchSet,
};
pub use schema::{
    AnchorDefinition, EditDefinition, Metadata, PatchSet, ValidationError, ValidationIssue,
};
pub use version::{check_requirement, check_tool_requirement, VersionError, TOOL_VERSION};

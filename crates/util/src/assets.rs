//! Asset document loading.
//!
//! An asset directory holds `schema` and `ui` documents (mandatory),
//! optional `workflows` and `rules` documents, and any number of `*.rhai`
//! scripts. Documents are YAML or JSON, chosen by extension; anything without
//! a `.json` extension is parsed as YAML.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use capsule_types::{RuleSet, SchemaBundle, UiDefinition, WorkflowBundle, WorkflowIssue};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];
const SCRIPT_EXTENSION: &str = "rhai";
/// Script loaded ahead of the others when present.
const PRIMARY_SCRIPT: &str = "actions.rhai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Schema,
    Ui,
    Workflows,
    Rules,
    Script,
}

impl AssetKind {
    /// File stem the loader looks for.
    pub fn stem(&self) -> &'static str {
        match self {
            AssetKind::Schema => "schema",
            AssetKind::Ui => "ui",
            AssetKind::Workflows => "workflows",
            AssetKind::Rules => "rules",
            AssetKind::Script => "actions",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Failure to load one asset. Always names the asset involved.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("required {asset} asset not found in '{}'", dir.display())]
    Missing { asset: AssetKind, dir: PathBuf },

    #[error("failed to read {asset} asset '{}': {source}", path.display())]
    Io {
        asset: AssetKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed {asset} asset '{name}': {message}")]
    Malformed {
        asset: AssetKind,
        name: String,
        message: String,
    },

    #[error("invalid workflows in '{name}': {}", format_issues(issues))]
    InvalidWorkflow { name: String, issues: Vec<WorkflowIssue> },
}

impl LoadError {
    pub fn malformed(asset: AssetKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Malformed {
            asset,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Reloading may succeed for I/O and missing-file failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Missing { .. } | LoadError::Io { .. })
    }

    pub fn asset(&self) -> AssetKind {
        match self {
            LoadError::Missing { asset, .. } | LoadError::Io { asset, .. } | LoadError::Malformed { asset, .. } => *asset,
            LoadError::InvalidWorkflow { .. } => AssetKind::Workflows,
        }
    }
}

fn format_issues(issues: &[WorkflowIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Source text of one script asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub name: String,
    pub text: String,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Every parsed asset needed to bootstrap a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetBundle {
    pub schema: SchemaBundle,
    pub ui: UiDefinition,
    pub workflows: WorkflowBundle,
    pub rules: RuleSet,
    /// Scripts in load order.
    pub scripts: Vec<ScriptSource>,
}

impl AssetBundle {
    /// Bundle assembled from collaborator-supplied trees.
    pub fn new(schema: SchemaBundle, ui: UiDefinition) -> Self {
        Self {
            schema: schema.normalize(),
            ui,
            ..Default::default()
        }
    }

    pub fn with_workflows(mut self, workflows: WorkflowBundle) -> Self {
        self.workflows = workflows.normalize();
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_script(mut self, script: ScriptSource) -> Self {
        self.scripts.push(script);
        self
    }

    /// Enforces the workflow invariants, including that every step's screen
    /// is declared in the UI. Session bootstrap calls this too.
    pub fn validate(&self) -> Result<(), LoadError> {
        let mut issues = self.workflows.validate();
        issues.extend(
            self.workflows
                .unknown_screens(|screen_id| self.ui.screen(screen_id).is_some()),
        );
        if issues.is_empty() {
            Ok(())
        } else {
            Err(LoadError::InvalidWorkflow {
                name: AssetKind::Workflows.to_string(),
                issues,
            })
        }
    }
}

/// Parses a document body, picking JSON or YAML from `name`'s extension.
pub fn parse_document<T: DeserializeOwned>(asset: AssetKind, name: &str, content: &str) -> Result<T, LoadError> {
    let is_json = Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str(content).map_err(|error| error.to_string())
    } else {
        serde_yaml::from_str(content).map_err(|error| error.to_string())
    };
    parsed.map_err(|message| LoadError::malformed(asset, name, message))
}

/// Reads and parses one document file.
pub fn load_document<T: DeserializeOwned>(asset: AssetKind, path: &Path) -> Result<T, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        asset,
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| asset.to_string());
    parse_document(asset, &name, &content)
}

/// Loads every asset from `dir`.
pub fn load_asset_dir(dir: &Path) -> Result<AssetBundle, LoadError> {
    let schema_path = find_document(dir, AssetKind::Schema).ok_or_else(|| LoadError::Missing {
        asset: AssetKind::Schema,
        dir: dir.to_path_buf(),
    })?;
    let ui_path = find_document(dir, AssetKind::Ui).ok_or_else(|| LoadError::Missing {
        asset: AssetKind::Ui,
        dir: dir.to_path_buf(),
    })?;

    let schema: SchemaBundle = load_document(AssetKind::Schema, &schema_path)?;
    let ui: UiDefinition = load_document(AssetKind::Ui, &ui_path)?;
    let mut bundle = AssetBundle::new(schema, ui);

    if let Some(path) = find_document(dir, AssetKind::Workflows) {
        let workflows: WorkflowBundle = load_document(AssetKind::Workflows, &path)?;
        bundle = bundle.with_workflows(workflows);
        if let Err(LoadError::InvalidWorkflow { issues, .. }) = bundle.validate() {
            return Err(LoadError::InvalidWorkflow {
                name: path.display().to_string(),
                issues,
            });
        }
    }

    if let Some(path) = find_document(dir, AssetKind::Rules) {
        bundle = bundle.with_rules(load_document(AssetKind::Rules, &path)?);
    }

    for path in script_paths(dir)? {
        let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            asset: AssetKind::Script,
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!(script = %name, bytes = text.len(), "loaded script asset");
        bundle.scripts.push(ScriptSource::new(name, text));
    }

    info!(
        assets_dir = %dir.display(),
        entities = bundle.schema.entities.len(),
        screens = bundle.ui.screens.len(),
        workflows = bundle.workflows.workflows.len(),
        scripts = bundle.scripts.len(),
        "loaded asset bundle"
    );
    Ok(bundle)
}

fn find_document(dir: &Path, asset: AssetKind) -> Option<PathBuf> {
    DOCUMENT_EXTENSIONS
        .iter()
        .map(|extension| dir.join(format!("{}.{}", asset.stem(), extension)))
        .find(|path| path.is_file())
}

fn script_paths(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        asset: AssetKind::Script,
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|extension| extension.to_str())
                    .is_some_and(|extension| extension.eq_ignore_ascii_case(SCRIPT_EXTENSION))
        })
        .collect();

    paths.sort_by_key(|path| {
        let name = path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default();
        (name != PRIMARY_SCRIPT, name)
    });
    Ok(paths)
}

//! CRD to JSON Schema conversion
//!
//! Every `.yaml`/`.yml` file below the given CRD directories is scanned;
//! documents whose `kind` is `CustomResourceDefinition` produce one JSON
//! Schema file per version into a single flat output directory. File names
//! follow `{kind}_{version}.json` (lower-cased), which is what the local
//! schema-location template `{{.ResourceKind}}_{{.ResourceAPIVersion}}.json`
//! resolves to.
//!
//! The emitted schemas are tightened the way kubectl validates:
//! nested objects with `properties` reject unknown fields unless they say
//! otherwise, and int-or-string fields accept both types.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::crd::{CrdDocument, CrdParser};
use crate::error::{CoreError, Result};

/// Default output file name format
pub const DEFAULT_FILENAME_FORMAT: &str = "{kind}_{version}";

/// CRD conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// File name format; `{kind}`, `{version}`, `{group}` (first group
    /// segment) and `{fullgroup}` are substituted, the result lower-cased.
    #[serde(default = "default_filename_format")]
    pub filename_format: String,

    /// Also reject unknown top-level fields
    #[serde(default)]
    pub deny_root_additional_properties: bool,
}

fn default_filename_format() -> String {
    DEFAULT_FILENAME_FORMAT.to_string()
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            filename_format: default_filename_format(),
            deny_root_additional_properties: false,
        }
    }
}

impl ConvertOptions {
    pub(crate) fn check(&self) -> Result<()> {
        for placeholder in ["{kind}", "{version}"] {
            if !self.filename_format.contains(placeholder) {
                return Err(CoreError::InvalidFilenameFormat {
                    format: self.filename_format.clone(),
                    message: format!("must contain {}", placeholder),
                });
            }
        }
        Ok(())
    }

    /// Output file name for one kind/version of a CRD.
    ///
    /// `None` when the kind, version or group could not be used as a path
    /// component. Separators in the format itself are kept.
    pub fn file_name(&self, crd: &CrdDocument, version: &str) -> Option<String> {
        let short_group = crd.group.split('.').next().unwrap_or_default();
        let components = [crd.kind.as_str(), version, crd.group.as_str(), short_group];
        if !components.iter().all(|c| is_safe_component(c)) {
            return None;
        }

        let stem = self
            .filename_format
            .replace("{kind}", &crd.kind)
            .replace("{version}", version)
            .replace("{fullgroup}", &crd.group)
            .replace("{group}", short_group);
        Some(format!("{}.json", stem.to_lowercase()))
    }
}

/// A name taken from a CRD may not leave the schema directory
fn is_safe_component(value: &str) -> bool {
    !value.is_empty()
        && !value.contains("..")
        && !value.contains(['/', '\\', '\0'])
}

/// A schema file written by the converter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedSchema {
    /// Resource kind as declared by the CRD
    pub kind: String,
    /// Version name (without group)
    pub version: String,
    /// Written file
    pub path: PathBuf,
    /// CRD file the schema came from
    pub source: PathBuf,
}

/// The pooled output directory
#[derive(Debug, Clone)]
pub struct SchemaDirectory {
    path: PathBuf,
    schemas: Vec<ConvertedSchema>,
}

impl SchemaDirectory {
    /// Wrap an existing directory of schema files (e.g. from an earlier run)
    pub fn existing(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("schema directory not found: {}", path.display()),
            )));
        }
        Ok(Self {
            path,
            schemas: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schemas written during this conversion
    pub fn schemas(&self) -> &[ConvertedSchema] {
        &self.schemas
    }

    /// Whether the directory holds no schema file at all
    pub fn is_empty(&self) -> bool {
        if !self.schemas.is_empty() {
            return false;
        }
        !WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json"))
    }
}

/// Converts pooled CRD directories into a schema directory
#[derive(Debug, Clone, Default)]
pub struct CrdConverter {
    options: ConvertOptions,
}

impl CrdConverter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    /// Convert every CRD found below `sources` into `output`.
    ///
    /// `output` is created if needed. No CRDs at all is not an error: the
    /// result is simply an empty schema directory.
    pub fn convert<P: AsRef<Path>>(&self, sources: &[P], output: &Path) -> Result<SchemaDirectory> {
        std::fs::create_dir_all(output)?;

        // file name -> schema; later documents win on collision
        let mut pending: BTreeMap<String, (ConvertedSchema, Value)> = BTreeMap::new();

        for file in sources.iter().flat_map(|dir| yaml_files(dir.as_ref())) {
            let content = match std::fs::read_to_string(&file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };

            let crds = match CrdParser::parse_all(&content) {
                Ok(crds) => crds,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping invalid YAML");
                    continue;
                }
            };

            for crd in crds {
                let crd = match crd {
                    Ok(crd) => crd,
                    Err(message) => {
                        tracing::warn!(path = %file.display(), %message, "skipping malformed CRD");
                        continue;
                    }
                };

                tracing::debug!(path = %file.display(), kind = %crd.kind, "converting CRD");
                for (version, name, schema) in self.schemas_for(&crd) {
                    let converted = ConvertedSchema {
                        kind: crd.kind.clone(),
                        version,
                        path: output.join(&name),
                        source: file.clone(),
                    };
                    if let Some((previous, _)) = pending.insert(name.clone(), (converted, schema)) {
                        tracing::warn!(
                            schema = %name,
                            previous = %previous.source.display(),
                            current = %file.display(),
                            "duplicate CRD version, keeping the last one"
                        );
                    }
                }
            }
        }

        let mut schemas = Vec::with_capacity(pending.len());
        for (_, (converted, schema)) in pending {
            if let Some(parent) = converted.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut text = serde_json::to_string_pretty(&schema)?;
            text.push('\n');
            std::fs::write(&converted.path, text)?;
            tracing::debug!(path = %converted.path.display(), "JSON schema written");
            schemas.push(converted);
        }

        tracing::info!(count = schemas.len(), output = %output.display(), "CRD schemas converted");

        Ok(SchemaDirectory {
            path: output.to_path_buf(),
            schemas,
        })
    }

    /// JSON Schemas for every version of one CRD, keyed by file name
    pub fn convert_document(&self, crd: &CrdDocument) -> Vec<(String, Value)> {
        self.schemas_for(crd)
            .into_iter()
            .map(|(_, name, schema)| (name, schema))
            .collect()
    }

    fn schemas_for(&self, crd: &CrdDocument) -> Vec<(String, String, Value)> {
        crd.schema_versions()
            .filter_map(|(version, openapi)| {
                let Some(name) = self.options.file_name(crd, version) else {
                    tracing::warn!(
                        crd = %crd.name,
                        kind = %crd.kind,
                        version,
                        "skipping CRD version whose name is not a valid file name"
                    );
                    return None;
                };
                Some((
                    version.to_string(),
                    name,
                    to_json_schema(openapi, self.options.deny_root_additional_properties),
                ))
            })
            .collect()
    }
}

/// Turn a CRD's OpenAPI v3 schema into a strict JSON Schema
pub fn to_json_schema(openapi: &Value, deny_root_additional_properties: bool) -> Value {
    let mut schema = openapi.clone();
    close_objects(&mut schema, !deny_root_additional_properties);
    replace_int_or_string(&mut schema);
    schema
}

fn close_objects(node: &mut Value, skip: bool) {
    let Value::Object(map) = node else {
        return;
    };

    if !skip && map.contains_key("properties") && !map.contains_key("additionalProperties") {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for key in ["properties", "patternProperties"] {
        if let Some(Value::Object(children)) = map.get_mut(key) {
            children.values_mut().for_each(|c| close_objects(c, false));
        }
    }
    for key in ["items", "additionalProperties", "not"] {
        match map.get_mut(key) {
            Some(Value::Array(children)) => children.iter_mut().for_each(|c| close_objects(c, false)),
            Some(child) => close_objects(child, false),
            None => {}
        }
    }
    for key in ["allOf", "anyOf", "oneOf"] {
        if let Some(Value::Array(children)) = map.get_mut(key) {
            children.iter_mut().for_each(|c| close_objects(c, false));
        }
    }
}

fn is_int_or_string(node: &Value) -> bool {
    node.get("format").and_then(Value::as_str) == Some("int-or-string")
        || node
            .get("x-kubernetes-int-or-string")
            .and_then(Value::as_bool)
            .unwrap_or(false)
}

fn replace_int_or_string(node: &mut Value) {
    if is_int_or_string(node) {
        *node = json!({"oneOf": [{"type": "string"}, {"type": "integer"}]});
        return;
    }
    match node {
        Value::Object(map) => map.values_mut().for_each(replace_int_or_string),
        Value::Array(items) => items.iter_mut().for_each(replace_int_or_string),
        _ => {}
    }
}

fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .map(|e| e.into_path())
        .collect()
}

//! Schema locations and validator arguments

use std::fmt;
use std::path::{Path, PathBuf};

use kubegate_core::{SchemaDirectory, ValidatorOptions};

/// Community CRD catalog, keyed by API group
pub const CRD_CATALOG_TEMPLATE: &str = "https://raw.githubusercontent.com/datreeio/CRDs-catalog/main/{{.Group}}/{{.ResourceKind}}_{{.ResourceAPIVersion}}.json";

/// Where the validator looks for a resource's schema, in lookup order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLocation {
    /// The validator's built-in Kubernetes schemas
    Default,
    /// Converted CRD schemas in a local directory
    Local(PathBuf),
    /// Remote catalog template
    Catalog(String),
}

impl SchemaLocation {
    /// Template string as passed to `-schema-location`
    pub fn template(&self) -> String {
        match self {
            SchemaLocation::Default => "default".to_string(),
            SchemaLocation::Local(dir) => local_template(dir),
            SchemaLocation::Catalog(template) => template.clone(),
        }
    }
}

impl fmt::Display for SchemaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template())
    }
}

fn local_template(dir: &Path) -> String {
    let dir = dir.to_string_lossy();
    format!(
        "{}/{{{{.ResourceKind}}}}_{{{{.ResourceAPIVersion}}}}.json",
        dir.trim_end_matches('/')
    )
}

/// Build the lookup list: default first, local schemas when there are any,
/// then the remote catalog when enabled.
pub fn schema_locations(schemas: Option<&SchemaDirectory>, catalog: bool) -> Vec<SchemaLocation> {
    let mut locations = vec![SchemaLocation::Default];

    if let Some(dir) = schemas.filter(|dir| !dir.is_empty()) {
        locations.push(SchemaLocation::Local(dir.path().to_path_buf()));
    }
    if catalog {
        locations.push(SchemaLocation::Catalog(CRD_CATALOG_TEMPLATE.to_string()));
    }

    locations
}

/// Validator arguments, excluding the input itself
pub fn validator_args(options: &ValidatorOptions, locations: &[SchemaLocation]) -> Vec<String> {
    let mut args = vec!["-summary".to_string()];

    if options.strict {
        args.push("-strict".to_string());
    }
    if options.ignore_missing_schemas {
        args.push("-ignore-missing-schemas".to_string());
    }
    if let Some(version) = &options.kubernetes_version {
        args.push("-kubernetes-version".to_string());
        args.push(version.trim_start_matches('v').to_string());
    }
    if !options.skip_kinds.is_empty() {
        args.push("-skip".to_string());
        args.push(options.skip_kinds.join(","));
    }
    for location in locations {
        args.push("-schema-location".to_string());
        args.push(location.template());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locations_without_local_schemas() {
        let temp = TempDir::new().unwrap();
        let empty = SchemaDirectory::existing(temp.path()).unwrap();

        assert_eq!(schema_locations(Some(&empty), false), vec![SchemaLocation::Default]);
        assert_eq!(schema_locations(None, false), vec![SchemaLocation::Default]);
    }

    #[test]
    fn test_locations_order() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("widget_v1.json"), "{}").unwrap();
        let dir = SchemaDirectory::existing(temp.path()).unwrap();

        let locations = schema_locations(Some(&dir), true);
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[0], SchemaLocation::Default);
        assert_eq!(locations[1], SchemaLocation::Local(temp.path().to_path_buf()));
        assert!(matches!(locations[2], SchemaLocation::Catalog(_)));
    }

    #[test]
    fn test_local_template() {
        let location = SchemaLocation::Local(PathBuf::from("/schemas/"));
        assert_eq!(
            location.template(),
            "/schemas/{{.ResourceKind}}_{{.ResourceAPIVersion}}.json"
        );
    }

    #[test]
    fn test_validator_args() {
        let locations = vec![
            SchemaLocation::Default,
            SchemaLocation::Local(PathBuf::from("/schemas")),
            SchemaLocation::Catalog(CRD_CATALOG_TEMPLATE.to_string()),
        ];
        let args = validator_args(&ValidatorOptions::default(), &locations);
        insta::assert_snapshot!(args.join("\n"), @r###"
        -summary
        -strict
        -ignore-missing-schemas
        -schema-location
        default
        -schema-location
        /schemas/{{.ResourceKind}}_{{.ResourceAPIVersion}}.json
        -schema-location
        https://raw.githubusercontent.com/datreeio/CRDs-catalog/main/{{.Group}}/{{.ResourceKind}}_{{.ResourceAPIVersion}}.json
        "###);
    }

    #[test]
    fn test_validator_args_options() {
        let options = ValidatorOptions {
            strict: false,
            ignore_missing_schemas: false,
            kubernetes_version: Some("v1.31.0".to_string()),
            skip_kinds: vec!["Secret".to_string(), "ConfigMap".to_string()],
        };
        let args = validator_args(&options, &[SchemaLocation::Default]);
        assert_eq!(
            args,
            vec![
                "-summary",
                "-kubernetes-version",
                "1.31.0",
                "-skip",
                "Secret,ConfigMap",
                "-schema-location",
                "default",
            ]
        );
    }
}

//! CustomResourceDefinition document parsing
//!
//! Only the parts of a CRD needed to emit per-version JSON Schemas are
//! extracted: the group, the resource kind and, for every version, its
//! OpenAPI v3 schema. Both `apiextensions.k8s.io/v1` (per-version schemas)
//! and the legacy `v1beta1` layout (one `spec.validation` schema shared by
//! all versions) are understood.

use serde::Deserialize;
use serde_json::Value;

/// Kind value identifying a CRD document
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// The schema-relevant content of a CRD
#[derive(Debug, Clone, PartialEq)]
pub struct CrdDocument {
    /// Full CRD name (e.g., "certificates.cert-manager.io")
    pub name: String,
    /// API group (e.g., "cert-manager.io")
    pub group: String,
    /// Resource kind (e.g., "Certificate")
    pub kind: String,
    pub versions: Vec<CrdVersion>,
}

/// One API version of a CRD
#[derive(Debug, Clone, PartialEq)]
pub struct CrdVersion {
    /// Version name (e.g., "v1", "v1alpha1")
    pub name: String,
    /// OpenAPI v3 schema, if the version declares one
    pub schema: Option<Value>,
}

impl CrdDocument {
    /// Versions that carry a schema
    pub fn schema_versions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.versions
            .iter()
            .filter_map(|v| v.schema.as_ref().map(|s| (v.name.as_str(), s)))
    }
}

/// Parser for CRD YAML
pub struct CrdParser;

impl CrdParser {
    /// Whether a document's top-level `kind` is `CustomResourceDefinition`
    pub fn is_crd(value: &Value) -> bool {
        value.get("kind").and_then(Value::as_str) == Some(CRD_KIND)
    }

    /// Split a (possibly multi-document) YAML text into documents.
    ///
    /// Empty documents are dropped. A document with an `items` array (a
    /// `List`) is replaced by its items.
    pub fn documents(yaml: &str) -> Result<Vec<Value>, serde_yaml::Error> {
        let mut documents = Vec::new();
        for de in serde_yaml::Deserializer::from_str(yaml) {
            let value = Value::deserialize(de)?;
            match value {
                Value::Null => {}
                Value::Object(ref map) if map.get("items").is_some_and(Value::is_array) => {
                    if let Some(Value::Array(items)) = map.get("items") {
                        documents.extend(items.iter().cloned());
                    }
                }
                other => documents.push(other),
            }
        }
        Ok(documents)
    }

    /// All CRDs found in a YAML text
    pub fn parse_all(yaml: &str) -> Result<Vec<Result<CrdDocument, String>>, serde_yaml::Error> {
        Ok(Self::documents(yaml)?
            .iter()
            .filter(|doc| Self::is_crd(doc))
            .map(Self::parse_value)
            .collect())
    }

    /// Parse a single CRD document
    pub fn parse_value(value: &Value) -> Result<CrdDocument, String> {
        if !Self::is_crd(value) {
            return Err(format!(
                "expected {}, got {}",
                CRD_KIND,
                value.get("kind").and_then(Value::as_str).unwrap_or("nothing")
            ));
        }

        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let spec = value.get("spec").ok_or("missing 'spec' field")?;

        let group = spec
            .get("group")
            .and_then(Value::as_str)
            .ok_or("missing 'spec.group' field")?
            .to_string();

        let kind = spec
            .pointer("/names/kind")
            .and_then(Value::as_str)
            .ok_or("missing 'spec.names.kind' field")?
            .to_string();

        let shared_schema = spec.pointer("/validation/openAPIV3Schema");

        let versions = match spec.get("versions").and_then(Value::as_array) {
            Some(versions) if !versions.is_empty() => versions
                .iter()
                .map(|v| Self::parse_version(v, shared_schema))
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                let name = spec
                    .get("version")
                    .and_then(Value::as_str)
                    .ok_or("missing 'spec.versions' or 'spec.version' field")?;
                vec![CrdVersion {
                    name: name.to_string(),
                    schema: shared_schema.cloned(),
                }]
            }
        };

        Ok(CrdDocument {
            name,
            group,
            kind,
            versions,
        })
    }

    fn parse_version(version: &Value, shared_schema: Option<&Value>) -> Result<CrdVersion, String> {
        let name = version
            .get("name")
            .and_then(Value::as_str)
            .ok_or("version missing 'name' field")?
            .to_string();

        let schema = version
            .pointer("/schema/openAPIV3Schema")
            .or(shared_schema)
            .cloned();

        Ok(CrdVersion { name, schema })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_CRD: &str = r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: certificates.cert-manager.io
spec:
  group: cert-manager.io
  names:
    kind: Certificate
    plural: certificates
  scope: Namespaced
  versions:
    - name: v1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          properties:
            spec:
              type: object
    - name: v1alpha1
      served: false
      storage: false
"#;

    #[test]
    fn test_parse_v1_crd() {
        let docs = CrdParser::parse_all(V1_CRD).unwrap();
        assert_eq!(docs.len(), 1);
        let crd = docs[0].as_ref().unwrap();

        assert_eq!(crd.name, "certificates.cert-manager.io");
        assert_eq!(crd.group, "cert-manager.io");
        assert_eq!(crd.kind, "Certificate");
        assert_eq!(crd.versions.len(), 2);
        assert!(crd.versions[0].schema.is_some());
        assert!(crd.versions[1].schema.is_none());

        let with_schema: Vec<_> = crd.schema_versions().map(|(v, _)| v).collect();
        assert_eq!(with_schema, vec!["v1"]);
    }

    #[test]
    fn test_parse_legacy_crd() {
        let yaml = r#"
apiVersion: apiextensions.k8s.io/v1beta1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
spec:
  group: example.com
  version: v1beta1
  names:
    kind: Widget
  validation:
    openAPIV3Schema:
      type: object
"#;
        let docs = CrdParser::parse_all(yaml).unwrap();
        let crd = docs[0].as_ref().unwrap();
        assert_eq!(crd.versions.len(), 1);
        assert_eq!(crd.versions[0].name, "v1beta1");
        assert!(crd.versions[0].schema.is_some());
    }

    #[test]
    fn test_legacy_shared_schema_applies_to_all_versions() {
        let yaml = r#"
kind: CustomResourceDefinition
spec:
  group: example.com
  names:
    kind: Widget
  versions:
    - name: v1beta1
    - name: v1beta2
  validation:
    openAPIV3Schema:
      type: object
"#;
        let docs = CrdParser::parse_all(yaml).unwrap();
        let crd = docs[0].as_ref().unwrap();
        assert_eq!(crd.schema_versions().count(), 2);
    }

    #[test]
    fn test_non_crd_documents_are_skipped() {
        let yaml = format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: cert-manager\n---\n{}\n---\n",
            V1_CRD
        );
        let docs = CrdParser::parse_all(&yaml).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_list_items_are_flattened() {
        let yaml = r#"
apiVersion: v1
kind: List
items:
  - apiVersion: apiextensions.k8s.io/v1
    kind: CustomResourceDefinition
    spec:
      group: a.example.com
      names: {kind: A}
      versions: [{name: v1}]
  - apiVersion: v1
    kind: ConfigMap
"#;
        let documents = CrdParser::documents(yaml).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(CrdParser::parse_all(yaml).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_kind_is_an_error() {
        let value: Value = serde_yaml::from_str(
            "kind: CustomResourceDefinition\nspec:\n  group: example.com\n  versions: [{name: v1}]\n",
        )
        .unwrap();
        let err = CrdParser::parse_value(&value).unwrap_err();
        assert!(err.contains("spec.names.kind"));
    }

    #[test]
    fn test_is_crd() {
        let crd: Value = serde_json::json!({"kind": "CustomResourceDefinition"});
        let other: Value = serde_json::json!({"kind": "Deployment"});
        let none: Value = serde_json::json!({"apiVersion": "v1"});
        assert!(CrdParser::is_crd(&crd));
        assert!(!CrdParser::is_crd(&other));
        assert!(!CrdParser::is_crd(&none));
    }
}

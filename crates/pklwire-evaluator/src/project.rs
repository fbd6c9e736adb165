//! `PklProject` as an evaluated value.
//!
//! A project is loaded by evaluating `<dir>/PklProject` for `output.value`
//! and reading the resulting object. Dependency resolution itself is Pkl's
//! job (`pkl project resolve`); this only carries the resolved metadata.

use std::collections::BTreeMap;

use pklwire_frame::{Checksums, DependencyKind, ProjectOrDependency};
use pklwire_value::Value;

use crate::error::{EvaluatorError, Result};

/// `pkl.Project` as rendered by its `output.value`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub project_file_uri: String,
    pub package: Option<ProjectPackage>,
    pub evaluator_settings: Option<ProjectEvaluatorSettings>,
    pub tests: Vec<String>,
    pub dependencies: ProjectDependencies,
}

/// `pkl.Project#Package`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPackage {
    pub name: String,
    pub base_uri: String,
    pub version: String,
    pub package_zip_url: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub website: Option<String>,
    pub documentation: Option<String>,
    pub source_code: Option<String>,
    pub source_code_url_scheme: Option<String>,
    pub license: Option<String>,
    pub license_text: Option<String>,
    pub issue_tracker: Option<String>,
    pub api_tests: Vec<String>,
    pub exclude: Vec<String>,
    pub uri: Option<String>,
}

/// `pkl.Project#EvaluatorSettings`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectEvaluatorSettings {
    pub external_properties: Option<BTreeMap<String, String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub allowed_modules: Option<Vec<String>>,
    pub allowed_resources: Option<Vec<String>>,
    pub no_cache: Option<bool>,
    pub module_path: Option<Vec<String>>,
    pub module_cache_dir: Option<String>,
    pub root_dir: Option<String>,
}

/// Resolved dependencies declared by a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDependencies {
    pub local_dependencies: BTreeMap<String, ProjectLocalDependency>,
    pub remote_dependencies: BTreeMap<String, ProjectRemoteDependency>,
}

/// A dependency on another project on the local filesystem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectLocalDependency {
    pub package_uri: String,
    pub project_file_uri: String,
    pub dependencies: ProjectDependencies,
}

/// A dependency on a published package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectRemoteDependency {
    pub package_uri: String,
    pub checksums: Option<Checksums>,
}

impl ProjectDependencies {
    pub fn is_empty(&self) -> bool {
        self.local_dependencies.is_empty() && self.remote_dependencies.is_empty()
    }

    /// Wire form sent with `CreateEvaluator`.
    pub fn encode(&self) -> BTreeMap<String, ProjectOrDependency> {
        let local = self.local_dependencies.iter().map(|(name, dep)| {
            (
                name.clone(),
                ProjectOrDependency {
                    kind: DependencyKind::Local,
                    package_uri: Some(dep.package_uri.clone()),
                    project_file_uri: Some(dep.project_file_uri.clone()),
                    checksums: None,
                    dependencies: Some(dep.dependencies.encode()),
                },
            )
        });
        let remote = self.remote_dependencies.iter().map(|(name, dep)| {
            (
                name.clone(),
                ProjectOrDependency {
                    kind: DependencyKind::Remote,
                    package_uri: Some(dep.package_uri.clone()),
                    project_file_uri: None,
                    checksums: dep.checksums.clone(),
                    dependencies: None,
                },
            )
        });
        local.chain(remote).collect()
    }

    fn from_value(value: &Value) -> Result<Self> {
        let mut deps = ProjectDependencies::default();
        for (name, dep) in entries(value.property("localDependencies"))? {
            deps.local_dependencies.insert(
                name,
                ProjectLocalDependency {
                    package_uri: required_string(dep, "packageUri")?,
                    project_file_uri: required_string(dep, "projectFileUri")?,
                    dependencies: match present(dep.property("dependencies")) {
                        Some(nested) => ProjectDependencies::from_value(nested)?,
                        None => ProjectDependencies::default(),
                    },
                },
            );
        }
        for (name, dep) in entries(value.property("remoteDependencies"))? {
            let checksums = match present(dep.property("checksums")) {
                Some(c) => Some(Checksums {
                    sha256: required_string(c, "sha256")?,
                }),
                None => None,
            };
            deps.remote_dependencies.insert(
                name,
                ProjectRemoteDependency {
                    package_uri: required_string(dep, "packageUri")?,
                    checksums,
                },
            );
        }
        Ok(deps)
    }
}

impl Project {
    /// Read a project from the `output.value` of a `PklProject` module.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.as_object().is_none() && value.as_dynamic().is_none() {
            return Err(EvaluatorError::Project(format!(
                "expected an object, got {}",
                value.kind()
            )));
        }

        let package = match present(value.property("package")) {
            Some(p) => Some(ProjectPackage {
                name: required_string(p, "name")?,
                base_uri: required_string(p, "baseUri")?,
                version: required_string(p, "version")?,
                package_zip_url: required_string(p, "packageZipUrl")?,
                description: optional_string(p, "description")?,
                authors: strings(p.property("authors"))?.unwrap_or_default(),
                website: optional_string(p, "website")?,
                documentation: optional_string(p, "documentation")?,
                source_code: optional_string(p, "sourceCode")?,
                source_code_url_scheme: optional_string(p, "sourceCodeUrlScheme")?,
                license: optional_string(p, "license")?,
                license_text: optional_string(p, "licenseText")?,
                issue_tracker: optional_string(p, "issueTracker")?,
                api_tests: strings(p.property("apiTests"))?.unwrap_or_default(),
                exclude: strings(p.property("exclude"))?.unwrap_or_default(),
                uri: optional_string(p, "uri")?,
            }),
            None => None,
        };

        let evaluator_settings = match present(value.property("evaluatorSettings")) {
            Some(s) => Some(ProjectEvaluatorSettings {
                external_properties: string_map(s.property("externalProperties"))?,
                env: string_map(s.property("env"))?,
                allowed_modules: strings(s.property("allowedModules"))?,
                allowed_resources: strings(s.property("allowedResources"))?,
                no_cache: present(s.property("noCache")).and_then(Value::as_bool),
                module_path: strings(s.property("modulePath"))?,
                module_cache_dir: optional_string(s, "moduleCacheDir")?,
                root_dir: optional_string(s, "rootDir")?,
            }),
            None => None,
        };

        let dependencies = match present(value.property("dependencies")) {
            Some(deps) => ProjectDependencies::from_value(deps)?,
            None => ProjectDependencies::default(),
        };

        Ok(Project {
            project_file_uri: required_string(value, "projectFileUri")?,
            package,
            evaluator_settings,
            tests: strings(value.property("tests"))?.unwrap_or_default(),
            dependencies,
        })
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn required_string(value: &Value, name: &str) -> Result<String> {
    optional_string(value, name)?
        .ok_or_else(|| EvaluatorError::Project(format!("missing property {name:?}")))
}

fn optional_string(value: &Value, name: &str) -> Result<Option<String>> {
    match present(value.property(name)) {
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| EvaluatorError::Project(format!("property {name:?} is not a string"))),
        None => Ok(None),
    }
}

fn strings(value: Option<&Value>) -> Result<Option<Vec<String>>> {
    let Some(value) = present(value) else {
        return Ok(None);
    };
    let items = value
        .as_slice()
        .ok_or_else(|| EvaluatorError::Project(format!("expected a list, got {}", value.kind())))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| EvaluatorError::Project("list element is not a string".to_string()))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Name → value pairs of a `Mapping` or a dynamic object's entries.
fn entries(value: Option<&Value>) -> Result<Vec<(String, &Value)>> {
    let Some(value) = present(value) else {
        return Ok(Vec::new());
    };
    let pairs: Vec<(&Value, &Value)> = match value {
        Value::Map(map) => map.iter().collect(),
        Value::Dynamic(dynamic) => dynamic.entries.iter().collect(),
        other => {
            return Err(EvaluatorError::Project(format!(
                "expected a mapping, got {}",
                other.kind()
            )))
        }
    };
    pairs
        .into_iter()
        .map(|(k, v)| {
            k.as_str()
                .map(|name| (name.to_string(), v))
                .ok_or_else(|| EvaluatorError::Project("mapping key is not a string".to_string()))
        })
        .collect()
}

fn string_map(value: Option<&Value>) -> Result<Option<BTreeMap<String, String>>> {
    if present(value).is_none() {
        return Ok(None);
    }
    entries(value)?
        .into_iter()
        .map(|(k, v)| {
            v.as_str()
                .map(|s| (k.clone(), s.to_string()))
                .ok_or_else(|| EvaluatorError::Project(format!("value for {k:?} is not a string")))
        })
        .collect::<Result<BTreeMap<_, _>>>()
        .map(Some)
}

//! Evaluator configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use pklwire_frame::{CreateEvaluator, DependencyKind, ProjectOrDependency};
use url::Url;

use crate::error::{EvaluatorError, Result};
use crate::project::{Project, ProjectDependencies};
use crate::reader::{module_spec, resource_spec, ModuleReader, ResourceReader};

/// Resource URI schemes allowed by [`EvaluatorOptions::preconfigured`].
pub const DEFAULT_ALLOWED_RESOURCES: &[&str] = &[
    "http:",
    "https:",
    "file:",
    "env:",
    "prop:",
    "modulepath:",
    "package:",
    "projectpackage:",
];

/// Module URI schemes allowed by [`EvaluatorOptions::preconfigured`].
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "pkl:",
    "repl:",
    "file:",
    "http:",
    "https:",
    "modulepath:",
    "package:",
    "projectpackage:",
];

/// Renderer used for `output.text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonnet,
    Pcf,
    Plist,
    Properties,
    Textproto,
    Xml,
    Yaml,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonnet => "jsonnet",
            OutputFormat::Pcf => "pcf",
            OutputFormat::Plist => "plist",
            OutputFormat::Properties => "properties",
            OutputFormat::Textproto => "textproto",
            OutputFormat::Xml => "xml",
            OutputFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "json" => OutputFormat::Json,
            "jsonnet" => OutputFormat::Jsonnet,
            "pcf" => OutputFormat::Pcf,
            "plist" => OutputFormat::Plist,
            "properties" => OutputFormat::Properties,
            "textproto" => OutputFormat::Textproto,
            "xml" => OutputFormat::Xml,
            "yaml" => OutputFormat::Yaml,
            other => return Err(format!("unknown output format: {other}")),
        })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for creating an evaluator.
///
/// Every field is optional; unset fields are left out of the create request
/// and Pkl applies its own defaults.
#[derive(Clone, Default)]
pub struct EvaluatorOptions {
    /// External properties, read with `read("prop:<name>")`.
    pub properties: Option<BTreeMap<String, String>>,
    /// Environment visible to `read("env:<name>")`.
    pub env: Option<BTreeMap<String, String>>,
    /// Directories, zips and jars searched for `modulepath:` URIs.
    pub module_paths: Option<Vec<String>>,
    pub output_format: Option<OutputFormat>,
    /// Regex patterns (matched against URIs) of modules that may be loaded.
    pub allowed_modules: Option<Vec<String>>,
    /// Regex patterns of resources that may be read.
    pub allowed_resources: Option<Vec<String>>,
    pub resource_readers: Vec<Arc<dyn ResourceReader>>,
    pub module_readers: Vec<Arc<dyn ModuleReader>>,
    /// Package cache; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Restricts file-based modules and resources to this directory.
    pub root_dir: Option<PathBuf>,
    /// Directory holding a `PklProject`, enabling its dependencies.
    pub project_dir: Option<PathBuf>,
    pub declared_project_dependencies: Option<ProjectDependencies>,
}

impl EvaluatorOptions {
    /// Options matching the `pkl` CLI defaults: standard schemes allowed,
    /// the process environment exposed, packages cached in `~/.pkl/cache`.
    pub fn preconfigured() -> Self {
        Self {
            allowed_resources: Some(DEFAULT_ALLOWED_RESOURCES.iter().map(|s| s.to_string()).collect()),
            allowed_modules: Some(DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect()),
            env: Some(std::env::vars().collect()),
            cache_dir: dirs::home_dir().map(|home| home.join(".pkl").join("cache")),
            ..Default::default()
        }
    }

    /// Options derived from a loaded project: its evaluator settings plus
    /// its directory and resolved dependencies.
    pub fn from_project(project: &Project) -> Result<Self> {
        let mut options = EvaluatorOptions::default();
        if let Some(settings) = &project.evaluator_settings {
            options.properties = settings.external_properties.clone();
            options.env = settings.env.clone();
            options.allowed_modules = settings.allowed_modules.clone();
            options.allowed_resources = settings.allowed_resources.clone();
            options.module_paths = settings.module_path.clone();
            options.cache_dir = if settings.no_cache == Some(true) {
                None
            } else {
                settings.module_cache_dir.as_ref().map(PathBuf::from)
            };
            options.root_dir = settings.root_dir.as_ref().map(PathBuf::from);
        }

        let project_file = Url::parse(&project.project_file_uri)?
            .to_file_path()
            .map_err(|()| {
                EvaluatorError::Project(format!(
                    "project file is not a local file: {}",
                    project.project_file_uri
                ))
            })?;
        options.project_dir = project_file.parent().map(Path::to_path_buf);
        options.declared_project_dependencies = Some(project.dependencies.clone());
        Ok(options)
    }

    /// Overlay `overrides` on top of `self`: every field set in `overrides`
    /// wins. Reader lists are replaced when `overrides` has any.
    pub fn merge(self, overrides: EvaluatorOptions) -> Self {
        Self {
            properties: overrides.properties.or(self.properties),
            env: overrides.env.or(self.env),
            module_paths: overrides.module_paths.or(self.module_paths),
            output_format: overrides.output_format.or(self.output_format),
            allowed_modules: overrides.allowed_modules.or(self.allowed_modules),
            allowed_resources: overrides.allowed_resources.or(self.allowed_resources),
            resource_readers: if overrides.resource_readers.is_empty() {
                self.resource_readers
            } else {
                overrides.resource_readers
            },
            module_readers: if overrides.module_readers.is_empty() {
                self.module_readers
            } else {
                overrides.module_readers
            },
            cache_dir: overrides.cache_dir.or(self.cache_dir),
            root_dir: overrides.root_dir.or(self.root_dir),
            project_dir: overrides.project_dir.or(self.project_dir),
            declared_project_dependencies: overrides
                .declared_project_dependencies
                .or(self.declared_project_dependencies),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_resource_reader(mut self, reader: impl ResourceReader + 'static) -> Self {
        self.resource_readers.push(Arc::new(reader));
        self
    }

    pub fn with_module_reader(mut self, reader: impl ModuleReader + 'static) -> Self {
        self.module_readers.push(Arc::new(reader));
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    /// Build the `CreateEvaluator` request.
    pub fn to_create_message(&self, request_id: i64) -> Result<CreateEvaluator> {
        let project = match &self.project_dir {
            Some(dir) => {
                let file = std::path::absolute(dir.join("PklProject"))?;
                let uri = Url::from_file_path(&file)
                    .map_err(|()| EvaluatorError::InvalidPath(file.clone()))?;
                Some(ProjectOrDependency {
                    kind: DependencyKind::Local,
                    package_uri: None,
                    project_file_uri: Some(uri.to_string()),
                    checksums: None,
                    dependencies: self
                        .declared_project_dependencies
                        .as_ref()
                        .map(ProjectDependencies::encode),
                })
            }
            None => None,
        };

        Ok(CreateEvaluator {
            request_id,
            client_resource_readers: Some(
                self.resource_readers
                    .iter()
                    .map(|r| resource_spec(r.as_ref()))
                    .collect(),
            ),
            client_module_readers: Some(
                self.module_readers
                    .iter()
                    .map(|r| module_spec(r.as_ref()))
                    .collect(),
            ),
            module_paths: self.module_paths.clone(),
            env: self.env.clone(),
            properties: self.properties.clone(),
            output_format: self.output_format.map(|f| f.as_str().to_string()),
            allowed_modules: self.allowed_modules.clone(),
            allowed_resources: self.allowed_resources.clone(),
            root_dir: self.root_dir.as_ref().map(|p| p.display().to_string()),
            cache_dir: self.cache_dir.as_ref().map(|p| p.display().to_string()),
            project,
        })
    }
}

impl fmt::Debug for EvaluatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource_schemes: Vec<&str> = self.resource_readers.iter().map(|r| r.scheme()).collect();
        let module_schemes: Vec<&str> = self.module_readers.iter().map(|r| r.scheme()).collect();
        f.debug_struct("EvaluatorOptions")
            .field("properties", &self.properties)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .field("module_paths", &self.module_paths)
            .field("output_format", &self.output_format)
            .field("allowed_modules", &self.allowed_modules)
            .field("allowed_resources", &self.allowed_resources)
            .field("resource_readers", &resource_schemes)
            .field("module_readers", &module_schemes)
            .field("cache_dir", &self.cache_dir)
            .field("root_dir", &self.root_dir)
            .field("project_dir", &self.project_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ProjectEvaluatorSettings, ProjectRemoteDependency};
    use crate::reader::{PathElement, Reader, ReaderResult};

    struct Custom;

    impl Reader for Custom {
        fn scheme(&self) -> &str {
            "custom"
        }

        fn is_globbable(&self) -> bool {
            true
        }

        fn has_hierarchical_uris(&self) -> bool {
            false
        }

        fn list_elements(&self, _url: &Url) -> ReaderResult<Vec<PathElement>> {
            Ok(vec![])
        }
    }

    impl ModuleReader for Custom {
        fn is_local(&self) -> bool {
            true
        }

        fn read(&self, _url: &Url) -> ReaderResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_preconfigured() {
        let options = EvaluatorOptions::preconfigured();
        assert!(options
            .allowed_modules
            .as_ref()
            .unwrap()
            .contains(&"repl:".to_string()));
        assert_eq!(options.allowed_resources.as_ref().unwrap().len(), 8);
        assert!(options.env.is_some());
        if let Some(cache) = &options.cache_dir {
            assert!(cache.ends_with(".pkl/cache"));
        }
    }

    #[test]
    fn test_create_message_advertises_readers() {
        let options = EvaluatorOptions::default()
            .with_module_reader(Custom)
            .with_output_format(OutputFormat::Yaml)
            .with_property("name", "value");
        let message = options.to_create_message(11).unwrap();
        assert_eq!(message.request_id, 11);
        assert_eq!(message.output_format.as_deref(), Some("yaml"));
        assert_eq!(message.client_resource_readers, Some(vec![]));
        let modules = message.client_module_readers.unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].scheme, "custom");
        assert!(modules[0].is_local);
        assert!(modules[0].is_globbable);
        assert!(message.project.is_none());
        assert!(message.allowed_modules.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_create_message_project() {
        let mut deps = ProjectDependencies::default();
        deps.remote_dependencies.insert(
            "birds".to_string(),
            ProjectRemoteDependency {
                package_uri: "package://example.com/birds@1.0.0".to_string(),
                checksums: None,
            },
        );
        let options = EvaluatorOptions {
            declared_project_dependencies: Some(deps),
            ..Default::default()
        }
        .with_project_dir("/work/app");

        let project = options.to_create_message(1).unwrap().project.unwrap();
        assert_eq!(project.kind, DependencyKind::Local);
        assert_eq!(
            project.project_file_uri.as_deref(),
            Some("file:///work/app/PklProject")
        );
        assert!(project.dependencies.unwrap().contains_key("birds"));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_project_and_merge() {
        let project = Project {
            project_file_uri: "file:///work/app/PklProject".to_string(),
            evaluator_settings: Some(ProjectEvaluatorSettings {
                allowed_modules: Some(vec!["file:".to_string()]),
                no_cache: Some(true),
                module_cache_dir: Some("/tmp/cache".to_string()),
                root_dir: Some("/work".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let base = EvaluatorOptions::from_project(&project).unwrap();
        assert_eq!(base.project_dir, Some(PathBuf::from("/work/app")));
        assert_eq!(base.cache_dir, None);
        assert_eq!(base.root_dir, Some(PathBuf::from("/work")));

        let merged = base.merge(EvaluatorOptions {
            allowed_modules: Some(vec!["pkl:".to_string()]),
            ..Default::default()
        });
        assert_eq!(merged.allowed_modules, Some(vec!["pkl:".to_string()]));
        assert_eq!(merged.project_dir, Some(PathBuf::from("/work/app")));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("pcf".parse::<OutputFormat>(), Ok(OutputFormat::Pcf));
        assert!("toml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Textproto.to_string(), "textproto");
    }
}

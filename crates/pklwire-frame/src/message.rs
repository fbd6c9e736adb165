//! Typed messages exchanged with a Pkl server.
//!
//! Each message is a MessagePack array `[kind, {fields}]` with camelCase
//! field names. Optional fields that are `None` are left out of the map
//! entirely; the server treats absent and nil differently for some fields.

use std::collections::BTreeMap;

use rmpv::Value as Raw;

use crate::code;
use crate::error::{FrameError, Result};

/// A client-side reader advertised in `CreateEvaluator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderSpec {
    pub scheme: String,
    pub has_hierarchical_uris: bool,
    pub is_globbable: bool,
}

/// A client-side module reader advertised in `CreateEvaluator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReaderSpec {
    pub scheme: String,
    pub has_hierarchical_uris: bool,
    pub is_globbable: bool,
    pub is_local: bool,
}

/// One entry of a directory-style listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    pub name: String,
    pub is_directory: bool,
}

impl PathElement {
    pub fn new(name: impl Into<String>, is_directory: bool) -> Self {
        Self {
            name: name.into(),
            is_directory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub sha256: String,
}

/// Whether a project dependency lives on disk or in a package repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Local,
    Remote,
}

impl DependencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyKind::Local => "local",
            DependencyKind::Remote => "remote",
        }
    }
}

/// Project or dependency descriptor sent with `CreateEvaluator`.
///
/// Local dependencies carry a project file URI and their own dependencies;
/// remote ones carry a package URI and optional checksums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOrDependency {
    pub kind: DependencyKind,
    pub package_uri: Option<String>,
    pub project_file_uri: Option<String>,
    pub checksums: Option<Checksums>,
    pub dependencies: Option<BTreeMap<String, ProjectOrDependency>>,
}

/// Fields of `CreateEvaluator` (0x20).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateEvaluator {
    pub request_id: i64,
    pub client_resource_readers: Option<Vec<ReaderSpec>>,
    pub client_module_readers: Option<Vec<ModuleReaderSpec>>,
    pub module_paths: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    pub properties: Option<BTreeMap<String, String>>,
    pub output_format: Option<String>,
    pub allowed_modules: Option<Vec<String>>,
    pub allowed_resources: Option<Vec<String>>,
    pub root_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub project: Option<ProjectOrDependency>,
}

/// Fields of `Evaluate` (0x23).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluate {
    pub request_id: i64,
    pub evaluator_id: i64,
    pub module_uri: String,
    pub module_text: Option<String>,
    pub expr: Option<String>,
}

/// Messages the host sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    CreateEvaluator(CreateEvaluator),
    CloseEvaluator {
        evaluator_id: i64,
    },
    Evaluate(Evaluate),
    ReadResourceResponse {
        request_id: i64,
        evaluator_id: i64,
        result: std::result::Result<Vec<u8>, String>,
    },
    ReadModuleResponse {
        request_id: i64,
        evaluator_id: i64,
        result: std::result::Result<String, String>,
    },
    ListResourcesResponse {
        request_id: i64,
        evaluator_id: i64,
        result: std::result::Result<Vec<PathElement>, String>,
    },
    ListModulesResponse {
        request_id: i64,
        evaluator_id: i64,
        result: std::result::Result<Vec<PathElement>, String>,
    },
}

/// A read or list callback from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub request_id: i64,
    pub evaluator_id: i64,
    pub uri: String,
}

/// Messages the server sends to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    CreateEvaluatorResponse {
        request_id: i64,
        evaluator_id: Option<i64>,
        error: Option<String>,
    },
    EvaluateResponse {
        request_id: i64,
        evaluator_id: i64,
        result: Option<Vec<u8>>,
        error: Option<String>,
    },
    Log {
        evaluator_id: i64,
        level: i64,
        message: String,
        frame_uri: String,
    },
    ReadResource(ReadRequest),
    ReadModule(ReadRequest),
    ListResources(ReadRequest),
    ListModules(ReadRequest),
}

impl OutgoingMessage {
    pub fn code(&self) -> u64 {
        match self {
            OutgoingMessage::CreateEvaluator(_) => code::CREATE_EVALUATOR,
            OutgoingMessage::CloseEvaluator { .. } => code::CLOSE_EVALUATOR,
            OutgoingMessage::Evaluate(_) => code::EVALUATE,
            OutgoingMessage::ReadResourceResponse { .. } => code::READ_RESOURCE_RESPONSE,
            OutgoingMessage::ReadModuleResponse { .. } => code::READ_MODULE_RESPONSE,
            OutgoingMessage::ListResourcesResponse { .. } => code::LIST_RESOURCES_RESPONSE,
            OutgoingMessage::ListModulesResponse { .. } => code::LIST_MODULES_RESPONSE,
        }
    }

    /// Convert into the `[kind, {fields}]` wire record.
    pub fn to_value(&self) -> Raw {
        let record = match self {
            OutgoingMessage::CreateEvaluator(m) => Record::default()
                .put("requestId", m.request_id)
                .put_opt(
                    "clientResourceReaders",
                    m.client_resource_readers
                        .as_ref()
                        .map(|rs| Raw::Array(rs.iter().map(reader_spec).collect())),
                )
                .put_opt(
                    "clientModuleReaders",
                    m.client_module_readers
                        .as_ref()
                        .map(|rs| Raw::Array(rs.iter().map(module_reader_spec).collect())),
                )
                .put_opt("modulePaths", m.module_paths.as_deref().map(string_array))
                .put_opt("env", m.env.as_ref().map(string_map))
                .put_opt("properties", m.properties.as_ref().map(string_map))
                .put_opt("outputFormat", m.output_format.as_deref())
                .put_opt("allowedModules", m.allowed_modules.as_deref().map(string_array))
                .put_opt(
                    "allowedResources",
                    m.allowed_resources.as_deref().map(string_array),
                )
                .put_opt("rootDir", m.root_dir.as_deref())
                .put_opt("cacheDir", m.cache_dir.as_deref())
                .put_opt("project", m.project.as_ref().map(project_value)),
            OutgoingMessage::CloseEvaluator { evaluator_id } => {
                Record::default().put("evaluatorId", *evaluator_id)
            }
            OutgoingMessage::Evaluate(m) => Record::default()
                .put("requestId", m.request_id)
                .put("evaluatorId", m.evaluator_id)
                .put("moduleUri", m.module_uri.as_str())
                .put_opt("moduleText", m.module_text.as_deref())
                .put_opt("expr", m.expr.as_deref()),
            OutgoingMessage::ReadResourceResponse {
                request_id,
                evaluator_id,
                result,
            } => reply(*request_id, *evaluator_id).put_result(
                result
                    .as_ref()
                    .map(|bytes| Raw::Binary(bytes.clone())),
            ),
            OutgoingMessage::ReadModuleResponse {
                request_id,
                evaluator_id,
                result,
            } => reply(*request_id, *evaluator_id)
                .put_result(result.as_ref().map(|text| Raw::from(text.as_str()))),
            OutgoingMessage::ListResourcesResponse {
                request_id,
                evaluator_id,
                result,
            }
            | OutgoingMessage::ListModulesResponse {
                request_id,
                evaluator_id,
                result,
            } => reply(*request_id, *evaluator_id).put_listing(result.as_ref()),
        };
        record.finish(self.code())
    }

    /// Parse a wire record sent by a host. Used by server-side fixtures.
    pub fn from_value(raw: Raw) -> Result<Self> {
        let (code, mut f) = Fields::from_record(raw)?;
        let message = match code {
            code::CREATE_EVALUATOR => OutgoingMessage::CreateEvaluator(CreateEvaluator {
                request_id: f.i64("requestId")?,
                client_resource_readers: f
                    .opt_array("clientResourceReaders")?
                    .map(|items| {
                        items
                            .into_iter()
                            .map(parse_reader_spec)
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?,
                client_module_readers: f
                    .opt_array("clientModuleReaders")?
                    .map(|items| {
                        items
                            .into_iter()
                            .map(parse_module_reader_spec)
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?,
                module_paths: f.opt_strings("modulePaths")?,
                env: f.opt_string_map("env")?,
                properties: f.opt_string_map("properties")?,
                output_format: f.opt_string("outputFormat")?,
                allowed_modules: f.opt_strings("allowedModules")?,
                allowed_resources: f.opt_strings("allowedResources")?,
                root_dir: f.opt_string("rootDir")?,
                cache_dir: f.opt_string("cacheDir")?,
                project: f.take("project").map(parse_project).transpose()?,
            }),
            code::CLOSE_EVALUATOR => OutgoingMessage::CloseEvaluator {
                evaluator_id: f.i64("evaluatorId")?,
            },
            code::EVALUATE => OutgoingMessage::Evaluate(Evaluate {
                request_id: f.i64("requestId")?,
                evaluator_id: f.i64("evaluatorId")?,
                module_uri: f.string("moduleUri")?,
                module_text: f.opt_string("moduleText")?,
                expr: f.opt_string("expr")?,
            }),
            code::READ_RESOURCE_RESPONSE => OutgoingMessage::ReadResourceResponse {
                request_id: f.i64("requestId")?,
                evaluator_id: f.i64("evaluatorId")?,
                result: match f.opt_string("error")? {
                    Some(error) => Err(error),
                    None => Ok(f.opt_bytes("contents")?.unwrap_or_default()),
                },
            },
            code::READ_MODULE_RESPONSE => OutgoingMessage::ReadModuleResponse {
                request_id: f.i64("requestId")?,
                evaluator_id: f.i64("evaluatorId")?,
                result: match f.opt_string("error")? {
                    Some(error) => Err(error),
                    None => Ok(f.opt_string("contents")?.unwrap_or_default()),
                },
            },
            code::LIST_RESOURCES_RESPONSE | code::LIST_MODULES_RESPONSE => {
                let request_id = f.i64("requestId")?;
                let evaluator_id = f.i64("evaluatorId")?;
                let result = match f.opt_string("error")? {
                    Some(error) => Err(error),
                    None => Ok(f
                        .opt_array("pathElements")?
                        .unwrap_or_default()
                        .into_iter()
                        .map(parse_path_element)
                        .collect::<Result<Vec<_>>>()?),
                };
                if code == code::LIST_RESOURCES_RESPONSE {
                    OutgoingMessage::ListResourcesResponse {
                        request_id,
                        evaluator_id,
                        result,
                    }
                } else {
                    OutgoingMessage::ListModulesResponse {
                        request_id,
                        evaluator_id,
                        result,
                    }
                }
            }
            other => return Err(FrameError::UnknownCode(other)),
        };
        Ok(message)
    }
}

impl IncomingMessage {
    pub fn code(&self) -> u64 {
        match self {
            IncomingMessage::CreateEvaluatorResponse { .. } => code::CREATE_EVALUATOR_RESPONSE,
            IncomingMessage::EvaluateResponse { .. } => code::EVALUATE_RESPONSE,
            IncomingMessage::Log { .. } => code::LOG,
            IncomingMessage::ReadResource(_) => code::READ_RESOURCE,
            IncomingMessage::ReadModule(_) => code::READ_MODULE,
            IncomingMessage::ListResources(_) => code::LIST_RESOURCES,
            IncomingMessage::ListModules(_) => code::LIST_MODULES,
        }
    }

    /// The session this message belongs to. `None` for create responses,
    /// which are routed by request id instead.
    pub fn evaluator_id(&self) -> Option<i64> {
        match self {
            IncomingMessage::CreateEvaluatorResponse { .. } => None,
            IncomingMessage::EvaluateResponse { evaluator_id, .. }
            | IncomingMessage::Log { evaluator_id, .. } => Some(*evaluator_id),
            IncomingMessage::ReadResource(r)
            | IncomingMessage::ReadModule(r)
            | IncomingMessage::ListResources(r)
            | IncomingMessage::ListModules(r) => Some(r.evaluator_id),
        }
    }

    /// Parse a `[kind, {fields}]` record sent by the server.
    pub fn from_value(raw: Raw) -> Result<Self> {
        let (code, mut f) = Fields::from_record(raw)?;
        let message = match code {
            code::CREATE_EVALUATOR_RESPONSE => IncomingMessage::CreateEvaluatorResponse {
                request_id: f.i64("requestId")?,
                evaluator_id: f.opt_i64("evaluatorId")?,
                error: f.opt_string("error")?.filter(|e| !e.is_empty()),
            },
            code::EVALUATE_RESPONSE => IncomingMessage::EvaluateResponse {
                request_id: f.i64("requestId")?,
                evaluator_id: f.i64("evaluatorId")?,
                result: f.opt_bytes("result")?,
                error: f.opt_string("error")?.filter(|e| !e.is_empty()),
            },
            code::LOG => IncomingMessage::Log {
                evaluator_id: f.i64("evaluatorId")?,
                level: f.i64("level")?,
                message: f.string("message")?,
                frame_uri: f.opt_string("frameUri")?.unwrap_or_default(),
            },
            code::READ_RESOURCE => IncomingMessage::ReadResource(f.read_request()?),
            code::READ_MODULE => IncomingMessage::ReadModule(f.read_request()?),
            code::LIST_RESOURCES => IncomingMessage::ListResources(f.read_request()?),
            code::LIST_MODULES => IncomingMessage::ListModules(f.read_request()?),
            other => return Err(FrameError::UnknownCode(other)),
        };
        Ok(message)
    }

    /// Convert into the wire record. Used by server-side fixtures.
    pub fn to_value(&self) -> Raw {
        let record = match self {
            IncomingMessage::CreateEvaluatorResponse {
                request_id,
                evaluator_id,
                error,
            } => Record::default()
                .put("requestId", *request_id)
                .put_opt("evaluatorId", *evaluator_id)
                .put_opt("error", error.as_deref()),
            IncomingMessage::EvaluateResponse {
                request_id,
                evaluator_id,
                result,
                error,
            } => reply(*request_id, *evaluator_id)
                .put_opt("result", result.clone().map(Raw::Binary))
                .put_opt("error", error.as_deref()),
            IncomingMessage::Log {
                evaluator_id,
                level,
                message,
                frame_uri,
            } => Record::default()
                .put("evaluatorId", *evaluator_id)
                .put("level", *level)
                .put("message", message.as_str())
                .put("frameUri", frame_uri.as_str()),
            IncomingMessage::ReadResource(r)
            | IncomingMessage::ReadModule(r)
            | IncomingMessage::ListResources(r)
            | IncomingMessage::ListModules(r) => {
                reply(r.request_id, r.evaluator_id).put("uri", r.uri.as_str())
            }
        };
        record.finish(self.code())
    }
}

/// Field map under construction, in insertion order.
#[derive(Default)]
struct Record(Vec<(Raw, Raw)>);

impl Record {
    fn put(mut self, name: &str, value: impl Into<Raw>) -> Self {
        self.0.push((Raw::from(name), value.into()));
        self
    }

    fn put_opt<V: Into<Raw>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.put(name, v),
            None => self,
        }
    }

    fn put_result(self, result: std::result::Result<Raw, &String>) -> Self {
        match result {
            Ok(contents) => self.put("contents", contents),
            Err(error) => self.put("error", error.as_str()),
        }
    }

    fn put_listing(self, result: std::result::Result<&Vec<PathElement>, &String>) -> Self {
        match result {
            Ok(elements) => self.put(
                "pathElements",
                Raw::Array(
                    elements
                        .iter()
                        .map(|e| {
                            Record::default()
                                .put("name", e.name.as_str())
                                .put("isDirectory", e.is_directory)
                                .into_map()
                        })
                        .collect(),
                ),
            ),
            Err(error) => self.put("error", error.as_str()),
        }
    }

    fn into_map(self) -> Raw {
        Raw::Map(self.0)
    }

    fn finish(self, code: u64) -> Raw {
        Raw::Array(vec![Raw::from(code), self.into_map()])
    }
}

fn reply(request_id: i64, evaluator_id: i64) -> Record {
    Record::default()
        .put("requestId", request_id)
        .put("evaluatorId", evaluator_id)
}

fn string_array(items: &[String]) -> Raw {
    Raw::Array(items.iter().map(|s| Raw::from(s.as_str())).collect())
}

fn string_map(map: &BTreeMap<String, String>) -> Raw {
    Raw::Map(
        map.iter()
            .map(|(k, v)| (Raw::from(k.as_str()), Raw::from(v.as_str())))
            .collect(),
    )
}

fn reader_spec(r: &ReaderSpec) -> Raw {
    Record::default()
        .put("scheme", r.scheme.as_str())
        .put("hasHierarchicalUris", r.has_hierarchical_uris)
        .put("isGlobbable", r.is_globbable)
        .into_map()
}

fn module_reader_spec(r: &ModuleReaderSpec) -> Raw {
    Record::default()
        .put("scheme", r.scheme.as_str())
        .put("hasHierarchicalUris", r.has_hierarchical_uris)
        .put("isGlobbable", r.is_globbable)
        .put("isLocal", r.is_local)
        .into_map()
}

fn project_value(p: &ProjectOrDependency) -> Raw {
    Record::default()
        .put_opt("packageUri", p.package_uri.as_deref())
        .put("type", p.kind.as_str())
        .put_opt("projectFileUri", p.project_file_uri.as_deref())
        .put_opt(
            "checksums",
            p.checksums.as_ref().map(|c| {
                Record::default()
                    .put("sha256", c.sha256.as_str())
                    .into_map()
            }),
        )
        .put_opt(
            "dependencies",
            p.dependencies.as_ref().map(|deps| {
                Raw::Map(
                    deps.iter()
                        .map(|(name, dep)| (Raw::from(name.as_str()), project_value(dep)))
                        .collect(),
                )
            }),
        )
        .into_map()
}

fn parse_reader_spec(raw: Raw) -> Result<ReaderSpec> {
    let mut f = Fields::from_map("ReaderSpec", raw)?;
    Ok(ReaderSpec {
        scheme: f.string("scheme")?,
        has_hierarchical_uris: f.bool("hasHierarchicalUris")?,
        is_globbable: f.bool("isGlobbable")?,
    })
}

fn parse_module_reader_spec(raw: Raw) -> Result<ModuleReaderSpec> {
    let mut f = Fields::from_map("ModuleReaderSpec", raw)?;
    Ok(ModuleReaderSpec {
        scheme: f.string("scheme")?,
        has_hierarchical_uris: f.bool("hasHierarchicalUris")?,
        is_globbable: f.bool("isGlobbable")?,
        is_local: f.bool("isLocal")?,
    })
}

fn parse_path_element(raw: Raw) -> Result<PathElement> {
    let mut f = Fields::from_map("PathElement", raw)?;
    Ok(PathElement {
        name: f.string("name")?,
        is_directory: f.bool("isDirectory")?,
    })
}

fn parse_project(raw: Raw) -> Result<ProjectOrDependency> {
    let mut f = Fields::from_map("ProjectOrDependency", raw)?;
    let kind = match f.string("type")?.as_str() {
        "local" => DependencyKind::Local,
        "remote" => DependencyKind::Remote,
        _ => {
            return Err(FrameError::InvalidField {
                kind: "ProjectOrDependency",
                field: "type",
                expected: "\"local\" or \"remote\"",
            })
        }
    };
    let checksums = match f.take("checksums") {
        Some(raw) => {
            let mut c = Fields::from_map("Checksums", raw)?;
            Some(Checksums {
                sha256: c.string("sha256")?,
            })
        }
        None => None,
    };
    let dependencies = match f.take("dependencies") {
        Some(Raw::Map(pairs)) => Some(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let name = k.as_str().map(str::to_string).ok_or(FrameError::InvalidField {
                        kind: "ProjectOrDependency",
                        field: "dependencies",
                        expected: "string keys",
                    })?;
                    Ok((name, parse_project(v)?))
                })
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        Some(_) => {
            return Err(FrameError::InvalidField {
                kind: "ProjectOrDependency",
                field: "dependencies",
                expected: "map",
            })
        }
        None => None,
    };
    Ok(ProjectOrDependency {
        kind,
        package_uri: f.opt_string("packageUri")?,
        project_file_uri: f.opt_string("projectFileUri")?,
        checksums,
        dependencies,
    })
}

/// Field map of a received record. Nil values count as absent.
struct Fields {
    kind: &'static str,
    entries: Vec<(Raw, Raw)>,
}

impl Fields {
    fn from_record(raw: Raw) -> Result<(u64, Fields)> {
        let items = match raw {
            Raw::Array(items) if items.len() == 2 => items,
            other => return Err(FrameError::NotARecord(other.to_string())),
        };
        let mut items = items.into_iter();
        let code = match items.next() {
            Some(Raw::Integer(n)) => n
                .as_u64()
                .ok_or_else(|| FrameError::NotARecord(format!("negative kind {n:?}")))?,
            other => {
                return Err(FrameError::NotARecord(format!(
                    "kind is not an integer: {other:?}"
                )))
            }
        };
        let fields = match items.next() {
            Some(Raw::Map(entries)) => Fields {
                kind: code::code_name(code),
                entries,
            },
            other => {
                return Err(FrameError::NotARecord(format!(
                    "fields are not a map: {other:?}"
                )))
            }
        };
        Ok((code, fields))
    }

    fn from_map(kind: &'static str, raw: Raw) -> Result<Fields> {
        match raw {
            Raw::Map(entries) => Ok(Fields { kind, entries }),
            _ => Err(FrameError::NotARecord(format!("{kind} is not a map"))),
        }
    }

    fn take(&mut self, field: &'static str) -> Option<Raw> {
        let pos = self
            .entries
            .iter()
            .position(|(k, _)| k.as_str() == Some(field))?;
        match self.entries.swap_remove(pos).1 {
            Raw::Nil => None,
            value => Some(value),
        }
    }

    fn require(&mut self, field: &'static str) -> Result<Raw> {
        self.take(field).ok_or(FrameError::MissingField {
            kind: self.kind,
            field,
        })
    }

    fn invalid(&self, field: &'static str, expected: &'static str) -> FrameError {
        FrameError::InvalidField {
            kind: self.kind,
            field,
            expected,
        }
    }

    fn i64(&mut self, field: &'static str) -> Result<i64> {
        let raw = self.require(field)?;
        raw.as_i64().ok_or_else(|| self.invalid(field, "int64"))
    }

    fn opt_i64(&mut self, field: &'static str) -> Result<Option<i64>> {
        match self.take(field) {
            Some(raw) => raw
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(field, "int64")),
            None => Ok(None),
        }
    }

    fn bool(&mut self, field: &'static str) -> Result<bool> {
        match self.take(field) {
            Some(Raw::Boolean(b)) => Ok(b),
            Some(_) => Err(self.invalid(field, "bool")),
            None => Ok(false),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        let raw = self.require(field)?;
        self.text(field, raw)
    }

    fn opt_string(&mut self, field: &'static str) -> Result<Option<String>> {
        match self.take(field) {
            Some(raw) => self.text(field, raw).map(Some),
            None => Ok(None),
        }
    }

    fn text(&self, field: &'static str, raw: Raw) -> Result<String> {
        match raw {
            Raw::String(s) => s.into_str().ok_or_else(|| self.invalid(field, "UTF-8 string")),
            _ => Err(self.invalid(field, "string")),
        }
    }

    fn opt_bytes(&mut self, field: &'static str) -> Result<Option<Vec<u8>>> {
        match self.take(field) {
            Some(Raw::Binary(bytes)) => Ok(Some(bytes)),
            Some(_) => Err(self.invalid(field, "binary")),
            None => Ok(None),
        }
    }

    fn opt_array(&mut self, field: &'static str) -> Result<Option<Vec<Raw>>> {
        match self.take(field) {
            Some(Raw::Array(items)) => Ok(Some(items)),
            Some(_) => Err(self.invalid(field, "array")),
            None => Ok(None),
        }
    }

    fn opt_strings(&mut self, field: &'static str) -> Result<Option<Vec<String>>> {
        match self.opt_array(field)? {
            Some(items) => items
                .into_iter()
                .map(|raw| self.text(field, raw))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            None => Ok(None),
        }
    }

    fn opt_string_map(&mut self, field: &'static str) -> Result<Option<BTreeMap<String, String>>> {
        match self.take(field) {
            Some(Raw::Map(pairs)) => pairs
                .into_iter()
                .map(|(k, v)| Ok((self.text(field, k)?, self.text(field, v)?)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Some),
            Some(_) => Err(self.invalid(field, "map")),
            None => Ok(None),
        }
    }

    fn read_request(&mut self) -> Result<ReadRequest> {
        Ok(ReadRequest {
            request_id: self.i64("requestId")?,
            evaluator_id: self.i64("evaluatorId")?,
            uri: self.string("uri")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(record: &'a Raw, name: &str) -> Option<&'a Raw> {
        let Raw::Array(items) = record else {
            panic!("not a record");
        };
        let Raw::Map(entries) = &items[1] else {
            panic!("fields not a map");
        };
        entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v)
    }

    #[test]
    fn test_evaluate_omits_absent_fields() {
        let message = OutgoingMessage::Evaluate(Evaluate {
            request_id: 7,
            evaluator_id: 42,
            module_uri: "file:///tmp/a.pkl".to_string(),
            module_text: None,
            expr: None,
        });
        let raw = message.to_value();
        assert_eq!(field(&raw, "requestId"), Some(&Raw::from(7)));
        assert_eq!(field(&raw, "moduleUri"), Some(&Raw::from("file:///tmp/a.pkl")));
        assert!(field(&raw, "moduleText").is_none());
        assert!(field(&raw, "expr").is_none());
    }

    #[test]
    fn test_create_evaluator_field_names() {
        let message = OutgoingMessage::CreateEvaluator(CreateEvaluator {
            request_id: 1,
            client_module_readers: Some(vec![ModuleReaderSpec {
                scheme: "custom".to_string(),
                has_hierarchical_uris: true,
                is_globbable: false,
                is_local: true,
            }]),
            allowed_modules: Some(vec!["pkl:".to_string()]),
            output_format: Some("yaml".to_string()),
            ..Default::default()
        });
        let raw = message.to_value();
        assert!(field(&raw, "clientModuleReaders").is_some());
        assert!(field(&raw, "clientResourceReaders").is_none());
        assert_eq!(field(&raw, "outputFormat"), Some(&Raw::from("yaml")));
        assert!(field(&raw, "project").is_none());

        let parsed = OutgoingMessage::from_value(raw).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_project_descriptor() {
        let mut deps = BTreeMap::new();
        deps.insert(
            "birds".to_string(),
            ProjectOrDependency {
                kind: DependencyKind::Remote,
                package_uri: Some("package://example.com/birds@1.0.0".to_string()),
                project_file_uri: None,
                checksums: Some(Checksums {
                    sha256: "abc123".to_string(),
                }),
                dependencies: None,
            },
        );
        let message = OutgoingMessage::CreateEvaluator(CreateEvaluator {
            request_id: 3,
            project: Some(ProjectOrDependency {
                kind: DependencyKind::Local,
                package_uri: None,
                project_file_uri: Some("file:///proj/PklProject".to_string()),
                checksums: None,
                dependencies: Some(deps),
            }),
            ..Default::default()
        });
        let raw = message.to_value();
        let project = field(&raw, "project").unwrap();
        let Raw::Map(entries) = project else {
            panic!("project not a map");
        };
        assert!(entries
            .iter()
            .any(|(k, v)| k.as_str() == Some("type") && v.as_str() == Some("local")));
        assert_eq!(OutgoingMessage::from_value(raw).unwrap(), message);
    }

    #[test]
    fn test_read_reply_carries_exactly_one_of_contents_or_error() {
        let ok = OutgoingMessage::ReadModuleResponse {
            request_id: 1,
            evaluator_id: 2,
            result: Ok("foo = 1".to_string()),
        }
        .to_value();
        assert_eq!(field(&ok, "contents"), Some(&Raw::from("foo = 1")));
        assert!(field(&ok, "error").is_none());

        let err = OutgoingMessage::ReadResourceResponse {
            request_id: 1,
            evaluator_id: 2,
            result: Err("boom".to_string()),
        }
        .to_value();
        assert_eq!(field(&err, "error"), Some(&Raw::from("boom")));
        assert!(field(&err, "contents").is_none());
    }

    #[test]
    fn test_list_reply_path_elements() {
        let message = OutgoingMessage::ListModulesResponse {
            request_id: 5,
            evaluator_id: 6,
            result: Ok(vec![
                PathElement::new("a.pkl", false),
                PathElement::new("sub", true),
            ]),
        };
        let parsed = OutgoingMessage::from_value(message.to_value()).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_incoming_create_response() {
        let raw = IncomingMessage::CreateEvaluatorResponse {
            request_id: 9,
            evaluator_id: Some(-4),
            error: None,
        }
        .to_value();
        let parsed = IncomingMessage::from_value(raw).unwrap();
        assert_eq!(parsed.code(), code::CREATE_EVALUATOR_RESPONSE);
        assert_eq!(parsed.evaluator_id(), None);
        assert!(matches!(
            parsed,
            IncomingMessage::CreateEvaluatorResponse {
                request_id: 9,
                evaluator_id: Some(-4),
                error: None
            }
        ));
    }

    #[test]
    fn test_empty_error_string_is_no_error() {
        let raw = Raw::Array(vec![
            Raw::from(code::EVALUATE_RESPONSE),
            Raw::Map(vec![
                (Raw::from("requestId"), Raw::from(1)),
                (Raw::from("evaluatorId"), Raw::from(2)),
                (Raw::from("result"), Raw::Binary(vec![0xc0])),
                (Raw::from("error"), Raw::from("")),
            ]),
        ]);
        let IncomingMessage::EvaluateResponse { result, error, .. } =
            IncomingMessage::from_value(raw).unwrap()
        else {
            panic!("expected evaluate response");
        };
        assert_eq!(result, Some(vec![0xc0]));
        assert_eq!(error, None);
    }

    #[test]
    fn test_nil_field_counts_as_absent() {
        let raw = Raw::Array(vec![
            Raw::from(code::CREATE_EVALUATOR_RESPONSE),
            Raw::Map(vec![
                (Raw::from("requestId"), Raw::from(1)),
                (Raw::from("evaluatorId"), Raw::Nil),
                (Raw::from("error"), Raw::from("bad option")),
            ]),
        ]);
        let parsed = IncomingMessage::from_value(raw).unwrap();
        assert!(matches!(
            parsed,
            IncomingMessage::CreateEvaluatorResponse {
                evaluator_id: None,
                error: Some(ref e),
                ..
            } if e == "bad option"
        ));
    }

    #[test]
    fn test_missing_field() {
        let raw = Raw::Array(vec![
            Raw::from(code::READ_MODULE),
            Raw::Map(vec![
                (Raw::from("requestId"), Raw::from(1)),
                (Raw::from("evaluatorId"), Raw::from(2)),
            ]),
        ]);
        let err = IncomingMessage::from_value(raw).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MissingField {
                kind: "ReadModule",
                field: "uri"
            }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_kind() {
        let raw = Raw::Array(vec![Raw::from(0x99), Raw::Map(vec![])]);
        assert!(matches!(
            IncomingMessage::from_value(raw),
            Err(FrameError::UnknownCode(0x99))
        ));
    }

    #[test]
    fn test_not_a_record() {
        assert!(matches!(
            IncomingMessage::from_value(Raw::from("hello")),
            Err(FrameError::NotARecord(_))
        ));
    }

    #[test]
    fn test_log_message() {
        let message = IncomingMessage::Log {
            evaluator_id: 11,
            level: 1,
            message: "careful".to_string(),
            frame_uri: "file:///tmp/a.pkl".to_string(),
        };
        let parsed = IncomingMessage::from_value(message.to_value()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.evaluator_id(), Some(11));
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::request::RequestContext;

/// Closed set of check tags, one per observable operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    FileUpload,
    Directory,
    ReadFile,
    WriteFile,
    Command,
    Sql,
    Xxe,
    Ognl,
    Deserialization,
    Request,
    Common,
}

impl CheckKind {
    /// The wire tag used in config, logs, and the parameter summary.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::FileUpload => "fileUpload",
            CheckKind::Directory => "directory",
            CheckKind::ReadFile => "readFile",
            CheckKind::WriteFile => "writeFile",
            CheckKind::Command => "command",
            CheckKind::Sql => "sql",
            CheckKind::Xxe => "xxe",
            CheckKind::Ognl => "ognl",
            CheckKind::Deserialization => "deserialization",
            CheckKind::Request => "request",
            CheckKind::Common => "common",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized parameter value.
///
/// Deliberately closed (no open any-type): strings, raw bytes, or string
/// lists cover every hook kind, and a closed set keeps the checker
/// contract checkable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    List(Vec<String>),
    Bytes(Vec<u8>),
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_owned())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value)
    }
}

/// Parameter bag built by normalization. Keys are the fixed parameter
/// names of each hook kind, so uniqueness holds by construction.
pub type Params = BTreeMap<&'static str, ParamValue>;

/// Everything the checker sees for one hook invocation.
///
/// Immutable once constructed; built inside the dispatcher and discarded
/// when the decision call returns.
#[derive(Debug)]
pub struct CheckParameter<'a> {
    kind: CheckKind,
    params: Params,
    request: Option<&'a RequestContext>,
}

impl<'a> CheckParameter<'a> {
    pub(crate) fn new(kind: CheckKind, params: Params, request: Option<&'a RequestContext>) -> Self {
        Self {
            kind,
            params,
            request,
        }
    }

    pub fn kind(&self) -> CheckKind {
        self.kind
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// The in-flight request on the calling thread, if one is bound.
    pub fn request(&self) -> Option<&'a RequestContext> {
        self.request
    }

    /// One-line summary: kind tag plus the parameter bag as JSON.
    pub fn describe(&self) -> String {
        match serde_json::to_string(&self.params) {
            Ok(json) => format!("{} {json}", self.kind),
            Err(_) => format!("{} {{}}", self.kind),
        }
    }
}

impl fmt::Display for CheckParameter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

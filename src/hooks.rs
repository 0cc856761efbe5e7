//! Hook-point normalization: raw call-site data → check kind + parameter bag.
//!
//! Every observable operation kind is a variant of [`HookEvent`], and one
//! table ([`normalize`]) turns it into the `(CheckKind, Params)` pair the
//! dispatcher submits to the checker. Returning `None` means the hook is
//! skipped (missing or empty inputs), never an error: normalization
//! failures degrade to best-effort values instead of aborting.

use std::path::Path;

use crate::check::{CheckKind, ParamValue, Params};
use crate::config::Settings;

/// Raw arguments of one hook invocation, as produced by the host
/// operation being observed. `Option` fields mirror arguments the
/// call site may not have (the skip policy drops the whole event).
#[derive(Debug)]
pub enum HookEvent<'a> {
    /// Multipart file upload: name plus raw content bytes.
    FileUpload {
        name: Option<&'a str>,
        content: Option<&'a [u8]>,
    },
    /// Directory listing of `path`.
    ListFiles { path: Option<&'a Path> },
    /// File opened for reading.
    ReadFile { path: Option<&'a Path> },
    /// File opened for writing; no content yet, so an empty placeholder
    /// is submitted.
    WriteFile { path: Option<&'a Path> },
    /// Write through an already-open stream whose target path was
    /// stashed on a [`WriteStreamToken`] at open time.
    StreamWrite {
        path: Option<&'a str>,
        bytes: &'a [u8],
    },
    /// Process execution with an argv list.
    Command { argv: &'a [String] },
    /// SQL statement about to execute against `server`.
    Sql { server: &'a str, statement: &'a str },
    /// External entity resolution during XML parsing.
    Xxe { entity: Option<&'a str> },
    /// Expression-language evaluation (OGNL and friends).
    Ognl { expression: Option<&'a str> },
    /// Deserialization of a class by resolved name.
    Deserialization { class_name: Option<&'a str> },
}

/// The normalization table. One arm per hook kind; `None` = skip.
pub(crate) fn normalize(event: &HookEvent<'_>, settings: &Settings) -> Option<(CheckKind, Params)> {
    match event {
        HookEvent::FileUpload { name, content } => {
            let name = (*name)?;
            let content = (*content)?;
            let cut = content.len().min(settings.upload_content_max_bytes);
            let mut params = Params::new();
            params.insert("filename", ParamValue::from(name));
            params.insert(
                "content",
                ParamValue::Str(String::from_utf8_lossy(&content[..cut]).into_owned()),
            );
            Some((CheckKind::FileUpload, params))
        }
        HookEvent::ListFiles { path } => Some((CheckKind::Directory, path_params((*path)?))),
        HookEvent::ReadFile { path } => Some((CheckKind::ReadFile, path_params((*path)?))),
        HookEvent::WriteFile { path } => {
            let path = (*path)?;
            let mut params = Params::new();
            params.insert("name", ParamValue::Str(file_name(path)));
            params.insert("realpath", ParamValue::Str(real_path(path)));
            params.insert("content", ParamValue::Str(String::new()));
            Some((CheckKind::WriteFile, params))
        }
        HookEvent::StreamWrite { path, bytes } => {
            let path = (*path)?;
            if bytes.is_empty() {
                return None;
            }
            let mut params = Params::new();
            params.insert("name", ParamValue::Str(file_name(Path::new(path))));
            params.insert("realpath", ParamValue::from(path));
            params.insert(
                "content",
                ParamValue::Str(String::from_utf8_lossy(bytes).into_owned()),
            );
            Some((CheckKind::WriteFile, params))
        }
        HookEvent::Command { argv } => {
            if argv.is_empty() {
                return None;
            }
            let mut params = Params::new();
            params.insert("command", ParamValue::List(argv.to_vec()));
            Some((CheckKind::Command, params))
        }
        HookEvent::Sql { server, statement } => {
            if statement.is_empty() {
                return None;
            }
            let mut params = Params::new();
            params.insert("server", ParamValue::from(*server));
            params.insert("query", ParamValue::from(*statement));
            Some((CheckKind::Sql, params))
        }
        HookEvent::Xxe { entity } => {
            let entity = (*entity)?;
            let mut params = Params::new();
            params.insert("entity", ParamValue::from(entity));
            Some((CheckKind::Xxe, params))
        }
        HookEvent::Ognl { expression } => {
            let expression = (*expression)?;
            let mut params = Params::new();
            params.insert("expression", ParamValue::from(expression));
            Some((CheckKind::Ognl, params))
        }
        HookEvent::Deserialization { class_name } => {
            let class_name = (*class_name)?;
            let mut params = Params::new();
            params.insert("class", ParamValue::from(class_name));
            Some((CheckKind::Deserialization, params))
        }
    }
}

/// Path + canonical path pair shared by the read/list hooks.
fn path_params(path: &Path) -> Params {
    let mut params = Params::new();
    params.insert("path", ParamValue::Str(path.display().to_string()));
    params.insert("realpath", ParamValue::Str(real_path(path)));
    params
}

/// Canonicalize, degrading to the absolute then the raw path. Path checks
/// must never fail on filesystem resolution errors.
fn real_path(path: &Path) -> String {
    if let Ok(canonical) = path.canonicalize() {
        return canonical.display().to_string();
    }
    match std::path::absolute(path) {
        Ok(abs) => abs.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Path stash for the paired stream-open / stream-write hooks.
///
/// The open call carries the target path but no content yet, so the
/// instrumentation attaches one of these to the stream's lock object;
/// the write hook retrieves the path from it later. The gate only
/// stashes while interception is active on the opening thread.
#[derive(Debug, Default)]
pub struct WriteStreamToken {
    path: Option<String>,
}

impl WriteStreamToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub(crate) fn set_path(&mut self, path: &str) {
        self.path = Some(path.to_owned());
    }
}

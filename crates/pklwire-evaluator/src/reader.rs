//! Host-provided readers for custom URI schemes.
//!
//! When an evaluator meets a module or resource URI whose scheme matches a
//! registered reader, Pkl calls back into the host. Callbacks run on tokio's
//! blocking pool, so readers may do synchronous I/O.

use std::sync::Arc;

use url::Url;

pub use pklwire_frame::{ModuleReaderSpec, PathElement, ReaderSpec};

/// Error type readers return; its `Display` text is sent back to Pkl.
pub type ReaderError = Box<dyn std::error::Error + Send + Sync>;

pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

/// Behaviour shared by module and resource readers.
pub trait Reader: Send + Sync {
    /// URI scheme this reader handles, without the trailing colon.
    fn scheme(&self) -> &str;

    /// Whether glob patterns (`import*`, `read*`) may be used with this scheme.
    fn is_globbable(&self) -> bool;

    /// Whether URIs of this scheme have a path hierarchy.
    fn has_hierarchical_uris(&self) -> bool;

    /// List the children of a hierarchical URI. Used for globbing.
    fn list_elements(&self, url: &Url) -> ReaderResult<Vec<PathElement>>;
}

/// Reads resources (`read("custom:...")`) as bytes.
pub trait ResourceReader: Reader {
    fn read(&self, url: &Url) -> ReaderResult<Vec<u8>>;
}

/// Reads Pkl modules (`import "custom:..."`) as source text.
pub trait ModuleReader: Reader {
    /// Local modules are treated like files: no caching, relative imports allowed.
    fn is_local(&self) -> bool;

    fn read(&self, url: &Url) -> ReaderResult<String>;
}

/// First reader whose scheme equals the URL's scheme. No fallback.
pub fn find_reader<'a, R>(readers: &'a [Arc<R>], url: &Url) -> Option<&'a Arc<R>>
where
    R: Reader + ?Sized,
{
    readers.iter().find(|r| r.scheme() == url.scheme())
}

pub(crate) fn resource_spec(reader: &dyn ResourceReader) -> ReaderSpec {
    ReaderSpec {
        scheme: reader.scheme().to_string(),
        has_hierarchical_uris: reader.has_hierarchical_uris(),
        is_globbable: reader.is_globbable(),
    }
}

pub(crate) fn module_spec(reader: &dyn ModuleReader) -> ModuleReaderSpec {
    ModuleReaderSpec {
        scheme: reader.scheme().to_string(),
        has_hierarchical_uris: reader.has_hierarchical_uris(),
        is_globbable: reader.is_globbable(),
        is_local: reader.is_local(),
    }
}

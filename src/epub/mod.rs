//! EPUB package access
//!
//! Just enough of the container to address content with CFIs: the package
//! manifest and spine, content loaders and the [`Book`] façade.

mod book;
mod loader;
mod opf;
mod types;

pub use book::{Book, RangeText};
pub use loader::{DirectoryLoader, DocumentLoader, MemoryLoader};
pub use opf::{find_opf_path, opf_dir, resolve_href, Package, Spine};
pub use types::{ManifestItem, SpineItem};

use crate::error::{Error, Result};

pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Read `META-INF/container.xml` and the package document through `loader`
pub async fn open_package<L: DocumentLoader + ?Sized>(loader: &L) -> Result<Package> {
    let container = loader
        .load(CONTAINER_PATH)
        .await
        .map_err(|e| Error::loader(CONTAINER_PATH, e))?;
    let opf_path = find_opf_path(&container)?;

    let opf = loader
        .load(&opf_path)
        .await
        .map_err(|e| Error::loader(&opf_path, e))?;
    Package::parse(&opf, opf_dir(&opf_path))
}

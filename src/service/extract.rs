//! Materialises a service's spec files from an embedded resource bundle.

use super::{Service, SpecRecord};
use include_dir::Dir;
use log::info;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("resource not found in bundle: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Ensures the service's spec files exist on disk.
///
/// A spec whose directory is already set is returned unchanged. Otherwise
/// the directory becomes `.` and every listed file that is not already
/// present is copied out of `bundle`. Extraction is idempotent per
/// `(directory, file)`: existing files are left untouched.
pub fn extract_spec<'a>(
    service: &'a mut Service,
    bundle: &Dir<'_>,
) -> Result<&'a SpecRecord, ExtractError> {
    if !service.spec.directory.is_empty() {
        return Ok(&service.spec);
    }
    service.spec.directory = ".".to_string();
    let dir = service.spec.directory.clone();
    extract_spec_into(&service.spec, bundle, Path::new(&dir))?;
    Ok(&service.spec)
}

/// Copies the spec's file list (`main_file` first, then every referenced
/// file) from `bundle` into `dir`, skipping files that already exist.
pub fn extract_spec_into(
    spec: &SpecRecord,
    bundle: &Dir<'_>,
    dir: &Path,
) -> Result<(), ExtractError> {
    let files = std::iter::once(&spec.main_file).chain(spec.referenced_files.iter());
    for name in files {
        if name.is_empty() {
            continue;
        }
        let dest = dir.join(name);
        if dest.exists() {
            continue;
        }
        let resource = bundle
            .get_file(name)
            .ok_or_else(|| ExtractError::ResourceNotFound(name.clone()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        // io::copy streams through its own 8 KiB buffer.
        io::copy(&mut resource.contents(), &mut out)?;
        info!("extracted spec file {}", dest.display());
    }
    Ok(())
}

//! Compressed pipeline artifacts.
//!
//! Every artifact is bzip2-compressed and written to a temporary file first,
//! then renamed into place, so a crashed run never leaves a truncated file
//! behind under the final name.

use crate::config::{FETCH_FILE, FORMAT_VERSION, MATRIX_FILE, META_FILE, TABLE_FILE};
use crate::matrix::{MatrixMeta, RecipeMatrix};
use crate::models::FetchDocument;
use anyhow::{bail, Context, Result};
use bincode::Options;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Binary matrix payload; values are stored row-major.
#[derive(Serialize, Deserialize)]
struct MatrixPayload {
    version: u32,
    rows: u64,
    cols: u64,
    values: Vec<f64>,
}

/// The CSV table read back into labels and values.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub resources: Vec<String>,
    pub recipes: Vec<String>,
    pub values: Array2<f64>,
}

pub fn artifact_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(name)
}

fn write_compressed<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BzEncoder<BufWriter<File>>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", tmp_path))?;
    let mut encoder = BzEncoder::new(BufWriter::new(file), Compression::best());
    write(&mut encoder)?;
    encoder
        .finish()
        .and_then(|mut inner| inner.flush())
        .with_context(|| format!("Failed to finish compressed file: {:?}", tmp_path))?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {:?}", path))?;
    Ok(())
}

fn read_compressed(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("Artifact does not exist: {:?}", path);
    }
    let file = File::open(path).with_context(|| format!("Failed to open: {:?}", path))?;
    let mut bytes = Vec::new();
    BzDecoder::new(BufReader::new(file))
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to decompress: {:?}", path))?;
    Ok(bytes)
}

pub fn save_fetch(doc: &FetchDocument, output_dir: &Path) -> Result<PathBuf> {
    let path = artifact_path(output_dir, FETCH_FILE);
    write_compressed(&path, |out| {
        serde_json::to_writer_pretty(out, doc).context("Failed to serialize fetch document")
    })?;
    info!(items = doc.items.len(), path = ?path, "Fetch document saved");
    Ok(path)
}

/// Loads the fetch document; a missing or corrupt file is fatal.
pub fn load_fetch(output_dir: &Path) -> Result<FetchDocument> {
    let path = artifact_path(output_dir, FETCH_FILE);
    let bytes = read_compressed(&path).context("Run `factorio-lp fetch` first")?;
    let doc: FetchDocument = serde_json::from_slice(&bytes)
        .with_context(|| format!("Corrupt fetch document: {:?}", path))?;
    info!(items = doc.items.len(), archived = doc.archived.len(), "Fetch document loaded");
    Ok(doc)
}

/// Writes the dense table: a `resource` header cell followed by the column
/// labels, then one row per resource.
pub fn write_table(matrix: &RecipeMatrix, output_dir: &Path) -> Result<PathBuf> {
    let path = artifact_path(output_dir, TABLE_FILE);
    write_compressed(&path, |out| {
        let mut writer = csv::Writer::from_writer(out);
        let header = std::iter::once("resource")
            .chain(matrix.meta.recipes.iter().map(|r| r.name.as_str()));
        writer.write_record(header)?;

        for (resource, row) in matrix.meta.resources.iter().zip(matrix.values.rows()) {
            let record = std::iter::once(resource.name.clone())
                .chain(row.iter().map(|v| v.to_string()));
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    })
    .with_context(|| format!("Failed to write table: {:?}", path))?;
    Ok(path)
}

pub fn read_table(output_dir: &Path) -> Result<TableData> {
    let path = artifact_path(output_dir, TABLE_FILE);
    let bytes = read_compressed(&path)?;
    let mut reader = csv::Reader::from_reader(bytes.as_slice());

    let recipes: Vec<String> = reader
        .headers()
        .with_context(|| format!("Table has no header: {:?}", path))?
        .iter()
        .skip(1)
        .map(str::to_string)
        .collect();

    let mut resources = Vec::new();
    let mut values = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad table row {}", i + 1))?;
        let mut cells = record.iter();
        resources.push(cells.next().unwrap_or_default().to_string());
        for cell in cells {
            let value: f64 = cell
                .parse()
                .with_context(|| format!("Bad number {:?} in table row {}", cell, i + 1))?;
            values.push(value);
        }
    }

    let values = Array2::from_shape_vec((resources.len(), recipes.len()), values)
        .context("Table rows have inconsistent lengths")?;
    Ok(TableData {
        resources,
        recipes,
        values,
    })
}

/// Writes the binary matrix and its metadata sidecar.
pub fn save_matrix(matrix: &RecipeMatrix, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let matrix_path = artifact_path(output_dir, MATRIX_FILE);
    let meta_path = artifact_path(output_dir, META_FILE);

    let payload = MatrixPayload {
        version: FORMAT_VERSION,
        rows: matrix.resources() as u64,
        cols: matrix.recipes() as u64,
        values: matrix.values.iter().copied().collect(),
    };
    write_compressed(&matrix_path, |out| {
        bincode::DefaultOptions::new()
            .serialize_into(out, &payload)
            .context("Failed to serialize matrix")
    })?;
    write_compressed(&meta_path, |out| {
        serde_json::to_writer_pretty(out, &matrix.meta).context("Failed to serialize matrix metadata")
    })?;

    info!(
        resources = payload.rows,
        recipes = payload.cols,
        path = ?matrix_path,
        "Matrix saved"
    );
    Ok((matrix_path, meta_path))
}

pub fn load_matrix(output_dir: &Path) -> Result<RecipeMatrix> {
    let matrix_path = artifact_path(output_dir, MATRIX_FILE);
    let meta_path = artifact_path(output_dir, META_FILE);

    let bytes = read_compressed(&matrix_path).context("Run `factorio-lp preprocess` first")?;
    let options = bincode::options().with_limit((bytes.len() as u64).saturating_add(1024));
    let payload: MatrixPayload = options
        .deserialize(&bytes)
        .with_context(|| format!("Corrupt matrix file: {:?}", matrix_path))?;
    if payload.version != FORMAT_VERSION {
        bail!(
            "Matrix format version {} is not supported (expected {}); rerun preprocess",
            payload.version,
            FORMAT_VERSION
        );
    }

    let meta_bytes = read_compressed(&meta_path)?;
    let meta: MatrixMeta = serde_json::from_slice(&meta_bytes)
        .with_context(|| format!("Corrupt matrix metadata: {:?}", meta_path))?;
    if meta.version != FORMAT_VERSION {
        bail!(
            "Metadata format version {} is not supported (expected {}); rerun preprocess",
            meta.version,
            FORMAT_VERSION
        );
    }

    let values = Array2::from_shape_vec((payload.rows as usize, payload.cols as usize), payload.values)
        .context("Matrix payload length does not match its shape")?;
    RecipeMatrix::new(meta, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{RecipeMeta, ResourceKind, ResourceMeta};
    use crate::models::ItemRecord;
    use ndarray::array;
    use tempfile::TempDir;

    fn small_matrix() -> RecipeMatrix {
        let resources = vec![
            ResourceMeta {
                name: "Iron gear wheel".to_string(),
                kind: ResourceKind::Intermediate,
                unit: "/s".to_string(),
            },
            ResourceMeta {
                name: "Iron plate".to_string(),
                kind: ResourceKind::Raw,
                unit: "/s".to_string(),
            },
        ];
        let recipes = vec![RecipeMeta {
            name: "Iron gear wheel (Manual)".to_string(),
            recipe: "Iron gear wheel".to_string(),
            machine: "Manual".to_string(),
        }];
        RecipeMatrix::new(MatrixMeta::new(resources, recipes), array![[2.0], [-4.0 / 3.0]]).unwrap()
    }

    #[test]
    fn fetch_document_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut doc = FetchDocument::default();
        doc.items.insert(
            "Pipe".to_string(),
            ItemRecord {
                page_id: 7,
                title: "Pipe".to_string(),
                ..ItemRecord::default()
            },
        );
        doc.archived.insert("Small plane".to_string());

        save_fetch(&doc, dir.path()).unwrap();
        assert_eq!(load_fetch(dir.path()).unwrap(), doc);
    }

    #[test]
    fn missing_fetch_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_fetch(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("does not exist"));
    }

    #[test]
    fn corrupt_fetch_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FETCH_FILE), b"not bzip2 at all").unwrap();
        assert!(load_fetch(dir.path()).is_err());
    }

    #[test]
    fn matrix_roundtrip_is_exact() {
        let dir = TempDir::new().unwrap();
        let matrix = small_matrix();
        save_matrix(&matrix, dir.path()).unwrap();
        assert_eq!(load_matrix(dir.path()).unwrap(), matrix);
    }

    #[test]
    fn table_agrees_with_matrix() {
        let dir = TempDir::new().unwrap();
        let matrix = small_matrix();
        write_table(&matrix, dir.path()).unwrap();

        let table = read_table(dir.path()).unwrap();
        assert_eq!(table.resources, vec!["Iron gear wheel", "Iron plate"]);
        assert_eq!(table.recipes, vec!["Iron gear wheel (Manual)"]);
        assert_eq!(table.values, matrix.values);
    }

    #[test]
    fn version_mismatch_is_an_error() {
        let dir = TempDir::new().unwrap();
        save_matrix(&small_matrix(), dir.path()).unwrap();

        let stale = MatrixPayload {
            version: FORMAT_VERSION + 1,
            rows: 0,
            cols: 0,
            values: Vec::new(),
        };
        write_compressed(&dir.path().join(MATRIX_FILE), |out| {
            bincode::DefaultOptions::new()
                .serialize_into(out, &stale)
                .map_err(Into::into)
        })
        .unwrap();

        let err = load_matrix(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        save_matrix(&small_matrix(), dir.path()).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("out");
        save_fetch(&FetchDocument::default(), &nested).unwrap();
        assert!(nested.join(FETCH_FILE).exists());
    }
}

//! Document-store collaborator: persists settlement artifacts under the data
//! directory and records owner, category and size for each one.

use std::path::{Path, PathBuf};

use sqlx::Row;
use tracing::instrument;

use crate::db::Pool;
use crate::error::EngineResult;

pub const CATEGORY_PAYSLIP_SNAPSHOT: &str = "payslip_snapshot";
pub const CATEGORY_PAYMENT_INSTRUCTIONS: &str = "payment_instructions";

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: i64,
    pub path: PathBuf,
    pub size_bytes: i64,
}

/// Write the bytes to `{data_dir}/documents/{owner_id}/{file_name}` and
/// record the artifact. The path stored is relative to `data_dir`.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all)]
pub async fn store_document(
    pool: &Pool,
    data_dir: &str,
    owner_id: i64,
    category: &str,
    title: &str,
    file_name: &str,
    mime_type: &str,
    bytes: &[u8],
    source_id: Option<i64>,
) -> EngineResult<StoredDocument> {
    let relative = Path::new("documents")
        .join(owner_id.to_string())
        .join(file_name);
    let absolute = Path::new(data_dir).join(&relative);
    if let Some(parent) = absolute.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&absolute, bytes).await?;

    let size_bytes = bytes.len() as i64;
    let rec = sqlx::query(
        "INSERT INTO documents (owner_id, category, title, path, mime_type, size_bytes, source_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(owner_id)
    .bind(category)
    .bind(title)
    .bind(relative.to_string_lossy().as_ref())
    .bind(mime_type)
    .bind(size_bytes)
    .bind(source_id)
    .fetch_one(pool)
    .await?;

    Ok(StoredDocument {
        id: rec.get("id"),
        path: absolute,
        size_bytes,
    })
}

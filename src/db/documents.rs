//! Document metadata database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::document::{DocumentInfo, MetadataError, MetadataStore, ProcessingStatus, SplitPage};

/// Document row
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    file_path: String,
    processing_status: String,
    num_pages_total: Option<i64>,
    optimized_file_path: Option<String>,
    compression_ratio: Option<f64>,
    original_size: Option<i64>,
    optimized_size: Option<i64>,
}

impl TryFrom<DocumentRow> for DocumentInfo {
    type Error = MetadataError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let total_pages = row
            .num_pages_total
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    MetadataError::InvalidRecord(format!("document {} has {} pages", row.id, n))
                })
            })
            .transpose()?;

        Ok(DocumentInfo {
            processing_status: row.processing_status.parse()?,
            total_pages,
            file_path: row.file_path,
            optimized_file_path: row.optimized_file_path,
            compression_ratio: row.compression_ratio,
            original_size: row.original_size.and_then(|n| u64::try_from(n).ok()),
            optimized_size: row.optimized_size.and_then(|n| u64::try_from(n).ok()),
            id: row.id,
        })
    }
}

/// Split page row
#[derive(Debug, Clone, sqlx::FromRow)]
struct SplitPageRow {
    page_number: i64,
    file_path: String,
    file_size: i64,
}

impl TryFrom<SplitPageRow> for SplitPage {
    type Error = MetadataError;

    fn try_from(row: SplitPageRow) -> Result<Self, Self::Error> {
        let page_number = u32::try_from(row.page_number)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| {
                MetadataError::InvalidRecord(format!("invalid page number {}", row.page_number))
            })?;

        Ok(SplitPage {
            page_number,
            file_path: row.file_path,
            file_size: u64::try_from(row.file_size).unwrap_or(0),
        })
    }
}

/// Metadata store over the backend's SQLite tables
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a document record
    pub async fn upsert_document(&self, info: &DocumentInfo) -> Result<(), MetadataError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO documents (id, file_path, processing_status, num_pages_total,
                                   optimized_file_path, compression_ratio, original_size,
                                   optimized_size, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                file_path = excluded.file_path,
                processing_status = excluded.processing_status,
                num_pages_total = excluded.num_pages_total,
                optimized_file_path = excluded.optimized_file_path,
                compression_ratio = excluded.compression_ratio,
                original_size = excluded.original_size,
                optimized_size = excluded.optimized_size,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&info.id)
        .bind(&info.file_path)
        .bind(info.processing_status.as_str())
        .bind(info.total_pages.map(i64::from))
        .bind(&info.optimized_file_path)
        .bind(info.compression_ratio)
        .bind(info.original_size.map(|n| n as i64))
        .bind(info.optimized_size.map(|n| n as i64))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one split page, replacing an earlier record for the same page
    pub async fn insert_split_page(
        &self,
        document_id: &str,
        page: &SplitPage,
    ) -> Result<(), MetadataError> {
        sqlx::query(
            r#"
            INSERT INTO pdf_pages (document_id, page_number, file_path, file_size)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(document_id, page_number) DO UPDATE SET
                file_path = excluded.file_path,
                file_size = excluded.file_size
            "#,
        )
        .bind(document_id)
        .bind(i64::from(page.page_number))
        .bind(&page.file_path)
        .bind(page.file_size as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn register_document(&self, info: &DocumentInfo) -> Result<(), MetadataError> {
        self.upsert_document(info).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentInfo>, MetadataError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, file_path, processing_status, num_pages_total, optimized_file_path,
                   compression_ratio, original_size, optimized_size
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentInfo::try_from).transpose()
    }

    async fn get_split_page(
        &self,
        document_id: &str,
        page_number: u32,
    ) -> Result<Option<SplitPage>, MetadataError> {
        let row = sqlx::query_as::<_, SplitPageRow>(
            r#"
            SELECT page_number, file_path, file_size
            FROM pdf_pages
            WHERE document_id = ? AND page_number = ?
            "#,
        )
        .bind(document_id)
        .bind(i64::from(page_number))
        .fetch_optional(&self.pool)
        .await?;

        row.map(SplitPage::try_from).transpose()
    }

    async fn list_split_pages(&self, document_id: &str) -> Result<Vec<SplitPage>, MetadataError> {
        let rows = sqlx::query_as::<_, SplitPageRow>(
            r#"
            SELECT page_number, file_path, file_size
            FROM pdf_pages
            WHERE document_id = ?
            ORDER BY page_number ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SplitPage::try_from).collect()
    }

    async fn clear_split_pages(&self, document_id: &str) -> Result<u64, MetadataError> {
        let result = sqlx::query("DELETE FROM pdf_pages WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn set_processing_status(
        &self,
        document_id: &str,
        status: ProcessingStatus,
    ) -> Result<(), MetadataError> {
        let result = sqlx::query(
            "UPDATE documents SET processing_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(document_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::QueryFailed(format!(
                "no document {} to update",
                document_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    async fn store() -> SqliteMetadataStore {
        SqliteMetadataStore::new(memory_pool().await)
    }

    fn split(page_number: u32) -> SplitPage {
        SplitPage {
            page_number,
            file_path: format!("split_pages/d1/page_{}.pdf", page_number),
            file_size: 2048,
        }
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let store = store().await;
        let doc = DocumentInfo::new("d1", "uploads/1700000000000-ktav.pdf")
            .with_status(ProcessingStatus::Linearized)
            .with_total_pages(412)
            .with_optimized_path("uploads/1700000000000-ktav-linearized.pdf");
        store.register_document(&doc).await.unwrap();

        let loaded = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_split_pages_are_ordered() {
        let store = store().await;
        store.upsert_document(&DocumentInfo::new("d1", "uploads/a.pdf")).await.unwrap();
        for n in [3, 1, 2] {
            store.insert_split_page("d1", &split(n)).await.unwrap();
        }

        let pages = store.list_split_pages("d1").await.unwrap();
        let numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.get_split_page("d1", 2).await.unwrap(), Some(split(2)));
        assert_eq!(store.get_split_page("d1", 9).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_and_reset_status() {
        let store = store().await;
        store
            .upsert_document(&DocumentInfo::new("d1", "uploads/a.pdf").with_status(ProcessingStatus::Failed))
            .await
            .unwrap();
        store.insert_split_page("d1", &split(1)).await.unwrap();
        store.insert_split_page("d1", &split(2)).await.unwrap();

        assert_eq!(store.clear_split_pages("d1").await.unwrap(), 2);
        store
            .set_processing_status("d1", ProcessingStatus::Pending)
            .await
            .unwrap();

        let doc = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(doc.processing_status, ProcessingStatus::Pending);
        assert!(store.list_split_pages("d1").await.unwrap().is_empty());
        assert!(store
            .set_processing_status("missing", ProcessingStatus::Pending)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_status_is_invalid_record() {
        let pool = memory_pool().await;
        sqlx::query("INSERT INTO documents (id, file_path, processing_status) VALUES ('d1', 'a.pdf', 'exploded')")
            .execute(&pool)
            .await
            .unwrap();

        let err = SqliteMetadataStore::new(pool).get_document("d1").await.unwrap_err();
        assert!(matches!(err, MetadataError::InvalidRecord(_)));
    }
}

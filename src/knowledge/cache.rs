//! Index Cache - rusqlite 기반 벡터 인덱스 영속화
//!
//! 재시작 시 같은 데이터셋(fingerprint)과 같은 임베딩 모델이면
//! 임베딩을 다시 계산하지 않고 캐시에서 인덱스를 복원합니다.
//! 저장 위치: <data_dir>/index.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

use crate::dataset::Fingerprint;
use crate::knowledge::chunker::Chunk;
use crate::knowledge::vector::{IndexedChunk, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 캐시된 인덱스 메타데이터
#[derive(Debug, Clone, Serialize)]
pub struct CacheMeta {
    pub fingerprint: Fingerprint,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

// ============================================================================
// IndexCache
// ============================================================================

/// 인덱스 캐시
///
/// 한 번에 하나의 인덱스만 저장합니다 (저장 시 통째로 교체).
pub struct IndexCache {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl IndexCache {
    /// 캐시 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        cache.initialize()?;
        Ok(cache)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS index_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                fingerprint TEXT NOT NULL,
                embedding_model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                built_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                idx INTEGER PRIMARY KEY,
                row_number INTEGER NOT NULL,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            );",
        )
        .context("Failed to create cache tables")?;

        tracing::debug!("Index cache initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 메타데이터 조회 (캐시가 비어 있으면 None)
    pub fn meta(&self) -> Result<Option<CacheMeta>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        read_meta(&conn)
    }

    /// fingerprint와 모델이 일치하는 인덱스 로드
    ///
    /// 일치하지 않으면 None (오래된 벡터는 절대 재사용하지 않음)
    pub fn load(&self, fingerprint: &Fingerprint, model: &str) -> Result<Option<VectorIndex>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let meta = match read_meta(&conn)? {
            Some(meta) => meta,
            None => return Ok(None),
        };

        if &meta.fingerprint != fingerprint || meta.embedding_model != model {
            tracing::debug!(
                "Index cache miss (cached {} / {}, wanted {} / {})",
                meta.fingerprint.short(),
                meta.embedding_model,
                fingerprint.short(),
                model
            );
            return Ok(None);
        }

        let mut stmt =
            conn.prepare("SELECT idx, row_number, source, text, embedding FROM chunks ORDER BY idx")?;

        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(4)?;
            Ok(IndexedChunk {
                chunk: Chunk {
                    index: row.get::<_, i64>(0)? as usize,
                    row: row.get::<_, i64>(1)? as usize,
                    source: row.get(2)?,
                    text: row.get(3)?,
                },
                embedding: deserialize_vector(&blob),
            })
        })?;

        let entries = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read cached chunks")?;

        if entries.len() != meta.chunk_count {
            tracing::warn!(
                "Index cache is incomplete ({} of {} chunks), ignoring",
                entries.len(),
                meta.chunk_count
            );
            return Ok(None);
        }

        let index = VectorIndex::from_entries(meta.fingerprint, meta.embedding_model, entries)?;
        tracing::info!("Loaded {} chunks from index cache", index.len());
        Ok(Some(index))
    }

    /// 인덱스 저장 (기존 캐시 통째로 교체)
    pub fn save(&self, index: &VectorIndex) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM index_meta", [])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (idx, row_number, source, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for entry in index.entries() {
                stmt.execute(params![
                    entry.chunk.index as i64,
                    entry.chunk.row as i64,
                    entry.chunk.source,
                    entry.chunk.text,
                    serialize_vector(&entry.embedding),
                ])
                .context("Failed to insert cached chunk")?;
            }
        }

        tx.execute(
            "INSERT INTO index_meta (id, fingerprint, embedding_model, dimension, chunk_count, built_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                index.fingerprint().as_str(),
                index.model(),
                index.dimension() as i64,
                index.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to write index metadata")?;

        tx.commit().context("Failed to commit index cache")?;

        tracing::info!(
            "Saved {} chunks to index cache (fingerprint {})",
            index.len(),
            index.fingerprint().short()
        );
        Ok(())
    }

    /// 캐시 비우기
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM index_meta;")
            .context("Failed to clear index cache")?;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_meta(conn: &Connection) -> Result<Option<CacheMeta>> {
    let meta = conn
        .query_row(
            "SELECT fingerprint, embedding_model, dimension, chunk_count, built_at
             FROM index_meta WHERE id = 1",
            [],
            |row| {
                Ok(CacheMeta {
                    fingerprint: Fingerprint::from_hex(row.get::<_, String>(0)?),
                    embedding_model: row.get(1)?,
                    dimension: row.get::<_, i64>(2)? as usize,
                    chunk_count: row.get::<_, i64>(3)? as usize,
                    built_at: parse_datetime(row.get::<_, String>(4)?),
                })
            },
        )
        .optional()
        .context("Failed to read index metadata")?;

    Ok(meta)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// f32 벡터를 little-endian 바이트로 직렬화
fn serialize_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

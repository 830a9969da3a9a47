//! Embedded vector store using SQLite and sqlite-vec
use std::path::Path;
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use tracing::info;

use super::{CollectionDescription, IndexError, Payload, Point, ScoredPoint, VectorBackend};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    dimension INTEGER NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL,
    point_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE(collection_id, point_id),
    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_points_collection ON points(collection_id);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Each collection's vectors live in their own vec0 table, named after the
/// collection row id.
fn vec_table(collection_id: i64) -> String {
    format!("vec_points_{collection_id}")
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Collections stored in one SQLite database.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open a database at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref();
        info!("Initializing vector database: {}", path.display());
        init_sqlite_vec();
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, IndexError> {
        init_sqlite_vec();
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, IndexError> {
        // Verify sqlite-vec is loaded
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {vec_version}");

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `(id, dimension)` of a named collection.
fn lookup(conn: &Connection, name: &str) -> Result<Option<(i64, usize)>, IndexError> {
    let row = conn
        .query_row(
            "SELECT id, dimension FROM collections WHERE name = ?",
            params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    Ok(row.map(|(id, dim)| (id, dim as usize)))
}

impl VectorBackend for SqliteBackend {
    fn describe(&self, name: &str) -> Result<Option<CollectionDescription>, IndexError> {
        let conn = self.conn();
        let Some((id, dimension)) = lookup(&conn, name)? else {
            return Ok(None);
        };
        let points_count: i64 = conn.query_row(
            "SELECT count(*) FROM points WHERE collection_id = ?",
            params![id],
            |row| row.get(0),
        )?;
        Ok(Some(CollectionDescription {
            dimension,
            points_count: points_count as u64,
            status: "green".to_string(),
            named_vectors: false,
        }))
    }

    fn create_collection(&self, name: &str, dimension: usize) -> Result<(), IndexError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id: i64 = tx.query_row(
            "INSERT INTO collections (name, dimension) VALUES (?, ?) RETURNING id",
            params![name, dimension as i64],
            |row| row.get(0),
        )?;
        tx.execute_batch(&format!(
            "CREATE VIRTUAL TABLE {} USING vec0(embedding FLOAT[{dimension}]);",
            vec_table(id)
        ))?;
        tx.commit()?;
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let mut conn = self.conn();
        let Some((id, _)) = lookup(&conn, name)? else {
            return Ok(());
        };
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", vec_table(id)))?;
        // Cascade deletes points
        tx.execute("DELETE FROM collections WHERE id = ?", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn upsert(&self, name: &str, points: &[Point]) -> Result<(), IndexError> {
        let mut conn = self.conn();
        let (id, dimension) =
            lookup(&conn, name)?.ok_or_else(|| IndexError::MissingCollection(name.to_string()))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        let table = vec_table(id);
        let tx = conn.transaction()?;
        {
            let mut upsert_point = tx.prepare(
                r#"
                INSERT INTO points (collection_id, point_id, payload)
                VALUES (?, ?, ?)
                ON CONFLICT(collection_id, point_id) DO UPDATE SET
                    payload = excluded.payload
                RETURNING id
                "#,
            )?;
            let mut delete_vec = tx.prepare(&format!("DELETE FROM {table} WHERE rowid = ?"))?;
            let mut insert_vec =
                tx.prepare(&format!("INSERT INTO {table} (rowid, embedding) VALUES (?, ?)"))?;

            for point in points {
                let payload = serde_json::to_string(&point.payload)?;
                let row_id: i64 = upsert_point.query_row(
                    params![id, point.id.to_string(), payload],
                    |row| row.get(0),
                )?;
                // vec0 has no upsert
                delete_vec.execute(params![row_id])?;
                insert_vec.execute(params![row_id, serialize_vector(&point.vector)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let conn = self.conn();
        let (id, dimension) =
            lookup(&conn, name)?.ok_or_else(|| IndexError::MissingCollection(name.to_string()))?;
        if vector.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let query = format!(
            r#"
            SELECT point_id, payload, score FROM (
                SELECT
                    p.point_id,
                    p.payload,
                    1.0 - vec_distance_cosine(v.embedding, ?) AS score
                FROM {} v
                JOIN points p ON v.rowid = p.id
            )
            WHERE score >= ?
            ORDER BY score DESC
            LIMIT ?
            "#,
            vec_table(id)
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![
                serialize_vector(vector),
                f64::from(score_threshold),
                limit as i64
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (point_id, payload, score) = row?;
            let payload: Payload = serde_json::from_str(&payload)?;
            results.push(ScoredPoint {
                id: point_id,
                score: score as f32,
                payload,
            });
        }

        Ok(results)
    }
}

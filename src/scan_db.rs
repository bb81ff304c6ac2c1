use rusqlite::{Connection, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::parse::MedicationRecord;

pub struct ScanStore {
    conn: Connection,
}

/// A captured box photo awaiting (or past) analysis.
#[derive(Debug)]
pub struct StoredScan {
    pub uid: String,
    pub file_name: String,
    pub image: Vec<u8>,
    pub captured_at: i64,
    pub is_analyzed: bool,
}

/// Blob-free projection for listings.
#[derive(Debug)]
pub struct ScanSummary {
    pub uid: String,
    pub file_name: String,
    pub captured_at: i64,
    pub is_analyzed: bool,
}

impl ScanStore {
    /// Create a new scan store with SQLite backend
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS scans (
                uid TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                image BLOB NOT NULL,
                captured_at INTEGER NOT NULL,
                is_analyzed INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS results (
                scan_uid TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                active_ingredient TEXT NOT NULL DEFAULT '',
                dosage TEXT NOT NULL DEFAULT '',
                quantity TEXT NOT NULL DEFAULT '',
                laboratory TEXT NOT NULL DEFAULT '',
                stripe TEXT NOT NULL DEFAULT '',
                analyzed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (scan_uid) REFERENCES scans(uid) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_is_analyzed ON scans(is_analyzed)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scans_captured_at ON scans(captured_at)",
            [],
        )?;

        info!("Scan database initialized");
        Ok(Self { conn })
    }

    /// Generate a unique ID from the stored file name and capture time
    pub fn generate_uid(file_name: &str, captured_at: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_name.as_bytes());
        hasher.update(captured_at.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Insert or update a captured scan
    pub fn upsert_scan(&self, scan: &StoredScan) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO scans (uid, file_name, image, captured_at, is_analyzed)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(uid) DO UPDATE SET
                file_name = excluded.file_name,
                image = excluded.image,
                captured_at = excluded.captured_at",
            params![
                scan.uid,
                scan.file_name,
                scan.image,
                scan.captured_at,
                scan.is_analyzed,
            ],
        )?;
        info!(uid = %scan.uid, file_name = %scan.file_name, "Scan stored");
        Ok(())
    }

    /// Store the analysis outcome for a scan and mark it analyzed. A fresh
    /// record fully replaces any previous one — results are rebuilt per
    /// attempt, never merged.
    pub fn set_result(&self, scan_uid: &str, record: &MedicationRecord) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO results
                (scan_uid, name, active_ingredient, dosage, quantity, laboratory, stripe)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scan_uid) DO UPDATE SET
                name = excluded.name,
                active_ingredient = excluded.active_ingredient,
                dosage = excluded.dosage,
                quantity = excluded.quantity,
                laboratory = excluded.laboratory,
                stripe = excluded.stripe,
                analyzed_at = CURRENT_TIMESTAMP",
            params![
                scan_uid,
                record.name,
                record.active_ingredient,
                record.dosage,
                record.quantity,
                record.laboratory,
                record.stripe,
            ],
        )?;

        self.conn.execute(
            "UPDATE scans SET is_analyzed = 1 WHERE uid = ?1",
            params![scan_uid],
        )?;

        info!(uid = %scan_uid, "Analysis result stored");
        Ok(())
    }

    /// Get scan by UID
    pub fn get_scan_by_uid(&self, uid: &str) -> SqliteResult<Option<StoredScan>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, file_name, image, captured_at, is_analyzed
             FROM scans
             WHERE uid = ?1",
        )?;
        let mut rows = stmt.query(params![uid])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_scan(row)?)),
            None => Ok(None),
        }
    }

    /// Get the stored result for a scan, if it has been analyzed.
    pub fn get_result(&self, scan_uid: &str) -> SqliteResult<Option<MedicationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, active_ingredient, dosage, quantity, laboratory, stripe
             FROM results
             WHERE scan_uid = ?1",
        )?;
        let mut rows = stmt.query(params![scan_uid])?;
        match rows.next()? {
            Some(row) => Ok(Some(MedicationRecord {
                name: row.get(0)?,
                active_ingredient: row.get(1)?,
                dosage: row.get(2)?,
                quantity: row.get(3)?,
                laboratory: row.get(4)?,
                stripe: row.get(5)?,
            })),
            None => Ok(None),
        }
    }

    /// Get all scans still waiting for analysis
    pub fn get_pending_scans(&self) -> SqliteResult<Vec<StoredScan>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, file_name, image, captured_at, is_analyzed
             FROM scans
             WHERE is_analyzed = 0
             ORDER BY captured_at DESC",
        )?;
        let rows = stmt.query_map([], |row| Self::row_to_scan(row))?;
        rows.collect()
    }

    /// Most recent scans, newest first, without image blobs.
    pub fn list_scans(&self, limit: usize) -> SqliteResult<Vec<ScanSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT uid, file_name, captured_at, is_analyzed
             FROM scans
             ORDER BY captured_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(ScanSummary {
                uid: row.get(0)?,
                file_name: row.get(1)?,
                captured_at: row.get(2)?,
                is_analyzed: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Helper: map a 5-column scan projection to `StoredScan`.
    fn row_to_scan(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredScan> {
        Ok(StoredScan {
            uid: row.get(0)?,
            file_name: row.get(1)?,
            image: row.get(2)?,
            captured_at: row.get(3)?,
            is_analyzed: row.get(4)?,
        })
    }

    /// Get count of scans by analysis status
    pub fn get_counts(&self) -> SqliteResult<(usize, usize)> {
        let total: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM scans", [], |row| row.get(0))?;

        let analyzed: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM scans WHERE is_analyzed = 1",
            [],
            |row| row.get(0),
        )?;

        Ok((total, analyzed))
    }
}

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::model::RenderedDocument;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            run_id      TEXT PRIMARY KEY,
            command     TEXT NOT NULL,
            image       TEXT NOT NULL,
            page_title  TEXT,
            mapped      INTEGER,
            skipped     INTEGER,
            link        TEXT,
            status      TEXT NOT NULL DEFAULT 'running'
                        CHECK(status IN ('running','ok','failed')),
            error_kind  TEXT,
            error       TEXT,
            started_at  TEXT NOT NULL DEFAULT (datetime('now')),
            finished_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_started ON runs(started_at);

        CREATE TABLE IF NOT EXISTS artifacts (
            id            INTEGER PRIMARY KEY,
            run_id        TEXT NOT NULL REFERENCES runs(run_id),
            kind          TEXT NOT NULL CHECK(kind IN ('global','page')),
            name          TEXT NOT NULL,
            slug          TEXT NOT NULL,
            html_path     TEXT NOT NULL,
            document_path TEXT NOT NULL,
            link          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id);
        ",
    )?;
    Ok(())
}

/// `run-<utc timestamp>-<8 hex>`; sorts by start time.
pub fn new_run_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}-{}", stamp, &suffix[..8])
}

// ── Runs ──

pub fn start_run(conn: &Connection, run_id: &str, command: &str, image: &Path) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (run_id, command, image) VALUES (?1, ?2, ?3)",
        rusqlite::params![run_id, command, image.display().to_string()],
    )?;
    Ok(())
}

pub struct RunSummary<'a> {
    pub page_title: Option<&'a str>,
    pub mapped: usize,
    pub skipped: usize,
    pub link: Option<&'a str>,
}

pub fn finish_run(conn: &Connection, run_id: &str, summary: &RunSummary<'_>) -> Result<()> {
    conn.execute(
        "UPDATE runs SET status = 'ok', page_title = ?2, mapped = ?3, skipped = ?4, link = ?5,
                finished_at = datetime('now')
         WHERE run_id = ?1",
        rusqlite::params![
            run_id,
            summary.page_title,
            summary.mapped as i64,
            summary.skipped as i64,
            summary.link,
        ],
    )?;
    Ok(())
}

pub fn fail_run(conn: &Connection, run_id: &str, error_kind: &str, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE runs SET status = 'failed', error_kind = ?2, error = ?3, finished_at = datetime('now')
         WHERE run_id = ?1",
        rusqlite::params![run_id, error_kind, error],
    )?;
    Ok(())
}

// ── Artifacts ──

pub fn save_artifacts(
    conn: &Connection,
    run_id: &str,
    kind: &str,
    docs: &[RenderedDocument],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO artifacts (run_id, kind, name, slug, html_path, document_path, link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for d in docs {
            count += stmt.execute(rusqlite::params![
                run_id,
                kind,
                d.title,
                d.file_base_name,
                d.html_path.display().to_string(),
                d.document_path.display().to_string(),
                d.link,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── History ──

pub struct RunRow {
    pub run_id: String,
    pub command: String,
    pub image: String,
    pub page_title: Option<String>,
    pub status: String,
    pub error_kind: Option<String>,
    pub link: Option<String>,
    pub artifacts: i64,
    pub started_at: String,
}

pub fn fetch_history(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.run_id, r.command, r.image, r.page_title, r.status, r.error_kind, r.link,
                (SELECT COUNT(*) FROM artifacts a WHERE a.run_id = r.run_id),
                r.started_at
         FROM runs r
         ORDER BY r.started_at DESC, r.rowid DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                run_id: row.get(0)?,
                command: row.get(1)?,
                image: row.get(2)?,
                page_title: row.get(3)?,
                status: row.get(4)?,
                error_kind: row.get(5)?,
                link: row.get(6)?,
                artifacts: row.get(7)?,
                started_at: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub fn run_status(conn: &Connection, run_id: &str) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;
    let status = conn
        .query_row(
            "SELECT status FROM runs WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(status)
}

// ── Tests ──

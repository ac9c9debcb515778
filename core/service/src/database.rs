use chrono::{NaiveDate, NaiveTime, SecondsFormat, Utc};
use quicknotes_schemas::{join_tags, split_tags, NewNote, Note, NoteChanges, NoteId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{NotesError, NotesResult};
use crate::validation::{DATE_FORMAT, TIME_FORMAT};

const NOTE_COLUMNS: &str =
    "id, title, content, tags, position, event_date, event_time, created_at, updated_at";

/// Columns added to the original `note` table after its first release
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("tags", "TEXT"),
    ("position", "INTEGER"),
    ("event_date", "TEXT"),
    ("event_time", "TEXT"),
];

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the notes database and bring its schema up to date
    pub fn new<P: AsRef<Path>>(path: P) -> NotesResult<Self> {
        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Check if a column exists in a table
    fn has_column(&self, table: &str, column: &str) -> NotesResult<bool> {
        let query = format!("PRAGMA table_info({})", table);
        let mut stmt = self.conn.prepare(&query)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns.iter().any(|c| c == column))
    }

    fn init_schema(&self) -> NotesResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS note (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT,
                position INTEGER,
                event_date TEXT,
                event_time TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Databases created before tags/ordering/events existed lack these columns
        for (column, column_type) in ADDITIVE_COLUMNS {
            if !self.has_column("note", column)? {
                self.conn.execute(
                    &format!("ALTER TABLE note ADD COLUMN {} {}", column, column_type),
                    [],
                )?;
                info!("Added missing column note.{}", column);
            }
        }

        // Highest position ever handed out, so deleting the last note does not
        // make its position available again
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS note_position_seq (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_assigned INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO note_position_seq (id, last_assigned) VALUES (1, 0)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_note_position ON note(position)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_note_updated_at ON note(updated_at)",
            [],
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========== ORDERING ==========

    /// Next append position. Read-then-write inside the caller's transaction;
    /// no reservation is made across connections.
    fn next_position(tx: &Transaction) -> rusqlite::Result<i64> {
        let next: i64 = tx.query_row(
            "SELECT MAX(
                COALESCE((SELECT MAX(position) FROM note), 0),
                COALESCE((SELECT last_assigned FROM note_position_seq WHERE id = 1), 0)
             ) + 1",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE note_position_seq SET last_assigned = ?1 WHERE id = 1",
            params![next],
        )?;

        Ok(next)
    }

    /// Insert a note at the end of the display order
    pub fn create_note(&mut self, new_note: &NewNote) -> NotesResult<Note> {
        let tx = self.conn.transaction()?;
        let position = Self::next_position(&tx)?;
        let now = timestamp();

        tx.execute(
            "INSERT INTO note (title, content, tags, position, event_date, event_time,
                               created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new_note.title,
                new_note.content,
                join_tags(&new_note.tags),
                position,
                new_note.event_date.map(format_date),
                new_note.event_time.map(format_time),
                now,
                now,
            ],
        )?;

        let id = NoteId(tx.last_insert_rowid());
        let note = fetch_note(&tx, id)?.ok_or(NotesError::NotFound(id))?;
        tx.commit()?;

        debug!("Created note {} at position {}", id, position);
        Ok(note)
    }

    /// Assign 1-based positions in the given order. Unknown ids are skipped and
    /// notes not mentioned keep their position; a repeated id ends up at its
    /// last index. Returns how many position writes hit an existing note.
    pub fn reorder(&mut self, order: &[NoteId]) -> NotesResult<usize> {
        let tx = self.conn.transaction()?;
        let now = timestamp();
        let mut updated = 0;

        for (index, id) in order.iter().enumerate() {
            updated += tx.execute(
                "UPDATE note SET position = ?1, updated_at = ?2 WHERE id = ?3",
                params![(index + 1) as i64, now, id.0],
            )?;
        }

        tx.commit()?;

        debug!("Reordered {} of {} requested notes", updated, order.len());
        Ok(updated)
    }

    /// All notes: positioned ones by ascending position, then the rest by
    /// most recent update
    pub fn list_ordered(&self) -> NotesResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM note
             ORDER BY position IS NULL, position ASC, updated_at DESC, id DESC",
            NOTE_COLUMNS
        ))?;

        let notes = stmt
            .query_map([], row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notes)
    }

    // ========== CRUD ==========

    pub fn get_note(&self, id: NoteId) -> NotesResult<Option<Note>> {
        Ok(fetch_note(&self.conn, id)?)
    }

    /// Apply a partial update and refresh `updated_at`
    pub fn update_note(&mut self, id: NoteId, changes: &NoteChanges) -> NotesResult<Note> {
        let tx = self.conn.transaction()?;
        let mut note = fetch_note(&tx, id)?.ok_or(NotesError::NotFound(id))?;

        if let Some(ref title) = changes.title {
            note.title = title.clone();
        }
        if let Some(ref content) = changes.content {
            note.content = content.clone();
        }
        if let Some(ref tags) = changes.tags {
            note.tags = tags.clone();
        }
        if let Some(event_date) = changes.event_date {
            note.event_date = event_date;
        }
        if let Some(event_time) = changes.event_time {
            note.event_time = event_time;
        }

        tx.execute(
            "UPDATE note
             SET title = ?1, content = ?2, tags = ?3, event_date = ?4, event_time = ?5,
                 updated_at = ?6
             WHERE id = ?7",
            params![
                note.title,
                note.content,
                join_tags(&note.tags),
                note.event_date.map(format_date),
                note.event_time.map(format_time),
                timestamp(),
                id.0,
            ],
        )?;

        let note = fetch_note(&tx, id)?.ok_or(NotesError::NotFound(id))?;
        tx.commit()?;

        debug!("Updated note {}", id);
        Ok(note)
    }

    pub fn delete_note(&mut self, id: NoteId) -> NotesResult<()> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM note WHERE id = ?1", params![id.0])?;

        if deleted == 0 {
            return Err(NotesError::NotFound(id));
        }

        tx.commit()?;
        debug!("Deleted note {}", id);
        Ok(())
    }

    /// Substring match on title or content, optionally restricted to notes
    /// carrying `tag`. An empty query matches nothing.
    pub fn search(&self, query: &str, tag: Option<&str>) -> NotesResult<Vec<Note>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM note
             WHERE instr(title, ?1) > 0 OR instr(content, ?1) > 0
             ORDER BY updated_at DESC, id DESC",
            NOTE_COLUMNS
        ))?;

        let notes = stmt
            .query_map(params![query], row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;

        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        let notes = match tag {
            Some(tag) => notes
                .into_iter()
                .filter(|note| note.tags.iter().any(|t| t == tag))
                .collect(),
            None => notes,
        };

        Ok(notes)
    }

    pub fn count_notes(&self) -> NotesResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM note", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn fetch_note(conn: &Connection, id: NoteId) -> rusqlite::Result<Option<Note>> {
    conn.query_row(
        &format!("SELECT {} FROM note WHERE id = ?1", NOTE_COLUMNS),
        params![id.0],
        row_to_note,
    )
    .optional()
}

fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
    let tags: Option<String> = row.get(3)?;
    let event_date: Option<String> = row.get(5)?;
    let event_time: Option<String> = row.get(6)?;

    let event_date = event_date
        .filter(|d| !d.is_empty())
        .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).map_err(|e| chrono_error(5, e)))
        .transpose()?;

    let event_time = event_time
        .filter(|t| !t.is_empty())
        .map(|t| NaiveTime::parse_from_str(&t, TIME_FORMAT).map_err(|e| chrono_error(6, e)))
        .transpose()?;

    Ok(Note {
        id: NoteId(row.get(0)?),
        title: row.get(1)?,
        content: row.get(2)?,
        tags: tags.as_deref().map(split_tags).unwrap_or_default(),
        position: row.get(4)?,
        event_date,
        event_time,
        created_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
    })
}

/// Microsecond precision keeps text order equal to time order for
/// back-to-back writes
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn chrono_error(column: usize, err: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn new_note(title: &str) -> NewNote {
        NewNote {
            title: title.to_string(),
            content: format!("{} content", title),
            ..Default::default()
        }
    }

    fn open() -> (NamedTempFile, Database) {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();
        (temp, db)
    }

    fn titles(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn test_database_creation() {
        let (_temp, db) = open();
        assert_eq!(db.count_notes().unwrap(), 0);
        assert!(db.list_ordered().unwrap().is_empty());
    }

    #[test]
    fn test_append_positions_increase() {
        let (_temp, mut db) = open();

        let positions: Vec<i64> = ["a", "b", "c"]
            .iter()
            .map(|t| db.create_note(&new_note(t)).unwrap().position.unwrap())
            .collect();

        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_append_position_not_reused_after_delete() {
        let (_temp, mut db) = open();

        db.create_note(&new_note("a")).unwrap();
        let last = db.create_note(&new_note("b")).unwrap();
        db.delete_note(last.id).unwrap();

        let next = db.create_note(&new_note("c")).unwrap();
        assert_eq!(next.position, Some(3));
    }

    #[test]
    fn test_note_round_trip_with_tags_and_events() {
        let (_temp, mut db) = open();

        let created = db
            .create_note(&NewNote {
                title: "Badminton".into(),
                content: "Play at PolyU".into(),
                tags: vec!["x".into(), " y ".into(), "".into()],
                event_date: NaiveDate::from_ymd_opt(2025, 11, 3),
                event_time: NaiveTime::from_hms_opt(17, 0, 0),
            })
            .unwrap();

        let fetched = db.get_note(created.id).unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["x", "y"]);
        assert_eq!(fetched.event_date, NaiveDate::from_ymd_opt(2025, 11, 3));
        assert_eq!(fetched.event_time, NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(fetched.created_at, fetched.updated_at);
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_get_missing_note() {
        let (_temp, db) = open();
        assert!(db.get_note(NoteId(99)).unwrap().is_none());
    }

    #[test]
    fn test_reorder_then_list() {
        let (_temp, mut db) = open();

        let a = db.create_note(&new_note("a")).unwrap();
        let b = db.create_note(&new_note("b")).unwrap();
        let c = db.create_note(&new_note("c")).unwrap();

        let updated = db.reorder(&[c.id, a.id, b.id]).unwrap();
        assert_eq!(updated, 3);

        let notes = db.list_ordered().unwrap();
        assert_eq!(titles(&notes), vec!["c", "a", "b"]);
        assert_eq!(notes[0].position, Some(1));
    }

    #[test]
    fn test_unpositioned_notes_follow_by_recent_update() {
        let (_temp, mut db) = open();

        let a = db.create_note(&new_note("a")).unwrap();
        let b = db.create_note(&new_note("b")).unwrap();
        let old = db.create_note(&new_note("old")).unwrap();
        let recent = db.create_note(&new_note("recent")).unwrap();

        db.conn
            .execute(
                "UPDATE note SET position = NULL, updated_at = '2024-01-01T00:00:00.000000Z' WHERE id = ?1",
                params![old.id.0],
            )
            .unwrap();
        db.conn
            .execute(
                "UPDATE note SET position = NULL, updated_at = '2024-06-01T00:00:00.000000Z' WHERE id = ?1",
                params![recent.id.0],
            )
            .unwrap();

        db.reorder(&[b.id, a.id]).unwrap();

        let notes = db.list_ordered().unwrap();
        assert_eq!(titles(&notes), vec!["b", "a", "recent", "old"]);
    }

    #[test]
    fn test_reorder_skips_unknown_ids() {
        let (_temp, mut db) = open();

        let a = db.create_note(&new_note("a")).unwrap();
        let b = db.create_note(&new_note("b")).unwrap();

        let updated = db.reorder(&[NoteId(404), b.id]).unwrap();
        assert_eq!(updated, 1);

        // b took the second slot, a kept its original position
        assert_eq!(db.get_note(b.id).unwrap().unwrap().position, Some(2));
        assert_eq!(db.get_note(a.id).unwrap().unwrap().position, Some(1));
    }

    #[test]
    fn test_reorder_duplicate_id_last_wins() {
        let (_temp, mut db) = open();

        let a = db.create_note(&new_note("a")).unwrap();
        let b = db.create_note(&new_note("b")).unwrap();

        db.reorder(&[a.id, b.id, a.id]).unwrap();

        assert_eq!(db.get_note(a.id).unwrap().unwrap().position, Some(3));
        assert_eq!(db.get_note(b.id).unwrap().unwrap().position, Some(2));
    }

    #[test]
    fn test_reorder_empty_is_noop() {
        let (_temp, mut db) = open();
        let a = db.create_note(&new_note("a")).unwrap();

        assert_eq!(db.reorder(&[]).unwrap(), 0);
        assert_eq!(db.get_note(a.id).unwrap().unwrap(), a);
    }

    #[test]
    fn test_partial_update() {
        let (_temp, mut db) = open();

        let note = db
            .create_note(&NewNote {
                title: "Dentist".into(),
                content: "Checkup".into(),
                tags: vec!["health".into()],
                event_date: NaiveDate::from_ymd_opt(2025, 1, 10),
                event_time: None,
            })
            .unwrap();

        let updated = db
            .update_note(
                note.id,
                &NoteChanges {
                    content: Some("Checkup and cleaning".into()),
                    event_date: Some(None),
                    event_time: Some(NaiveTime::from_hms_opt(9, 30, 0)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "Dentist");
        assert_eq!(updated.content, "Checkup and cleaning");
        assert_eq!(updated.tags, vec!["health"]);
        assert_eq!(updated.event_date, None);
        assert_eq!(updated.event_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(updated.position, note.position);
        assert!(updated.updated_at > note.updated_at);
    }

    #[test]
    fn test_update_missing_note() {
        let (_temp, mut db) = open();
        let err = db
            .update_note(NoteId(5), &NoteChanges {
                title: Some("x".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, NotesError::NotFound(NoteId(5))));
    }

    #[test]
    fn test_delete_missing_note_leaves_storage() {
        let (_temp, mut db) = open();
        db.create_note(&new_note("keep")).unwrap();

        let err = db.delete_note(NoteId(42)).unwrap_err();
        assert!(matches!(err, NotesError::NotFound(_)));
        assert_eq!(db.count_notes().unwrap(), 1);
    }

    #[test]
    fn test_search_by_text_and_tag() {
        let (_temp, mut db) = open();

        db.create_note(&NewNote {
            title: "Gym".into(),
            content: "Leg day at 6pm".into(),
            tags: vec!["health".into(), "gym".into()],
            ..Default::default()
        })
        .unwrap();
        db.create_note(&NewNote {
            title: "Groceries".into(),
            content: "Buy protein for the gym".into(),
            tags: vec!["errands".into()],
            ..Default::default()
        })
        .unwrap();
        db.create_note(&new_note("Unrelated")).unwrap();

        let hits = db.search("gym", None).unwrap();
        assert_eq!(titles(&hits), vec!["Groceries"]);

        let hits = db.search("Gym", None).unwrap();
        assert_eq!(titles(&hits), vec!["Gym"]);

        let hits = db.search("6pm", Some("health")).unwrap();
        assert_eq!(titles(&hits), vec!["Gym"]);

        let hits = db.search("6pm", Some("heal")).unwrap();
        assert!(hits.is_empty());

        assert!(db.search("", Some("health")).unwrap().is_empty());
    }

    #[test]
    fn test_legacy_table_gets_new_columns() {
        let temp = NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(temp.path()).unwrap();
            conn.execute(
                "CREATE TABLE note (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT,
                    updated_at TEXT
                )",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO note (title, content, created_at, updated_at)
                 VALUES ('legacy', 'from before', '2023-01-01T00:00:00Z', '2023-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }

        let mut db = Database::new(temp.path()).unwrap();
        for (column, _) in ADDITIVE_COLUMNS {
            assert!(db.has_column("note", column).unwrap());
        }

        let legacy = &db.list_ordered().unwrap()[0];
        assert_eq!(legacy.position, None);
        assert!(legacy.tags.is_empty());

        let fresh = db.create_note(&new_note("fresh")).unwrap();
        assert_eq!(fresh.position, Some(1));
        assert_eq!(titles(&db.list_ordered().unwrap()), vec!["fresh", "legacy"]);
    }
}

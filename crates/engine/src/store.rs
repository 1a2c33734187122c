use anyhow::Context;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::events::EngineEvent;
use crate::resources::{ResourceBundle, ResourceKind, ResourceLedger};
use crate::rooms::RoomState;
use crate::snapshot::{GameSnapshot, MachineRecord};

/// SQLite-backed persistence for player snapshots and the event log.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub seq: i64,
    pub ts_ms: i64,
    pub kind: String,
    pub machine_id: Option<i64>,
    pub payload_json: String,
}

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    pub fn load_snapshot(&self, player_id: &str) -> anyhow::Result<Option<GameSnapshot>> {
        let conn = self.open()?;
        let rooms: Option<(i64, i64, i64)> = conn
            .query_row(
                "SELECT current_room, rooms_unlocked, seen_room_unlock FROM players WHERE player_id = ?1",
                [player_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((current_room, rooms_unlocked, seen_room_unlock)) = rooms else {
            return Ok(None);
        };
        let rooms = RoomState::new(to_u32(current_room), to_u32(rooms_unlocked))
            .with_unlock_seen(seen_room_unlock != 0);

        let mut stmt = conn.prepare(
            "SELECT kind, amount FROM player_resources WHERE player_id = ?1",
        )?;
        let amounts = stmt.query_map([player_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut bundle = ResourceBundle::new();
        for row in amounts {
            let (kind, amount) = row?;
            if let Some(kind) = ResourceKind::parse(&kind) {
                bundle.set(kind, amount);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, machine_type, level, x, y, room, last_activated
             FROM player_machines WHERE player_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([player_id], |row| {
            Ok(MachineRecord {
                id: u64::try_from(row.get::<_, i64>(0)?).unwrap_or(0),
                machine_type: row.get(1)?,
                level: to_u32(row.get(2)?),
                x: row.get(3)?,
                y: row.get(4)?,
                room: to_u32(row.get(5)?),
                last_activated: u64::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
            })
        })?;
        let machines = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(Some(GameSnapshot {
            resources: ResourceLedger::from(&bundle),
            machines,
            rooms,
        }))
    }

    /// Replaces the player's stored state and appends `events`, in one
    /// transaction. Returns the new revision.
    pub fn save_snapshot(
        &self,
        player_id: &str,
        snapshot: &GameSnapshot,
        events: &[EngineEvent],
    ) -> anyhow::Result<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let rooms = &snapshot.rooms;
        tx.execute(
            "INSERT INTO players (player_id, current_room, rooms_unlocked, seen_room_unlock, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(player_id) DO UPDATE SET
               current_room = excluded.current_room,
               rooms_unlocked = excluded.rooms_unlocked,
               seen_room_unlock = excluded.seen_room_unlock,
               updated_at = excluded.updated_at",
            (
                player_id,
                rooms.current_room(),
                rooms.rooms_unlocked(),
                i64::from(rooms.unlock_seen()),
                now_rfc3339(),
            ),
        )?;

        tx.execute(
            "DELETE FROM player_resources WHERE player_id = ?1",
            [player_id],
        )?;
        for kind in ResourceKind::ALL {
            tx.execute(
                "INSERT INTO player_resources (player_id, kind, amount) VALUES (?1, ?2, ?3)",
                (player_id, kind.as_str(), snapshot.resources.get(kind)),
            )?;
        }

        tx.execute(
            "DELETE FROM player_machines WHERE player_id = ?1",
            [player_id],
        )?;
        for m in &snapshot.machines {
            tx.execute(
                "INSERT INTO player_machines (player_id, id, machine_type, level, x, y, room, last_activated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    player_id,
                    to_i64(m.id),
                    &m.machine_type,
                    m.level,
                    m.x,
                    m.y,
                    m.room,
                    to_i64(m.last_activated),
                ),
            )
            .with_context(|| format!("save machine {} for {player_id}", m.id))?;
        }

        for event in events {
            append_event_tx(&tx, player_id, event)?;
        }
        let rev = rev_tx(&tx, player_id)?;
        tx.commit()?;
        Ok(rev)
    }

    pub fn get_rev(&self, player_id: &str) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> = conn.query_row(
            "SELECT MAX(seq) FROM event_log WHERE player_id = ?1",
            [player_id],
            |row| row.get(0),
        )?;
        Ok(rev.unwrap_or(0))
    }

    /// Events newer than `after_seq`, oldest first.
    pub fn list_events(
        &self,
        player_id: &str,
        after_seq: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<EventRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT seq, ts_ms, kind, machine_id, payload_json FROM event_log
             WHERE player_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map((player_id, after_seq, limit), |row| {
            Ok(EventRecord {
                seq: row.get(0)?,
                ts_ms: row.get(1)?,
                kind: row.get(2)?,
                machine_id: row.get(3)?,
                payload_json: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn to_u32(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS players (
  player_id TEXT PRIMARY KEY,
  current_room INTEGER NOT NULL DEFAULT 1,
  rooms_unlocked INTEGER NOT NULL DEFAULT 1,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS player_resources (
  player_id TEXT NOT NULL REFERENCES players(player_id) ON DELETE CASCADE,
  kind TEXT NOT NULL,
  amount REAL NOT NULL DEFAULT 0,
  PRIMARY KEY (player_id, kind)
);

-- machine_type is free text: rows of retired types are dropped on load, not here.
CREATE TABLE IF NOT EXISTS player_machines (
  player_id TEXT NOT NULL REFERENCES players(player_id) ON DELETE CASCADE,
  id INTEGER NOT NULL,
  machine_type TEXT NOT NULL,
  level INTEGER NOT NULL DEFAULT 1,
  x REAL NOT NULL DEFAULT 0,
  y REAL NOT NULL DEFAULT 0,
  room INTEGER NOT NULL DEFAULT 1,
  last_activated INTEGER NOT NULL DEFAULT 0,
  PRIMARY KEY (player_id, id)
);

-- Monotonic revision source for client sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  player_id TEXT NOT NULL,
  kind TEXT NOT NULL,
  machine_id INTEGER,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_player ON event_log(player_id, seq);
CREATE INDEX IF NOT EXISTS idx_player_machines_type ON player_machines(player_id, machine_type);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    // Added after the first release.
    ensure_column(conn, "players", "seen_room_unlock", "INTEGER NOT NULL DEFAULT 1")?;

    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, col: &str, decl: &str) -> anyhow::Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {col} {decl}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(e) => {
            if e.to_string().to_lowercase().contains("duplicate column") {
                return Ok(());
            }
            Err(e).with_context(|| format!("ensure column {table}.{col}"))
        }
    }
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    player_id: &str,
    event: &EngineEvent,
) -> anyhow::Result<i64> {
    let payload_json = serde_json::to_string(event).context("encode event payload")?;
    tx.execute(
        "INSERT INTO event_log (ts_ms, player_id, kind, machine_id, payload_json) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            crate::now_ms(),
            player_id,
            event.kind(),
            event.machine_id().map(|id| to_i64(id.0)),
            payload_json,
        ),
    )?;
    Ok(tx.last_insert_rowid())
}

fn rev_tx(tx: &rusqlite::Transaction<'_>, player_id: &str) -> anyhow::Result<i64> {
    let rev: Option<i64> = tx.query_row(
        "SELECT MAX(seq) FROM event_log WHERE player_id = ?1",
        [player_id],
        |row| row.get(0),
    )?;
    Ok(rev.unwrap_or(0))
}

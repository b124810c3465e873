//! Access to the catalog records the backfill jobs repair
//!
//! Songs and albums belong to the wider Encore schema; the scheduler only
//! reads the rows missing an identifier and writes the identifier back.
//! Write-backs are guarded so an identifier set elsewhere is never
//! overwritten.
//!
//! Every lookup is stamped as an attempt. Pending items come back never
//! attempted first, then least recently attempted, so items the catalog
//! cannot resolve do not starve the rest of the backlog.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use encore_catalog_client::RecordingQuery;
use parking_lot::Mutex;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A song with no ISRC, plus the metadata used to resolve one
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSong {
    pub song_id: Uuid,
    pub query: RecordingQuery,
}

/// An album with no UPC and one of its tracks' ISRCs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumIdentifierQuery {
    pub album_id: Uuid,
    pub title: String,
    pub isrc: String,
}

/// Read and write-back operations for the backfill jobs
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Songs with no ISRC, least recently attempted first
    async fn songs_missing_isrc(&self, limit: i64) -> Result<Vec<PendingSong>, sqlx::Error>;

    /// Set a song's ISRC if it is still empty
    async fn set_song_isrc(&self, song_id: Uuid, isrc: &str) -> Result<bool, sqlx::Error>;

    /// Albums with no UPC that have at least one track with an ISRC, least
    /// recently attempted first
    async fn albums_missing_upc(
        &self,
        limit: i64,
    ) -> Result<Vec<AlbumIdentifierQuery>, sqlx::Error>;

    /// Set an album's UPC if it is still empty
    async fn set_album_upc(&self, album_id: Uuid, upc: &str) -> Result<bool, sqlx::Error>;

    /// Stamp an ISRC lookup for a song, whatever its outcome
    async fn mark_song_attempted(&self, song_id: Uuid) -> Result<(), sqlx::Error>;

    /// Stamp a UPC lookup for an album, whatever its outcome
    async fn mark_album_attempted(&self, album_id: Uuid) -> Result<(), sqlx::Error>;
}

#[derive(Debug, FromRow)]
struct PendingSongRow {
    id: Uuid,
    title: String,
    album_title: Option<String>,
    label: Option<String>,
    release_date: Option<NaiveDate>,
    artists: Vec<String>,
}

impl From<PendingSongRow> for PendingSong {
    fn from(row: PendingSongRow) -> Self {
        let query = RecordingQuery {
            title: row.title,
            album: row.album_title,
            label: row.label,
            release_date: row.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
            artists: row.artists,
        };
        Self {
            song_id: row.id,
            query,
        }
    }
}

#[derive(Debug, FromRow)]
struct PendingAlbumRow {
    id: Uuid,
    title: String,
    isrc: String,
}

/// Recording store over the `songs`, `albums`, `artists` and `song_artists`
/// tables
#[derive(Clone)]
pub struct PgRecordingStore {
    pool: PgPool,
}

impl PgRecordingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn mark_attempted(&self, target: &str, item_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO backfill_attempts (target, item_id, attempted_at)
            VALUES ($1, $2, clock_timestamp())
            ON CONFLICT (target, item_id)
            DO UPDATE SET attempted_at = EXCLUDED.attempted_at
            "#,
        )
        .bind(target)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for PgRecordingStore {
    async fn songs_missing_isrc(&self, limit: i64) -> Result<Vec<PendingSong>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PendingSongRow>(
            r#"
            SELECT
                s.id,
                s.title,
                al.title AS album_title,
                al.label,
                al.release_date,
                COALESCE(
                    array_agg(ar.name ORDER BY sa.position) FILTER (WHERE ar.name IS NOT NULL),
                    '{}'
                ) AS artists
            FROM songs s
            LEFT JOIN albums al ON al.id = s.album_id
            LEFT JOIN song_artists sa ON sa.song_id = s.id
            LEFT JOIN artists ar ON ar.id = sa.artist_id
            LEFT JOIN backfill_attempts ba ON ba.target = 'isrc' AND ba.item_id = s.id
            WHERE s.isrc IS NULL OR s.isrc = ''
            GROUP BY s.id, al.id, ba.attempted_at
            ORDER BY ba.attempted_at ASC NULLS FIRST, s.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PendingSong::from).collect())
    }

    async fn set_song_isrc(&self, song_id: Uuid, isrc: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET isrc = $2, updated_at = NOW()
            WHERE id = $1 AND (isrc IS NULL OR isrc = '')
            "#,
        )
        .bind(song_id)
        .bind(isrc)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn albums_missing_upc(
        &self,
        limit: i64,
    ) -> Result<Vec<AlbumIdentifierQuery>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PendingAlbumRow>(
            r#"
            SELECT al.id, al.title, MIN(s.isrc) AS isrc
            FROM albums al
            JOIN songs s ON s.album_id = al.id
            LEFT JOIN backfill_attempts ba ON ba.target = 'upc' AND ba.item_id = al.id
            WHERE (al.upc IS NULL OR al.upc = '')
                AND s.isrc IS NOT NULL AND s.isrc <> ''
            GROUP BY al.id, al.title, ba.attempted_at
            ORDER BY ba.attempted_at ASC NULLS FIRST, al.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AlbumIdentifierQuery {
                album_id: row.id,
                title: row.title,
                isrc: row.isrc,
            })
            .collect())
    }

    async fn set_album_upc(&self, album_id: Uuid, upc: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE albums
            SET upc = $2, updated_at = NOW()
            WHERE id = $1 AND (upc IS NULL OR upc = '')
            "#,
        )
        .bind(album_id)
        .bind(upc)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_song_attempted(&self, song_id: Uuid) -> Result<(), sqlx::Error> {
        self.mark_attempted("isrc", song_id).await
    }

    async fn mark_album_attempted(&self, album_id: Uuid) -> Result<(), sqlx::Error> {
        self.mark_attempted("upc", album_id).await
    }
}

#[derive(Debug, Clone)]
struct MemorySong {
    id: Uuid,
    album_id: Option<Uuid>,
    query: RecordingQuery,
    isrc: Option<String>,
}

#[derive(Debug, Clone)]
struct MemoryAlbum {
    id: Uuid,
    title: String,
    upc: Option<String>,
}

#[derive(Debug, Default)]
struct Catalog {
    songs: Vec<MemorySong>,
    albums: Vec<MemoryAlbum>,
    song_attempts: HashMap<Uuid, u64>,
    album_attempts: HashMap<Uuid, u64>,
    attempt_seq: u64,
}

impl Catalog {
    fn next_attempt(&mut self) -> u64 {
        self.attempt_seq += 1;
        self.attempt_seq
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Recording store held in memory; ties in attempt order fall back to
/// insertion order
#[derive(Debug, Default)]
pub struct MemoryRecordingStore {
    catalog: Mutex<Catalog>,
}

impl MemoryRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_album(&self, title: impl Into<String>, upc: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.lock().albums.push(MemoryAlbum {
            id,
            title: title.into(),
            upc: upc.map(str::to_string),
        });
        id
    }

    pub fn add_song(&self, album_id: Option<Uuid>, query: RecordingQuery, isrc: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.catalog.lock().songs.push(MemorySong {
            id,
            album_id,
            query,
            isrc: isrc.map(str::to_string),
        });
        id
    }

    pub fn song_isrc(&self, song_id: Uuid) -> Option<String> {
        self.catalog
            .lock()
            .songs
            .iter()
            .find(|s| s.id == song_id)
            .and_then(|s| s.isrc.clone())
    }

    pub fn album_upc(&self, album_id: Uuid) -> Option<String> {
        self.catalog
            .lock()
            .albums
            .iter()
            .find(|a| a.id == album_id)
            .and_then(|a| a.upc.clone())
    }
}

#[async_trait]
impl RecordingStore for MemoryRecordingStore {
    async fn songs_missing_isrc(&self, limit: i64) -> Result<Vec<PendingSong>, sqlx::Error> {
        let catalog = self.catalog.lock();
        let mut pending: Vec<&MemorySong> =
            catalog.songs.iter().filter(|s| is_blank(&s.isrc)).collect();
        pending.sort_by_key(|s| catalog.song_attempts.get(&s.id).copied());
        Ok(pending
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|s| PendingSong {
                song_id: s.id,
                query: s.query.clone(),
            })
            .collect())
    }

    async fn set_song_isrc(&self, song_id: Uuid, isrc: &str) -> Result<bool, sqlx::Error> {
        let mut catalog = self.catalog.lock();
        match catalog.songs.iter_mut().find(|s| s.id == song_id) {
            Some(song) if is_blank(&song.isrc) => {
                song.isrc = Some(isrc.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn albums_missing_upc(
        &self,
        limit: i64,
    ) -> Result<Vec<AlbumIdentifierQuery>, sqlx::Error> {
        let catalog = self.catalog.lock();
        let mut albums: Vec<&MemoryAlbum> =
            catalog.albums.iter().filter(|a| is_blank(&a.upc)).collect();
        albums.sort_by_key(|a| catalog.album_attempts.get(&a.id).copied());

        let mut pending = Vec::new();
        for album in albums {
            if pending.len() as i64 >= limit {
                break;
            }
            let mut isrcs: Vec<&str> = catalog
                .songs
                .iter()
                .filter(|s| s.album_id == Some(album.id) && !is_blank(&s.isrc))
                .filter_map(|s| s.isrc.as_deref())
                .collect();
            isrcs.sort_unstable();
            if let Some(isrc) = isrcs.first() {
                pending.push(AlbumIdentifierQuery {
                    album_id: album.id,
                    title: album.title.clone(),
                    isrc: isrc.to_string(),
                });
            }
        }
        Ok(pending)
    }

    async fn set_album_upc(&self, album_id: Uuid, upc: &str) -> Result<bool, sqlx::Error> {
        let mut catalog = self.catalog.lock();
        match catalog.albums.iter_mut().find(|a| a.id == album_id) {
            Some(album) if is_blank(&album.upc) => {
                album.upc = Some(upc.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_song_attempted(&self, song_id: Uuid) -> Result<(), sqlx::Error> {
        let mut catalog = self.catalog.lock();
        let seq = catalog.next_attempt();
        catalog.song_attempts.insert(song_id, seq);
        Ok(())
    }

    async fn mark_album_attempted(&self, album_id: Uuid) -> Result<(), sqlx::Error> {
        let mut catalog = self.catalog.lock();
        let seq = catalog.next_attempt();
        catalog.album_attempts.insert(album_id, seq);
        Ok(())
    }
}

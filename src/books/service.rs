//! Default book-creation implementation
//!
//! Extracts audio properties, uploads the audio and cover to object
//! storage, and persists the catalog row.

use std::io::Cursor;

use async_trait::async_trait;
use chrono::Utc;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::storage::S3Client;

use super::{AudioTrack, Book, CreateBook, CreateBookError, NewBook};

/// Book creation backed by S3 and SQLite
#[derive(Clone)]
pub struct BookService {
    s3_client: S3Client,
    db: SqlitePool,
}

struct AudioProperties {
    codec: Option<String>,
    duration_secs: u64,
    bitrate: u32,
    sample_rate: u32,
    channels: u8,
}

impl BookService {
    pub fn new(s3_client: S3Client, db: SqlitePool) -> Self {
        Self { s3_client, db }
    }

    fn parse_audio_properties(bytes: &[u8]) -> Result<AudioProperties, CreateBookError> {
        let tagged = Probe::new(Cursor::new(bytes))
            .guess_file_type()
            .map_err(|e| CreateBookError::AudioMetadata(e.to_string()))?
            .read()
            .map_err(|e| CreateBookError::AudioMetadata(e.to_string()))?;

        let properties = tagged.properties();

        Ok(AudioProperties {
            codec: Some(format!("{:?}", tagged.file_type()).to_lowercase()),
            duration_secs: properties.duration().as_secs(),
            bitrate: properties.audio_bitrate().unwrap_or(0),
            sample_rate: properties.sample_rate().unwrap_or(0),
            channels: properties.channels().unwrap_or(0),
        })
    }
}

#[async_trait]
impl CreateBook for BookService {
    async fn create(&self, book: NewBook) -> Result<Book, CreateBookError> {
        let properties = Self::parse_audio_properties(&book.audio.bytes)?;

        let id = Uuid::new_v4().to_string();
        let format = format_from_filename(&book.audio.filename);
        let size = book.audio.size as u64;

        // Audio first; a failed upload must not leave a dangling row
        let audio_key = format!("books/audio/{}-{}", Uuid::new_v4(), book.audio.filename);
        self.s3_client
            .put_object(&audio_key, book.audio.bytes, &book.audio.content_type)
            .await
            .map_err(|e| CreateBookError::Storage(e.to_string()))?;

        let cover_key = match book.cover {
            Some(cover) => {
                let key = format!("covers/{}-{}", Uuid::new_v4(), cover.filename);
                self.s3_client
                    .put_object(&key, cover.bytes, &cover.content_type)
                    .await
                    .map_err(|e| CreateBookError::Storage(e.to_string()))?;
                Some(key)
            }
            None => None,
        };

        let created_at = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO books (id, title, author, description, cover_key, audio_key, \
             audio_format, audio_codec, audio_duration_secs, audio_bitrate, \
             audio_sample_rate, audio_channels, audio_size, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&cover_key)
        .bind(&audio_key)
        .bind(&format)
        .bind(&properties.codec)
        .bind(properties.duration_secs as i64)
        .bind(properties.bitrate as i64)
        .bind(properties.sample_rate as i64)
        .bind(properties.channels as i64)
        .bind(size as i64)
        .bind(created_at.to_rfc3339())
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            // Roll back the stored objects rather than leaving orphans
            if let Err(del) = self.s3_client.delete_object(&audio_key).await {
                tracing::warn!(key = %audio_key, error = %del, "Failed to remove orphaned audio object");
            }
            if let Some(key) = &cover_key {
                if let Err(del) = self.s3_client.delete_object(key).await {
                    tracing::warn!(key = %key, error = %del, "Failed to remove orphaned cover object");
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            book_id = %id,
            title = %book.title,
            size = size,
            duration_secs = properties.duration_secs,
            "Book created"
        );

        Ok(Book {
            id,
            title: book.title,
            author: book.author,
            description: book.description,
            cover_key,
            audio: AudioTrack {
                storage_key: audio_key,
                format,
                codec: properties.codec,
                duration_secs: properties.duration_secs,
                bitrate: properties.bitrate,
                sample_rate: properties.sample_rate,
                channels: properties.channels,
                size,
            },
            created_at,
        })
    }
}

/// Audio format label from the filename extension
fn format_from_filename(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && *ext != filename)
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "mp3".to_string())
}

//! Transcript export.
//!
//! On resolution a session's full history is written to
//! `dialog_{user}_{status}_{YYYYMMDD_HHMMSS}.txt` and the session is dropped.

use crate::session::{HistoryEntry, SessionStore};
use chrono::{DateTime, Utc};
use helpdesk_common::error::ResultExt;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Solved,
    Unsolved,
}

impl Resolution {
    /// Callback data and file name component.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solved => "solved",
            Self::Unsolved => "unsolved",
        }
    }

    /// Parse inline-button callback data.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "solved" => Some(Self::Solved),
            "unsolved" => Some(Self::Unsolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Keep file names to a portable character set.
fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// File name for a transcript saved at `saved_at`.
pub fn transcript_filename(user_id: &str, status: Resolution, saved_at: DateTime<Utc>) -> String {
    format!(
        "dialog_{}_{}_{}.txt",
        sanitize(user_id),
        status,
        saved_at.format("%Y%m%d_%H%M%S")
    )
}

/// Render the header and every history record.
pub fn render_transcript(
    user_id: &str,
    status: Resolution,
    saved_at: DateTime<Utc>,
    history: &[HistoryEntry],
) -> String {
    let mut out = format!(
        "User ID: {user_id}\nSaved at: {} UTC\nStatus: {status}\n\n",
        format_timestamp(&saved_at)
    );
    for entry in history {
        let _ = write!(
            out,
            "{}  {}: {}\n\n",
            format_timestamp(&entry.timestamp),
            entry.role.label(),
            entry.text
        );
    }
    out
}

/// Writes transcripts and clears the sessions they came from.
pub struct TranscriptWriter {
    store: Arc<SessionStore>,
    dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(store: Arc<SessionStore>, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    /// Save the user's history and drop the session.
    ///
    /// Returns `Ok(None)` when there is nothing to save. On a write error the
    /// session is left in place.
    pub async fn save_and_clear(
        &self,
        user_id: &str,
        status: Resolution,
    ) -> helpdesk_common::Result<Option<PathBuf>> {
        let Some(mut guard) = self.store.lock_existing(user_id).await else {
            return Ok(None);
        };
        let Some(session) = guard.session() else {
            return Ok(None);
        };
        if session.history().is_empty() {
            return Ok(None);
        }

        let saved_at = Utc::now();
        let path = self.dir.join(transcript_filename(user_id, status, saved_at));
        let body = render_transcript(user_id, status, saved_at, session.history());
        let entries = session.history().len();

        tokio::fs::create_dir_all(&self.dir)
            .await
            .context(format!("creating transcript directory {}", self.dir.display()))?;
        tokio::fs::write(&path, body)
            .await
            .context(format!("writing transcript {}", path.display()))?;

        guard.clear();

        tracing::info!(
            user_id = %user_id,
            status = %status,
            entries,
            file = %path.display(),
            "Transcript saved"
        );

        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HistoryRole;
    use chrono::TimeZone;
    use helpdesk_common::ReplyRole;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap()
    }

    #[test]
    fn resolution_parse() {
        assert_eq!(Resolution::parse("solved"), Some(Resolution::Solved));
        assert_eq!(Resolution::parse("unsolved"), Some(Resolution::Unsolved));
        assert_eq!(Resolution::parse("maybe"), None);
    }

    #[test]
    fn filename_shape() {
        assert_eq!(
            transcript_filename("123456", Resolution::Solved, at(9, 7, 3)),
            "dialog_123456_solved_20240305_090703.txt"
        );
        assert_eq!(
            transcript_filename("../evil", Resolution::Unsolved, at(23, 59, 59)),
            "dialog____evil_unsolved_20240305_235959.txt"
        );
    }

    #[test]
    fn render_header_and_entries() {
        let history = vec![
            HistoryEntry {
                role: HistoryRole::System,
                text: "sys".into(),
                timestamp: at(10, 0, 0),
            },
            HistoryEntry {
                role: HistoryRole::User,
                text: "A".into(),
                timestamp: at(10, 0, 1),
            },
        ];
        let text = render_transcript("42", Resolution::Solved, at(10, 5, 0), &history);
        assert_eq!(
            text,
            "User ID: 42\n\
             Saved at: 2024-03-05T10:05:00.000000 UTC\n\
             Status: solved\n\n\
             2024-03-05T10:00:00.000000  SYSTEM: sys\n\n\
             2024-03-05T10:00:01.000000  USER: A\n\n"
        );
    }

    #[tokio::test]
    async fn missing_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new("sys", ReplyRole::Assistant));
        let writer = TranscriptWriter::new(store, dir.path());

        let saved = writer.save_and_clear("1", Resolution::Solved).await.unwrap();
        assert!(saved.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(writer.store.active_users(), 0);
    }

    #[tokio::test]
    async fn save_writes_file_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new("sys", ReplyRole::Assistant));
        let now = Utc::now();
        store.append_user_turn("1", "A", now).await;
        store.append_bot_turn("1", "B", now).await;

        let writer = TranscriptWriter::new(store.clone(), dir.path());
        let path = writer
            .save_and_clear("1", Resolution::Unsolved)
            .await
            .unwrap()
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dialog_1_unsolved_"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("User ID: 1\n"));
        assert!(content.contains("Status: unsolved"));
        assert!(content.contains("  BOT: B\n\n"));
        assert!(store.get("1").await.is_none());
        assert_eq!(store.active_users(), 0);
    }

    #[tokio::test]
    async fn write_failure_keeps_session() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = Arc::new(SessionStore::new("sys", ReplyRole::Assistant));
        store.append_user_turn("1", "A", Utc::now()).await;

        let writer = TranscriptWriter::new(store.clone(), &blocker);
        let err = writer.save_and_clear("1", Resolution::Solved).await.unwrap_err();
        assert!(err.is_io());
        assert!(store.get("1").await.is_some());
        assert_eq!(store.active_users(), 1);
    }
}

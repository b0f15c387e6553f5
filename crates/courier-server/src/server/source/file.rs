use courier::{Error, Result, Source, WorkItem};
use std::path::{Path, PathBuf};

/// Reads a JSON-lines file of work items, once per cycle.
///
/// Each non-blank line is one serialized [`WorkItem`], e.g.
/// `{"name":"USD","payload":{"kind":"rate","base":"EUR","rate":1.07,"date":"2024-05-01"}}`.
/// The file is re-read on every fetch, so edits show up on the next cycle.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, raw: &str) -> Result<Vec<WorkItem>> {
        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| Error::UpstreamFetch {
                    reason: format!("{}:{}: {e}", self.path.display(), idx + 1),
                })
            })
            .collect()
    }
}

impl Source for FileSource {
    async fn fetch(&self) -> Result<Vec<WorkItem>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::UpstreamFetch {
                reason: format!("failed to read `{}`: {e}", self.path.display()),
            })?;

        let items = self.parse(&raw)?;
        tracing::debug!(path = %self.path.display(), items = items.len(), "Loaded work items");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::{Payload, PayloadKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn reads_every_kind_in_file_order() {
        let file = file_with(concat!(
            r#"{"name":"USD","payload":{"kind":"rate","base":"EUR","rate":1.07,"date":"2024-05-01"}}"#,
            "\n\n",
            r#"{"name":"Song 2","payload":{"kind":"proposition","album":"Blur","artists":["Blur"],"playlist_index":0,"track_index":1,"playlist_id":"p1","source_track":"Beetlebum"}}"#,
            "\n",
            r#"{"name":"Tender","payload":{"kind":"now-playing","track":"Tender","played_at":1714550400,"duration_ms":470000}}"#,
            "\n",
        ));

        let items = FileSource::new(file.path()).fetch().await.unwrap();

        let kinds: Vec<_> = items.iter().map(|item| item.payload.kind()).collect();
        assert_eq!(
            kinds,
            [
                PayloadKind::Rate,
                PayloadKind::Proposition,
                PayloadKind::NowPlaying
            ]
        );
        let Payload::NowPlaying(played) = &items[2].payload else {
            panic!("expected a now-playing payload");
        };
        assert!(played.artists.is_empty());
        assert_eq!(played.duration_ms, 470_000);
    }

    #[tokio::test]
    async fn bad_line_fails_the_fetch_with_its_line_number() {
        let file = file_with(concat!(
            r#"{"name":"USD","payload":{"kind":"rate","base":"EUR","rate":1.07,"date":"2024-05-01"}}"#,
            "\n",
            r#"{"name":"GBP","payload":{"kind":"bogus"}}"#,
            "\n",
        ));

        let err = FileSource::new(file.path()).fetch().await.unwrap_err();
        let Error::UpstreamFetch { reason } = &err else {
            panic!("expected an upstream failure, got {err:?}");
        };
        assert!(reason.contains(":2:"), "{reason}");
    }

    #[tokio::test]
    async fn missing_file_is_an_upstream_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.jsonl"));

        assert!(matches!(
            source.fetch().await,
            Err(Error::UpstreamFetch { .. })
        ));
    }

    #[tokio::test]
    async fn empty_file_yields_no_items() {
        let file = file_with("\n  \n");
        let items = FileSource::new(file.path()).fetch().await.unwrap();
        assert!(items.is_empty());
    }
}

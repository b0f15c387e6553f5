use courier::{Handler, Message, Payload, Result, decode};

/// Consumer handler that decodes every message and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl Handler for LoggingHandler {
    async fn handle(&self, worker_id: usize, message: Message) -> Result<()> {
        let item = decode(&message)?;
        let origin = message.worker_id();

        match &item.payload {
            Payload::Rate(rate) => tracing::debug!(
                worker_id,
                ?origin,
                name = %item.name,
                base = %rate.base,
                rate = rate.value,
                date = %rate.date,
                "Consumed rate"
            ),
            Payload::Proposition(p) => tracing::debug!(
                worker_id,
                ?origin,
                name = %item.name,
                album = %p.album,
                artists = ?p.artists,
                playlist = %p.playlist_id,
                "Consumed proposition"
            ),
            Payload::NowPlaying(n) => tracing::debug!(
                worker_id,
                ?origin,
                name = %item.name,
                played_at = n.played_at,
                duration_ms = n.duration_ms,
                artists = n.artists.len(),
                "Consumed now-playing"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::{Error, WorkItem, encode};

    #[tokio::test]
    async fn decodes_and_accepts_encoded_items() {
        let message = encode(&WorkItem::rate("USD", "EUR", 1.07, "2024-05-01"), 2).unwrap();
        assert!(LoggingHandler.handle(0, message).await.is_ok());
    }

    #[tokio::test]
    async fn undecodable_message_is_an_error() {
        let message = Message::new("USD", "not json").with_header("kind", "rate");
        assert!(matches!(
            LoggingHandler.handle(0, message).await,
            Err(Error::Serialization { .. })
        ));
    }
}

use tokio::sync::mpsc;

/// Await the next outbound envelope, then opportunistically drain every
/// envelope already queued, so the writer emits one batch per wakeup
/// instead of one frame at a time ("the writer batches: when
/// awakened, it writes the first envelope, then opportunistically drains
/// all currently queued envelopes"). Returns `None` once the channel is
/// closed and empty.
pub async fn recv_batch(rx: &mut mpsc::Receiver<String>) -> Option<Vec<String>> {
    let first = rx.recv().await?;
    let mut batch = vec![first];
    while let Ok(next) = rx.try_recv() {
        batch.push(next);
    }
    Some(batch)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_everything_queued_since_last_wakeup() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send("a".into()).await.unwrap();
        tx.send("b".into()).await.unwrap();
        tx.send("c".into()).await.unwrap();

        let batch = recv_batch(&mut rx).await.unwrap();
        assert_eq!(batch, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn returns_none_on_closed_empty_channel() {
        let (tx, mut rx) = mpsc::channel::<String>(8);
        drop(tx);
        assert_eq!(recv_batch(&mut rx).await, None);
    }
}

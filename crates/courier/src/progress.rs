//! Transfer progress normalized to whole percentages.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};

/// Chunk size used when streaming a request body.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Which way the bytes are moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    /// Request body going out.
    Upload,
    /// Response body coming in.
    Download,
}

/// A raw progress report from the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Direction of the transfer.
    pub direction: TransferDirection,
    /// Bytes transferred so far.
    pub loaded: u64,
    /// Total bytes, if known.
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// An upload progress report.
    pub fn upload(loaded: u64, total: Option<u64>) -> Self {
        Self {
            direction: TransferDirection::Upload,
            loaded,
            total,
        }
    }

    /// A download progress report.
    pub fn download(loaded: u64, total: Option<u64>) -> Self {
        Self {
            direction: TransferDirection::Download,
            loaded,
            total,
        }
    }

    /// Whether a percentage can be computed from this event.
    pub fn is_computable(&self) -> bool {
        matches!(self.total, Some(total) if total > 0)
    }

    /// `round(loaded / total * 100)`, if the total is computable.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|total| *total > 0)?;
        let percent = (self.loaded as f64 / total as f64 * 100.0).round();
        Some(percent.min(100.0) as u8)
    }
}

/// Callback receiving normalized progress, 0 to 100.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Forward `event` to `callback` as a percentage.
///
/// Events without a computable total are dropped.
pub fn normalize_progress<F>(event: &ProgressEvent, callback: &F)
where
    F: Fn(u8) + ?Sized,
{
    if let Some(percent) = event.percent() {
        tracing::trace!(target: "courier::http", direction = ?event.direction, percent, "transfer progress");
        callback(percent);
    }
}

/// Stream `body` in chunks, reporting upload progress as each chunk is taken.
pub(crate) fn upload_stream(
    body: Bytes,
    on_progress: ProgressCallback,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let total = body.len() as u64;
    let chunks: Vec<Bytes> = (0..body.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(body.len())))
        .collect();

    let mut loaded = 0u64;
    stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        normalize_progress(&ProgressEvent::upload(loaded, Some(total)), on_progress.as_ref());
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collect(events: &[ProgressEvent]) -> Vec<u8> {
        let seen = Mutex::new(Vec::new());
        for event in events {
            normalize_progress(event, &|p: u8| seen.lock().push(p));
        }
        seen.into_inner()
    }

    #[test]
    fn computable_totals_are_rounded() {
        let seen = collect(&[
            ProgressEvent::download(0, Some(200)),
            ProgressEvent::download(1, Some(200)),
            ProgressEvent::download(1, Some(3)),
            ProgressEvent::download(2, Some(3)),
            ProgressEvent::upload(200, Some(200)),
        ]);
        assert_eq!(seen, [0, 1, 33, 67, 100]);
    }

    #[test]
    fn unknown_totals_are_dropped() {
        let seen = collect(&[
            ProgressEvent::download(512, None),
            ProgressEvent::upload(10, Some(0)),
        ]);
        assert!(seen.is_empty());
        assert!(!ProgressEvent::download(5, None).is_computable());
        assert!(ProgressEvent::download(5, Some(10)).is_computable());
    }

    #[tokio::test]
    async fn upload_stream_reports_each_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let body = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + UPLOAD_CHUNK_SIZE / 2]);

        let chunks: Vec<_> = upload_stream(body.clone(), Arc::new(move |p: u8| sink.lock().push(p)))
            .collect()
            .await;

        let rebuilt: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| match chunk {
                Ok(bytes) => bytes.to_vec(),
                Err(never) => match never {},
            })
            .collect();
        assert_eq!(rebuilt, body.to_vec());
        assert_eq!(*seen.lock(), [40, 80, 100]);
    }

    #[tokio::test]
    async fn empty_upload_reports_nothing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let chunks: Vec<_> = upload_stream(Bytes::new(), Arc::new(move |p: u8| sink.lock().push(p)))
            .collect()
            .await;
        assert!(chunks.is_empty());
        assert!(seen.lock().is_empty());
    }
}

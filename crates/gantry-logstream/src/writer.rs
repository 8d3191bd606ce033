//! Buffered live log writer
//!
//! Sits between a running step and a [`LogClient`]. Bytes come in on
//! arbitrary chunk boundaries; complete lines go out in periodic batches.
//! History is ring-trimmed against a byte budget so the most recent output
//! survives for debugging, masking runs before any byte is buffered, and a
//! nudge scan on close turns telltale tail lines into actionable errors.

use crate::client::LogClient;
use crate::error::Result;
use crate::nudge::{self, Nudge};
use gantry_api::line::truncate_message;
use gantry_api::RemoteLine;
use gantry_masker::Masker;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Tuning knobs for one writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Byte budget for serialized history. Oldest lines are dropped first.
    pub limit_bytes: usize,

    /// Delay between the ready signal and the batch flush.
    pub flush_interval: Duration,

    /// Quiet period after which the idle diagnostic fires.
    pub idle_threshold: Duration,

    /// Mirror every line to the engine's stdout.
    pub stdout_echo: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            limit_bytes: 5 * 1024 * 1024,
            flush_interval: Duration::from_secs(1),
            idle_threshold: Duration::from_secs(600),
            stdout_echo: false,
        }
    }
}

struct State {
    ordinal: u64,
    pending: Vec<RemoteLine>,
    history: Vec<RemoteLine>,
    history_bytes: usize,
    residual: Vec<u8>,
    errors: Vec<String>,
    /// Set when open failed: pending stops accumulating, flushing stops.
    stopped: bool,
    closed: bool,
    last_flush: Instant,
    flush_failures: u64,
}

struct Inner {
    client: Arc<dyn LogClient>,
    masker: Arc<Masker>,
    key: String,
    name: String,
    nudges: Vec<Nudge>,
    config: WriterConfig,
    started: Instant,
    state: Mutex<State>,
    ready: Notify,
    close_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves consistent line data; keep
        // flushing whatever is there rather than abandoning the stream.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush_pending(&self) {
        let batch: Vec<RemoteLine> = {
            let mut state = self.lock();
            if state.pending.is_empty() {
                return;
            }
            std::mem::take(&mut state.pending)
        };

        match self.client.write(&self.key, &batch).await {
            Ok(()) => {
                self.lock().last_flush = Instant::now();
            }
            Err(err) => {
                let mut state = self.lock();
                state.flush_failures += 1;
                let failures = state.flush_failures;
                drop(state);
                warn!(key = %self.key, failures, error = %err, "log batch flush failed");
            }
        }
    }

    fn idle_diagnostic(&self) {
        let state = self.lock();
        info!(
            key = %self.key,
            name = %self.name,
            history_lines = state.history.len(),
            history_bytes = state.history_bytes,
            flush_failures = state.flush_failures,
            idle_secs = state.last_flush.elapsed().as_secs(),
            "log stream idle"
        );
    }

    async fn run_flusher(self: Arc<Self>, mut close_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = close_rx.changed() => break,
                ready = tokio::time::timeout(self.config.idle_threshold, self.ready.notified()) => {
                    match ready {
                        Ok(()) => {
                            tokio::select! {
                                _ = close_rx.changed() => break,
                                _ = tokio::time::sleep(self.config.flush_interval) => {
                                    self.flush_pending().await;
                                }
                            }
                        }
                        Err(_) => {
                            let quiet = {
                                let state = self.lock();
                                state.pending.is_empty()
                                    && state.last_flush.elapsed() >= self.config.idle_threshold
                            };
                            if quiet {
                                self.idle_diagnostic();
                            }
                        }
                    }
                }
            }
        }
        debug!(key = %self.key, "log flusher exited");
    }
}

/// Per-step buffered writer over a [`LogClient`].
pub struct LiveLogWriter {
    inner: Arc<Inner>,
}

impl LiveLogWriter {
    /// Construct the writer and start its background flusher.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        client: Arc<dyn LogClient>,
        masker: Arc<Masker>,
        key: &str,
        name: &str,
        nudges: Vec<Nudge>,
        config: WriterConfig,
    ) -> Self {
        let (close_tx, close_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            client,
            masker,
            key: key.to_string(),
            name: name.to_string(),
            nudges,
            config,
            started: Instant::now(),
            state: Mutex::new(State {
                ordinal: 0,
                pending: Vec::new(),
                history: Vec::new(),
                history_bytes: 0,
                residual: Vec::new(),
                errors: Vec::new(),
                stopped: false,
                closed: false,
                last_flush: Instant::now(),
                flush_failures: 0,
            }),
            ready: Notify::new(),
            close_tx,
        });

        tokio::spawn(Arc::clone(&inner).run_flusher(close_rx));
        LiveLogWriter { inner }
    }

    /// Open the upstream stream. A failure stops live flushing but the
    /// writer remains usable: history accumulates and `close` still runs.
    pub async fn open(&self) -> Result<()> {
        match self.inner.client.open(&self.inner.key).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut state = self.inner.lock();
                state.stopped = true;
                state.errors.push(format!("failed to open log stream: {err}"));
                Err(err)
            }
        }
    }

    /// Buffer a chunk of step output.
    ///
    /// Always reports the original chunk length: masking may shrink or grow
    /// the stored bytes and callers must not see that.
    pub fn write(&self, p: &[u8]) -> usize {
        let masked = self.inner.masker.mask(p);

        let mut state = self.inner.lock();

        let Some(last_nl) = masked.iter().rposition(|&b| b == b'\n') else {
            state.residual.extend_from_slice(&masked);
            return p.len();
        };

        // Everything through the last newline joins the residual; the tail
        // becomes the new residual.
        let mut block = std::mem::take(&mut state.residual);
        block.extend_from_slice(&masked[..=last_nl]);
        state.residual = masked[last_nl + 1..].to_vec();

        let elapsed = self.inner.started.elapsed().as_secs_f64();
        let segments: Vec<&[u8]> = block.split(|&b| b == b'\n').collect();
        let last_index = segments.len() - 1;
        for (i, segment) in segments.into_iter().enumerate() {
            if i == last_index && segment.is_empty() {
                // split() yields an empty trailing segment after the final
                // newline; interior empties are real blank lines and kept
                continue;
            }
            let message = truncate_message(&String::from_utf8_lossy(segment));
            if self.inner.config.stdout_echo {
                println!("{message}");
            }
            let line = RemoteLine::info(state.ordinal, &message, chrono::Utc::now(), elapsed);
            state.ordinal += 1;
            let line_bytes = line.encoded_len();

            // Trim oldest-first until the new line fits. The incoming line
            // is always admitted, so serialized history can exceed the
            // budget by at most this one line until the next trim.
            while state.history_bytes + line_bytes > self.inner.config.limit_bytes
                && !state.history.is_empty()
            {
                let dropped = state.history.remove(0);
                state.history_bytes -= dropped.encoded_len();
                if state.pending.first().map(|l| l.pos) == Some(dropped.pos) {
                    state.pending.remove(0);
                }
            }

            if !state.stopped {
                state.pending.push(line.clone());
            }
            state.history.push(line);
            state.history_bytes += line_bytes;
        }

        drop(state);
        self.inner.ready.notify_one();
        p.len()
    }

    /// Flush the residual, scan nudges, upload the full history and close
    /// the upstream stream. Idempotent; only the upload error surfaces.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        let _ = self.inner.close_tx.send(true);

        let has_residual = !self.inner.lock().residual.is_empty();
        if has_residual {
            self.write(b"\n");
        }

        self.inner.flush_pending().await;

        let history: Vec<RemoteLine> = {
            let mut state = self.inner.lock();
            let hits = nudge::scan(&state.history, &self.inner.nudges);
            state.errors.extend(hits);
            state.history.clone()
        };

        let upload_result = self.inner.client.upload(&self.inner.key, &history).await;
        if let Err(err) = &upload_result {
            warn!(key = %self.inner.key, error = %err, "log history upload failed");
        }

        if let Err(err) = self.inner.client.close(&self.inner.key).await {
            warn!(key = %self.inner.key, error = %err, "log stream close failed");
        }

        upload_result
    }

    /// Errors observed by the pipeline: open failures and fired nudges.
    pub fn errors(&self) -> Vec<String> {
        self.inner.lock().errors.clone()
    }

    /// Number of lines currently retained.
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Serialized byte size of retained history.
    pub fn history_bytes(&self) -> usize {
        self.inner.lock().history_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingClient;
    use gantry_masker::PatternSet;

    fn writer_with(
        client: Arc<RecordingClient>,
        secrets: &[&str],
        nudges: Vec<Nudge>,
        config: WriterConfig,
    ) -> LiveLogWriter {
        let secrets: Vec<String> = secrets.iter().map(|s| s.to_string()).collect();
        let masker = Arc::new(Masker::new(&secrets, &PatternSet::new(), false));
        LiveLogWriter::new(client, masker, "key-1", "step one", nudges, config)
    }

    #[tokio::test]
    async fn test_lines_reassemble_across_chunk_boundaries() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        w.write(b"ab");
        w.write(b"c\nde");
        w.write(b"f\n");
        w.close().await.unwrap();

        let uploaded = client.uploaded("key-1");
        let messages: Vec<&str> = uploaded.iter().map(|l| l.out.as_str()).collect();
        assert_eq!(messages, vec!["abc", "def"]);
    }

    #[tokio::test]
    async fn test_multi_newline_block_yields_multiple_lines() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        w.write(b"one\ntwo\nthree\n");
        w.close().await.unwrap();

        let uploaded = client.uploaded("key-1");
        assert_eq!(uploaded.len(), 3);
        let positions: Vec<u64> = uploaded.iter().map(|l| l.pos).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_write_reports_input_length_despite_masking() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(
            Arc::clone(&client),
            &["secret123"],
            vec![],
            WriterConfig::default(),
        );

        let n = w.write(b"password: secret123");
        assert_eq!(n, 19);
        w.close().await.unwrap();

        let uploaded = client.uploaded("key-1");
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].out, "password: **************");
    }

    #[tokio::test]
    async fn test_residual_flushes_as_final_line_on_close() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        w.write(b"no trailing newline");
        assert_eq!(w.history_len(), 0);
        w.close().await.unwrap();

        let uploaded = client.uploaded("key-1");
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].out, "no trailing newline");
    }

    #[tokio::test]
    async fn test_ring_trim_drops_oldest_and_respects_bound() {
        let client = Arc::new(RecordingClient::new());
        let config = WriterConfig {
            limit_bytes: 600,
            ..Default::default()
        };
        let w = writer_with(Arc::clone(&client), &[], vec![], config);

        for i in 0..50 {
            w.write(format!("line number {i:03}\n").as_bytes());
        }

        let last_line_bytes = {
            let line = RemoteLine::info(49, "line number 049", chrono::Utc::now(), 0.0);
            line.encoded_len()
        };
        assert!(w.history_bytes() <= 600 + last_line_bytes);

        w.close().await.unwrap();
        let uploaded = client.uploaded("key-1");
        // Newest lines survive; oldest were trimmed.
        assert_eq!(uploaded.last().unwrap().out, "line number 049");
        assert_ne!(uploaded.first().unwrap().out, "line number 000");
    }

    #[tokio::test]
    async fn test_ordinals_strictly_increase() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        for _ in 0..20 {
            w.write(b"tick\n");
        }
        w.close().await.unwrap();

        let uploaded = client.uploaded("key-1");
        for pair in uploaded.windows(2) {
            assert!(pair[0].pos < pair[1].pos);
        }
    }

    #[tokio::test]
    async fn test_nudge_appends_formatted_error_on_close() {
        let client = Arc::new(RecordingClient::new());
        let nudges = vec![Nudge::new(
            "[Kk]illed",
            "increase memory",
            "possible oom",
        )];
        let w = writer_with(Arc::clone(&client), &[], nudges, WriterConfig::default());

        w.write(b"compiling\nprocess Killed\n");
        w.close().await.unwrap();

        let errors = w.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("process Killed"));
        assert!(errors[0].contains("increase memory"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        w.write(b"once\n");
        w.close().await.unwrap();
        w.close().await.unwrap();

        assert_eq!(client.upload_count("key-1"), 1);
        assert_eq!(client.close_count("key-1"), 1);
    }

    #[tokio::test]
    async fn test_close_runs_after_failed_open() {
        let client = Arc::new(RecordingClient::new());
        client.fail_open();
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        assert!(w.open().await.is_err());
        w.write(b"still recorded\n");
        w.close().await.unwrap();

        assert!(w.errors().iter().any(|e| e.contains("failed to open")));
        let uploaded = client.uploaded("key-1");
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].out, "still recorded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flusher_ships_pending_batch_after_interval() {
        let client = Arc::new(RecordingClient::new());
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());
        w.open().await.unwrap();

        w.write(b"live line\n");
        // Let the flusher pick up the ready signal and run its timer.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let written = client.written("key-1");
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].out, "live line");
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_error_surfaces_from_close() {
        let client = Arc::new(RecordingClient::new());
        client.fail_upload();
        let w = writer_with(Arc::clone(&client), &[], vec![], WriterConfig::default());

        w.write(b"data\n");
        assert!(w.close().await.is_err());
        // Close was still attempted upstream.
        assert_eq!(client.close_count("key-1"), 1);
    }
}

//! # Command Channel
//!
//! Request/response plumbing on top of the serial link. A command is written
//! with a CR LF terminator, then the receive buffer is polled every
//! [`POLL_INTERVAL_MS`] until a marker shows up or the deadline passes.
//!
//! Each poll re-scans the whole unconsumed history, so a marker that arrived
//! split across polls, or that straddles the ring's wrap point, is still
//! found. On success everything up to and including the marker is consumed,
//! except inbound publish frames, which stay for the demultiplexer. On
//! timeout the buffer is left untouched and the caller decides whether to
//! retry.
//!
//! Waiting blocks the foreground for up to the timeout. There is no way to
//! abort a wait early; the deadline is the only bound. Commands are strictly
//! sequential because the modem protocol has no request identifiers.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use heapless::String;

use crate::command::Command;
use crate::demux::{self, FRAME_MARKER, Scan};
use crate::error::{ArgumentError, MqttError};
use crate::ring::{RxBuffer, Snapshot};
use crate::transport::ModemTransport;
use crate::util;

/// Interval between receive buffer polls.
pub const POLL_INTERVAL_MS: u32 = 10;

/// Longest status line returned by [`CommandChannel::await_line`].
pub const MAX_LINE_LEN: usize = 128;

const TERMINATOR: &[u8] = b"\r\n";

/// Sends commands and waits for their answers.
///
/// Elapsed time is accounted from the sleeps the channel takes, which makes
/// a simulated `DelayNs` a simulated clock.
pub struct CommandChannel<'b, T, D, const N: usize> {
    transport: T,
    rx: &'b RxBuffer<N>,
    delay: D,
    slept_ms: u64,
}

impl<'b, T, D, const N: usize> CommandChannel<'b, T, D, N>
where
    T: ModemTransport,
    D: DelayNs,
{
    pub fn new(transport: T, rx: &'b RxBuffer<N>, delay: D) -> Self {
        Self {
            transport,
            rx,
            delay,
            slept_ms: 0,
        }
    }

    /// The receive buffer this channel reads from.
    pub fn rx(&self) -> &'b RxBuffer<N> {
        self.rx
    }

    /// Total time spent sleeping in this channel.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.slept_ms)
    }

    /// Writes `text` followed by CR LF.
    pub async fn send(&mut self, text: &str) -> Result<(), MqttError<T::Error>> {
        self.transport.send(text.as_bytes()).await?;
        self.transport.send(TERMINATOR).await?;
        Ok(())
    }

    /// Validates, encodes and sends `command`.
    ///
    /// Nothing is transmitted if an argument is rejected.
    pub async fn send_command(&mut self, command: &Command<'_>) -> Result<(), MqttError<T::Error>> {
        let line = command.encode().map_err(MqttError::InvalidArgument)?;
        self.log_command(command, &line);
        self.send(&line).await
    }

    fn log_command(&self, command: &Command<'_>, line: &str) {
        if command.is_sensitive() {
            let _head = line.split('=').next().unwrap_or("");
            debug!("AT> {}=<redacted>", _head);
        } else {
            debug!("AT> {}", line);
        }
    }

    /// Writes bytes as-is, without a terminator.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), MqttError<T::Error>> {
        trace!("raw> {} bytes", bytes.len());
        self.transport.send(bytes).await?;
        Ok(())
    }

    /// Drops leftover responses to earlier commands (a trailing `OK` after
    /// `+MQTTCONNECTED`, say) so they cannot satisfy the next wait.
    ///
    /// Stops at the first inbound publish notification; it and everything
    /// after it is left for the demultiplexer. A notification whose marker
    /// has only partly arrived is kept as well.
    pub fn discard_stale(&mut self) {
        let snapshot = self.rx.snapshot();
        let end = match util::find(&snapshot, FRAME_MARKER) {
            Some(frame) => frame,
            None => snapshot.len() - partial_marker_len(&snapshot),
        };
        if end > 0 {
            self.rx.release(&snapshot, end);
        }
    }

    /// Discards stale responses, sends `command` and waits for `marker`.
    pub async fn command(
        &mut self,
        command: &Command<'_>,
        marker: &str,
        timeout: Duration,
    ) -> Result<(), MqttError<T::Error>> {
        let line = command.encode().map_err(MqttError::InvalidArgument)?;
        self.discard_stale();
        self.log_command(command, &line);
        self.send(&line).await?;
        self.await_marker(marker, timeout).await
    }

    /// Discards stale responses, sends `command` and returns the line that
    /// starts with `prefix`.
    pub async fn query(
        &mut self,
        command: &Command<'_>,
        prefix: &str,
        timeout: Duration,
    ) -> Result<String<MAX_LINE_LEN>, MqttError<T::Error>> {
        let line = command.encode().map_err(MqttError::InvalidArgument)?;
        self.discard_stale();
        self.log_command(command, &line);
        self.send(&line).await?;
        self.await_line(prefix, timeout).await
    }

    /// Polls until `marker` appears in the received bytes.
    ///
    /// Returns `Ok(())` once found, having consumed everything through the
    /// marker. Returns [`MqttError::Timeout`] if `timeout` elapses first,
    /// with the buffer untouched. An empty marker is a caller error.
    pub async fn await_marker(
        &mut self,
        marker: &str,
        timeout: Duration,
    ) -> Result<(), MqttError<T::Error>> {
        if marker.is_empty() {
            return Err(MqttError::InvalidArgument(ArgumentError::EmptyMarker));
        }
        let budget = timeout.as_millis();
        let mut waited: u64 = 0;
        loop {
            let snapshot = self.rx.snapshot();
            if let Some(hit) = find_response(&snapshot, marker.as_bytes()) {
                self.take_response(&snapshot, hit.frames_end, hit.at + marker.len());
                trace!("matched {} after {} ms", marker, waited);
                return Ok(());
            }
            if waited >= budget {
                debug!("no {} within {} ms", marker, budget);
                return Err(MqttError::Timeout);
            }
            self.sleep_ms(POLL_INTERVAL_MS).await;
            waited += u64::from(POLL_INTERVAL_MS);
        }
    }

    /// Polls until a complete line starting with `prefix` has arrived and
    /// returns the text between the prefix and the line break.
    ///
    /// Consumes through the end of that line. Times out like
    /// [`await_marker`](Self::await_marker).
    pub async fn await_line(
        &mut self,
        prefix: &str,
        timeout: Duration,
    ) -> Result<String<MAX_LINE_LEN>, MqttError<T::Error>> {
        if prefix.is_empty() {
            return Err(MqttError::InvalidArgument(ArgumentError::EmptyMarker));
        }
        let budget = timeout.as_millis();
        let mut waited: u64 = 0;
        loop {
            let snapshot = self.rx.snapshot();
            if let Some(hit) = find_response(&snapshot, prefix.as_bytes()) {
                let body = hit.at + prefix.len();
                if let Some(eol) = util::find_from(&snapshot, b"\n", body) {
                    self.take_response(&snapshot, hit.frames_end, eol + 1);
                    let raw = snapshot[body..eol].trim_ascii_end();
                    let text = core::str::from_utf8(raw).map_err(|_| MqttError::MalformedFrame)?;
                    let mut line = String::new();
                    line.push_str(text).map_err(|_| MqttError::MalformedFrame)?;
                    return Ok(line);
                }
            }
            if waited >= budget {
                debug!("no {} line within {} ms", prefix, budget);
                return Err(MqttError::Timeout);
            }
            self.sleep_ms(POLL_INTERVAL_MS).await;
            waited += u64::from(POLL_INTERVAL_MS);
        }
    }

    /// Consumes a matched response and everything before it, except the
    /// inbound frames ending at `frames_end`.
    fn take_response(&self, snapshot: &Snapshot<N>, frames_end: usize, end: usize) {
        match util::find(&snapshot[..frames_end], FRAME_MARKER) {
            None => {
                self.rx.release(snapshot, end);
            }
            Some(first_frame) => {
                self.rx.excise(snapshot, frames_end..end);
                self.rx.release(snapshot, first_frame);
            }
        }
    }

    /// Sleeps for `duration`, counted towards [`elapsed`](Self::elapsed).
    pub async fn pause(&mut self, duration: Duration) {
        let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        self.sleep_ms(ms).await;
    }

    async fn sleep_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
        self.slept_ms += u64::from(ms);
    }
}

struct Hit {
    /// Offset of the match.
    at: usize,
    /// End of the last inbound frame in front of the match, or 0.
    frames_end: usize,
}

/// Finds `needle` outside of any inbound publish frame, so a payload that
/// happens to contain `OK` cannot answer a command.
///
/// Returns `None` while a frame in front of the match is still arriving.
fn find_response(data: &[u8], needle: &[u8]) -> Option<Hit> {
    let mut from = 0;
    loop {
        let at = util::find_from(data, needle, from)?;
        let frame = match util::find_from(data, FRAME_MARKER, from) {
            Some(frame) if frame < at => frame,
            _ => return Some(Hit { at, frames_end: from }),
        };
        let span_end = match demux::scan(&data[frame..]) {
            Scan::Frame { span, .. } | Scan::Truncated { span, .. } | Scan::Malformed { span } => {
                span.end
            }
            Scan::Empty | Scan::Pending => return None,
        };
        from = frame + span_end.max(1);
    }
}

/// Length of the longest tail of `data` that could grow into a frame marker.
fn partial_marker_len(data: &[u8]) -> usize {
    (1..FRAME_MARKER.len())
        .rev()
        .find(|&len| data.ends_with(&FRAME_MARKER[..len]))
        .unwrap_or(0)
}

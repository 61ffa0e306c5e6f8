//! Stop-and-wait framed session over a byte transport
//!
//! One command is in flight at a time. The session owns the sequence
//! counter, retransmits on NAK or bad replies, honours the printer's
//! "busy" bytes and only advances the sequence once a reply carrying the
//! request's sequence number has been accepted.

use super::{FiscalLink, Reply};
use crate::error::{PrintError, PrintResult};
use crate::protocol::frame::{self, ACK, DC2, DC4, ETX, Frame, NAK, STX};
use crate::protocol::sequence::SequenceCounter;
use crate::protocol::status::{self, StatusTable};
use crate::transport::Transport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Timing and retry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Silence tolerated before a reply starts
    pub wait_time: Duration,
    /// Bad or stale replies tolerated per command
    pub retries: u32,
    /// Single byte read window inside a reply
    pub wait_char_time: Duration,
    /// Empty byte reads tolerated inside a reply
    pub no_reply_tries: u32,
    /// NAKs tolerated while waiting for ACK
    pub max_naks: u32,
    /// Upper bound on a reply frame
    pub max_frame_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(10),
            retries: 4,
            wait_char_time: Duration::from_millis(100),
            no_reply_tries: 200,
            max_naks: 10,
            max_frame_len: 4096,
        }
    }
}

/// Protocol dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkVariant {
    /// Contiguous sequence, no ACK handshake
    Epson,
    /// Even sequence, frames acknowledged in both directions
    Hasar,
}

impl LinkVariant {
    fn sequence(&self) -> SequenceCounter {
        match self {
            LinkVariant::Epson => SequenceCounter::contiguous(),
            LinkVariant::Hasar => SequenceCounter::even(),
        }
    }

    pub fn status_table(&self) -> &'static StatusTable {
        match self {
            LinkVariant::Epson => &status::EPSON,
            LinkVariant::Hasar => &status::HASAR,
        }
    }

    fn acknowledges(&self) -> bool {
        matches!(self, LinkVariant::Hasar)
    }
}

#[derive(Debug)]
pub struct LinkSession {
    transport: Box<dyn Transport>,
    variant: LinkVariant,
    sequence: SequenceCounter,
    config: LinkConfig,
}

impl LinkSession {
    pub fn new(transport: Box<dyn Transport>, variant: LinkVariant) -> Self {
        Self {
            transport,
            sequence: variant.sequence(),
            variant,
            config: LinkConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceCounter) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn variant(&self) -> LinkVariant {
        self.variant
    }

    /// Sequence number the next command will carry
    pub fn sequence(&self) -> u8 {
        self.sequence.current()
    }

    async fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        trace!(target: "fiscal_printer::wire", "-> {}", frame::hex(bytes));
        self.transport.write_all(bytes).await
    }

    /// Read one byte with at most `wait`, never past `deadline`
    async fn read_until(&mut self, deadline: Instant) -> PrintResult<Option<u8>> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        self.transport.read_byte(deadline - now).await
    }

    /// Write `request` and wait for the printer's ACK, resending on NAK
    async fn send_and_wait_ack(&mut self, request: &[u8]) -> PrintResult<()> {
        self.write(request).await?;
        let mut deadline = Instant::now() + self.config.wait_time;
        let mut naks = 0;

        loop {
            match self.read_until(deadline).await? {
                Some(ACK) => return Ok(()),
                Some(NAK) => {
                    naks += 1;
                    if naks > self.config.max_naks {
                        return Err(PrintError::TooManyNaks);
                    }
                    debug!(naks, "Printer rejected the frame, resending");
                    self.write(request).await?;
                    deadline = Instant::now() + self.config.wait_time;
                }
                Some(other) => trace!("ignoring 0x{:02x} while waiting for ACK", other),
                None if Instant::now() >= deadline => return Err(PrintError::Timeout),
                None => {}
            }
        }
    }

    /// Collect a reply after its STX through the four checksum digits
    async fn read_frame(&mut self) -> PrintResult<Frame> {
        let mut buf = vec![STX];
        let mut empty_reads = 0;
        let mut checksum_left: Option<usize> = None;

        while checksum_left != Some(0) {
            let Some(b) = self.transport.read_byte(self.config.wait_char_time).await? else {
                empty_reads += 1;
                if empty_reads > self.config.no_reply_tries {
                    return Err(PrintError::ReplyInterrupted);
                }
                continue;
            };
            // the limit is on consecutive gaps
            empty_reads = 0;
            buf.push(b);
            if buf.len() > self.config.max_frame_len {
                return Err(PrintError::TruncatedFrame);
            }
            checksum_left = match checksum_left {
                Some(n) => Some(n - 1),
                None if b == ETX => Some(4),
                None => None,
            };
        }

        trace!(target: "fiscal_printer::wire", "<- {}", frame::hex(&buf));
        frame::decode(&buf)
    }

    fn count_retry(&self, retries: &mut u32) -> PrintResult<()> {
        *retries += 1;
        if *retries >= self.config.retries {
            return Err(PrintError::TooManyRetries);
        }
        Ok(())
    }

    async fn exchange(&mut self, request: &[u8]) -> PrintResult<Frame> {
        let expected = self.sequence.current();
        if self.variant.acknowledges() {
            self.send_and_wait_ack(request).await?;
        } else {
            self.write(request).await?;
        }

        let mut deadline = Instant::now() + self.config.wait_time;
        let mut retries = 0;

        loop {
            let byte = match self.read_until(deadline).await? {
                Some(b) => b,
                None if Instant::now() >= deadline => return Err(PrintError::Timeout),
                None => continue,
            };

            match byte {
                DC2 | DC4 => {
                    trace!("printer busy, extending wait");
                    deadline += self.config.wait_time;
                }
                NAK if !self.variant.acknowledges() => {
                    self.count_retry(&mut retries)?;
                    debug!(retries, "NAK received, resending");
                    self.write(request).await?;
                    deadline = Instant::now() + self.config.wait_time;
                }
                STX => match self.read_frame().await {
                    Ok(reply) if reply.sequence == expected => {
                        if self.variant.acknowledges() {
                            self.write(&[ACK]).await?;
                        }
                        return Ok(reply);
                    }
                    Ok(reply) => {
                        warn!(
                            expected = format_args!("0x{:02x}", expected),
                            received = format_args!("0x{:02x}", reply.sequence),
                            "Stale reply discarded"
                        );
                        self.count_retry(&mut retries)?;
                        if self.variant.acknowledges() {
                            self.write(&[ACK]).await?;
                        } else {
                            self.write(request).await?;
                        }
                        deadline = Instant::now() + self.config.wait_time;
                    }
                    Err(
                        e @ (PrintError::BadChecksum
                        | PrintError::TruncatedFrame
                        | PrintError::MalformedReply(_)),
                    ) => {
                        debug!(error = %e, retries, "Bad reply");
                        self.count_retry(&mut retries)?;
                        self.write(&[NAK]).await?;
                        deadline = Instant::now() + self.config.wait_time;
                    }
                    Err(e) => return Err(e),
                },
                other => trace!("ignoring 0x{:02x}", other),
            }
        }
    }
}

#[async_trait]
impl FiscalLink for LinkSession {
    async fn send_command(
        &mut self,
        command: u8,
        fields: &[String],
        skip_status: bool,
    ) -> PrintResult<Reply> {
        if let Err(e) = self.transport.open().await {
            warn!(target = %self.transport.describe(), error = %e, "Failed to open printer link");
            return Err(e);
        }

        let request = frame::encode(self.sequence.current(), command, fields);
        debug!(
            command = format_args!("0x{:02x}", command),
            seq = format_args!("0x{:02x}", self.sequence.current()),
            fields = fields.len(),
            "Sending command"
        );

        let reply = match self.exchange(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, PrintError::Connection(_) | PrintError::Io(_)) {
                    self.transport.close().await;
                }
                return Err(e);
            }
        };
        self.sequence.advance();

        let mut reply = Reply::new(reply.fields);
        if !skip_status {
            reply.check(self.variant.status_table())?;
        }
        Ok(reply)
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AutoReply, MockTransport};

    fn session(mock: &MockTransport, variant: LinkVariant, seq: u8) -> LinkSession {
        let step = if variant == LinkVariant::Hasar { 2 } else { 1 };
        LinkSession::new(Box::new(mock.clone()), variant)
            .with_sequence(SequenceCounter::starting_at(seq, step))
    }

    #[tokio::test(start_paused = true)]
    async fn test_epson_exchange_advances_sequence() {
        let mock = MockTransport::auto(AutoReply::new());
        let mut link = session(&mock, LinkVariant::Epson, 0x7F);

        let reply = link.send_command(0x2a, &["N".into()], true).await.unwrap();
        assert_eq!(reply.field(2), Some("1"));
        assert_eq!(link.sequence(), 0x20);
        assert!(mock.control_bytes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hasar_acknowledges_reply() {
        let mock = MockTransport::auto(AutoReply::new().with_ack());
        let mut link = session(&mock, LinkVariant::Hasar, 0x40);

        link.send_command(0x2a, &[], false).await.unwrap();
        assert_eq!(mock.control_bytes(), vec![ACK]);
        assert_eq!(link.sequence(), 0x42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_bytes_extend_wait() {
        let mock = MockTransport::new();
        mock.reply_on_write(vec![DC2]);
        let mut link = session(&mock, LinkVariant::Epson, 0x20);

        let task = tokio::spawn(async move {
            let result = link.send_command(0x2a, &[], true).await;
            (result, link)
        });
        // reply lands after the first window would have expired
        tokio::time::sleep(Duration::from_secs(15)).await;
        mock.push_bytes(&frame::encode(0x20, 0x2a, &["0000", "0000"]));

        let (result, _) = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out_without_advancing() {
        let mock = MockTransport::new();
        let mut link = session(&mock, LinkVariant::Epson, 0x30);
        let started = Instant::now();

        let err = link.send_command(0x2a, &[], true).await.unwrap_err();
        assert!(matches!(err, PrintError::Timeout));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(link.sequence(), 0x30);
    }
}

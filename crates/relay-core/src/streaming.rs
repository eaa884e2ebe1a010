//! Human-paced delivery of a finished reply.
//!
//! The model answers in one piece; this module replays it the way a person would
//! type it:
//! - short replies: typing indicator, a pause, one bubble
//! - longer replies: one bubble per sentence-like segment, each preceded by typing
//! - edit mode: one placeholder bubble that is rewritten with a growing prefix
//!
//! Pauses use `tokio::time::sleep`, so only the current update's task waits.

use std::{str::FromStr, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

/// Text of the edit-mode placeholder bubble (Telegram rejects empty messages).
pub const EDIT_PLACEHOLDER: &str = "…";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One bubble for short replies, one per sentence otherwise.
    Bubbles,
    /// A single bubble edited in fixed-size increments.
    Edit,
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bubbles" | "bubble" => Ok(DeliveryMode::Bubbles),
            "edit" | "edits" => Ok(DeliveryMode::Edit),
            other => Err(Error::Config(format!(
                "unknown delivery mode {other:?} (expected \"bubbles\" or \"edit\")"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Replies up to this many characters (and without a paragraph break) go out as one bubble.
    pub short_threshold: usize,
    /// Simulated typing speed used to size the pause before a bubble.
    pub chars_per_sec: f64,
    /// Upper bound for any single typing pause.
    pub max_typing_delay: Duration,
    /// A terminator only ends a segment once the segment is longer than this.
    pub min_segment_len: usize,
    /// Characters appended per edit in edit mode.
    pub edit_chunk_chars: usize,
    /// Pause between consecutive edits.
    pub edit_interval: Duration,
    /// Longest bubble the messenger accepts; longer segments are split.
    pub max_message_len: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            short_threshold: 80,
            chars_per_sec: 20.0,
            max_typing_delay: Duration::from_millis(1500),
            min_segment_len: 3,
            edit_chunk_chars: 20,
            edit_interval: Duration::from_millis(250),
            max_message_len: 3500,
        }
    }
}

/// What happened during one delivery.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub messages_sent: usize,
    pub edits: usize,
    /// One `Error::DeliveryChunkFailed` per failed call, in order.
    pub failures: Vec<Error>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, chat_id: ChatId, index: usize, call: &str, err: Error) {
        warn!(chat_id = chat_id.0, index, call, error = %err, "delivery chunk failed");
        self.failures.push(Error::DeliveryChunkFailed {
            index,
            reason: format!("{call}: {err}"),
        });
    }
}

#[derive(Clone, Debug, Default)]
pub struct StreamingDelivery {
    cfg: DeliveryConfig,
}

impl StreamingDelivery {
    pub fn new(cfg: DeliveryConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.cfg
    }

    /// Deliver `text` to `chat_id` through `sink`.
    ///
    /// Individual failures are logged and collected in the report. The only hard
    /// failure is `DeliveryInitFailed`, when the edit-mode placeholder cannot be sent.
    pub async fn deliver(
        &self,
        sink: &dyn MessagingPort,
        chat_id: ChatId,
        text: &str,
        mode: DeliveryMode,
    ) -> Result<DeliveryReport> {
        self.deliver_reply(sink, chat_id, None, text, mode).await
    }

    /// Like [`deliver`](Self::deliver), with the first bubble threaded under `reply_to`.
    pub async fn deliver_reply(
        &self,
        sink: &dyn MessagingPort,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
        mode: DeliveryMode,
    ) -> Result<DeliveryReport> {
        if text.trim().is_empty() {
            debug!(chat_id = chat_id.0, "nothing to deliver");
            return Ok(DeliveryReport::default());
        }

        let out = Outbox {
            sink,
            chat_id,
            reply_to,
            typing: sink.capabilities().supports_chat_actions,
        };

        match mode {
            DeliveryMode::Bubbles => Ok(self.deliver_bubbles(&out, text).await),
            DeliveryMode::Edit => {
                if !sink.capabilities().supports_edit {
                    debug!(chat_id = chat_id.0, "messenger cannot edit; using bubbles");
                    return Ok(self.deliver_bubbles(&out, text).await);
                }
                let limit = self.max_message_len(sink);
                if text.chars().count() > limit {
                    debug!(
                        chat_id = chat_id.0,
                        limit, "reply too long for a single edited bubble; using bubbles"
                    );
                    return Ok(self.deliver_bubbles(&out, text).await);
                }
                self.deliver_edits(&out, text).await
            }
        }
    }

    /// Pause before a bubble of `chars` characters: `min(chars / speed, cap)`.
    pub fn typing_delay(&self, chars: usize) -> Duration {
        if self.cfg.chars_per_sec <= 0.0 {
            return self.cfg.max_typing_delay;
        }
        let secs = chars as f64 / self.cfg.chars_per_sec;
        Duration::from_secs_f64(secs).min(self.cfg.max_typing_delay)
    }

    /// Bubbles `deliver_bubbles` would send for `text`, in order.
    pub fn plan_bubbles(&self, text: &str, max_message_len: usize) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut segments = if is_single_bubble(trimmed, self.cfg.short_threshold) {
            vec![trimmed.to_string()]
        } else {
            segment_sentences(trimmed, self.cfg.min_segment_len)
        };
        if segments.is_empty() {
            segments.push(trimmed.to_string());
        }

        segments
            .iter()
            .flat_map(|s| split_text(s, max_message_len))
            .collect()
    }

    fn max_message_len(&self, sink: &dyn MessagingPort) -> usize {
        self.cfg
            .max_message_len
            .min(sink.capabilities().max_message_len)
            .max(1)
    }

    async fn deliver_bubbles(&self, out: &Outbox<'_>, text: &str) -> DeliveryReport {
        let chat_id = out.chat_id;
        let mut report = DeliveryReport::default();
        let bubbles = self.plan_bubbles(text, self.max_message_len(out.sink));
        debug!(chat_id = chat_id.0, bubbles = bubbles.len(), "delivering bubbles");

        for (index, bubble) in bubbles.iter().enumerate() {
            if let Err(e) = out.typing().await {
                report.record_failure(chat_id, index, "typing", e);
            }
            sleep(self.typing_delay(bubble.chars().count())).await;

            match out.send(index == 0, bubble).await {
                Ok(_) => report.messages_sent += 1,
                Err(e) => report.record_failure(chat_id, index, "send", e),
            }
        }

        report
    }

    async fn deliver_edits(&self, out: &Outbox<'_>, text: &str) -> Result<DeliveryReport> {
        let (sink, chat_id) = (out.sink, out.chat_id);
        let mut report = DeliveryReport::default();

        if let Err(e) = out.typing().await {
            report.record_failure(chat_id, 0, "typing", e);
        }

        let placeholder = out
            .send(true, EDIT_PLACEHOLDER)
            .await
            .map_err(|e| Error::DeliveryInitFailed(e.to_string()))?;
        report.messages_sent += 1;

        let slices = edit_slices(text, self.cfg.edit_chunk_chars);
        debug!(chat_id = chat_id.0, edits = slices.len(), "delivering edits");

        let mut shown = String::with_capacity(text.len());
        let mut last_ok = true;
        for (index, slice) in slices.iter().enumerate() {
            shown.push_str(slice);
            sleep(self.cfg.edit_interval).await;

            match sink.edit_text(placeholder, &shown).await {
                Ok(()) => {
                    report.edits += 1;
                    last_ok = true;
                }
                Err(e) => {
                    report.record_failure(chat_id, index, "edit", e);
                    last_ok = false;
                }
            }
        }

        // The bubble must end up holding the whole reply.
        if !last_ok {
            sleep(self.cfg.edit_interval).await;
            match sink.edit_text(placeholder, text).await {
                Ok(()) => report.edits += 1,
                Err(e) => report.record_failure(chat_id, slices.len(), "final edit", e),
            }
        }

        Ok(report)
    }
}

/// One delivery's destination: the sink, the chat and what the sink supports.
struct Outbox<'a> {
    sink: &'a dyn MessagingPort,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    typing: bool,
}

impl Outbox<'_> {
    async fn typing(&self) -> Result<()> {
        if !self.typing {
            return Ok(());
        }
        self.sink.show_typing(self.chat_id).await
    }

    async fn send(&self, first: bool, text: &str) -> Result<MessageRef> {
        match self.reply_to {
            Some(reply_to) if first => self.sink.send_reply(self.chat_id, reply_to, text).await,
            _ => self.sink.send_text(self.chat_id, text).await,
        }
    }
}

/// Short and without a paragraph break.
pub fn is_single_bubble(text: &str, short_threshold: usize) -> bool {
    text.chars().count() <= short_threshold && !text.trim().contains("\n\n")
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

fn is_closer(ch: char) -> bool {
    matches!(ch, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
}

/// Split `text` into sentence-like segments.
///
/// A segment ends at `.`, `!` or `?` once it holds more than `min_len`
/// characters, swallowing any run of further terminators or closing quotes, and
/// only when followed by whitespace or the end of the text (so `3.14` stays
/// whole). Segments are trimmed; empty ones are dropped.
pub fn segment_sentences(text: &str, min_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        buf.push(ch);
        if !is_terminator(ch) || buf.trim().chars().count() <= min_len {
            continue;
        }

        while let Some(&next) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                buf.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if chars.peek().map_or(true, |c| c.is_whitespace()) {
            flush_segment(&mut out, &mut buf);
        }
    }
    flush_segment(&mut out, &mut buf);

    out
}

fn flush_segment(out: &mut Vec<String>, buf: &mut String) {
    let seg = buf.trim();
    if !seg.is_empty() {
        out.push(seg.to_string());
    }
    buf.clear();
}

/// Consecutive slices of `chunk_chars` characters (the last one may be shorter).
pub fn edit_slices(text: &str, chunk_chars: usize) -> Vec<&str> {
    let chunk = chunk_chars.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == chunk {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Hard split into pieces of at most `max_len` characters.
pub fn split_text(s: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0;

    for ch in s.chars() {
        if cur_len >= max_len {
            out.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        cur.push(ch);
        cur_len += 1;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

//! Incremental `text/event-stream` decoding.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the stream did not set one.
    pub event: String,
    pub data: String,
}

/// Splits a byte stream into events. Chunks may end mid-line.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = self.buffer[search_index..].iter().position(|b| *b == b'\n')
        {
            let newline_index = search_index + relative_pos;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }

            let line = String::from_utf8_lossy(&self.buffer[search_index..line_end]).into_owned();
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }

            search_index = newline_index + 1;
        }

        if search_index > 0 {
            self.buffer.drain(..search_index);
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        if !rest.trim().is_empty() {
            self.feed_line(rest.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(f, v)| (f, v.strip_prefix(' ').unwrap_or(v)));
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` do not matter for request/response routing.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_partial_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: one").is_empty());
        let events = decoder.push(b"\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "message".to_string(),
                data: "one".to_string()
            }]
        );
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_reads_named_events_and_multiline_data() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"event: endpoint\r\ndata: /messages?session=1\r\n\r\n: ping\n\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "endpoint");
        assert_eq!(events[0].data, "/messages?session=1");
        assert_eq!(events[1].data, "a\nb");
    }

    #[test]
    fn test_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"id\":1}").is_empty());
        assert_eq!(decoder.finish().unwrap().data, "{\"id\":1}");
    }

    #[test]
    fn test_detects_event_stream_content_type() {
        assert!(is_event_stream_content_type(
            "text/event-stream; charset=utf-8"
        ));
        assert!(!is_event_stream_content_type("application/json"));
    }
}

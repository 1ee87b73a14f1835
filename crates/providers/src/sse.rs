//! SSE plumbing for streaming chat completions.
//!
//! Buffers incoming chunks, splits on `\n\n`, and extracts `data:` payloads.
//! The adapter feeds each payload to a parser that yields text chunks.

use cq_domain::error::{Error, Result};
use cq_domain::stream::BoxStream;

/// Extract complete `data:` payloads from an SSE buffer.
///
/// Consumed bytes are drained in place; a trailing partial event stays in
/// the buffer for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a text-chunk stream from an SSE response.
///
/// `parse_data` maps one `data:` payload to an optional text chunk;
/// returning `None` skips the payload. The `[DONE]` sentinel ends the
/// stream.
pub(crate) fn text_chunk_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<String>>
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        'outer: loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if data == "[DONE]" {
                            break 'outer;
                        }
                        if let Some(chunk) = parse_data(&data) {
                            yield Ok(chunk);
                        }
                    }
                }
                Ok(None) => {
                    // Body closed; flush any trailing partial event.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            if data == "[DONE]" {
                                break;
                            }
                            if let Some(chunk) = parse_data(&data) {
                                yield Ok(chunk);
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::Transient(format!("stream read: {e}")));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

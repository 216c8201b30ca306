#![no_main]
use helpdesk_gateway::providers::stream::{LineBuffer, StreamAccumulator};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes split at an arbitrary point must never panic the parser.
    let split = data.first().map_or(0, |b| usize::from(*b)).min(data.len());
    let mut lines = LineBuffer::default();
    let mut acc = StreamAccumulator::new();
    for chunk in [&data[..split], &data[split..]] {
        for line in lines.push(chunk) {
            acc.push_line(&line);
        }
    }
    if let Some(tail) = lines.finish() {
        acc.push_line(&tail);
    }
    let _ = acc.into_text();

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = helpdesk_gateway::providers::stream::extract_content(&value);
    }
});

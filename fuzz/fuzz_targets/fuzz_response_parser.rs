#![no_main]

use libfuzzer_sys::fuzz_target;

use barrage::http::ResponseParser;

// Feeds arbitrary bytes to the incremental response parser in two chunks, the way a socket read
// loop would, to catch panics on truncated status lines, header splits mid-name, and the
// double-CRLF scan running off a chunk boundary.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = data.len() / 2;
    let mut parser = ResponseParser::new();
    let _ = parser.feed(&data[..split]);
    if let Ok(true) = parser.feed(&data[split..]) {
        let _ = parser.finish(&[]);
    }
});

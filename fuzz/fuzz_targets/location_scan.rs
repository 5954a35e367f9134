#![no_main]

use errsight_analyzer::context::location::scan;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        for location in scan(text) {
            assert!(location.line > 0);
            assert!(!location.path.is_empty());
        }
    }
});

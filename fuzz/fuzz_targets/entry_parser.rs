#![no_main]

use errsight_analyzer::EntryParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);
    let entries = EntryParser::with_defaults().parse(&input);

    // 순번은 0부터 연속, 시작 줄은 증가
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.index, i);
    }
    for pair in entries.windows(2) {
        assert!(pair[0].line < pair[1].line);
    }
});

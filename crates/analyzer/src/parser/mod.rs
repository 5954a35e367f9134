//! 엔트리 파서 -- 비정형 로그 텍스트를 [`LogEntry`] 목록으로 분할합니다.
//!
//! [`EntryParser`]는 줄 단위로 입력을 훑으며 등록된 헤더 형식과 JSON 라인 파서로
//! 새 엔트리의 시작을 판별합니다. 헤더가 아닌 줄은 직전 엔트리에 이어 붙습니다.
//!
//! # 이어지는 줄 처리
//! - 스택 줄(`Traceback`, `  File "`, `at `, `Caused by:`, 들여쓴 프레임, `...`)이 한 번
//!   나타나면 그 줄과 이후의 모든 이어지는 줄은 스택 블록으로 들어갑니다.
//! - 그 전까지의 줄은 메시지에 덧붙습니다.
//! - 첫 헤더 이전의 줄은 UNKNOWN 레벨의 선행 엔트리가 됩니다.
//!
//! # 사용 예시
//! ```
//! use errsight_analyzer::parser::EntryParser;
//!
//! let parser = EntryParser::with_defaults();
//! let entries = parser.parse("2025-01-01 12:00:00 ERROR: Database connection failed");
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].message, "Database connection failed");
//! ```

pub mod header;
pub mod json;

pub use header::{HeaderFormat, HeaderMatch};
pub use json::{JsonFieldMapping, JsonLineParser};

use errsight_core::types::{Level, LogEntry};

/// 엔트리 파서
///
/// 헤더 형식은 등록 순서대로 시도되며, JSON 라인 파서가 있으면 가장 먼저 시도됩니다.
/// 파싱은 실패하지 않습니다. 인식할 수 없는 입력은 UNKNOWN 엔트리가 됩니다.
#[derive(Debug, Clone)]
pub struct EntryParser {
    /// 등록된 헤더 형식 (순서대로 시도)
    formats: Vec<HeaderFormat>,
    /// JSON 라인 파서
    json: Option<JsonLineParser>,
}

impl EntryParser {
    /// 헤더 형식이 없는 빈 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
            json: None,
        }
    }

    /// 기본 헤더 형식과 JSON 라인 파서로 생성합니다.
    pub fn with_defaults() -> Self {
        Self {
            formats: HeaderFormat::defaults(),
            json: Some(JsonLineParser::default()),
        }
    }

    /// 헤더 형식을 등록합니다. 등록 순서대로 시도됩니다.
    pub fn register(mut self, format: HeaderFormat) -> Self {
        self.formats.push(format);
        self
    }

    /// JSON 라인 파서를 설정합니다.
    pub fn json(mut self, parser: JsonLineParser) -> Self {
        self.json = Some(parser);
        self
    }

    /// 등록된 형식 이름 목록을 반환합니다.
    pub fn registered_formats(&self) -> Vec<&str> {
        let mut names = Vec::with_capacity(self.formats.len() + 1);
        if self.json.is_some() {
            names.push("json");
        }
        names.extend(self.formats.iter().map(HeaderFormat::name));
        names
    }

    /// 입력 텍스트를 엔트리 목록으로 분할합니다.
    ///
    /// 입력 순서를 보존하며, 공백뿐인 입력은 빈 목록을 반환합니다.
    pub fn parse(&self, input: &str) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        let mut pending: Option<PendingEntry> = None;

        let lines: Vec<&str> = input.lines().collect();
        for (idx, &line) in lines.iter().enumerate() {
            let line_no = idx + 1;

            if let Some(header) = self.match_header(line) {
                match pending.as_mut() {
                    Some(entry) if opens_frame_block(line, &header, &lines[idx + 1..]) => {
                        entry.push_stack_header(line);
                    }
                    _ => {
                        if let Some(done) = pending.take() {
                            entries.push(done.finish(entries.len()));
                        }
                        pending = Some(PendingEntry::from_header(line_no, line, header));
                    }
                }
                continue;
            }

            match pending.as_mut() {
                Some(entry) => entry.push_continuation(line),
                None if line.trim().is_empty() => {}
                None => {
                    // 첫 헤더 이전의 선행 텍스트
                    let mut preamble = PendingEntry::unknown(line_no);
                    preamble.push_continuation(line);
                    pending = Some(preamble);
                }
            }
        }

        if let Some(done) = pending.take() {
            entries.push(done.finish(entries.len()));
        }

        tracing::trace!(entries = entries.len(), "parsed log input");
        entries
    }

    fn match_header(&self, line: &str) -> Option<HeaderMatch> {
        if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
            return None;
        }
        if let Some(json) = &self.json {
            if let Some(header) = json.match_line(line) {
                return Some(header);
            }
        }
        self.formats
            .iter()
            .find_map(|format| format.match_line(line))
    }
}

impl Default for EntryParser {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// 조립 중인 엔트리
struct PendingEntry {
    line: usize,
    raw: Vec<String>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    level: Level,
    message: Vec<String>,
    stack: Vec<String>,
    in_stack: bool,
}

impl PendingEntry {
    fn from_header(line_no: usize, line: &str, header: HeaderMatch) -> Self {
        let mut stack = Vec::new();
        let in_stack = header.stack.is_some();
        if let Some(block) = header.stack {
            stack.extend(block.lines().map(str::to_owned));
        }
        Self {
            line: line_no,
            raw: vec![line.to_owned()],
            timestamp: header.timestamp,
            level: header.level,
            message: vec![header.message],
            stack,
            in_stack,
        }
    }

    fn unknown(line_no: usize) -> Self {
        Self {
            line: line_no,
            raw: Vec::new(),
            timestamp: None,
            level: Level::Unknown,
            message: Vec::new(),
            stack: Vec::new(),
            in_stack: false,
        }
    }

    fn push_continuation(&mut self, line: &str) {
        self.raw.push(line.to_owned());
        if line.trim().is_empty() {
            return;
        }
        if !self.in_stack && is_stack_line(line) {
            self.in_stack = true;
        }
        if self.in_stack {
            self.stack.push(line.trim_end().to_owned());
        } else {
            self.message.push(line.trim().to_owned());
        }
    }

    /// 프레임 목록을 여는 예외 요약 줄 (`Error: boom`)을 스택 블록의 첫 줄로 붙입니다.
    fn push_stack_header(&mut self, line: &str) {
        self.raw.push(line.to_owned());
        self.in_stack = true;
        self.stack.push(line.trim_end().to_owned());
    }

    fn finish(mut self, index: usize) -> LogEntry {
        while self.raw.last().is_some_and(|l| l.trim().is_empty()) {
            self.raw.pop();
        }

        let mut message = self
            .message
            .iter()
            .filter(|l| !l.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        // 메시지가 없으면 스택의 마지막 줄(예외 요약)을 메시지로 사용
        if message.is_empty() {
            if let Some(last) = self.stack.last() {
                message = last.trim().to_owned();
            }
        }

        let stack = (!self.stack.is_empty()).then(|| self.stack.join("\n"));

        LogEntry {
            index,
            line: self.line,
            raw: self.raw.join("\n"),
            timestamp: self.timestamp,
            level: self.level,
            message,
            stack,
        }
    }
}

/// 타임스탬프 없는 `LEVEL:` 헤더가 실제로는 JS/JVM 스택의 예외 요약 줄인지 판별합니다.
///
/// Node의 `Error: boom` 다음에는 `    at ...` 프레임이 옵니다. 이런 줄은 열린 엔트리의
/// 스택으로 이어 붙이며, 다음 줄이 `Traceback`인 Python logging 헤더는 새 엔트리로 둡니다.
fn opens_frame_block(line: &str, header: &HeaderMatch, rest: &[&str]) -> bool {
    if header.timestamp.is_some() || header.stack.is_some() || line.starts_with('{') {
        return false;
    }
    rest.iter()
        .find(|next| !next.trim().is_empty())
        .is_some_and(|next| next.trim_start().starts_with("at "))
}

/// 스택 트레이스 / traceback 블록의 줄인지 판별합니다.
pub fn is_stack_line(line: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "Traceback (",
        "File \"",
        "at ",
        "Caused by:",
        "...",
        "stack backtrace:",
        "goroutine ",
        "During handling of the above exception",
        "The above exception was the direct cause",
    ];

    let trimmed = line.trim_start();
    if PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix)) {
        return true;
    }
    // 들여쓴 프레임 (탭 또는 4칸 이상 공백)
    line.starts_with('\t') || line.starts_with("    ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> EntryParser {
        EntryParser::with_defaults()
    }

    #[test]
    fn empty_and_whitespace_input_yield_no_entries() {
        assert!(parser().parse("").is_empty());
        assert!(parser().parse("   \n\t\n  ").is_empty());
    }

    #[test]
    fn single_header_line() {
        let entries = parser().parse("2025-01-01 12:00:00 ERROR: Database connection failed");
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.index, 0);
        assert_eq!(entry.line, 1);
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.message, "Database connection failed");
        assert!(entry.timestamp.is_some());
        assert!(entry.stack.is_none());
    }

    #[test]
    fn python_traceback_goes_to_stack() {
        let input = "\
2025-01-01 12:00:00 ERROR: request failed
Traceback (most recent call last):
  File \"app/views.py\", line 42, in handler
    user = users[user_id]
KeyError: 'user_id'
2025-01-01 12:00:01 INFO: next request";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        let first = &entries[0];
        assert_eq!(first.message, "request failed");
        let stack = first.stack.as_deref().unwrap();
        assert!(stack.starts_with("Traceback"));
        assert!(stack.ends_with("KeyError: 'user_id'"));
        assert_eq!(entries[1].line, 6);
        assert_eq!(entries[1].level, Level::Info);
    }

    #[test]
    fn node_error_summary_stays_with_open_entry() {
        let input = "\
2025-01-01 12:00:00 ERROR request failed
Error: boom
    at handler (/srv/app/server.js:10:5)
    at process (node:internal/process:1:1)
2025-01-01 12:00:01 INFO next request";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        let first = &entries[0];
        assert_eq!(first.message, "request failed");
        let stack = first.stack.as_deref().unwrap();
        assert!(stack.starts_with("Error: boom"));
        assert!(stack.contains("server.js:10:5"));
        assert_eq!(entries[1].line, 5);
    }

    #[test]
    fn python_logging_headers_before_traceback_still_split() {
        let input = "\
ERROR:app:first failure
Traceback (most recent call last):
  File \"a.py\", line 1, in <module>
KeyError: 'x'
ERROR:app:second failure
Traceback (most recent call last):
  File \"b.py\", line 2, in <module>
KeyError: 'y'";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first failure");
        assert_eq!(entries[1].message, "second failure");
        assert!(entries[1].stack.as_deref().unwrap().contains("b.py"));
    }

    #[test]
    fn leading_node_error_is_its_own_entry() {
        let entries = parser().parse("Error: boom\n    at run (src/app.js:12:5)");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, Level::Error);
        assert_eq!(entries[0].message, "boom");
        assert!(entries[0].stack.as_deref().unwrap().contains("app.js:12:5"));
    }

    #[test]
    fn non_stack_continuation_appends_to_message() {
        let input = "WARNING: config reload\ncontinued detail line\n";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "config reload\ncontinued detail line");
        assert!(entries[0].stack.is_none());
    }

    #[test]
    fn jvm_stack_trace() {
        let input = "\
[2025-01-01 12:00:00] [ERROR] handler crashed
java.lang.NullPointerException: name is null
    at com.acme.Service.run(Service.java:27)
    at com.acme.Main.main(Main.java:10)
Caused by: java.io.IOException
    ... 3 more";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(
            entry.message,
            "handler crashed\njava.lang.NullPointerException: name is null"
        );
        assert!(entry.stack.as_deref().unwrap().contains("Service.java:27"));
        assert!(entry.stack.as_deref().unwrap().ends_with("... 3 more"));
    }

    #[test]
    fn preamble_becomes_unknown_entry() {
        let input = "booting worker 3\n2025-01-01 12:00:00 INFO ready";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Unknown);
        assert_eq!(entries[0].message, "booting worker 3");
        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].line, 2);
    }

    #[test]
    fn headerless_input_is_single_unknown_entry() {
        let input = "\
Traceback (most recent call last):
  File \"main.py\", line 3, in <module>
    import missing_mod
ModuleNotFoundError: No module named 'missing_mod'";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, Level::Unknown);
        assert_eq!(
            entries[0].message,
            "ModuleNotFoundError: No module named 'missing_mod'"
        );
        assert_eq!(entries[0].raw, input);
    }

    #[test]
    fn json_lines_with_stack_field() {
        let input = concat!(
            r#"{"level":"error","msg":"boom","stack":"Error: boom\n    at run (src/app.js:12:5)"}"#,
            "\n",
            r#"{"level":"info","msg":"recovered"}"#
        );
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Error);
        assert!(entries[0].stack.as_deref().unwrap().contains("src/app.js:12:5"));
        assert_eq!(entries[1].message, "recovered");
    }

    #[test]
    fn indented_lines_never_start_entries() {
        let input = "ERROR: outer\n    ERROR: looks like a header but indented";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].stack.is_some());
    }

    #[test]
    fn crlf_line_endings() {
        let input = "INFO: one\r\nERROR: two\r\n";
        let entries = parser().parse(input);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "two");
    }

    #[test]
    fn custom_format_registration() {
        let parser = EntryParser::new().register(
            HeaderFormat::new("pipe", r"^(?P<level>[A-Z]+)\s*\|\s*(?P<msg>.*)$").unwrap(),
        );
        assert_eq!(parser.registered_formats(), ["pipe"]);
        let entries = parser.parse("ERROR | disk full\nWARN | low memory");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "disk full");
    }

    #[test]
    fn default_formats_listed() {
        let parser = EntryParser::with_defaults();
        let formats = parser.registered_formats();
        assert_eq!(formats[0], "json");
        assert!(formats.contains(&"iso"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_text_does_not_panic(input in "\\PC{0,400}") {
                let entries = EntryParser::with_defaults().parse(&input);
                for (i, entry) in entries.iter().enumerate() {
                    prop_assert_eq!(entry.index, i);
                    prop_assert!(entry.line >= 1);
                }
                for pair in entries.windows(2) {
                    prop_assert!(pair[0].line < pair[1].line);
                }
            }

            #[test]
            fn non_blank_input_yields_entries(input in "[ \\t]{0,4}[!-~][ -~\\n]{0,200}") {
                let entries = EntryParser::with_defaults().parse(&input);
                prop_assert!(!entries.is_empty());
            }

            #[test]
            fn header_lines_keep_input_order(
                lines in prop::collection::vec(
                    (prop_oneof![Just("ERROR"), Just("WARN"), Just("INFO")], "[a-z0-9]{1,16}"),
                    1..40,
                )
            ) {
                let input: String = lines
                    .iter()
                    .map(|(level, msg)| format!("2025-01-01 12:00:00 {level}: {msg}\n"))
                    .collect();
                let entries = EntryParser::with_defaults().parse(&input);
                prop_assert_eq!(entries.len(), lines.len());
                for (entry, (level, msg)) in entries.iter().zip(&lines) {
                    prop_assert_eq!(&entry.message, msg);
                    prop_assert_eq!(entry.level.as_str(), *level);
                }
            }
        }
    }
}

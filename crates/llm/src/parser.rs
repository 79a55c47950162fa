//! Reply parsing
//!
//! Models rarely produce clean JSON. The parser reads the reply line by
//! line, looking for `key: value` pairs whose key belongs to the fixed
//! schema, and tolerates stray quotes, trailing commas, echoed type
//! annotations and replies emitted on a single line.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use voice_buddy_core::{ParsedRecord, RecordDraft, SchemaKey};

/// Parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Reply does not contain a response")]
    MissingResponse,
}

impl From<ParseError> for voice_buddy_core::Error {
    fn from(err: ParseError) -> Self {
        voice_buddy_core::Error::Parse(err.to_string())
    }
}

// A key and the opening quote that may precede it
static KEY_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\b(human_input|human_emotion|reaction_emotion|intent|action|tool_input|tool|response|entities)\b"#).unwrap()
});

const ANNOTATIONS: [&str; 2] = ["str =", "list ="];

/// Stateless parser for model replies
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaParser;

impl SchemaParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw reply into a record
    ///
    /// Succeeds when the reply explicitly sets `response`, even to `NA`.
    pub fn parse(&self, raw: &str) -> Result<ParsedRecord, ParseError> {
        let repaired = repair_line_breaks(raw);
        let mut draft = RecordDraft::new();

        for line in structure_lines(&repaired) {
            let Some(line) = clean_line(line) else {
                continue;
            };
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if let Some(key) = SchemaKey::from_name(&normalize_key(key)) {
                draft.set(key, normalize_value(value));
            }
        }

        draft.finish().ok_or(ParseError::MissingResponse)
    }
}

/// Put every schema key on its own line when the reply has no line breaks
pub fn repair_line_breaks(raw: &str) -> String {
    if raw.contains('\n') {
        return raw.to_string();
    }
    KEY_BOUNDARY.replace_all(raw, "\n$0").into_owned()
}

/// Lines up to, not including, the first one holding a closing brace
pub fn structure_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().take_while(|line| !line.contains('}'))
}

/// Strip trailing punctuation, or `None` when the line cannot hold a pair
pub fn clean_line(line: &str) -> Option<&str> {
    let mut line = line.trim_end();
    line = line.strip_suffix(',').unwrap_or(line);
    line = line
        .strip_suffix('"')
        .or_else(|| line.strip_suffix('\''))
        .unwrap_or(line);

    if line.chars().count() < 4 {
        return None;
    }
    if !SchemaKey::ALL.iter().any(|k| line.contains(k.as_str())) {
        return None;
    }
    Some(line)
}

/// Normalize a key to its schema spelling
pub fn normalize_key(key: &str) -> String {
    let mut key = key.replace(['"', '\''], "");
    for annotation in ANNOTATIONS {
        key = key.replace(annotation, "");
    }
    key.trim().to_lowercase().replace(' ', "_")
}

/// Normalize a value; `NA` in any case becomes the empty string
///
/// The closing quote was already removed by [`clean_line`], so only an
/// opening quote is stripped here. Inner quotes are kept verbatim.
pub fn normalize_value(value: &str) -> String {
    let mut value = value.trim();
    for annotation in ANNOTATIONS {
        value = value.strip_prefix(annotation).unwrap_or(value).trim_start();
    }
    let value = value
        .strip_prefix('"')
        .or_else(|| value.strip_prefix('\''))
        .unwrap_or(value)
        .trim();

    if value.eq_ignore_ascii_case("na") {
        String::new()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FULL_REPLY: &str = r#"{
"human_input": "how are you today",
"human_emotion": "neutral",
"reaction_emotion": "happiness",
"intent": "small talk",
"action": "answer the question",
"tool": NA,
"tool_input": NA,
"response": "I'm great, thanks for asking!",
"entities": NA
}"#;

    #[test]
    fn test_parses_full_reply() {
        let record = SchemaParser::new().parse(FULL_REPLY).unwrap();
        assert_eq!(record.human_input, "how are you today");
        assert_eq!(record.human_emotion, "neutral");
        assert_eq!(record.reaction_emotion, "happiness");
        assert_eq!(record.intent, "small talk");
        assert_eq!(record.action, "answer the question");
        assert_eq!(record.tool, "");
        assert_eq!(record.tool_input, "");
        assert_eq!(record.response, "I'm great, thanks for asking!");
        assert_eq!(record.entities, "");
    }

    #[test]
    fn test_response_only() {
        let record = SchemaParser::new().parse("response: Hello there\n}").unwrap();
        assert_eq!(
            record,
            ParsedRecord {
                response: "Hello there".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_na_response_is_still_set() {
        let record = SchemaParser::new().parse("response: NA\n}").unwrap();
        assert_eq!(record.response, "");
    }

    #[test]
    fn test_garbage_fails() {
        let result = SchemaParser::new().parse("garbage with no keys");
        assert_eq!(result, Err(ParseError::MissingResponse));
    }

    #[test]
    fn test_missing_response_fails() {
        let result = SchemaParser::new().parse("intent: greeting\naction: wave\n}");
        assert_eq!(result, Err(ParseError::MissingResponse));
    }

    #[test]
    fn test_single_line_reply() {
        let raw = r#"{"human_input": "hi", "human_emotion": "happiness", "response": "Hey there", "intent": "greeting", "entities": NA}"#;
        let record = SchemaParser::new().parse(raw).unwrap();
        assert_eq!(record.human_input, "hi");
        assert_eq!(record.human_emotion, "happiness");
        assert_eq!(record.response, "Hey there");
        assert_eq!(record.intent, "greeting");
    }

    #[test]
    fn test_lines_after_closing_brace_ignored() {
        let raw = "response: first\n}\nresponse: second";
        assert_eq!(SchemaParser::new().parse(raw).unwrap().response, "first");
    }

    #[test]
    fn test_value_keeps_colons_and_inner_quotes() {
        let raw = "response: \"Meet at 10:30, say \"hi\" to Bob\",\n}";
        let record = SchemaParser::new().parse(raw).unwrap();
        assert_eq!(record.response, "Meet at 10:30, say \"hi\" to Bob");
    }

    #[test]
    fn test_last_occurrence_wins() {
        let raw = "response: one\nresponse: two\n}";
        assert_eq!(SchemaParser::new().parse(raw).unwrap().response, "two");
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let raw = "mood: grumpy\nresponse: ok\nconfidence_response: high\n}";
        let record = SchemaParser::new().parse(raw).unwrap();
        assert_eq!(record.response, "ok");
    }

    #[test]
    fn test_repair_line_breaks() {
        assert_eq!(repair_line_breaks("a\nb"), "a\nb");
        assert_eq!(
            repair_line_breaks("intent: x tool_input: y"),
            "\nintent: x \ntool_input: y"
        );
        assert_eq!(repair_line_breaks("tool_input: y"), "\ntool_input: y");
        // Keys only match as whole words
        assert_eq!(repair_line_breaks("toolbox: y"), "toolbox: y");
        assert_eq!(repair_line_breaks("my_tool_input: y"), "my_tool_input: y");
    }

    #[test]
    fn test_clean_line() {
        assert_eq!(clean_line("\"response\": \"hi\","), Some("\"response\": \"hi"));
        assert_eq!(clean_line("tool: 'x'  "), Some("tool: 'x"));
        assert_eq!(clean_line("{"), None);
        assert_eq!(clean_line("no schema words here"), None);
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" \"Human Input\" "), "human_input");
        assert_eq!(normalize_key("str = intent"), "intent");
        assert_eq!(normalize_key("'Tool_Input'"), "tool_input");
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value(" \"hello"), "hello");
        assert_eq!(normalize_value(" str = \"hello"), "hello");
        assert_eq!(normalize_value(" Na "), "");
        assert_eq!(normalize_value(" \"NA"), "");
        assert_eq!(normalize_value(" nature"), "nature");
    }

    #[test]
    fn test_reparse_of_serialized_record() {
        let parser = SchemaParser::new();
        let record = parser.parse(FULL_REPLY).unwrap();
        let again = parser.parse(&record.to_reply_text()).unwrap();
        assert_eq!(record, again);
    }

    fn field() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[A-Za-z0-9][A-Za-z0-9 ,.!?:']{0,30}[A-Za-z0-9.!?]"
                .prop_filter("NA is reserved", |s| !s.eq_ignore_ascii_case("na")),
        ]
    }

    fn record() -> impl Strategy<Value = ParsedRecord> {
        (
            (field(), field(), field(), field(), field()),
            (field(), field(), field(), field()),
        )
            .prop_map(|((a, b, c, d, e), (f, g, h, i))| ParsedRecord {
                human_input: a,
                human_emotion: b,
                reaction_emotion: c,
                intent: d,
                action: e,
                tool: f,
                tool_input: g,
                response: h,
                entities: i,
            })
    }

    proptest! {
        #[test]
        fn prop_nine_key_reply_parses(record in record()) {
            let parsed = SchemaParser::new().parse(&record.to_reply_text());
            prop_assert_eq!(parsed, Ok(record));
        }

        #[test]
        fn prop_parse_is_idempotent(record in record()) {
            let parser = SchemaParser::new();
            let first = parser.parse(&record.to_reply_text()).unwrap();
            let second = parser.parse(&first.to_reply_text()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_text_without_keys_fails(text in "[XYZ0-9 .,!?]{0,60}") {
            prop_assert_eq!(SchemaParser::new().parse(&text), Err(ParseError::MissingResponse));
        }
    }
}

use super::SubtitleParser;
use crate::error::Result;

/// Delimiter appended after every dialogue line.
pub const LINE_DELIMITER: &str = ", ";

/// Line-oriented parser for `.srt` and plain `.txt` subtitles.
///
/// A line is skipped when it is empty, contains the `-->` timestamp marker,
/// or consists only of ASCII digits (a sequence number). Every other line is
/// dialogue, including malformed timestamp lines that still contain letters.
#[derive(Debug, Default)]
pub struct LineParser;

impl SubtitleParser for LineParser {
    fn name(&self) -> &'static str {
        "srt/txt"
    }

    fn parse(&self, _path: &std::path::Path, data: &[u8]) -> Result<String> {
        let text = String::from_utf8_lossy(data);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut paragraph = String::with_capacity(text.len());
        for line in text.lines().filter(|line| is_dialogue(line)) {
            paragraph.push_str(line);
            paragraph.push_str(LINE_DELIMITER);
        }

        Ok(paragraph)
    }
}

pub fn is_dialogue(line: &str) -> bool {
    !(line.is_empty() || line.contains("-->") || line.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(input: &str) -> String {
        LineParser.parse(Path::new("test.srt"), input.as_bytes()).unwrap()
    }

    #[test]
    fn test_srt_blocks_become_comma_joined_dialogue() {
        let input = "1\n0:0:0,28 --> 0:0:2,14\nhello world\n\n2\n0:0:2,14 --> 0:0:6,78\nsecond line";
        assert_eq!(parse(input), "hello world, second line, ");
    }

    #[test]
    fn test_crlf_and_bom_are_ignored() {
        let input = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nbonjour\r\n\r\n";
        assert_eq!(parse(input), "bonjour, ");
    }

    #[test]
    fn test_plain_text_keeps_every_line() {
        let input = "first thought\nsecond thought\n";
        assert_eq!(parse(input), "first thought, second thought, ");
    }

    #[test]
    fn test_malformed_timestamp_with_letters_is_dialogue() {
        assert!(is_dialogue("00:00:01 to 00:00:02"));
        assert!(!is_dialogue("00:00:01,000 --> 00:00:02,000"));
    }

    #[test]
    fn test_numbers_with_other_characters_are_dialogue() {
        assert!(!is_dialogue("42"));
        assert!(is_dialogue("42 apples"));
        assert!(is_dialogue("3.14"));
        assert!(is_dialogue(" 7"));
    }

    #[test]
    fn test_no_output_line_is_skippable() {
        let input = "1\n00:00:00,000 --> 00:00:01,000\nalpha\n2\n\n00:00:01,000 --> 00:00:02,000\nbeta\n12345\n";
        let transcript = parse(input);
        for piece in transcript.split(LINE_DELIMITER).filter(|p| !p.is_empty()) {
            assert!(is_dialogue(piece), "unexpected line {:?}", piece);
        }
        assert_eq!(transcript, "alpha, beta, ");
    }
}

//! Report section parsing.
//!
//! A section opens with `==== <Name> ====...` and runs until the next line of
//! exactly 80 `=`. Line endings may be `\n` or `\r\n`.

use nr_common::section::{is_closing_delimiter, is_opening_delimiter};
use nr_common::SectionName;
use std::collections::BTreeMap;

/// Body of the first section titled `name`, without its delimiter lines.
///
/// Returns `None` when the section is absent or never closed.
pub fn extract_section(document: &str, name: &str) -> Option<String> {
    let mut lines = document.lines();
    lines.by_ref().find(|line| is_opening_delimiter(line, name))?;

    let mut body = Vec::new();
    for line in lines {
        if is_closing_delimiter(line) {
            return Some(body.join("\n"));
        }
        body.push(line);
    }
    None
}

/// Number of opening lines for `name`.
pub fn count_sections(document: &str, name: &str) -> usize {
    document
        .lines()
        .filter(|line| is_opening_delimiter(line, name))
        .count()
}

/// Value of the first `key: value` line in a section body.
pub fn field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}

/// Sections of one report, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDocument {
    sections: BTreeMap<SectionName, String>,
}

impl ReportDocument {
    pub fn parse(text: &str) -> Self {
        let sections = SectionName::ALL
            .into_iter()
            .filter_map(|name| extract_section(text, name.title()).map(|body| (name, body)))
            .collect();
        Self { sections }
    }

    pub fn section(&self, name: SectionName) -> Option<&str> {
        self.sections.get(&name).map(String::as_str)
    }

    /// Known sections that did not parse.
    pub fn missing(&self) -> Vec<SectionName> {
        SectionName::ALL
            .into_iter()
            .filter(|name| !self.sections.contains_key(name))
            .collect()
    }

    pub fn header_field(&self, key: &str) -> Option<&str> {
        self.section(SectionName::Header).and_then(|body| field(body, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nr_common::section::{closing_delimiter, opening_delimiter};

    fn two_sections() -> String {
        [
            closing_delimiter(),
            opening_delimiter("NodeReport"),
            String::new(),
            "Process ID: 42".to_string(),
            closing_delimiter(),
            opening_delimiter("JavaScript Heap"),
            "Total heap memory size: 1,024 bytes".to_string(),
            String::new(),
            closing_delimiter(),
        ]
        .join("\n")
    }

    #[test]
    fn extracts_body_between_delimiters() {
        let doc = two_sections();
        assert_eq!(extract_section(&doc, "NodeReport").as_deref(), Some("\nProcess ID: 42"));
        assert_eq!(
            extract_section(&doc, "JavaScript Heap").as_deref(),
            Some("Total heap memory size: 1,024 bytes\n")
        );
        assert_eq!(extract_section(&doc, "System Information"), None);
    }

    #[test]
    fn crlf_documents_parse_the_same() {
        let doc = two_sections();
        let crlf = doc.replace('\n', "\r\n");
        assert_eq!(extract_section(&crlf, "NodeReport"), extract_section(&doc, "NodeReport"));
    }

    #[test]
    fn title_must_match_exactly() {
        let doc = two_sections();
        assert_eq!(extract_section(&doc, "Node"), None);
        assert_eq!(extract_section(&doc, "JavaScript"), None);
    }

    #[test]
    fn unterminated_section_is_absent() {
        let doc = format!("{}\nbody line\n", opening_delimiter("NodeReport"));
        assert_eq!(extract_section(&doc, "NodeReport"), None);
        assert_eq!(count_sections(&doc, "NodeReport"), 1);
    }

    #[test]
    fn first_occurrence_wins() {
        let doc = format!(
            "{}\nfirst\n{}\n{}\nsecond\n{}\n",
            opening_delimiter("NodeReport"),
            closing_delimiter(),
            opening_delimiter("NodeReport"),
            closing_delimiter()
        );
        assert_eq!(extract_section(&doc, "NodeReport").as_deref(), Some("first"));
        assert_eq!(count_sections(&doc, "NodeReport"), 2);
    }

    #[test]
    fn document_lists_missing_sections() {
        let doc = ReportDocument::parse(&two_sections());
        assert_eq!(doc.header_field("Process ID"), Some("42"));
        assert_eq!(
            doc.missing(),
            vec![SectionName::JavaScriptStackTrace, SectionName::SystemInformation]
        );
    }

    #[test]
    fn field_lookup_needs_a_colon() {
        let body = "Process IDs are listed below\nProcess ID: 7";
        assert_eq!(field(body, "Process ID"), Some("7"));
        assert_eq!(field(body, "Machine"), None);
    }
}

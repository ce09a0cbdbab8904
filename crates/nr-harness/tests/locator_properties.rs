//! Property-based tests for report naming and section extraction.

use chrono::NaiveDate;
use nr_common::section::{closing_delimiter, opening_delimiter};
use nr_common::{report_name_pattern, ProcessId, ReportFileName, SectionName, DEFAULT_PREFIX};
use nr_harness::{count_sections, extract_section, ReportDocument};
use proptest::prelude::*;

fn timestamp_strategy() -> impl Strategy<Value = chrono::NaiveDateTime> {
    (2000i32..2100, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60).prop_map(
        |(y, mo, d, h, mi, s)| {
            NaiveDate::from_ymd_opt(y, mo, d)
                .and_then(|date| date.and_hms_opt(h, mi, s))
                .expect("ranges only yield valid dates")
        },
    )
}

/// Body lines that can never be mistaken for a delimiter.
fn body_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 :.,_()/-]{0,60}", 0..20)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A name only matches the pattern of the pid that wrote it.
    #[test]
    fn name_matches_only_its_own_pid(
        writer in 1u32..4_000_000,
        reader in 1u32..4_000_000,
        sequence in 1u32..100_000,
        at in timestamp_strategy(),
    ) {
        let name = ReportFileName::new(DEFAULT_PREFIX, at, ProcessId(writer), sequence).render();
        let pattern = report_name_pattern(DEFAULT_PREFIX, ProcessId(reader)).unwrap();
        prop_assert_eq!(pattern.is_match(&name), writer == reader);
    }

    /// Rendered names parse back to the same components.
    #[test]
    fn rendered_name_parses_back(
        pid in 1u32..4_000_000,
        sequence in 1u32..100_000,
        at in timestamp_strategy(),
    ) {
        let original = ReportFileName::new("diag.run", at, ProcessId(pid), sequence);
        let parsed = ReportFileName::parse(&original.render());
        prop_assert_eq!(parsed, Some(original));
    }

    /// A body without delimiter lines comes back unchanged.
    #[test]
    fn section_body_extracts_back(body in body_strategy(), crlf in any::<bool>()) {
        let title = SectionName::JavaScriptHeap.title();
        let mut lines = vec![closing_delimiter(), opening_delimiter(title)];
        lines.extend(body.iter().cloned());
        lines.push(closing_delimiter());
        let document = lines.join(if crlf { "\r\n" } else { "\n" });

        prop_assert_eq!(extract_section(&document, title), Some(body.join("\n")));
        prop_assert_eq!(count_sections(&document, title), 1);
        prop_assert_eq!(
            ReportDocument::parse(&document).missing().len(),
            SectionName::ALL.len() - 1
        );
    }

    /// Removing the closing line makes the section unreadable.
    #[test]
    fn unterminated_section_is_absent(body in body_strategy()) {
        let title = SectionName::SystemInformation.title();
        let mut lines = vec![opening_delimiter(title)];
        lines.extend(body);
        let document = lines.join("\n");
        prop_assert_eq!(extract_section(&document, title), None);
    }
}

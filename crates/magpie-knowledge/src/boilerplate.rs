//! Repeated-line removal for paginated documents.
//!
//! Running headers and footers repeat on most pages of an extracted PDF.
//! Counting how many pages contain each distinct trimmed line finds them
//! without any layout information: a line present on at least 80% of
//! pages is boilerplate and is dropped from every page.

use std::collections::{HashMap, HashSet};

/// Fraction of pages a line must appear on to count as boilerplate.
const REPETITION_THRESHOLD: f64 = 0.8;

/// Minimum page count before detection runs. One or two pages cannot
/// statistically establish repetition, so such documents pass through
/// unchanged.
const MIN_PAGES_FOR_DETECTION: usize = 3;

/// Remove lines that repeat across most pages of a document.
///
/// Returns one output page per input page, in order. Pages with no
/// extractable lines contribute nothing to the counts and come back
/// empty rather than failing the document.
#[must_use]
pub fn strip_boilerplate(pages: &[String]) -> Vec<String> {
    if pages.len() < MIN_PAGES_FOR_DETECTION {
        return pages.to_vec();
    }

    let repetitive = repetitive_lines(pages);
    pages
        .iter()
        .map(|page| {
            page.lines()
                .filter(|line| !repetitive.contains(line.trim()))
                .collect::<Vec<&str>>()
                .join("\n")
        })
        .collect()
}

/// Rejoin filtered pages into one document text, blank line between
/// pages. Pages left empty by filtering are dropped.
#[must_use]
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// Distinct trimmed lines appearing on at least the threshold fraction
/// of pages. Blank lines never count: removing them would collapse
/// paragraph structure on every page.
fn repetitive_lines(pages: &[String]) -> HashSet<String> {
    let mut page_counts: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        let distinct: HashSet<&str> = page
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        for line in distinct {
            *page_counts.entry(line).or_insert(0) += 1;
        }
    }

    let total_pages = pages.len() as f64;
    page_counts
        .into_iter()
        .filter(|(_, count)| *count as f64 / total_pages >= REPETITION_THRESHOLD)
        .map(|(line, _)| line.to_owned())
        .collect()
}

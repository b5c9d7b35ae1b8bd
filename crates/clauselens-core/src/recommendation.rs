//! Splitting of recommendation text into advice and cited playbook chunks.
//!
//! The analysis service writes recommendations like
//! `"Action: Negotiate a mutual cap. Cite chunks: pb-3, pb-7."`. For display
//! the leading label is dropped and the chunk ids after `Cite chunks:` are
//! pulled out into a list.

const CITE_MARKER: &str = "cite chunks:";
const LEADING_LABELS: &[&str] = &["summary:", "action:"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recommendation {
    pub main: String,
    pub citations: Vec<String>,
}

impl Recommendation {
    /// Parse recommendation text. Marker and labels match case-insensitively.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        let (main, cited) = match lower.find(CITE_MARKER) {
            Some(pos) => (&text[..pos], &text[pos + CITE_MARKER.len()..]),
            None => (text, ""),
        };

        let main = strip_label(main.trim_start()).trim().to_string();

        let cited = cited.trim();
        let cited = cited.strip_suffix('.').unwrap_or(cited);
        let citations = cited
            .split([',', ';'])
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Self { main, citations }
    }
}

fn strip_label(s: &str) -> &str {
    for label in LEADING_LABELS {
        if s.len() >= label.len()
            && s.is_char_boundary(label.len())
            && s[..label.len()].eq_ignore_ascii_case(label)
        {
            return &s[label.len()..];
        }
    }
    s
}

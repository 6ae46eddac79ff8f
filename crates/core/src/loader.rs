//! Policy document loader.
//!
//! Splits a policy document with a two-level heading structure (`## ` section,
//! `### ` subsection) into tagged [`PolicyChunk`]s. A new chunk starts at every
//! heading boundary; chunk text is the heading plus everything up to the next
//! heading of equal or higher level. Loading is a pure transformation of the
//! input text and is idempotent.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::domain::{ChunkId, ChunkKind, PolicyChunk, PolicyType};

/// Title given to content that precedes the first heading, and to documents
/// with no headings at all.
pub const HEADER_SECTION_TITLE: &str = "Policy Header";

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("could not read policy document `{path}`: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("policy document path `{0}` has no usable file name")]
    InvalidPath(String),
}

#[derive(Clone, Debug, Default)]
pub struct PolicyLoader;

impl PolicyLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and chunk a policy document from disk. The document identifier is
    /// the file stem, which also determines the policy type.
    pub fn load_file(&self, path: &Path) -> Result<Vec<PolicyChunk>, LoaderError> {
        let identifier = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| LoaderError::InvalidPath(path.display().to_string()))?
            .to_string();

        let raw = fs::read_to_string(path)
            .map_err(|source| LoaderError::ReadFile { path: path.display().to_string(), source })?;

        Ok(self.load_document(&identifier, &raw))
    }

    /// Chunk raw document text under an explicit identifier.
    pub fn load_document(&self, identifier: &str, raw: &str) -> Vec<PolicyChunk> {
        let policy_type = policy_type_from_identifier(identifier);
        let sections = split_sections(raw);

        let mut chunks = Vec::with_capacity(sections.len());
        for section in sections {
            let chunk_kind = classify_chunk(&section.title, &section.text);
            let ordinal = chunks.len();
            chunks.push(PolicyChunk {
                id: ChunkId(format!("{identifier}#{ordinal}")),
                policy_type,
                policy_identifier: identifier.to_string(),
                section_title: section.title,
                chunk_kind,
                text: section.text,
                embedding: Vec::new(),
            });
        }

        chunks
    }
}

/// Policy type follows the document identifier convention; content is never
/// consulted when the identifier names the domain.
pub fn policy_type_from_identifier(identifier: &str) -> PolicyType {
    if identifier.to_ascii_lowercase().contains("auto") {
        PolicyType::Auto
    } else {
        PolicyType::Property
    }
}

struct RawSection {
    title: String,
    text: String,
}

fn split_sections(raw: &str) -> Vec<RawSection> {
    fn flush(open: &mut Option<(String, Vec<&str>)>, sections: &mut Vec<RawSection>) {
        if let Some((title, lines)) = open.take() {
            let text = lines.join("\n").trim().to_string();
            if !text.is_empty() {
                sections.push(RawSection { title, text });
            }
        }
    }

    let mut sections: Vec<RawSection> = Vec::new();
    // Title path of the enclosing `##` section, so subsection titles read
    // "Section - Subsection".
    let mut current_section_title: Option<String> = None;
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in raw.lines() {
        if let Some(heading) = line.strip_prefix("## ").map(str::trim) {
            flush(&mut open, &mut sections);
            current_section_title = Some(heading.to_string());
            open = Some((heading.to_string(), vec![line]));
        } else if let Some(heading) = line.strip_prefix("### ").map(str::trim) {
            flush(&mut open, &mut sections);
            let title = match &current_section_title {
                Some(section) => format!("{section} - {heading}"),
                None => heading.to_string(),
            };
            open = Some((title, vec![line]));
        } else {
            match &mut open {
                Some((_, lines)) => lines.push(line),
                None => {
                    // Preamble before the first heading.
                    open = Some((HEADER_SECTION_TITLE.to_string(), vec![line]));
                }
            }
        }
    }
    flush(&mut open, &mut sections);

    sections
}

fn classify_chunk(title: &str, text: &str) -> ChunkKind {
    let title = title.to_ascii_lowercase();
    let text = text.to_ascii_lowercase();

    for haystack in [title.as_str(), text.as_str()] {
        if haystack.contains("exclusion") || haystack.contains("not covered") {
            return ChunkKind::Exclusion;
        }
        if haystack.contains("coverage") || haystack.contains("we will pay") {
            return ChunkKind::Coverage;
        }
        if haystack.contains("deductible")
            || haystack.contains("duties")
            || haystack.contains("condition")
        {
            return ChunkKind::Condition;
        }
    }

    ChunkKind::General
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::domain::{ChunkKind, PolicyType};

    use super::{policy_type_from_identifier, PolicyLoader, HEADER_SECTION_TITLE};

    const SAMPLE: &str = "\
Acme Auto Policy, Form A-100.

## Part A - Liability

We will pay damages for bodily injury.

### Supplementary Payments

Up to $250 for bail bonds.

## Part D - Physical Damage Coverage

### Comprehensive Coverage

We will pay for direct and accidental loss to your covered auto from any \
cause except collision, including theft or larceny.

## Exclusions

We do not cover loss arising from wear and tear.
";

    #[test]
    fn splits_on_both_heading_levels_and_keeps_preamble() {
        let loader = PolicyLoader::new();
        let chunks = loader.load_document("auto_policy_1", SAMPLE);

        let titles: Vec<&str> = chunks.iter().map(|c| c.section_title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                HEADER_SECTION_TITLE,
                "Part A - Liability",
                "Part A - Liability - Supplementary Payments",
                "Part D - Physical Damage Coverage",
                "Part D - Physical Damage Coverage - Comprehensive Coverage",
                "Exclusions",
            ]
        );

        // Chunk text carries its own heading line.
        assert!(chunks[1].text.starts_with("## Part A - Liability"));
        assert!(chunks[2].text.starts_with("### Supplementary Payments"));
    }

    #[test]
    fn tags_chunk_kinds_by_keyword() {
        let loader = PolicyLoader::new();
        let chunks = loader.load_document("auto_policy_1", SAMPLE);

        let by_title = |title: &str| {
            chunks
                .iter()
                .find(|c| c.section_title == title)
                .unwrap_or_else(|| panic!("missing chunk {title}"))
        };

        assert_eq!(by_title("Exclusions").chunk_kind, ChunkKind::Exclusion);
        assert_eq!(
            by_title("Part D - Physical Damage Coverage - Comprehensive Coverage").chunk_kind,
            ChunkKind::Coverage
        );
        assert_eq!(by_title(HEADER_SECTION_TITLE).chunk_kind, ChunkKind::General);
    }

    #[test]
    fn condition_keywords_rank_below_exclusion_and_coverage() {
        let loader = PolicyLoader::new();
        let doc = "## Your Duties After Loss\n\nNotify us promptly and protect the property.";
        let chunks = loader.load_document("property_policy_1", doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_kind, ChunkKind::Condition);

        // "deductible" inside an exclusions section does not demote it.
        let doc = "## Exclusions\n\nLosses below the deductible are not covered.";
        let chunks = loader.load_document("property_policy_1", doc);
        assert_eq!(chunks[0].chunk_kind, ChunkKind::Exclusion);
    }

    #[test]
    fn document_without_headings_becomes_one_chunk() {
        let loader = PolicyLoader::new();
        let chunks = loader.load_document("property_policy_9", "Just a flat paragraph of text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_title, HEADER_SECTION_TITLE);
        assert_eq!(chunks[0].text, "Just a flat paragraph of text.");
    }

    #[test]
    fn loading_is_idempotent() {
        let loader = PolicyLoader::new();
        let first = loader.load_document("auto_policy_1", SAMPLE);
        let second = loader.load_document("auto_policy_1", SAMPLE);
        assert_eq!(first, second);
    }

    #[test]
    fn policy_type_follows_identifier_convention() {
        assert_eq!(policy_type_from_identifier("auto_policy_2"), PolicyType::Auto);
        assert_eq!(policy_type_from_identifier("property_policy_1"), PolicyType::Property);
    }

    #[test]
    fn load_file_uses_stem_as_identifier() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("auto_policy_1.md");
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(SAMPLE.as_bytes()).expect("write file");

        let loader = PolicyLoader::new();
        let chunks = loader.load_file(&path).expect("load file");
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].policy_identifier, "auto_policy_1");
        assert_eq!(chunks[0].policy_type, PolicyType::Auto);
    }
}

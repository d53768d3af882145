use crate::providers::{GroundingMetadata, WebSource};

fn label(source: &WebSource) -> String {
    let label = source
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| source.domain.as_deref().filter(|d| !d.trim().is_empty()))
        .unwrap_or("source");
    label.replace(['[', ']'], "")
}

/// Markdown links for every grounding source, duplicates removed, first
/// occurrence kept.
pub fn citation_links(grounding: &GroundingMetadata) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for source in &grounding.sources {
        let link = format!("[{}]({})", label(source), source.uri);
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

/// Appends a "Sources:" paragraph to `text` when there is anything to cite.
pub fn append_citations(text: &str, grounding: Option<&GroundingMetadata>) -> String {
    let links = grounding.map(citation_links).unwrap_or_default();
    if links.is_empty() {
        return text.to_string();
    }
    format!("{}\n\nSources: {}", text, links.join(", "))
}

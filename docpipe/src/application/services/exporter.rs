// /////////////////////////////////////////////////////////////////////////////
// docpipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exporter (§6 `export` subcommand)
//!
//! Renders a document's text-bearing elements into one of five
//! training-corpus formats. No teacher or pack file ships an equivalent
//! service -- this is grounded on the general shape of this crate's other
//! application services (a thin struct over `Repository` ports, one public
//! entry point per CLI subcommand) rather than a specific precedent.

use std::path::Path;

use serde_json::json;

use docpipe_domain::entities::{Element, ElementKind};
use docpipe_domain::repositories::repository::{Filter, Query, Repository};
use docpipe_domain::value_objects::{ElementId, FileId};
use docpipe_domain::CoreError;

use crate::application::commands::ExportFormat;

/// Renders documents' elements into a training-corpus format and writes the
/// result to disk (or returns it, for callers that want the bytes directly).
pub struct Exporter {
    elements: std::sync::Arc<dyn Repository<Element, Id = ElementId>>,
}

impl Exporter {
    pub fn new(elements: std::sync::Arc<dyn Repository<Element, Id = ElementId>>) -> Self {
        Self { elements }
    }

    /// Renders every document in `document_ids`, concatenated in the given
    /// order, and writes the result to `output_path` if given, otherwise
    /// returns it to the caller to print to stdout.
    pub async fn export(
        &self,
        document_ids: &[FileId],
        format: ExportFormat,
        output_path: Option<&Path>,
    ) -> Result<String, CoreError> {
        let mut rendered = String::new();
        for &document_id in document_ids {
            let elements = self.load_document_elements(document_id).await?;
            rendered.push_str(&render_document(document_id, &elements, format));
        }

        if let Some(path) = output_path {
            tokio::fs::write(path, &rendered)
                .await
                .map_err(|e| CoreError::BackendUnavailable(format!("writing export output: {e}")))?;
        }
        Ok(rendered)
    }

    async fn load_document_elements(&self, document_id: FileId) -> Result<Vec<Element>, CoreError> {
        let query = Query::new()
            .filter(Filter::eq("document_id", json!(document_id.to_string())))
            .paginate(0, u32::MAX);
        let mut elements = self.elements.list(query).await?.items;
        elements.sort_by_key(|e| e.position());
        Ok(elements)
    }
}

fn element_text(element: &Element) -> Option<&str> {
    match element.payload() {
        docpipe_domain::entities::ElementPayload::Text(text) => Some(text.as_str()),
        _ => None,
    }
}

fn document_body(elements: &[Element]) -> String {
    elements
        .iter()
        .filter_map(element_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_document(document_id: FileId, elements: &[Element], format: ExportFormat) -> String {
    match format {
        ExportFormat::Jsonl => render_jsonl(document_id, elements),
        ExportFormat::Markdown => render_markdown(elements),
        ExportFormat::ChatMl => render_chatml(document_id, elements),
        ExportFormat::Alpaca => render_alpaca(document_id, elements),
        ExportFormat::ShareGpt => render_sharegpt(document_id, elements),
    }
}

/// One JSON object per line, one line per element -- the format most
/// amenable to further offline processing (re-chunking, filtering).
fn render_jsonl(document_id: FileId, elements: &[Element]) -> String {
    elements
        .iter()
        .filter_map(|element| {
            let text = element_text(element)?;
            Some(
                json!({
                    "document_id": document_id.to_string(),
                    "element_id": element.id().to_string(),
                    "kind": format!("{:?}", element.kind()),
                    "page": element.bbox().page,
                    "text": text,
                })
                .to_string(),
            )
        })
        .map(|line| line + "\n")
        .collect()
}

/// Headings for `Title` elements, plain paragraphs otherwise -- reconstructs
/// a readable document from its elements in position order.
fn render_markdown(elements: &[Element]) -> String {
    let mut out = String::new();
    for element in elements {
        let Some(text) = element_text(element) else { continue };
        match element.kind() {
            ElementKind::Title => {
                out.push_str("# ");
                out.push_str(text);
            }
            ElementKind::Caption => {
                out.push_str("*");
                out.push_str(text);
                out.push('*');
            }
            _ => out.push_str(text),
        }
        out.push_str("\n\n");
    }
    out
}

/// One ChatML-framed exchange per document: a fixed system turn, the
/// reconstructed document as the user turn, no assistant turn -- downstream
/// fine-tuning supplies the completion this corpus is training toward.
fn render_chatml(document_id: FileId, elements: &[Element]) -> String {
    format!(
        "<|im_start|>system\nYou are given the contents of document {document_id}.<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n",
        document_body(elements)
    )
}

/// One Alpaca-style `{instruction, input, output}` JSON object per
/// document; `output` is left empty for the same reason ChatML's assistant
/// turn is omitted.
fn render_alpaca(document_id: FileId, elements: &[Element]) -> String {
    json!({
        "instruction": format!("Summarize document {document_id}."),
        "input": document_body(elements),
        "output": "",
    })
    .to_string()
        + "\n"
}

/// One ShareGPT-style `{conversations: [...]}` JSON object per document.
fn render_sharegpt(document_id: FileId, elements: &[Element]) -> String {
    json!({
        "conversations": [
            {"from": "system", "value": format!("Document {document_id}")},
            {"from": "human", "value": document_body(elements)},
        ],
    })
    .to_string()
        + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_domain::entities::{BoundingBox, ElementPayload, Provenance};

    fn provenance() -> Provenance {
        Provenance {
            processor_name: "test".into(),
            processor_version: "1.0.0".into(),
        }
    }

    fn element(document_id: FileId, position: u32, kind: ElementKind, text: &str) -> Element {
        Element::new(
            document_id,
            None,
            kind,
            position,
            BoundingBox { page: 1, x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
            ElementPayload::Text(text.into()),
            provenance(),
        )
        .unwrap()
    }

    #[test]
    fn markdown_renders_titles_as_headings() {
        let document_id = FileId::new();
        let elements = vec![
            element(document_id, 0, ElementKind::Title, "Introduction"),
            element(document_id, 1, ElementKind::Paragraph, "Body text."),
        ];
        let rendered = render_markdown(&elements);
        assert!(rendered.starts_with("# Introduction\n\n"));
        assert!(rendered.contains("Body text."));
    }

    #[test]
    fn jsonl_emits_one_line_per_text_bearing_element() {
        let document_id = FileId::new();
        let elements = vec![
            element(document_id, 0, ElementKind::Paragraph, "first"),
            element(document_id, 1, ElementKind::Image, ""),
        ];
        let rendered = render_jsonl(document_id, &elements[..1]);
        assert_eq!(rendered.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(rendered.trim()).unwrap();
        assert_eq!(parsed["text"], "first");
    }

    #[test]
    fn sharegpt_wraps_the_document_body_as_a_human_turn() {
        let document_id = FileId::new();
        let elements = vec![element(document_id, 0, ElementKind::Paragraph, "hello world")];
        let rendered = render_sharegpt(document_id, &elements);
        let parsed: serde_json::Value = serde_json::from_str(rendered.trim()).unwrap();
        assert_eq!(parsed["conversations"][1]["value"], "hello world");
    }
}

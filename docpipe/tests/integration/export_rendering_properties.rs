//! Property-based coverage for the exporter's JSON-emitting formats:
//! arbitrary element text (including quotes, newlines, and unicode) must
//! always round-trip through `serde_json` without corrupting the text or
//! breaking the one-line-per-record framing jsonl promises.

use docpipe::application::commands::ExportFormat;
use docpipe_domain::entities::{BoundingBox, Element, ElementKind, ElementPayload, Provenance};
use docpipe_domain::repositories::repository::Repository;
use docpipe_domain::value_objects::FileId;
use proptest::prelude::*;

use docpipe::application::services::Exporter;
use docpipe::infrastructure::repositories::in_memory::InMemoryRepository;
use std::sync::Arc;

fn element(document_id: FileId, text: &str) -> Element {
    Element::new(
        document_id,
        None,
        ElementKind::Paragraph,
        0,
        BoundingBox { page: 1, x: 0.0, y: 0.0, w: 1.0, h: 1.0 },
        ElementPayload::Text(text.to_string()),
        Provenance { processor_name: "test".into(), processor_version: "1.0.0".into() },
    )
    .unwrap()
}

async fn export_one(document_id: FileId, text: &str, format: ExportFormat) -> String {
    let repo: Arc<InMemoryRepository<Element>> = Arc::new(InMemoryRepository::new());
    repo.create(element(document_id, text)).await.unwrap();
    let exporter = Exporter::new(repo);
    exporter.export(&[document_id], format, None).await.unwrap()
}

proptest! {
    #[test]
    fn jsonl_export_always_parses_as_one_json_object_with_the_original_text(text in ".{0,200}") {
        let document_id = FileId::new();
        let rendered = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(export_one(document_id, &text, ExportFormat::Jsonl));

        prop_assert_eq!(rendered.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(rendered.trim()).unwrap();
        prop_assert_eq!(parsed["text"].as_str().unwrap(), text.as_str());
    }

    #[test]
    fn sharegpt_export_always_parses_and_preserves_the_human_turn(text in ".{0,200}") {
        let document_id = FileId::new();
        let rendered = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(export_one(document_id, &text, ExportFormat::ShareGpt));

        let parsed: serde_json::Value = serde_json::from_str(rendered.trim()).unwrap();
        prop_assert_eq!(parsed["conversations"][1]["value"].as_str().unwrap(), text.as_str());
    }
}

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_rag_core::{
    CharacterNgramEmbedder, EmbeddingIndex, IngestionOptions, LopdfExtractor, MemoryStore,
    RagPipeline, Reranker, RetrievalOptions, TermOverlapScorer, VectorStore,
};
use std::path::Path;
use std::sync::Arc;

/// Writes a PDF with one page per entry, each page showing its text on a single line.
pub fn write_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

pub async fn pipeline_over(
    store: Arc<dyn VectorStore>,
    ingestion: IngestionOptions,
) -> RagPipeline {
    let index = EmbeddingIndex::open(Arc::new(CharacterNgramEmbedder::default()), store)
        .await
        .expect("store matches the default embedder");

    RagPipeline::new(
        Box::new(LopdfExtractor),
        Arc::new(index),
        Reranker::new(Arc::new(TermOverlapScorer::default())),
        ingestion,
        RetrievalOptions::default(),
    )
}

pub async fn memory_pipeline() -> RagPipeline {
    pipeline_over(
        Arc::new(MemoryStore::new(pdf_rag_core::DEFAULT_EMBEDDING_DIMENSIONS)),
        IngestionOptions::default(),
    )
    .await
}

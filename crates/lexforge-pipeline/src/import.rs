//! Document import: raw text in, unit tree out.

use std::sync::Arc;

use lexforge_model::{AddressingMode, Document, SourceFormat, StructuralUnit, UnitId};
use lexforge_parse::StructuralParser;
use lexforge_store::{NewUnit, Store};

use crate::error::PipelineResult;

/// Parse raw document text and persist the resulting unit tree. Rich-text
/// sources arrive here already reduced to plain paragraphs; the declared
/// format is only recorded on the document row.
pub fn import_document(
    store: &Arc<Store>,
    name: &str,
    text: &str,
    source_format: SourceFormat,
    addressing: AddressingMode,
) -> PipelineResult<(Document, Vec<StructuralUnit>)> {
    let parsed = StructuralParser::new().parse(text);
    let document = store.create_document(name, source_format, addressing);

    // Arena parent indices become row ids as units are inserted in order.
    let mut ids: Vec<UnitId> = Vec::with_capacity(parsed.len());
    let mut units = Vec::with_capacity(parsed.len());
    for p in &parsed {
        let unit = store.insert_unit(NewUnit {
            document_id: document.id,
            unit_type: p.unit_type,
            parent_id: p.parent.map(|i| ids[i]),
            unit_number: p.unit_number.clone(),
            title: p.title.clone(),
            breadcrumb_path: p.breadcrumb_path.clone(),
            ordinal: p.ordinal,
            content: p.content.clone(),
        })?;
        ids.push(unit.id);
        units.push(unit);
    }
    tracing::info!(document = document.id.0, units = units.len(), "imported document");
    Ok((document, units))
}

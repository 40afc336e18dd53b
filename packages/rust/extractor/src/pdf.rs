//! PDF to plain text via lopdf.

use std::io::Write;

use lopdf::Document;
use tracing::debug;

use crate::ExtractError;

/// Extract the text of every page in `bytes`, pages joined by `"\n"`.
///
/// The bytes are spooled through a uniquely named temp file that is removed
/// when this function returns, whatever the outcome.
pub(crate) fn extract_from_bytes(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("paperdigest-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| ExtractError::Failed(format!("could not create temp file: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.flush())
        .map_err(|e| ExtractError::Failed(format!("could not write temp file: {e}")))?;

    let document = Document::load(tmp.path())
        .map_err(|e| ExtractError::Failed(format!("unreadable PDF: {e}")))?;

    let pages = document.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page in pages.keys() {
        let text = document
            .extract_text(&[*page])
            .map_err(|e| ExtractError::Failed(format!("page {page}: {e}")))?;
        texts.push(text.trim_end().to_string());
    }

    debug!(pages = texts.len(), bytes = bytes.len(), "pdf parsed");
    Ok(texts.join("\n"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// A minimal PDF with one page per entry of `lines`.
    pub(crate) fn sample_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_single_page() {
        let text = extract_from_bytes(&sample_pdf(&["Hello World!"])).expect("extract");
        assert!(text.contains("Hello World!"), "got {text:?}");
    }

    #[test]
    fn pages_are_joined_in_order() {
        let text = extract_from_bytes(&sample_pdf(&["First page", "Second page"])).expect("extract");
        let first = text.find("First page").expect("first page text");
        let second = text.find("Second page").expect("second page text");
        assert!(first < second);
        assert!(text[first..second].contains('\n'));
    }

    #[test]
    fn garbage_bytes_fail() {
        let err = extract_from_bytes(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Failed(_)));
    }
}

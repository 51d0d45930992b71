//! PDF upload validation using lopdf

use crate::errors::{AppError, Result};
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Validate an uploaded paper and return its page count.
///
/// Checks run cheapest first: extension, size, magic bytes, then a full
/// parse that must yield at least one page.
pub fn validate_pdf(file_name: &str, bytes: &[u8], max_bytes: usize) -> Result<usize> {
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(AppError::Validation {
            message: "Only PDF files are allowed".to_string(),
            field: Some("paper_document".to_string()),
        });
    }

    if bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::InvalidFormat {
            message: "File is not a PDF document".to_string(),
        });
    }

    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::InvalidFormat {
        message: format!("Failed to parse PDF: {}", e),
    })?;

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(AppError::InvalidFormat {
            message: "PDF document has no pages".to_string(),
        });
    }

    debug!(page_count = pages, size = bytes.len(), "PDF upload validated");
    Ok(pages)
}

/// Build a small valid PDF with `pages` blank pages
#[cfg(any(test, feature = "test-util"))]
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("in-memory PDF write");
    buf
}

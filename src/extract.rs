//! Text extraction for the supported document formats.
//!
//! The format is keyed by file extension: plain text and Markdown are read
//! as UTF-8, PDFs go through `pdf-extract`, and DOCX files are unzipped and
//! their `w:t` runs pulled out of `word/document.xml`. Extraction failures
//! are per-file errors; the ingestion pipeline logs and skips them rather
//! than aborting the batch.

use std::io::Read;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::{Document, DocumentMetadata};

/// Extensions accepted by [`load_documents`].
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["txt", "md", "pdf", "docx"];

/// Maximum decompressed bytes read from a ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from one file, dispatching on its extension.
/// Unknown extensions fail with [`Error::UnsupportedFormat`].
pub fn extract_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => std::fs::read_to_string(path).map_err(|e| Error::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        "pdf" => pdf_extract::extract_text(path).map_err(|e| Error::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        "docx" => {
            let bytes = std::fs::read(path).map_err(|e| Error::Extraction {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            extract_docx(&bytes).map_err(|reason| Error::Extraction {
                path: path.to_path_buf(),
                reason,
            })
        }
        _ => Err(Error::UnsupportedFormat(extension)),
    }
}

/// Pull the text runs out of a DOCX archive's `word/document.xml`.
/// Paragraphs (`w:p`) are separated by newlines, matching how the
/// document reads.
fn extract_docx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| "word/document.xml not found".to_string())?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| e.to_string())?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err("word/document.xml exceeds size limit".to_string());
        }
    }

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text_run => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"t" => in_text_run = false,
                    // Paragraph boundary.
                    b"p" => out.push('\n'),
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Load every supported document under `directory`, recursively.
///
/// Extraction failures for individual files are logged and skipped; they
/// never abort the batch. Documents whose extracted content is empty after
/// trimming are dropped. A missing directory is
/// [`Error::DirectoryNotFound`].
pub fn load_documents(directory: &Path) -> Result<Vec<Document>> {
    if !directory.is_dir() {
        return Err(Error::DirectoryNotFound(directory.to_path_buf()));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(directory)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        let content = match extract_text(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                continue;
            }
        };

        if content.trim().is_empty() {
            warn!(path = %path.display(), "skipping file with no extractable text");
            continue;
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        documents.push(Document {
            content,
            metadata: DocumentMetadata {
                source_path: path.display().to_string(),
                filename,
                file_type: extension,
            },
        });
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn unsupported_extension_returns_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.bin");
        fs::write(&path, b"binary").unwrap();
        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ext) if ext == "bin"));
    }

    #[test]
    fn reads_plain_text() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("note.txt");
        fs::write(&path, "hello from a text file").unwrap();
        assert_eq!(extract_text(&path).unwrap(), "hello from a text file");
    }

    #[test]
    fn invalid_docx_is_an_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.docx");
        fs::write(&path, b"not a zip archive").unwrap();
        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn invalid_pdf_is_an_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();
        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = load_documents(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound(_)));
    }

    #[test]
    fn load_skips_corrupt_and_empty_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.txt"), "some real content").unwrap();
        fs::write(tmp.path().join("empty.txt"), "   \n\t ").unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(tmp.path().join("ignored.xyz"), "wrong extension").unwrap();

        let docs = load_documents(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.filename, "good.txt");
        assert_eq!(docs[0].metadata.file_type, "txt");
    }

    #[test]
    fn load_recurses_into_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("nested");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("inner.md"), "# nested doc").unwrap();

        let docs = load_documents(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.filename, "inner.md");
    }
}

use crate::chunking::normalize_text;
use crate::extractor::PdfExtractor;
use crate::{IngestError, IngestFailurePolicy, PageDocument};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub pages: Vec<PageDocument>,
    pub skipped: Vec<SkippedPdf>,
}

/// Extracts and normalizes every page of every path, in path order.
///
/// Pages already read are kept when a later path fails; whether that failure aborts the call
/// is decided by `policy`.
pub fn load_pdfs<P: AsRef<Path>>(
    paths: &[P],
    extractor: &dyn PdfExtractor,
    policy: IngestFailurePolicy,
) -> Result<LoadReport, IngestError> {
    if paths.is_empty() {
        return Err(IngestError::InvalidArgument(
            "at least one pdf path is required".to_string(),
        ));
    }

    let mut report = LoadReport::default();

    for path in paths {
        let path = path.as_ref();
        match extractor.extract_pages(path) {
            Ok(pages) => {
                debug!(path = %path.display(), pages = pages.len(), "extracted pdf");
                report.pages.extend(pages.into_iter().map(|page| PageDocument {
                    text: normalize_text(&page.text),
                    ..page
                }));
            }
            Err(error) => match policy {
                IngestFailurePolicy::FailFast => return Err(error),
                IngestFailurePolicy::SkipUnreadable => {
                    warn!(path = %path.display(), reason = %error, "skipped pdf");
                    report.skipped.push(SkippedPdf {
                        path: path.to_path_buf(),
                        reason: error.to_string(),
                    });
                }
            },
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{discover_pdf_files, load_pdfs};
    use crate::extractor::PdfExtractor;
    use crate::{IngestError, IngestFailurePolicy, PageDocument};
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    /// Serves canned pages for paths ending in `good.pdf` and fails everything else.
    struct CannedExtractor;

    impl PdfExtractor for CannedExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageDocument>, IngestError> {
            if path.to_string_lossy().ends_with("good.pdf") {
                let source = path.to_string_lossy().to_string();
                Ok(vec![
                    PageDocument {
                        text: "First\tpage \u{2013} text\n".to_string(),
                        source: source.clone(),
                        page: 1,
                    },
                    PageDocument {
                        text: String::new(),
                        source,
                        page: 2,
                    },
                ])
            } else {
                Err(IngestError::PdfParse {
                    path: path.to_path_buf(),
                    reason: "corrupt".to_string(),
                })
            }
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"skip me"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn loading_requires_paths() {
        let paths: Vec<PathBuf> = Vec::new();
        let result = load_pdfs(&paths, &CannedExtractor, IngestFailurePolicy::SkipUnreadable);
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn loaded_pages_are_normalized_and_keep_metadata() {
        let report = load_pdfs(
            &["/uploads/good.pdf"],
            &CannedExtractor,
            IngestFailurePolicy::FailFast,
        )
        .unwrap();

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[0].text, "First page text");
        assert_eq!(report.pages[0].source, "/uploads/good.pdf");
        assert_eq!(report.pages[0].page, 1);
        assert_eq!(report.pages[1].page, 2);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn skip_policy_keeps_pages_from_readable_files() {
        let report = load_pdfs(
            &["/uploads/good.pdf", "/uploads/broken.pdf"],
            &CannedExtractor,
            IngestFailurePolicy::SkipUnreadable,
        )
        .unwrap();

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("broken.pdf")
        );
    }

    #[test]
    fn fail_fast_policy_surfaces_the_first_failure() {
        let result = load_pdfs(
            &["/uploads/good.pdf", "/uploads/broken.pdf"],
            &CannedExtractor,
            IngestFailurePolicy::FailFast,
        );

        match result {
            Err(IngestError::PdfParse { path, .. }) => {
                assert_eq!(path, PathBuf::from("/uploads/broken.pdf"))
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_file_on_disk_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("unreadable.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let report = load_pdfs(
            &[&path],
            &crate::extractor::LopdfExtractor,
            IngestFailurePolicy::SkipUnreadable,
        )?;

        assert!(report.pages.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, path);
        Ok(())
    }
}

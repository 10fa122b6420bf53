//! EPUB 2 writer. Renders a [`Novel`] into a scratch directory, then zips it.
//!
//! Archive layout:
//!
//! ```text
//! mimetype                      (stored, first entry)
//! META-INF/container.xml
//! OEBPS/style.css
//! OEBPS/Images/cover.jpg        (when a cover could be fetched)
//! OEBPS/Text/cover.xhtml        (when a cover could be fetched)
//! OEBPS/Text/chapter_0001.xhtml ...
//! OEBPS/content.opf
//! OEBPS/toc.ncx
//! ```

mod cover;
mod package;
mod templates;

use crate::model::Novel;
use crate::scraper::Fetcher;
use package::{
    chapter_href, Package, COVER_IMAGE_PATH, COVER_PAGE_PATH, NCX_PATH, OPF_PATH, STYLE_PATH,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MIMETYPE_ENTRY: &str = "mimetype";
const CONTAINER_ENTRY: &str = "META-INF/container.xml";

/// Errors from the EPUB writer.
///
/// Maps to CLI exit code 3.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: novel has no chapters.")]
    NoChapters,

    #[error("Cannot write EPUB: chapter number {number} at position {position} does not follow {previous}.")]
    ChapterOrder {
        position: usize,
        number: u32,
        previous: u32,
    },

    #[error("Cannot create scratch directory in {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write EPUB: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Writer settings.
#[derive(Debug, Clone, Default)]
pub struct EpubOptions {
    /// Parent of the per-book scratch directory. System temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

/// Write `novel` to `path` as an EPUB 2.0 archive.
///
/// If `novel.cover_url` is set the cover is fetched with `fetcher` and converted
/// to JPEG; cover problems are logged and the book is written without one. On any
/// error a partially written `path` is removed. The scratch directory is removed
/// on every exit path.
pub fn write_epub(
    novel: &Novel,
    path: &Path,
    fetcher: &dyn Fetcher,
    options: &EpubOptions,
) -> Result<(), EpubError> {
    validate_novel(novel)?;

    let mut workspace = Workspace::create(options.scratch_dir.as_deref())?;
    tracing::debug!(scratch = %workspace.root().display(), "Rendering EPUB");

    let identifier = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let cover = novel
        .cover_url
        .as_deref()
        .and_then(|url| cover::fetch_cover(fetcher, url));

    workspace.write(MIMETYPE_ENTRY, templates::MIMETYPE)?;
    workspace.write(CONTAINER_ENTRY, templates::CONTAINER_XML.as_bytes())?;
    workspace.write(STYLE_PATH, templates::STYLE_CSS.as_bytes())?;
    if let Some(jpeg) = &cover {
        workspace.write(COVER_IMAGE_PATH, jpeg)?;
        workspace.write(
            COVER_PAGE_PATH,
            templates::cover_xhtml(&novel.title).as_bytes(),
        )?;
    }
    for (i, chapter) in novel.chapters.iter().enumerate() {
        let page = templates::chapter_xhtml(&chapter.title, chapter.body_or_placeholder());
        workspace.write(&format!("OEBPS/{}", chapter_href(i + 1)), page.as_bytes())?;
    }

    let package = Package {
        novel,
        identifier: &identifier,
        generated: chrono::Utc::now(),
        has_cover: cover.is_some(),
    };
    workspace.write(OPF_PATH, package.render_opf().as_bytes())?;
    workspace.write(NCX_PATH, package.render_ncx().as_bytes())?;

    pack(&workspace, path)?;
    tracing::info!(
        path = %path.display(),
        chapters = novel.chapters.len(),
        cover = cover.is_some(),
        "EPUB written"
    );
    Ok(())
}

/// Filesystem-safe `.epub` file name for a novel title: keeps ASCII letters,
/// digits, spaces, dots and underscores. Falls back to `novel.epub`.
pub fn epub_filename(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_'))
        .collect();
    let stem = kept.trim().trim_start_matches('.').trim();
    if stem.is_empty() {
        "novel.epub".to_string()
    } else {
        format!("{}.epub", stem)
    }
}

fn validate_novel(novel: &Novel) -> Result<(), EpubError> {
    if novel.chapters.is_empty() {
        return Err(EpubError::NoChapters);
    }
    let mut previous = 0;
    for (i, chapter) in novel.chapters.iter().enumerate() {
        if chapter.number <= previous {
            return Err(EpubError::ChapterOrder {
                position: i + 1,
                number: chapter.number,
                previous,
            });
        }
        previous = chapter.number;
    }
    Ok(())
}

/// Randomly named scratch directory plus the archive entries written into it, in order.
struct Workspace {
    dir: TempDir,
    entries: Vec<String>,
}

impl Workspace {
    fn create(parent: Option<&Path>) -> Result<Self, EpubError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("lnbind-epub-");
            b
        };
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| EpubError::Scratch {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| EpubError::Scratch {
            path: parent
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir),
            source: e,
        })?;
        Ok(Self {
            dir,
            entries: Vec::new(),
        })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&mut self, entry: &str, data: &[u8]) -> Result<(), EpubError> {
        let path = self.root().join(entry);
        let io_err = |source: std::io::Error| EpubError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&path, data).map_err(io_err)?;
        self.entries.push(entry.to_string());
        Ok(())
    }

    /// Entries in archive order: `mimetype` first, the rest as written.
    fn archive_order(&self) -> impl Iterator<Item = &str> {
        let mimetype = self.entries.iter().filter(|e| *e == MIMETYPE_ENTRY);
        let rest = self.entries.iter().filter(|e| *e != MIMETYPE_ENTRY);
        mimetype.chain(rest).map(String::as_str)
    }
}

/// Zip the workspace into `path`, removing the file again if anything fails.
fn pack(workspace: &Workspace, path: &Path) -> Result<(), EpubError> {
    let file = File::create(path).map_err(|e| EpubError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let result = write_archive(file, workspace);
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove partial EPUB");
        }
    }
    result
}

fn write_archive(file: File, workspace: &Workspace) -> Result<(), EpubError> {
    let mut zip = ZipWriter::new(file);
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in workspace.archive_order() {
        let source = workspace.root().join(entry);
        let data = std::fs::read(&source).map_err(|e| EpubError::Io {
            path: source.clone(),
            source: e,
        })?;
        let options = if entry == MIMETYPE_ENTRY {
            options_stored
        } else {
            options_deflate
        };
        zip.start_file(entry, options)?;
        zip.write_all(&data)?;
    }
    zip.finish()?;
    Ok(())
}

use genpdf::elements::{Break, Image, Paragraph};
use genpdf::style::{Style, StyledString};
use genpdf::{Alignment, Document, SimplePageDecorator};
use std::path::{Path, PathBuf};

use crate::error::{GurneyError, Result};

/// Lays out a titled sequence of images as a PDF.
pub trait ReportComposer: Send + Sync {
    /// Composes a document with `title` on top and one captioned image per
    /// path, in the given order.
    ///
    /// # Errors
    ///
    /// [`GurneyError::Report`] when an image cannot be loaded or the document
    /// cannot be rendered.
    fn compose(&self, title: &str, images: &[PathBuf]) -> Result<Vec<u8>>;
}

/// Well-known font locations probed by [`GenpdfComposer::locate`].
const SYSTEM_FONTS: [(&str, &str); 3] = [
    ("/usr/share/fonts/truetype/liberation", "LiberationSans"),
    ("/usr/share/fonts/liberation", "LiberationSans"),
    ("/usr/share/fonts/truetype/dejavu", "DejaVuSans"),
];

/// [`ReportComposer`] backed by genpdf.
///
/// genpdf needs the four faces of a TrueType family on disk:
/// `{family}-Regular.ttf`, `-Bold`, `-Italic` and `-BoldItalic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenpdfComposer {
    pub fonts_dir: PathBuf,
    pub family: String,
}

impl GenpdfComposer {
    pub fn new(fonts_dir: impl Into<PathBuf>, family: impl Into<String>) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            family: family.into(),
        }
    }

    /// Uses the configured font when given, otherwise the first system family
    /// whose regular face exists.
    pub fn locate(fonts_dir: Option<&Path>, family: Option<&str>) -> Option<Self> {
        if let (Some(dir), Some(family)) = (fonts_dir, family) {
            return Some(Self::new(dir, family));
        }
        SYSTEM_FONTS
            .iter()
            .find(|(dir, family)| Path::new(dir).join(format!("{family}-Regular.ttf")).is_file())
            .map(|(dir, family)| Self::new(*dir, *family))
    }
}

impl ReportComposer for GenpdfComposer {
    fn compose(&self, title: &str, images: &[PathBuf]) -> Result<Vec<u8>> {
        let font = genpdf::fonts::from_files(&self.fonts_dir, &self.family, None).map_err(|e| {
            GurneyError::Report(format!(
                "Font family '{}' not usable from {}: {e}",
                self.family,
                self.fonts_dir.display()
            ))
        })?;

        let mut doc = Document::new(font);
        doc.set_title(title);
        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(30);
        doc.set_page_decorator(decorator);

        let title_style = Style::new().bold().with_font_size(16);
        doc.push(Paragraph::new(StyledString::new(title.to_owned(), title_style)));
        doc.push(Break::new(1));

        for path in images {
            let image = Image::from_path(path).map_err(|e| {
                GurneyError::Report(format!("Failed to load image {}: {e}", path.display()))
            })?;
            doc.push(image.with_alignment(Alignment::Center));

            let caption = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            doc.push(Paragraph::new(StyledString::new(
                caption,
                Style::new().italic().with_font_size(9),
            )));
            doc.push(Break::new(1));
        }

        let mut pdf = Vec::new();
        doc.render(&mut pdf)
            .map_err(|e| GurneyError::Report(format!("Failed to render PDF: {e}")))?;
        tracing::debug!(title, pages_images = images.len(), bytes = pdf.len(), "PDF composed");
        Ok(pdf)
    }
}

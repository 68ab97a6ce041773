// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Export of the diagram source and rendered output.

use std::fmt::{self, Write};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::render::Rendered;
use crate::util::escape_html;
use crate::viewport::Annotation;

/// The file name used when none is given, without its extension.
pub const FALLBACK_STEM: &str = "zone-topology";

/// An export format.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExportFormat {
    /// The raster rendering.
    Png,

    /// The vector rendering.
    Svg,

    /// The Mermaid source text.
    Mermaid,

    /// A printable HTML page embedding the rendering and listing the
    /// annotations.
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Mermaid => "mmd",
            Self::Html => "html",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Mermaid => "text/plain",
            Self::Html => "text/html",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            "mmd" | "code" | "txt" => Ok(Self::Mermaid),
            "html" => Ok(Self::Html),
            _ => Err(ExportError::UnsupportedFormat(text.trim().to_owned())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors that arise while exporting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExportError {
    /// The requested format is not known.
    UnsupportedFormat(String),

    /// The format needs rendered output, and there is none (or none in
    /// that form).
    MissingRendered(ExportFormat),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(format) => {
                write!(f, "unsupported topology export format \"{}\"", format)
            }
            Self::MissingRendered(format) => {
                write!(f, "no rendered output is available for {} export", format)
            }
        }
    }
}

impl std::error::Error for ExportError {}

/// Chooses the file name for an export. A blank `requested` name gives
/// `zone-topology.<ext>`; otherwise the format's extension is appended
/// unless `requested` already ends with it (in any case).
pub fn file_name(requested: &str, format: ExportFormat) -> String {
    let requested = requested.trim();
    let extension = format.extension();
    if requested.is_empty() {
        return format!("{}.{}", FALLBACK_STEM, extension);
    }
    let suffix = format!(".{}", extension);
    if requested.to_ascii_lowercase().ends_with(&suffix) {
        requested.to_owned()
    } else {
        format!("{}{}", requested, suffix)
    }
}

/// Produces the bytes of an export.
///
/// The Mermaid source is exported verbatim. The image formats export
/// the rendered output verbatim. HTML wraps the best available image
/// (raster if present, otherwise vector) in a printable page.
pub fn export(
    format: ExportFormat,
    title: &str,
    source: &str,
    rendered: Option<&Rendered>,
    annotations: &[Annotation],
) -> Result<Vec<u8>, ExportError> {
    let missing = || ExportError::MissingRendered(format);
    match format {
        ExportFormat::Mermaid => Ok(source.as_bytes().to_vec()),
        ExportFormat::Svg => Ok(rendered.ok_or_else(missing)?.svg.clone().into_bytes()),
        ExportFormat::Png => rendered
            .and_then(|rendered| rendered.png.clone())
            .ok_or_else(missing),
        ExportFormat::Html => {
            let rendered = rendered.ok_or_else(missing)?;
            Ok(html_document(title, rendered, annotations).into_bytes())
        }
    }
}

const PRINT_CSS: &str = "\
body { font-family: system-ui, sans-serif; margin: 24px; color: #0f172a; }
h1 { font-size: 18px; margin: 0 0 12px; }
img { max-width: 100%; height: auto; border: 1px solid #cbd5e1; }
ol { font-size: 13px; }
@media print {
  body { margin: 0; }
  img { border: none; page-break-inside: avoid; }
}
";

/// Produces the printable HTML page.
fn html_document(title: &str, rendered: &Rendered, annotations: &[Annotation]) -> String {
    let (mime, data) = match &rendered.png {
        Some(png) => (ExportFormat::Png.mime_type(), BASE64.encode(png)),
        None => (ExportFormat::Svg.mime_type(), BASE64.encode(rendered.svg.as_bytes())),
    };
    let title = escape_html(title);

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", title);
    let _ = writeln!(out, "<style>\n{}</style>", PRINT_CSS);
    out.push_str("</head>\n<body>\n");
    let _ = writeln!(out, "<h1>{}</h1>", title);
    let _ = writeln!(out, "<img alt=\"{}\" src=\"data:{};base64,{}\">", title, mime, data);
    if !annotations.is_empty() {
        out.push_str("<h2>Annotations</h2>\n<ol>\n");
        for annotation in annotations {
            let _ = writeln!(
                out,
                "<li>{} ({}, {})</li>",
                escape_html(&annotation.text),
                annotation.x.round(),
                annotation.y.round(),
            );
        }
        out.push_str("</ol>\n");
    }
    out.push_str("</body>\n</html>\n");
    out
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::Size;

    fn rendered(png: Option<Vec<u8>>) -> Rendered {
        Rendered {
            svg: "<svg/>".into(),
            png,
            bounds: Size::new(10.0, 10.0),
        }
    }

    #[test]
    fn formats_and_aliases() {
        assert_eq!("PNG".parse::<ExportFormat>(), Ok(ExportFormat::Png));
        assert_eq!("code".parse::<ExportFormat>(), Ok(ExportFormat::Mermaid));
        assert_eq!("txt".parse::<ExportFormat>(), Ok(ExportFormat::Mermaid));
        assert_eq!(
            "pdf".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat("pdf".into()))
        );
    }

    #[test]
    fn file_names() {
        assert_eq!(file_name("  ", ExportFormat::Svg), "zone-topology.svg");
        assert_eq!(file_name("example", ExportFormat::Mermaid), "example.mmd");
        assert_eq!(file_name("Example.PNG", ExportFormat::Png), "Example.PNG");
        assert_eq!(file_name("example.png", ExportFormat::Svg), "example.png.svg");
    }

    #[test]
    fn exports_are_verbatim() {
        let out = export(ExportFormat::Mermaid, "t", "flowchart LR\n", None, &[]).unwrap();
        assert_eq!(out, b"flowchart LR\n");
        let out = export(ExportFormat::Svg, "t", "", Some(&rendered(None)), &[]).unwrap();
        assert_eq!(out, b"<svg/>");
        let out = export(ExportFormat::Png, "t", "", Some(&rendered(Some(vec![1, 2]))), &[]).unwrap();
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn image_exports_need_rendered_output() {
        assert_eq!(
            export(ExportFormat::Png, "t", "", Some(&rendered(None)), &[]),
            Err(ExportError::MissingRendered(ExportFormat::Png))
        );
        assert_eq!(
            export(ExportFormat::Html, "t", "", None, &[]),
            Err(ExportError::MissingRendered(ExportFormat::Html))
        );
    }

    #[test]
    fn html_embeds_image_and_annotations() {
        let annotations = [Annotation {
            id: 0,
            x: 10.4,
            y: 20.6,
            text: "<primary> origin".into(),
        }];
        let out = export(
            ExportFormat::Html,
            "example.com & co",
            "",
            Some(&rendered(None)),
            &annotations,
        )
        .unwrap();
        let html = String::from_utf8(out).unwrap();
        assert!(html.contains("<title>example.com &amp; co</title>"));
        assert!(html.contains("src=\"data:image/svg+xml;base64,PHN2Zy8+\""));
        assert!(html.contains("<li>&lt;primary&gt; origin (10, 21)</li>"));
        assert!(html.contains("@media print"));
    }
}

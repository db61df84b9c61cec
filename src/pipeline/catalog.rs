//! Stage operation catalog: which operation is legal on which artifact type.
//!
//! The catalog is a pure lookup. Given the provider running a stage, the type
//! of the artifact entering it and the caller's choice, [`resolve`] returns
//! the endpoint to invoke and the type of artifact the stage will produce.
//! Because providers, types and choices are closed enums, the table is a
//! single `match` and there is no way to ask for a key that does not exist.
//!
//! | Provider  | Input | Choice            | Endpoint        | Output |
//! |-----------|-------|-------------------|-----------------|--------|
//! | PDF.co    | pdf   | convert-to-image  | ConvertToImage  | image  |
//! | PDF.co    | pdf   | optimize          | Optimize        | pdf    |
//! | PDF.co    | pdf   | split             | Split           | pdf    |
//! | ConvertAPI| pdf   | merge             | Merge           | pdf    |
//! | ConvertAPI| pdf   | convert-to-docx   | PdfToDocx       | docx   |
//! | ConvertAPI| pdf   | watermark         | Watermark       | pdf    |
//! | ConvertAPI| image | compress          | ImageCompress   | image  |
//! | ConvertAPI| image | rotate            | ImageRotate     | image  |
//! | ConvertAPI| image | convert-to-png    | ImageToPng      | image  |
//!
//! `docx` has no outgoing operations, so it can only ever be a final output.

use crate::error::PipelineError;
use crate::job::ArtifactType;
use crate::pipeline::provider::{EndpointKey, Provider};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Minimum page count for the split operation.
pub const SPLIT_MIN_PAGES: u32 = 2;

/// A transformation the caller can pick for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationChoice {
    ConvertToImage,
    Optimize,
    Split,
    Merge,
    ConvertToDocx,
    Watermark,
    Compress,
    Rotate,
    ConvertToPng,
}

impl OperationChoice {
    pub const ALL: [OperationChoice; 9] = [
        OperationChoice::ConvertToImage,
        OperationChoice::Optimize,
        OperationChoice::Split,
        OperationChoice::Merge,
        OperationChoice::ConvertToDocx,
        OperationChoice::Watermark,
        OperationChoice::Compress,
        OperationChoice::Rotate,
        OperationChoice::ConvertToPng,
    ];

    /// Stable identifier used on the command line and in logs.
    pub fn id(&self) -> &'static str {
        match self {
            OperationChoice::ConvertToImage => "convert-to-image",
            OperationChoice::Optimize => "optimize",
            OperationChoice::Split => "split",
            OperationChoice::Merge => "merge",
            OperationChoice::ConvertToDocx => "convert-to-docx",
            OperationChoice::Watermark => "watermark",
            OperationChoice::Compress => "compress",
            OperationChoice::Rotate => "rotate",
            OperationChoice::ConvertToPng => "convert-to-png",
        }
    }

    /// Label recorded in the job's operations summary.
    pub fn label(&self) -> &'static str {
        match self {
            OperationChoice::ConvertToImage => "Convert to JPG",
            OperationChoice::Optimize => "Optimize PDF",
            OperationChoice::Split => "Split PDF",
            OperationChoice::Merge => "Merge PDF",
            OperationChoice::ConvertToDocx => "Convert to DOCX",
            OperationChoice::Watermark => "Add watermark",
            OperationChoice::Compress => "Compress image",
            OperationChoice::Rotate => "Rotate image",
            OperationChoice::ConvertToPng => "Convert to PNG",
        }
    }
}

impl fmt::Display for OperationChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for OperationChoice {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        OperationChoice::ALL
            .into_iter()
            .find(|c| c.id() == wanted)
            .ok_or_else(|| PipelineError::Validation(format!("unknown operation '{}'", s.trim())))
    }
}

/// Result of resolving a choice: what to call and what comes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub endpoint: EndpointKey,
    pub output: ArtifactType,
}

const PDFCO_PDF: &[OperationChoice] = &[
    OperationChoice::ConvertToImage,
    OperationChoice::Optimize,
    OperationChoice::Split,
];

const CONVERTAPI_PDF: &[OperationChoice] = &[
    OperationChoice::Merge,
    OperationChoice::ConvertToDocx,
    OperationChoice::Watermark,
];

const CONVERTAPI_IMAGE: &[OperationChoice] = &[
    OperationChoice::Compress,
    OperationChoice::Rotate,
    OperationChoice::ConvertToPng,
];

/// Legal choices for `provider` on an artifact of type `input`, in menu order.
pub fn choices(provider: Provider, input: ArtifactType) -> &'static [OperationChoice] {
    match (provider, input) {
        (Provider::PdfCo, ArtifactType::Pdf) => PDFCO_PDF,
        (Provider::ConvertApi, ArtifactType::Pdf) => CONVERTAPI_PDF,
        (Provider::ConvertApi, ArtifactType::Image) => CONVERTAPI_IMAGE,
        (Provider::PdfCo, ArtifactType::Image)
        | (Provider::PdfCo, ArtifactType::Docx)
        | (Provider::ConvertApi, ArtifactType::Docx) => &[],
    }
}

/// Map a (provider, input type, choice) triple to its endpoint and output type.
pub fn resolve(
    provider: Provider,
    input: ArtifactType,
    choice: OperationChoice,
) -> Result<CatalogEntry, PipelineError> {
    use ArtifactType::{Docx, Image, Pdf};
    use OperationChoice as Op;

    let (endpoint, output) = match (provider, input, choice) {
        (Provider::PdfCo, Pdf, Op::ConvertToImage) => (EndpointKey::ConvertToImage, Image),
        (Provider::PdfCo, Pdf, Op::Optimize) => (EndpointKey::Optimize, Pdf),
        (Provider::PdfCo, Pdf, Op::Split) => (EndpointKey::Split, Pdf),
        (Provider::ConvertApi, Pdf, Op::Merge) => (EndpointKey::Merge, Pdf),
        (Provider::ConvertApi, Pdf, Op::ConvertToDocx) => (EndpointKey::PdfToDocx, Docx),
        (Provider::ConvertApi, Pdf, Op::Watermark) => (EndpointKey::Watermark, Pdf),
        (Provider::ConvertApi, Image, Op::Compress) => (EndpointKey::ImageCompress, Image),
        (Provider::ConvertApi, Image, Op::Rotate) => (EndpointKey::ImageRotate, Image),
        (Provider::ConvertApi, Image, Op::ConvertToPng) => (EndpointKey::ImageToPng, Image),
        _ => {
            return Err(PipelineError::Validation(format!(
                "{} does not offer '{}' for {} input",
                provider, choice, input
            )))
        }
    };
    Ok(CatalogEntry { endpoint, output })
}

/// Reject a split when the document is known to have fewer than two pages.
pub fn ensure_splittable(page_count: u32) -> Result<(), PipelineError> {
    if page_count < SPLIT_MIN_PAGES {
        return Err(PipelineError::Validation(format!(
            "split needs at least {SPLIT_MIN_PAGES} pages, document has {page_count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDERS: [Provider; 2] = [Provider::PdfCo, Provider::ConvertApi];
    const TYPES: [ArtifactType; 3] = [ArtifactType::Pdf, ArtifactType::Image, ArtifactType::Docx];

    fn expected(p: Provider, t: ArtifactType, c: OperationChoice) -> Option<ArtifactType> {
        use ArtifactType::*;
        use OperationChoice as Op;
        match (p, t, c) {
            (Provider::PdfCo, Pdf, Op::ConvertToImage) => Some(Image),
            (Provider::PdfCo, Pdf, Op::Optimize | Op::Split) => Some(Pdf),
            (Provider::ConvertApi, Pdf, Op::Merge | Op::Watermark) => Some(Pdf),
            (Provider::ConvertApi, Pdf, Op::ConvertToDocx) => Some(Docx),
            (Provider::ConvertApi, Image, Op::Compress | Op::Rotate | Op::ConvertToPng) => {
                Some(Image)
            }
            _ => None,
        }
    }

    #[test]
    fn every_triple_matches_the_static_table() {
        for p in PROVIDERS {
            for t in TYPES {
                for c in OperationChoice::ALL {
                    let got = resolve(p, t, c).ok().map(|e| e.output);
                    assert_eq!(got, expected(p, t, c), "{p} / {t} / {c}");
                }
            }
        }
    }

    #[test]
    fn choices_agree_with_resolve() {
        for p in PROVIDERS {
            for t in TYPES {
                let offered = choices(p, t);
                for c in OperationChoice::ALL {
                    assert_eq!(
                        offered.contains(&c),
                        resolve(p, t, c).is_ok(),
                        "{p} / {t} / {c}"
                    );
                }
            }
        }
    }

    #[test]
    fn docx_is_terminal() {
        assert!(choices(Provider::PdfCo, ArtifactType::Docx).is_empty());
        assert!(choices(Provider::ConvertApi, ArtifactType::Docx).is_empty());
    }

    #[test]
    fn resolve_reports_endpoint() {
        let entry = resolve(Provider::PdfCo, ArtifactType::Pdf, OperationChoice::Split).unwrap();
        assert_eq!(entry.endpoint, EndpointKey::Split);
        let entry =
            resolve(Provider::ConvertApi, ArtifactType::Image, OperationChoice::ConvertToPng)
                .unwrap();
        assert_eq!(entry.endpoint, EndpointKey::ImageToPng);
    }

    #[test]
    fn split_needs_two_pages() {
        assert!(ensure_splittable(0).is_err());
        assert!(ensure_splittable(1).is_err());
        assert!(ensure_splittable(2).is_ok());
    }

    #[test]
    fn choice_ids_round_trip_through_from_str() {
        for c in OperationChoice::ALL {
            assert_eq!(c.id().parse::<OperationChoice>().unwrap(), c);
        }
        assert!("explode".parse::<OperationChoice>().is_err());
    }
}

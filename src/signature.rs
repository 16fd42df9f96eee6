use crate::error::ComposeError;
use crate::pdf::{ImageData, ImageKind, decode_image_bytes, jpeg_component_count};
use crate::submission::FormData;
use base64::Engine;
use intake_form_contract::{SIGNATURE_DATA_SUFFIX, SignerSource, signature_field};
use std::collections::BTreeMap;
use std::path::Path;

const PNG_PREFIX: &str = "data:image/png";
const JPEG_PREFIXES: [&str; 2] = ["data:image/jpeg", "data:image/jpg"];

/// A captured signature in data-reference form:
/// `data:image/{png|jpeg};<encoding>,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload<'a> {
    pub kind: ImageKind,
    pub encoding: &'a str,
    pub payload: &'a str,
}

impl<'a> SignaturePayload<'a> {
    /// `None` for empty values and for anything without a recognized image prefix.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let raw = raw.trim();
        let (kind, rest) = if let Some(rest) = raw.strip_prefix(PNG_PREFIX) {
            (ImageKind::Png, rest)
        } else {
            let rest = JPEG_PREFIXES
                .iter()
                .find_map(|prefix| raw.strip_prefix(prefix))?;
            (ImageKind::Jpeg, rest)
        };
        // `data:image/pngx` is a different media type.
        if !(rest.is_empty() || rest.starts_with(';') || rest.starts_with(',')) {
            return None;
        }
        let (header, payload) = rest.split_once(',').unwrap_or((rest, ""));
        Some(Self {
            kind,
            encoding: header.trim_start_matches(';'),
            payload,
        })
    }

    pub fn is_base64(&self) -> bool {
        self.encoding
            .split(';')
            .any(|part| part.eq_ignore_ascii_case("base64"))
    }

    pub fn decode_bytes(&self) -> Option<Vec<u8>> {
        if self.payload.is_empty() {
            return None;
        }
        if self.is_base64() {
            let compact: String = self
                .payload
                .chars()
                .filter(|ch| !ch.is_ascii_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .ok()
        } else {
            Some(self.payload.as_bytes().to_vec())
        }
    }

    /// Decodes the image by its declared type. Payloads that do not decode yield `None`.
    pub fn decode_image(&self) -> Option<ImageData> {
        let bytes = self.decode_bytes()?;
        decode_image_bytes(&bytes, self.kind)
    }
}

pub fn is_recognized_signature(raw: &str) -> bool {
    SignaturePayload::parse(raw).is_some()
}

/// Signature values supplied by deployment rather than the submission,
/// such as the office signature on the arbitration agreement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureRegistry {
    pre_registered: BTreeMap<String, String>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a data reference for a signer the form contract marks as pre-registered.
    pub fn register(&mut self, key: &str, data_reference: impl Into<String>) -> Result<(), ComposeError> {
        let Some(def) = signature_field(key) else {
            return Err(ComposeError::Configuration(format!(
                "unknown signer key: {key}"
            )));
        };
        if def.source != SignerSource::PreRegistered {
            return Err(ComposeError::Configuration(format!(
                "signer {key} is captured on the form and cannot be pre-registered"
            )));
        }
        let data_reference = data_reference.into();
        if !is_recognized_signature(&data_reference) {
            return Err(ComposeError::Configuration(format!(
                "signature for {key} is not an image data reference"
            )));
        }
        self.pre_registered.insert(key.to_string(), data_reference);
        Ok(())
    }

    pub fn with_signer(mut self, key: &str, data_reference: impl Into<String>) -> Result<Self, ComposeError> {
        self.register(key, data_reference)?;
        Ok(self)
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.pre_registered.contains_key(key)
    }

    /// Raw signature value for a signer. Pre-registered signers never read the
    /// submission; everyone else reads `<key>Data`.
    pub fn resolve<'a>(&'a self, key: &str, form_data: &'a FormData) -> Option<&'a str> {
        match signature_field(key) {
            Some(def) if def.source == SignerSource::PreRegistered => {
                self.pre_registered.get(key).map(String::as_str)
            }
            Some(def) => form_data.text(def.data_key),
            None => form_data.text(&format!("{key}{SIGNATURE_DATA_SUFFIX}")),
        }
    }

    pub fn resolve_payload<'a>(&'a self, key: &str, form_data: &'a FormData) -> Option<SignaturePayload<'a>> {
        self.resolve(key, form_data).and_then(SignaturePayload::parse)
    }

    /// A date may be stamped when it has no dependency, or when its linked
    /// signature resolves to a recognized image data reference.
    pub fn should_stamp_date(&self, dependency_key: Option<&str>, form_data: &FormData) -> bool {
        match dependency_key {
            None => true,
            Some(key) => self.resolve_payload(key, form_data).is_some(),
        }
    }
}

pub fn encode_data_reference(bytes: &[u8], kind: ImageKind) -> String {
    format!(
        "data:{};base64,{}",
        kind.mime(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Reads a PNG or JPEG file into a data reference. With `as_jpeg`, PNG input is
/// flattened onto white and re-encoded as JPEG, and four-component JPEG input
/// is re-encoded as RGB.
pub fn data_reference_from_file(path: &Path, as_jpeg: bool) -> Result<String, ComposeError> {
    let bytes = std::fs::read(path)?;
    let kind = match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Png) => ImageKind::Png,
        Ok(image::ImageFormat::Jpeg) => ImageKind::Jpeg,
        _ => {
            return Err(ComposeError::Configuration(format!(
                "{} is not a PNG or JPEG image",
                path.display()
            )));
        }
    };
    let needs_transcode = match kind {
        ImageKind::Png => true,
        ImageKind::Jpeg => !matches!(jpeg_component_count(&bytes), Some(1 | 3)),
    };
    if as_jpeg && needs_transcode {
        let jpeg = transcode_to_jpeg(&bytes)?;
        return Ok(encode_data_reference(&jpeg, ImageKind::Jpeg));
    }
    Ok(encode_data_reference(&bytes, kind))
}

fn transcode_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, ComposeError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| ComposeError::Configuration(format!("signature image: {err}")))?;
    let rgba = decoded.to_rgba8();
    let mut flat = image::RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(flat.pixels_mut()) {
        let [r, g, b, a] = src.0;
        let blend = |c: u8| -> u8 {
            let a = a as u16;
            ((c as u16 * a + 255 * (255 - a)) / 255) as u8
        };
        dst.0 = [blend(r), blend(g), blend(b)];
    }
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90);
    flat.write_with_encoder(encoder)
        .map_err(|err| ComposeError::Configuration(format!("signature image: {err}")))?;
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;
    use intake_form_contract::OFFICE_SIGNER;

    #[test]
    fn parse_recognizes_png_and_jpeg_prefixes() {
        let png = SignaturePayload::parse("data:image/png;base64,AAAA").expect("png");
        assert_eq!(png.kind, ImageKind::Png);
        assert!(png.is_base64());
        assert_eq!(png.payload, "AAAA");
        let jpg = SignaturePayload::parse("data:image/jpg;base64,AAAA").expect("jpg");
        assert_eq!(jpg.kind, ImageKind::Jpeg);
        let jpeg = SignaturePayload::parse("data:image/jpeg,raw").expect("jpeg");
        assert!(!jpeg.is_base64());
    }

    #[test]
    fn parse_treats_other_values_as_absent() {
        for raw in [
            "",
            "   ",
            "not-a-data-uri",
            "data:image/gif;base64,AAAA",
            "data:image/pngx;base64,AAAA",
            "data:text/plain,hello",
            "image/png;base64,AAAA",
        ] {
            assert!(SignaturePayload::parse(raw).is_none(), "{raw}");
        }
    }

    #[test]
    fn decode_image_accepts_real_images_and_rejects_garbage() {
        let png = png_reference();
        let payload = SignaturePayload::parse(&png).expect("parse");
        let image = payload.decode_image().expect("decode png");
        assert_eq!((image.width, image.height), (8, 4));
        assert!(image.alpha.is_some());

        let jpeg = jpeg_reference();
        let image = SignaturePayload::parse(&jpeg)
            .and_then(|p| p.decode_image())
            .expect("decode jpeg");
        assert_eq!(image.filter, Some("DCTDecode"));

        let garbage = SignaturePayload::parse("data:image/png;base64,AAAA").expect("parse");
        assert!(garbage.decode_image().is_none());
        let broken = SignaturePayload::parse("data:image/png;base64,!!!").expect("parse");
        assert!(broken.decode_bytes().is_none());
    }

    #[test]
    fn date_dependency_follows_signature_presence() {
        let registry = SignatureRegistry::new();
        let data = FormData::new()
            .with("sigTermsPatientData", "")
            .with("sigTermsRepData", png_reference())
            .with("sigPrivacyRepData", "garbage");
        assert!(!registry.should_stamp_date(Some("sigTermsPatient"), &data));
        assert!(registry.should_stamp_date(Some("sigTermsRep"), &data));
        assert!(!registry.should_stamp_date(Some("sigPrivacyRep"), &data));
        assert!(!registry.should_stamp_date(Some("sigConsentPatient"), &data));
        assert!(registry.should_stamp_date(None, &data));
    }

    #[test]
    fn unknown_signers_fall_back_to_data_suffix() {
        let registry = SignatureRegistry::new();
        let data = FormData::new().with("sigWitnessData", "data:image/png;base64,AAAA");
        assert!(registry.should_stamp_date(Some("sigWitness"), &data));
    }

    #[test]
    fn office_signer_resolves_from_registry_only() {
        let submitted = FormData::new().with("sigArbOfficeData", png_reference());
        let empty = SignatureRegistry::new();
        assert!(!empty.should_stamp_date(Some(OFFICE_SIGNER), &submitted));

        let registry = SignatureRegistry::new()
            .with_signer(OFFICE_SIGNER, jpeg_reference())
            .expect("register");
        assert!(registry.is_registered(OFFICE_SIGNER));
        let no_answers = FormData::new();
        assert!(registry.should_stamp_date(Some(OFFICE_SIGNER), &no_answers));
        let payload = registry
            .resolve_payload(OFFICE_SIGNER, &no_answers)
            .expect("payload");
        assert_eq!(payload.kind, ImageKind::Jpeg);
    }

    #[test]
    fn register_rejects_patient_signers_and_bad_references() {
        let mut registry = SignatureRegistry::new();
        let err = registry
            .register("sigTermsPatient", png_reference())
            .expect_err("patient signer");
        assert!(err.is_configuration());
        assert!(registry.register("sigNobody", png_reference()).is_err());
        assert!(registry.register(OFFICE_SIGNER, "hello").is_err());
    }

    #[test]
    fn data_reference_from_file_keeps_or_transcodes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sig.png");
        std::fs::write(&path, png_bytes(6, 3)).expect("write");

        let kept = data_reference_from_file(&path, false).expect("png");
        assert!(kept.starts_with("data:image/png;base64,"));
        let jpeg = data_reference_from_file(&path, true).expect("jpeg");
        assert!(jpeg.starts_with("data:image/jpeg;base64,"));
        let image = SignaturePayload::parse(&jpeg)
            .and_then(|p| p.decode_image())
            .expect("decode");
        assert_eq!((image.width, image.height), (6, 3));

        let cmyk = dir.path().join("scan.jpg");
        std::fs::write(&cmyk, cmyk_jpeg_bytes()).expect("write");
        let as_is = data_reference_from_file(&cmyk, false).expect("cmyk");
        let as_is = SignaturePayload::parse(&as_is)
            .and_then(|p| p.decode_bytes())
            .expect("bytes");
        assert_eq!(jpeg_component_count(&as_is), Some(4));
        let rgb = data_reference_from_file(&cmyk, true).expect("rgb");
        let rgb = SignaturePayload::parse(&rgb)
            .and_then(|p| p.decode_bytes())
            .expect("bytes");
        assert_eq!(jpeg_component_count(&rgb), Some(3));

        let text = dir.path().join("sig.txt");
        std::fs::write(&text, b"hello").expect("write");
        assert!(data_reference_from_file(&text, false).is_err());
    }
}

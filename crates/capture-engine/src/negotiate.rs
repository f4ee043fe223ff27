//! Output codec negotiation.

use phoneframe_common::config::CapabilityClass;
use phoneframe_common::error::{PhoneframeError, PhoneframeResult};

/// Codec candidates, most preferred first.
pub const CODEC_PREFERENCE: &[&str] = &["video/mp4", "video/webm;codecs=vp9", "video/webm"];

/// Encoder bit-rate for the standard capability class.
pub const STANDARD_BITRATE_BPS: u32 = 15_000_000;

/// Encoder bit-rate for constrained environments.
pub const CONSTRAINED_BITRATE_BPS: u32 = 8_000_000;

/// Answers whether the hosting environment can encode a mime candidate.
pub trait CapabilityProbe {
    fn is_supported(&self, mime: &str) -> bool;
}

/// Container family of a negotiated codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    /// Classify a mime candidate.
    pub fn from_mime(mime: &str) -> Self {
        if mime.to_ascii_lowercase().contains("mp4") {
            Container::Mp4
        } else {
            Container::Webm
        }
    }

    /// File extension used for delivery.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }
}

/// The outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCodec {
    pub mime: String,
    pub container: Container,
    pub bitrate_bps: u32,
}

/// Bit-rate for a capability class.
pub fn bitrate_for(class: CapabilityClass) -> u32 {
    match class {
        CapabilityClass::Standard => STANDARD_BITRATE_BPS,
        CapabilityClass::Constrained => CONSTRAINED_BITRATE_BPS,
    }
}

/// Pick the first candidate in `preference` the probe supports.
pub fn negotiate<S: AsRef<str>>(
    probe: &dyn CapabilityProbe,
    preference: &[S],
    class: CapabilityClass,
) -> PhoneframeResult<NegotiatedCodec> {
    for candidate in preference {
        let mime = candidate.as_ref();
        let supported = probe.is_supported(mime);
        tracing::debug!(mime, supported, "Probed codec candidate");
        if supported {
            let codec = NegotiatedCodec {
                mime: mime.to_string(),
                container: Container::from_mime(mime),
                bitrate_bps: bitrate_for(class),
            };
            tracing::info!(
                mime = %codec.mime,
                bitrate_bps = codec.bitrate_bps,
                class = class.as_str(),
                "Negotiated output codec"
            );
            return Ok(codec);
        }
    }

    Err(PhoneframeError::NoSupportedCodec {
        candidates: preference.iter().map(|c| c.as_ref().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoneframe_common::error::ErrorKind;
    use proptest::prelude::*;
    use std::cell::RefCell;

    struct ListProbe {
        supported: Vec<&'static str>,
        asked: RefCell<Vec<String>>,
    }

    impl ListProbe {
        fn new(supported: Vec<&'static str>) -> Self {
            Self {
                supported,
                asked: RefCell::new(Vec::new()),
            }
        }
    }

    impl CapabilityProbe for ListProbe {
        fn is_supported(&self, mime: &str) -> bool {
            self.asked.borrow_mut().push(mime.to_string());
            self.supported.iter().any(|s| *s == mime)
        }
    }

    #[test]
    fn test_first_supported_candidate_wins() {
        let probe = ListProbe::new(vec!["video/mp4", "video/webm"]);
        let codec = negotiate(&probe, CODEC_PREFERENCE, CapabilityClass::Standard).unwrap();
        assert_eq!(codec.mime, "video/mp4");
        assert_eq!(codec.container, Container::Mp4);
        assert_eq!(codec.bitrate_bps, 15_000_000);
        assert_eq!(probe.asked.borrow().len(), 1);
    }

    #[test]
    fn test_second_candidate_when_first_unsupported() {
        let probe = ListProbe::new(vec!["video/webm;codecs=vp9"]);
        let codec = negotiate(&probe, CODEC_PREFERENCE, CapabilityClass::Constrained).unwrap();
        assert_eq!(codec.mime, "video/webm;codecs=vp9");
        assert_eq!(codec.container, Container::Webm);
        assert_eq!(codec.bitrate_bps, 8_000_000);
    }

    #[test]
    fn test_nothing_supported() {
        let probe = ListProbe::new(vec![]);
        let err = negotiate(&probe, CODEC_PREFERENCE, CapabilityClass::Standard).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSupportedCodec);
        assert_eq!(probe.asked.borrow().len(), CODEC_PREFERENCE.len());
    }

    #[test]
    fn test_constrained_is_roughly_half() {
        let ratio = CONSTRAINED_BITRATE_BPS as f64 / STANDARD_BITRATE_BPS as f64;
        assert!((0.4..=0.6).contains(&ratio));
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(Container::from_mime("video/MP4").extension(), "mp4");
        assert_eq!(Container::from_mime("video/webm;codecs=vp9").extension(), "webm");
    }

    proptest! {
        #[test]
        fn prop_picks_earliest_supported(mask in 1u8..8) {
            let supported: Vec<&'static str> = CODEC_PREFERENCE
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, m)| *m)
                .collect();
            let probe = ListProbe::new(supported.clone());
            let codec = negotiate(&probe, CODEC_PREFERENCE, CapabilityClass::Standard).unwrap();
            let first = CODEC_PREFERENCE.iter().find(|m| supported.contains(*m)).unwrap();
            prop_assert_eq!(codec.mime.as_str(), *first);
        }
    }
}

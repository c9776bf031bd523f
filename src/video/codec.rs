//! Codec candidates and capability negotiation.
//!
//! The target platform accepts two codec families, each listed most-compatible
//! variant first:
//!
//! | Rank | Codec string | Family |
//! |---|---|---|
//! | 1 | `avc1.42001E` | H.264 Baseline |
//! | 2 | `avc1.4D401E` | H.264 Main |
//! | 3 | `hev1.1.6.L93.B0` | H.265 Main |
//! | 4 | `hvc1.1.6.L93.B0` | H.265 Main (parameter sets in sample entry) |
//!
//! Negotiation walks the list, probes each entry and returns the first one the
//! backend reports as supported. Probe errors count as "unsupported".
//! Results can be memoized in a [`SupportCache`], which is owned by whoever
//! creates it and must be invalidated explicitly when the environment changes.

use super::backend::VideoBackend;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Codec family, which decides bitstream handling and MP4 sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    Avc,
    Hevc,
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avc => f.write_str("avc"),
            Self::Hevc => f.write_str("hevc"),
        }
    }
}

/// A concrete codec string such as `avc1.42001E`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecId {
    pub family: CodecFamily,
    pub name: String,
}

impl CodecId {
    pub fn new(family: CodecFamily, name: impl Into<String>) -> Self {
        Self {
            family,
            name: name.into(),
        }
    }

    /// H.264 Baseline, the universal fallback.
    pub fn avc_baseline() -> Self {
        Self::new(CodecFamily::Avc, "avc1.42001E")
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Platform-accepted codecs, most preferred first.
///
/// Both H.265 strings negotiate, but the muxer writes either one as a
/// `hev1` sample entry.
pub fn codec_candidates() -> Vec<CodecId> {
    vec![
        CodecId::avc_baseline(),
        CodecId::new(CodecFamily::Avc, "avc1.4D401E"),
        CodecId::new(CodecFamily::Hevc, "hev1.1.6.L93.B0"),
        CodecId::new(CodecFamily::Hevc, "hvc1.1.6.L93.B0"),
    ]
}

/// Memoized probe answers keyed by codec and resolution.
///
/// Not global: the owner decides its lifetime and calls [`invalidate`]
/// when platform capability may have changed.
///
/// [`invalidate`]: SupportCache::invalidate
#[derive(Debug, Default)]
pub struct SupportCache {
    entries: Mutex<HashMap<(String, u32, u32), bool>>,
}

impl SupportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, codec: &CodecId, width: u32, height: u32) -> Option<bool> {
        self.entries
            .lock()
            .ok()?
            .get(&(codec.name.clone(), width, height))
            .copied()
    }

    pub fn insert(&self, codec: &CodecId, width: u32, height: u32, supported: bool) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((codec.name.clone(), width, height), supported);
        }
    }

    /// Forget every remembered answer.
    pub fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ask the backend whether `codec` can encode `width`x`height`.
///
/// A probe error is logged and treated as unsupported.
pub fn probe(
    backend: &dyn VideoBackend,
    codec: &CodecId,
    width: u32,
    height: u32,
    cache: Option<&SupportCache>,
) -> bool {
    if let Some(hit) = cache.and_then(|c| c.get(codec, width, height)) {
        return hit;
    }
    let supported = match backend.probe(codec, width, height) {
        Ok(supported) => supported,
        Err(e) => {
            tracing::debug!(codec = %codec, error = %e, "codec probe failed");
            false
        }
    };
    if let Some(cache) = cache {
        cache.insert(codec, width, height, supported);
    }
    supported
}

/// First candidate the backend supports, if any.
pub fn negotiate(
    backend: &dyn VideoBackend,
    candidates: &[CodecId],
    width: u32,
    height: u32,
    cache: Option<&SupportCache>,
) -> Option<CodecId> {
    candidates
        .iter()
        .find(|codec| probe(backend, codec, width, height, cache))
        .cloned()
}

/// Result of negotiation with the baseline fallback applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub codec: CodecId,
    /// True when no candidate probed as supported and baseline was assumed.
    pub fell_back: bool,
}

/// Negotiate, falling back to H.264 Baseline when nothing probes as supported.
///
/// Returns `None` only when `allow_fallback` is false and no candidate
/// is supported. A fallback is logged at WARN so it is never silent.
pub fn negotiate_with_fallback(
    backend: &dyn VideoBackend,
    candidates: &[CodecId],
    width: u32,
    height: u32,
    cache: Option<&SupportCache>,
    allow_fallback: bool,
) -> Option<Negotiated> {
    if let Some(codec) = negotiate(backend, candidates, width, height, cache) {
        return Some(Negotiated {
            codec,
            fell_back: false,
        });
    }
    if !allow_fallback {
        return None;
    }
    let codec = CodecId::avc_baseline();
    tracing::warn!(
        backend = backend.name(),
        codec = %codec,
        "no codec candidate probed as supported; assuming baseline"
    );
    Some(Negotiated {
        codec,
        fell_back: true,
    })
}

/// Whether any candidate codec is supported at `width`x`height`.
pub fn is_video_supported(backend: &dyn VideoBackend, width: u32, height: u32) -> bool {
    negotiate(backend, &codec_candidates(), width, height, None).is_some()
}

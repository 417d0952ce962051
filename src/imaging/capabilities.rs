//! Process-wide capability registry.
//!
//! Built once from an engine's [`Capabilities`] at startup and read without
//! locking afterwards. Request code only ever sees `&CapabilityRegistry`.

use super::engine::{Capabilities, EngineError, ImageEngine};
use crate::options::ImageFormat;
use serde::Serialize;
use std::sync::OnceLock;

static REGISTRY: OnceLock<CapabilityRegistry> = OnceLock::new();

/// Which formats can be decoded/encoded and whether smart crop is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CapabilityRegistry {
    capabilities: Capabilities,
}

impl CapabilityRegistry {
    /// Query an engine for its capabilities.
    ///
    /// An engine that can decode nothing or encode nothing is unusable, and
    /// that is reported as an initialization failure.
    pub fn from_engine(engine: &impl ImageEngine) -> Result<Self, EngineError> {
        let capabilities = engine.capabilities();
        if capabilities.decode.is_empty() {
            return Err(EngineError::Init("engine reports no decodable formats".into()));
        }
        if capabilities.encode.is_empty() {
            return Err(EngineError::Init("engine reports no encodable formats".into()));
        }
        Ok(Self { capabilities })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn can_decode(&self, format: ImageFormat) -> bool {
        self.capabilities.decode.contains(&format)
    }

    pub fn can_encode(&self, format: ImageFormat) -> bool {
        self.capabilities.encode.contains(&format)
    }

    pub fn supports_smart_crop(&self) -> bool {
        self.capabilities.smart_crop
    }

    pub fn decode_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.capabilities.decode.iter().copied()
    }

    pub fn encode_formats(&self) -> impl Iterator<Item = ImageFormat> + '_ {
        self.capabilities.encode.iter().copied()
    }
}

/// Build the process-wide registry from `engine`.
///
/// Must be called once before any request is served. Calling it again is an
/// error: the registry never changes after startup.
pub fn init(engine: &impl ImageEngine) -> Result<&'static CapabilityRegistry, EngineError> {
    let registry = CapabilityRegistry::from_engine(engine)?;
    REGISTRY
        .set(registry)
        .map_err(|_| EngineError::Init("capability registry already initialized".into()))?;
    REGISTRY
        .get()
        .ok_or_else(|| EngineError::Init("capability registry unavailable".into()))
}

/// The process-wide registry, if [`init`] has run.
pub fn global() -> Option<&'static CapabilityRegistry> {
    REGISTRY.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::engine::tests::MockEngine;

    #[test]
    fn registry_reports_engine_capabilities() {
        let engine = MockEngine::new(10, 10);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();

        assert!(registry.can_decode(ImageFormat::Gif));
        assert!(registry.can_encode(ImageFormat::Webp));
        assert!(!registry.can_encode(ImageFormat::Gif));
        assert!(registry.supports_smart_crop());
    }

    #[test]
    fn registry_without_smart_crop() {
        let engine = MockEngine::new(10, 10).without_smart_crop();
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        assert!(!registry.supports_smart_crop());
    }

    #[test]
    fn registry_rejects_engine_without_encoders() {
        let mut engine = MockEngine::new(10, 10);
        engine.capabilities.encode.clear();
        let err = CapabilityRegistry::from_engine(&engine).unwrap_err();
        assert!(matches!(err, EngineError::Init(_)));
    }

    #[test]
    fn format_lists_are_sorted() {
        let engine = MockEngine::new(10, 10);
        let registry = CapabilityRegistry::from_engine(&engine).unwrap();
        let decode: Vec<_> = registry.decode_formats().collect();
        assert_eq!(
            decode,
            vec![
                ImageFormat::Jpeg,
                ImageFormat::Png,
                ImageFormat::Webp,
                ImageFormat::Gif
            ]
        );
    }

    #[test]
    fn global_init_is_once() {
        let engine = MockEngine::new(10, 10);
        // Other tests in this binary never touch the global slot.
        let first = init(&engine);
        assert!(first.is_ok());
        assert!(global().is_some());
        assert!(init(&engine).is_err());
    }
}

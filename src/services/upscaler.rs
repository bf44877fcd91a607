use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;

/// Output of a compute invocation.
#[derive(Debug)]
pub struct ComputeOutput {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Contract for the long-running compute step. Implementations must be safe
/// to call concurrently from multiple worker contexts.
pub trait ComputeEngine: Send + Sync {
    fn is_ready(&self) -> bool;
    fn compute(&self, input: &[u8]) -> Result<ComputeOutput, ComputeError>;
}

const SUPPORTED_FACTORS: [u32; 3] = [2, 3, 4];

/// Upscaling engine backed by the `image` crate: decode, Catmull-Rom resize
/// to `factor` times the original dimensions, encode as PNG.
pub struct Upscaler {
    factor: u32,
    ready: bool,
}

impl Upscaler {
    /// Build the engine once at process start. An unsupported factor yields
    /// a not-ready engine; workers then fail every job loudly instead of
    /// silently substituting a different scale.
    pub fn new(factor: u32) -> Self {
        let ready = SUPPORTED_FACTORS.contains(&factor);
        if !ready {
            tracing::error!(factor, "Unsupported upscale factor, engine not ready");
        }
        Self { factor, ready }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }
}

impl ComputeEngine for Upscaler {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn compute(&self, input: &[u8]) -> Result<ComputeOutput, ComputeError> {
        if !self.ready {
            return Err(ComputeError::NotReady);
        }

        let img = image::load_from_memory(input).map_err(ComputeError::Decode)?;
        let (width, height) = (img.width(), img.height());

        let upscaled = img.resize_exact(
            width * self.factor,
            height * self.factor,
            FilterType::CatmullRom,
        );

        let mut out = Cursor::new(Vec::new());
        upscaled
            .write_to(&mut out, ImageFormat::Png)
            .map_err(ComputeError::Encode)?;

        Ok(ComputeOutput {
            bytes: out.into_inner(),
            content_type: "image/png",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("compute engine is not ready")]
    NotReady,

    #[error("failed to decode input image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode upscaled image: {0}")]
    Encode(#[source] image::ImageError),
}

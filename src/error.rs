use thiserror::Error;

/// Errors that can occur while vectorizing an image.
///
/// Oracle degeneracy (no regions, no clusters) and rejected fits are not
/// errors; those paths skip the affected unit of work instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VectorizeError {
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rasterizer exited with {status}: {stderr}")]
    Rasterize { status: String, stderr: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rendered raster is {actual_w}x{actual_h}, expected {expected_w}x{expected_h}")]
    RasterSize {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("invalid svg: {0}")]
    InvalidSvg(String),

    #[error("png encoding failed: {0}")]
    Png(String),
}

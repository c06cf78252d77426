//! Encoding modules for the HLS packager
//!
//! [`Transcoder`] is the seam between the pipeline and the encoder binary:
//! production code drives ffmpeg, tests substitute a fake that writes files.

pub mod ffmpeg;

pub use ffmpeg::{build_hls_command, prepare_output_dir, EncodeError, Ffmpeg, HlsEncodeParams};

use crate::thumbnails::{MosaicRequest, PosterRequest, ThumbnailError};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Everything the pipeline asks of the external encoder
pub trait Transcoder: Send + Sync {
    /// Encode one rendition into HLS segments plus its own playlist
    fn encode_rendition(
        &self,
        params: &HlsEncodeParams,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), EncodeError>> + Send;

    /// Extract the single poster frame
    fn capture_poster(
        &self,
        request: &PosterRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), ThumbnailError>> + Send;

    /// Sample, scale and tile preview frames into mosaic sheets
    fn render_mosaic(
        &self,
        request: &MosaicRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), ThumbnailError>> + Send;
}

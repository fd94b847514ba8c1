//! Group-avatar grid composition: 2x2 grid
//! for 2-4 member avatars, 3x3 for 5-9 (extras beyond 9 are dropped), 256px
//! tiles, 4px gap, 8px padding, gray placeholders for missing/failed input,
//! content-addressed output filename, optional strict mode.
//!
//! Built on the `image` crate's resize (`Lanczos3`) and PNG encode, plus
//! `sha2::Sha256` for content-addressed hashing.

mod error;
mod source;

use std::path::PathBuf;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};

pub use error::{Error, Result};

/// Placeholder tile color for a missing or unfetchable source — mid-gray,
/// fully opaque.
const PLACEHOLDER_RGBA: [u8; 4] = [200, 200, 200, 255];

/// Composes group avatars out of member avatar sources.
#[derive(Clone)]
pub struct GroupAvatarComposer {
    http: reqwest::Client,
    source_root: String,
    output_dir: PathBuf,
    url_prefix: String,
    tile_px: u32,
    gap_px: u32,
    padding_px: u32,
    strict: bool,
}

impl GroupAvatarComposer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_root: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        tile_px: u32,
        gap_px: u32,
        padding_px: u32,
        strict: bool,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            source_root: source_root.into(),
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into(),
            tile_px,
            gap_px,
            padding_px,
            strict,
        }
    }

    /// Build from [`relaychat_config::AvatarConfig`]-shaped fields. Kept
    /// free of a direct `relaychat-config` dependency so this crate stays
    /// usable standalone; the gateway binary wires the fields across.
    pub fn from_parts(
        source_root: &str,
        output_dir: &str,
        url_prefix: &str,
        tile_px: u32,
        gap_px: u32,
        padding_px: u32,
        strict: bool,
    ) -> Self {
        Self::new(source_root, PathBuf::from(output_dir), url_prefix, tile_px, gap_px, padding_px, strict)
    }

    /// Compose a group avatar from up to 9 member avatar sources (URLs or
    /// paths relative to `source_root`), writing the result under
    /// `output_dir` and returning its public URL. Grid is 2x2 for 2-4
    /// sources, 3x3 for 5-9; anything past the 9th is dropped.
    ///
    /// In strict mode, every source failing to resolve is an error. In the
    /// default lenient mode, failed sources become gray placeholder tiles —
    /// the composition only fails if every source failed.
    pub async fn compose(&self, sources: &[String]) -> Result<String> {
        if sources.is_empty() {
            return Err(Error::invalid_input("at least one avatar source is required"));
        }

        let grid_dim: u32 = if sources.len() <= 4 { 2 } else { 3 };
        let cell_count = (grid_dim * grid_dim) as usize;
        let used: Vec<&String> = sources.iter().take(cell_count).collect();

        let mut tiles = Vec::with_capacity(used.len());
        let mut failures = 0usize;
        for source in &used {
            match source::resolve_lenient(&self.http, &self.source_root, source).await {
                Some(bytes) => match self.decode_tile(&bytes) {
                    Ok(img) => tiles.push(img),
                    Err(_) => {
                        failures += 1;
                        tiles.push(self.placeholder_tile());
                    },
                },
                None => {
                    failures += 1;
                    tiles.push(self.placeholder_tile());
                },
            }
        }

        if self.strict && failures > 0 {
            return Err(Error::invalid_input(format!(
                "{failures} of {} avatar sources failed to resolve (strict mode)",
                used.len()
            )));
        }
        if failures == used.len() {
            return Err(Error::invalid_input("every avatar source failed to resolve"));
        }

        let canvas = self.compose_grid(grid_dim, &tiles);
        let filename = self.content_addressed_filename(sources);
        self.write_canvas(&canvas, &filename).await?;

        Ok(format!("{}{}", self.url_prefix, filename))
    }

    fn decode_tile(&self, bytes: &[u8]) -> Result<DynamicImage> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::external("decoding avatar source", e))?;
        Ok(img.resize_to_fill(self.tile_px, self.tile_px, FilterType::Lanczos3))
    }

    fn placeholder_tile(&self) -> DynamicImage {
        let mut img = RgbaImage::new(self.tile_px, self.tile_px);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgba(PLACEHOLDER_RGBA);
        }
        DynamicImage::ImageRgba8(img)
    }

    fn compose_grid(&self, grid_dim: u32, tiles: &[DynamicImage]) -> RgbaImage {
        let span = |n: u32| self.padding_px * 2 + n * self.tile_px + n.saturating_sub(1) * self.gap_px;
        let canvas_side = span(grid_dim);
        let mut canvas = RgbaImage::new(canvas_side, canvas_side);
        for pixel in canvas.pixels_mut() {
            *pixel = image::Rgba([255, 255, 255, 255]);
        }

        for (index, tile) in tiles.iter().enumerate() {
            let row = index as u32 / grid_dim;
            let col = index as u32 % grid_dim;
            let x = self.padding_px + col * (self.tile_px + self.gap_px);
            let y = self.padding_px + row * (self.tile_px + self.gap_px);
            image::imageops::overlay(&mut canvas, tile, x as i64, y as i64);
        }

        canvas
    }

    /// Content-addressed filename: `sha256` over the sorted, deduplicated
    /// source list, so the same membership always composes to the same
    /// file regardless of iteration order.
    fn content_addressed_filename(&self, sources: &[String]) -> String {
        let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut hasher = Sha256::new();
        for source in sorted {
            hasher.update(source.as_bytes());
            hasher.update(b"\0");
        }
        format!("{:x}.png", hasher.finalize())
    }

    async fn write_canvas(&self, canvas: &RgbaImage, filename: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Error::external("creating avatar output directory", e))?;

        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| Error::external("encoding composed avatar", e))?;

        let path = self.output_dir.join(filename);
        tokio::fs::write(&path, buf.into_inner())
            .await
            .map_err(|e| Error::external(format!("writing composed avatar to {}", path.display()), e))
    }
}

use std::path::Path;

use crate::error::{GpuError, RenderError};
use crate::gpu::{
    Gpu, ShaderResourceView, Texture, TextureDesc, TextureFormat, TextureUsage, ViewDimension,
};

/// A sampled 2D texture and the view shaders read it through.
#[derive(Clone, Debug)]
pub struct ImageTexture {
    texture: Texture,
    view: ShaderResourceView,
}

impl ImageTexture {
    /// Create a texture from tightly packed RGBA8 data.
    pub fn from_rgba(
        gpu: &mut dyn Gpu,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<Self, GpuError> {
        let texture = gpu.create_texture(
            &TextureDesc {
                label,
                width,
                height,
                array_layers: 1,
                format: TextureFormat::Rgba8UnormSrgb,
                usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
                cube_compatible: false,
            },
            Some(data),
        )?;
        let view = gpu.create_shader_resource_view(&texture, ViewDimension::D2)?;
        Ok(Self { texture, view })
    }

    /// Linear (non-sRGB) data such as normal maps.
    pub fn from_rgba_linear(
        gpu: &mut dyn Gpu,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Result<Self, GpuError> {
        let texture = gpu.create_texture(
            &TextureDesc {
                label,
                width,
                height,
                array_layers: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::SHADER_RESOURCE | TextureUsage::COPY_DST,
                cube_compatible: false,
            },
            Some(data),
        )?;
        let view = gpu.create_shader_resource_view(&texture, ViewDimension::D2)?;
        Ok(Self { texture, view })
    }

    /// Load a texture from an image file.
    pub fn from_file(gpu: &mut dyn Gpu, path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let img = image::open(path)?.to_rgba8();
        let (width, height) = img.dimensions();
        log::debug!("loaded texture {} ({}x{})", path.display(), width, height);
        Ok(Self::from_rgba(gpu, &img, width, height, &path.display().to_string())?)
    }

    /// Load a texture from encoded image bytes.
    pub fn from_bytes(gpu: &mut dyn Gpu, bytes: &[u8], label: &str) -> Result<Self, RenderError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(gpu, &img, width, height, label)?)
    }

    /// A 1x1 texture of one color.
    pub fn solid(gpu: &mut dyn Gpu, rgba: [u8; 4], label: &str) -> Result<Self, GpuError> {
        Self::from_rgba_linear(gpu, &rgba, 1, 1, label)
    }

    /// Two-color checkerboard with `cells` squares per side.
    pub fn checkerboard(
        gpu: &mut dyn Gpu,
        size: u32,
        cells: u32,
        a: [u8; 4],
        b: [u8; 4],
    ) -> Result<Self, GpuError> {
        let cell = (size / cells.max(1)).max(1);
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
                data.extend_from_slice(&color);
            }
        }
        Self::from_rgba(gpu, &data, size, size, "checkerboard")
    }

    /// Blocky value noise around a base color.
    pub fn noise(gpu: &mut dyn Gpu, size: u32, seed: u32, base: [u8; 3]) -> Result<Self, GpuError> {
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let variation = (hash(x / 4, y / 4, seed) % 48) as i32 - 24;
                for channel in base {
                    data.push((channel as i32 + variation).clamp(0, 255) as u8);
                }
                data.push(255);
            }
        }
        Self::from_rgba(gpu, &data, size, size, "noise")
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn view(&self) -> &ShaderResourceView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }
}

fn hash(x: u32, y: u32, seed: u32) -> u32 {
    let mut h = seed;
    h = h.wrapping_add(x.wrapping_mul(374761393));
    h = h.wrapping_add(y.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessGpu;

    #[test]
    fn from_file_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let mut gpu = HeadlessGpu::new(8, 8);
        let texture = ImageTexture::from_file(&mut gpu, &path).unwrap();
        assert_eq!((texture.width(), texture.height()), (3, 2));
        assert!(gpu.is_live(texture.view().id()));
    }

    #[test]
    fn missing_file_is_image_error() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let result = ImageTexture::from_file(&mut gpu, "no/such/texture.png");
        assert!(matches!(result, Err(RenderError::Image(_))));
    }

    #[test]
    fn view_keeps_texture_alive() {
        let mut gpu = HeadlessGpu::new(8, 8);
        let texture = ImageTexture::solid(&mut gpu, [255; 4], "white").unwrap();
        let texture_id = texture.texture().id();
        let view = texture.view().clone();
        drop(texture);
        assert!(gpu.is_live(texture_id));
        drop(view);
        assert!(!gpu.is_live(texture_id));
    }
}

/// 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0 };
    pub const WHITE: Rgba = Rgba { r: 255, g: 255, b: 255, a: 255 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// HSL (hue in degrees, saturation and lightness in percent) plus alpha in
/// 0..=1, as CSS `hsla()` interprets it.
pub fn hsla_to_rgba(hue: f32, saturation: f32, lightness: f32, alpha: f32) -> Rgba {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let l = (lightness / 100.0).clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;

    Rgba {
        r: to_byte(r),
        g: to_byte(g),
        b: to_byte(b),
        a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
    }
}

/// The rectangular drawing target the render loop paints on.
pub trait DrawSurface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn clear(&mut self);

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba);

    fn draw_text(&mut self, x: f32, y: f32, text: &str, color: Rgba);

    /// Moves existing pixels `pixels` columns to the left, clearing the
    /// columns uncovered on the right.
    fn shift_left(&mut self, pixels: u32);
}

/// A piece of text queued for the presenter, in surface coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub color: Rgba,
}

/// CPU-side RGBA8 surface. Rectangles are rasterized into the buffer; text
/// is recorded and painted by the presenter on top of the uploaded image.
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    background: Rgba,
    text_runs: Vec<TextRun>,
    dirty: bool,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(width, height, Rgba::TRANSPARENT)
    }

    pub fn with_background(width: u32, height: u32, background: Rgba) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
            background,
            text_runs: Vec::new(),
            dirty: true,
        };
        canvas.clear();
        canvas
    }

    pub fn background(&self) -> Rgba {
        self.background
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let i = self.offset(x, y);
        Rgba {
            r: self.pixels[i],
            g: self.pixels[i + 1],
            b: self.pixels[i + 2],
            a: self.pixels[i + 3],
        }
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn text_runs(&self) -> &[TextRun] {
        &self.text_runs
    }

    /// Returns whether the canvas changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    fn blend(&mut self, i: usize, color: Rgba) {
        let alpha = color.a as f32 / 255.0;
        if alpha >= 1.0 {
            self.pixels[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, 255]);
            return;
        }
        let over = |src: u8, dst: u8| (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8;
        self.pixels[i] = over(color.r, self.pixels[i]);
        self.pixels[i + 1] = over(color.g, self.pixels[i + 1]);
        self.pixels[i + 2] = over(color.b, self.pixels[i + 2]);
        let dst_alpha = self.pixels[i + 3] as f32 / 255.0;
        self.pixels[i + 3] = ((alpha + dst_alpha * (1.0 - alpha)) * 255.0).round() as u8;
    }

    /// Clamps a span to `0..limit` after rounding to whole pixels.
    fn span(start: f32, length: f32, limit: u32) -> (u32, u32) {
        let (a, b) = if length >= 0.0 { (start, start + length) } else { (start + length, start) };
        let clip = |v: f32| v.round().clamp(0.0, limit as f32) as u32;
        (clip(a), clip(b))
    }
}

impl DrawSurface for PixelCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        let bg = self.background;
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&[bg.r, bg.g, bg.b, bg.a]);
        }
        self.text_runs.clear();
        self.dirty = true;
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return;
        }
        let (x0, x1) = Self::span(x, width, self.width);
        let (y0, y1) = Self::span(y, height, self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                let i = self.offset(px, py);
                self.blend(i, color);
            }
        }
        if x0 < x1 && y0 < y1 {
            self.dirty = true;
        }
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str, color: Rgba) {
        self.text_runs.push(TextRun {
            x,
            y,
            text: text.to_string(),
            color,
        });
        self.dirty = true;
    }

    fn shift_left(&mut self, pixels: u32) {
        let shift = pixels.min(self.width) as usize;
        if shift == 0 {
            return;
        }
        let row_bytes = self.width as usize * 4;
        let bg = self.background;
        for row in self.pixels.chunks_exact_mut(row_bytes) {
            row.copy_within(shift * 4.., 0);
            for px in row[row_bytes - shift * 4..].chunks_exact_mut(4) {
                px.copy_from_slice(&[bg.r, bg.g, bg.b, bg.a]);
            }
        }
        self.dirty = true;
    }
}

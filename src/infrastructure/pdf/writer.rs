//! Minimal image-only PDF writer
//!
//! JPEG files with one or three components are embedded unchanged
//! (`/DCTDecode`). Everything else is decoded and stored as zlib-compressed
//! raw samples (`/FlateDecode`), so no page is re-encoded lossily.
//!
//! Pages are sized from the image's own density (JFIF for JPEG, `pHYs` for
//! PNG) and fall back to the encoder's DPI. A JPEG's EXIF orientation is
//! applied when it is a plain rotation; mirrored orientations are ignored.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, GenericImageView};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::application::errors::AssemblyError;
use crate::domain::traits::PdfEncoder;

/// Resolution assumed for images without density metadata
const DEFAULT_DPI: f64 = 96.0;

/// [`PdfEncoder`] that writes one full-bleed page per image
#[derive(Debug, Clone)]
pub struct ImagePdfEncoder {
    dpi: f64,
}

impl Default for ImagePdfEncoder {
    fn default() -> Self {
        Self { dpi: DEFAULT_DPI }
    }
}

impl ImagePdfEncoder {
    pub fn with_dpi(dpi: f64) -> Self {
        Self { dpi: if dpi > 0.0 { dpi } else { DEFAULT_DPI } }
    }
}

impl PdfEncoder for ImagePdfEncoder {
    fn encode(&self, images: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        if images.is_empty() {
            return Err(AssemblyError::Encode("no pages to write".to_string()));
        }

        let file = File::create(output)?;
        let mut pdf = PdfWriter::new(BufWriter::new(file), images.len());
        pdf.write_header()?;

        for path in images {
            let page = PageImage::load(path)?;
            pdf.write_page(&page, self.dpi)?;
        }

        let mut out = pdf.finish()?;
        out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
}

impl ColorSpace {
    fn pdf_name(&self) -> &'static str {
        match self {
            ColorSpace::Gray => "/DeviceGray",
            ColorSpace::Rgb => "/DeviceRGB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Dct,
    Flate,
}

impl Filter {
    fn pdf_name(&self) -> &'static str {
        match self {
            Filter::Dct => "/DCTDecode",
            Filter::Flate => "/FlateDecode",
        }
    }
}

/// Clockwise turn applied when the page is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Rotation {
    #[default]
    Upright,
    Cw90,
    Half,
    Ccw90,
}

impl Rotation {
    fn from_exif(orientation: u16) -> Self {
        match orientation {
            3 => Rotation::Half,
            6 => Rotation::Cw90,
            8 => Rotation::Ccw90,
            _ => Rotation::Upright,
        }
    }

    /// Page size and image matrix for an image of `w` x `h` points
    fn placement(&self, w: f64, h: f64) -> (f64, f64, [f64; 6]) {
        match self {
            Rotation::Upright => (w, h, [w, 0.0, 0.0, h, 0.0, 0.0]),
            Rotation::Half => (w, h, [-w, 0.0, 0.0, -h, w, h]),
            Rotation::Cw90 => (h, w, [0.0, -w, h, 0.0, 0.0, w]),
            Rotation::Ccw90 => (h, w, [0.0, w, -h, 0.0, h, 0.0]),
        }
    }
}

/// Image samples ready to be embedded as an XObject
struct PageImage {
    width: u32,
    height: u32,
    color: ColorSpace,
    filter: Filter,
    data: Vec<u8>,
    /// Horizontal and vertical dots per inch, when the file says
    density: Option<(f64, f64)>,
    rotation: Rotation,
}

impl PageImage {
    fn load(path: &Path) -> Result<Self, AssemblyError> {
        let bytes = std::fs::read(path)?;

        let jpeg = jpeg_info(&bytes);
        let (density, rotation) = match &jpeg {
            Some(info) => (info.density, Rotation::from_exif(info.orientation)),
            None => (png_density(&bytes), Rotation::Upright),
        };

        if let Some(info) = jpeg {
            let color = match info.components {
                1 => Some(ColorSpace::Gray),
                3 => Some(ColorSpace::Rgb),
                _ => None,
            };
            if let Some(color) = color {
                return Ok(Self {
                    width: info.width as u32,
                    height: info.height as u32,
                    color,
                    filter: Filter::Dct,
                    data: bytes,
                    density,
                    rotation,
                });
            }
        }

        let decoded = image::load_from_memory(&bytes).map_err(|e| AssemblyError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut page = Self::from_raster(&decoded).map_err(AssemblyError::Io)?;
        page.density = density;
        page.rotation = rotation;
        Ok(page)
    }

    fn from_raster(img: &DynamicImage) -> io::Result<Self> {
        let (width, height) = img.dimensions();
        let color_type = img.color();
        let (color, raw) = if !color_type.has_color() && !color_type.has_alpha() {
            (ColorSpace::Gray, img.to_luma8().into_raw())
        } else if color_type.has_alpha() {
            (ColorSpace::Rgb, flatten_on_white(img))
        } else {
            (ColorSpace::Rgb, img.to_rgb8().into_raw())
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let data = encoder.finish()?;

        Ok(Self {
            width,
            height,
            color,
            filter: Filter::Flate,
            data,
            density: None,
            rotation: Rotation::Upright,
        })
    }

    /// Page size and image matrix in points
    fn placement(&self, default_dpi: f64) -> (f64, f64, [f64; 6]) {
        let (x_dpi, y_dpi) = self.density.unwrap_or((default_dpi, default_dpi));
        let w = self.width as f64 * 72.0 / x_dpi;
        let h = self.height as f64 * 72.0 / y_dpi;
        self.rotation.placement(w, h)
    }
}

/// Composite RGBA samples over a white background
fn flatten_on_white(img: &DynamicImage) -> Vec<u8> {
    let rgba = img.to_rgba8();
    let mut out = Vec::with_capacity((rgba.width() * rgba.height() * 3) as usize);
    for px in rgba.pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u16;
        for c in [r, g, b] {
            let blended = (c as u16 * a + 255 * (255 - a)) / 255;
            out.push(blended as u8);
        }
    }
    out
}

/// What the encoder needs from a JPEG's header segments
#[derive(Debug, Clone, PartialEq)]
struct JpegInfo {
    width: u16,
    height: u16,
    components: u8,
    density: Option<(f64, f64)>,
    /// EXIF orientation, `1` when absent
    orientation: u16,
}

/// Walk a JPEG's segments up to the frame header
fn jpeg_info(bytes: &[u8]) -> Option<JpegInfo> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut density = None;
    let mut orientation = 1;
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        // fill bytes
        if marker == 0xFF {
            i += 1;
            continue;
        }
        // start of scan or end of image before any frame header
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let seg = bytes.get(i + 4..i + 2 + len)?;

        match marker {
            0xE0 => {
                if let Some(jfif) = seg.strip_prefix(b"JFIF\0") {
                    density = jfif_density(jfif);
                }
            }
            0xE1 => {
                if let Some(tiff) = seg.strip_prefix(b"Exif\0\0") {
                    orientation = exif_orientation(tiff).unwrap_or(1);
                }
            }
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if seg.len() < 6 {
                    return None;
                }
                return Some(JpegInfo {
                    height: u16::from_be_bytes([seg[1], seg[2]]),
                    width: u16::from_be_bytes([seg[3], seg[4]]),
                    components: seg[5],
                    density,
                    orientation,
                });
            }
            _ => {}
        }
        i += 2 + len;
    }
    None
}

/// Density from a JFIF APP0 body (after the identifier)
fn jfif_density(jfif: &[u8]) -> Option<(f64, f64)> {
    let units = *jfif.get(2)?;
    let x = u16::from_be_bytes([*jfif.get(3)?, *jfif.get(4)?]) as f64;
    let y = u16::from_be_bytes([*jfif.get(5)?, *jfif.get(6)?]) as f64;
    if x == 0.0 || y == 0.0 {
        return None;
    }
    match units {
        1 => Some((x, y)),
        2 => Some((x * 2.54, y * 2.54)),
        // aspect ratio only
        _ => None,
    }
}

/// Orientation tag (0x0112) from IFD0 of an EXIF TIFF block
fn exif_orientation(tiff: &[u8]) -> Option<u16> {
    let big_endian = match tiff.get(0..2)? {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };
    let read_u16 = |at: usize| -> Option<u16> {
        let b = tiff.get(at..at + 2)?;
        Some(if big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    };
    let read_u32 = |at: usize| -> Option<u32> {
        let b = tiff.get(at..at + 4)?;
        Some(if big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    };

    let ifd = read_u32(4)? as usize;
    let count = read_u16(ifd)? as usize;
    (0..count)
        .map(|n| ifd + 2 + n * 12)
        .find(|entry| read_u16(*entry) == Some(0x0112))
        .and_then(|entry| read_u16(entry + 8))
}

/// Density from a PNG `pHYs` chunk given in pixels per metre
fn png_density(bytes: &[u8]) -> Option<(f64, f64)> {
    if !bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return None;
    }
    let mut i = 8;
    while i + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]) as usize;
        let kind = &bytes[i + 4..i + 8];
        let data = bytes.get(i + 8..i + 8 + len)?;
        match kind {
            b"pHYs" if data.len() >= 9 && data[8] == 1 => {
                let x = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64;
                let y = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as f64;
                if x == 0.0 || y == 0.0 {
                    return None;
                }
                return Some((x * 0.0254, y * 0.0254));
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }
        i += 12 + len;
    }
    None
}

/// Tracks byte offsets so the cross-reference table can be written at the end
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Object layout: 1 catalog, 2 page tree, then three objects per page
/// (page, content stream, image)
struct PdfWriter<W: Write> {
    out: CountingWriter<W>,
    offsets: Vec<u64>,
    page_ids: Vec<usize>,
    total_pages: usize,
}

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;

impl<W: Write> PdfWriter<W> {
    fn new(inner: W, total_pages: usize) -> Self {
        Self {
            out: CountingWriter { inner, written: 0 },
            offsets: vec![0; 2 + total_pages * 3],
            page_ids: Vec::with_capacity(total_pages),
            total_pages,
        }
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.out.write_all(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")
    }

    fn begin_object(&mut self, id: usize) -> io::Result<()> {
        self.offsets[id - 1] = self.out.written;
        write!(self.out, "{} 0 obj\n", id)
    }

    fn write_page(&mut self, image: &PageImage, dpi: f64) -> io::Result<()> {
        let index = self.page_ids.len();
        if index >= self.total_pages {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "more pages than declared"));
        }
        let page_id = 3 + index * 3;
        let content_id = page_id + 1;
        let image_id = page_id + 2;

        let (width_pt, height_pt, matrix) = image.placement(dpi);

        self.begin_object(page_id)?;
        write!(
            self.out,
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {:.2} {:.2}] /Resources << /XObject << /Im0 {} 0 R >> >> /Contents {} 0 R >>\nendobj\n",
            PAGES_ID, width_pt, height_pt, image_id, content_id
        )?;

        let matrix: Vec<String> = matrix.iter().map(|v| format!("{:.2}", v)).collect();
        let content = format!("q {} cm /Im0 Do Q", matrix.join(" "));
        self.begin_object(content_id)?;
        write!(self.out, "<< /Length {} >>\nstream\n{}\nendstream\nendobj\n", content.len(), content)?;

        self.begin_object(image_id)?;
        write!(
            self.out,
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {} /Length {} >>\nstream\n",
            image.width,
            image.height,
            image.color.pdf_name(),
            image.filter.pdf_name(),
            image.data.len()
        )?;
        self.out.write_all(&image.data)?;
        self.out.write_all(b"\nendstream\nendobj\n")?;

        self.page_ids.push(page_id);
        Ok(())
    }

    fn finish(mut self) -> io::Result<W> {
        if self.page_ids.len() != self.total_pages {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "fewer pages than declared"));
        }

        self.begin_object(CATALOG_ID)?;
        write!(self.out, "<< /Type /Catalog /Pages {} 0 R >>\nendobj\n", PAGES_ID)?;

        let kids: Vec<String> = self.page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
        self.begin_object(PAGES_ID)?;
        write!(
            self.out,
            "<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
            kids.join(" "),
            self.page_ids.len()
        )?;

        let xref_offset = self.out.written;
        write!(self.out, "xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1)?;
        for offset in &self.offsets {
            write!(self.out, "{:010} 00000 n \n", offset)?;
        }
        write!(
            self.out,
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len() + 1,
            CATALOG_ID,
            xref_offset
        )?;
        Ok(self.out.inner)
    }
}

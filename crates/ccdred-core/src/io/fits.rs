use std::borrow::Cow;
use std::ffi::CString;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use memmap2::Mmap;
use ndarray::Array2;
use tracing::{debug, warn};

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE, FITS_HISTORY_WIDTH, FITS_STRING_WIDTH};
use crate::error::{CcdError, Result};
use crate::frame::PixelData;
use crate::header::{Header, HeaderValue};

use super::FrameStore;

/// Keywords describing the data layout. Written from the array itself,
/// never copied from a user header.
const STRUCTURAL_KEYWORDS: [&str; 10] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE",
    "END",
];

/// cfitsio keeps process-wide state; calls into it are serialized.
static CFITSIO: Mutex<()> = Mutex::new(());

/// Layout of a primary HDU, parsed from its header.
#[derive(Clone, Debug)]
pub struct FitsLayout {
    pub header: Header,
    pub bitpix: i32,
    /// NAXIS1, NAXIS2, ... (NAXIS1 varies fastest).
    pub axes: Vec<usize>,
    /// Byte offset of the data unit.
    pub data_offset: usize,
}

impl FitsLayout {
    pub fn bytes_per_value(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    /// (rows, cols) of the image. Accepts NAXIS = 2, or NAXIS = 3 with a
    /// single plane.
    pub fn image_shape(&self) -> Result<(usize, usize)> {
        match self.axes.as_slice() {
            [cols, rows] | [cols, rows, 1] => Ok((*rows, *cols)),
            other => Err(CcdError::InvalidFits(format!(
                "expected a 2-D image, found axes {other:?}"
            ))),
        }
    }

    /// Byte offset just past the data unit.
    pub fn data_end(&self) -> Result<usize> {
        let overflow = || CcdError::InvalidFits(format!("data size overflows for axes {:?}", self.axes));
        self.axes
            .iter()
            .try_fold(self.bytes_per_value(), |acc, &n| acc.checked_mul(n))
            .and_then(|size| self.data_offset.checked_add(size))
            .ok_or_else(overflow)
    }
}

/// FITS primary-HDU store. Reads integer and float images, writes 32-bit floats.
///
/// Headers are scanned from a memory map; pixels go through cfitsio, which
/// handles every BITPIX and applies BZERO/BSCALE.
#[derive(Clone, Copy, Debug, Default)]
pub struct FitsStore;

impl FrameStore for FitsStore {
    fn read_header(&self, path: &Path) -> Result<Header> {
        let mmap = map_file(path)?;
        Ok(parse_layout(&mmap)?.header)
    }

    fn read_array(&self, path: &Path) -> Result<Array2<f32>> {
        let (rows, cols) = {
            let mmap = map_file(path)?;
            let layout = parse_layout(&mmap)?;
            let shape = layout.image_shape()?;
            let end = layout.data_end()?;
            if end > mmap.len() {
                return Err(CcdError::InvalidFits(format!(
                    "data truncated: expected {} bytes, file has {}",
                    end,
                    mmap.len()
                )));
            }
            shape
        };

        let values: Vec<f32> = {
            let _guard = CFITSIO.lock().unwrap_or_else(|e| e.into_inner());
            let mut fits = FitsFile::open(path)?;
            let hdu = fits.primary_hdu()?;
            hdu.read_image(&mut fits)?
        };
        if values.len() != rows * cols {
            return Err(CcdError::InvalidFits(format!(
                "expected {} pixels, read {}",
                rows * cols,
                values.len()
            )));
        }
        Ok(Array2::from_shape_vec((rows, cols), values)?)
    }

    fn write(&self, path: &Path, data: &PixelData, header: Option<&Header>) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let cards = header.map(header_cards).unwrap_or_default();
        let shape = data.shape();
        let values: Cow<'_, [f32]> = match data {
            PixelData::Frame(a) => a
                .as_slice()
                .map(Cow::Borrowed)
                .unwrap_or_else(|| Cow::Owned(a.iter().copied().collect())),
            PixelData::Cube(a) => a
                .as_slice()
                .map(Cow::Borrowed)
                .unwrap_or_else(|| Cow::Owned(a.iter().copied().collect())),
        };
        // Dimensions in row-major order; fitsio reverses them into NAXISn.
        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: shape,
        };

        let _guard = CFITSIO.lock().unwrap_or_else(|e| e.into_inner());
        let mut fits = FitsFile::create(path)
            .with_custom_primary(&description)
            .overwrite()
            .open()?;
        for card in &cards {
            write_record(&mut fits, card)?;
        }
        let hdu = fits.primary_hdu()?;
        hdu.write_image(&mut fits, &values[..])?;
        debug!(path = %path.display(), shape = ?shape, cards = cards.len(), "Wrote FITS");
        Ok(())
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Append one 80-character record to the current header.
fn write_record(fits: &mut FitsFile, card: &str) -> Result<()> {
    let record = CString::new(card.trim_end())
        .map_err(|_| CcdError::InvalidFits(format!("card contains NUL: {card}")))?;
    let mut status = 0;
    unsafe {
        fitsio::sys::ffprec(fits.as_raw(), record.as_ptr(), &mut status);
    }
    if status != 0 {
        warn!(card = card.trim_end(), status, "Skipping card rejected by cfitsio");
    }
    Ok(())
}

/// Parse the primary header at the start of `bytes`.
pub fn parse_layout(bytes: &[u8]) -> Result<FitsLayout> {
    let mut header = Header::new();
    let mut offset = 0;
    let mut ended = false;

    while !ended {
        let block = bytes
            .get(offset..offset + FITS_BLOCK_SIZE)
            .ok_or_else(|| CcdError::InvalidFits("header has no END card".into()))?;
        offset += FITS_BLOCK_SIZE;

        for card in block.chunks_exact(FITS_CARD_SIZE) {
            let card: String = card
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect();
            let keyword = card[..8].trim_end();
            match keyword {
                "END" => {
                    ended = true;
                    break;
                }
                "HISTORY" => header.add_history(card[8..].trim()),
                "" | "COMMENT" => {}
                _ if &card[8..10] == "= " => {
                    if let Some(value) = parse_value(&card[10..]) {
                        header.insert(keyword, value);
                    }
                }
                _ => {}
            }
        }
    }

    if header.get_bool("SIMPLE") != Some(true) {
        return Err(CcdError::InvalidFits("missing SIMPLE = T".into()));
    }
    let bitpix = header
        .get_i64("BITPIX")
        .ok_or_else(|| CcdError::InvalidFits("missing BITPIX".into()))? as i32;
    if !matches!(bitpix, 8 | 16 | 32 | 64 | -32 | -64) {
        return Err(CcdError::InvalidFits(format!("unsupported BITPIX {bitpix}")));
    }
    let naxis = header
        .get_i64("NAXIS")
        .ok_or_else(|| CcdError::InvalidFits("missing NAXIS".into()))?;
    let axes = (1..=naxis)
        .map(|i| {
            header
                .get_i64(&format!("NAXIS{i}"))
                .filter(|&n| n >= 0)
                .map(|n| n as usize)
                .ok_or_else(|| CcdError::InvalidFits(format!("missing NAXIS{i}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FitsLayout {
        header,
        bitpix,
        axes,
        data_offset: offset,
    })
}

/// Parse the value field of a card (columns 11-80).
fn parse_value(field: &str) -> Option<HeaderValue> {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return Some(HeaderValue::Str(value.trim_end().to_string()));
    }

    let raw = field.split('/').next().unwrap_or("").trim();
    match raw {
        "" => None,
        "T" => Some(HeaderValue::Bool(true)),
        "F" => Some(HeaderValue::Bool(false)),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Some(HeaderValue::Int(i))
            } else if let Ok(f) = raw.replace(['D', 'd'], "E").parse::<f64>() {
                Some(HeaderValue::Float(f))
            } else {
                Some(HeaderValue::Str(raw.to_string()))
            }
        }
    }
}

/// Non-structural value cards of `header` followed by its HISTORY records.
pub fn header_cards(header: &Header) -> Vec<String> {
    let mut cards = Vec::with_capacity(header.len() + header.history().len());
    for (key, value) in header.iter() {
        if STRUCTURAL_KEYWORDS.contains(&key) {
            continue;
        }
        if key.len() > 8 {
            debug!(keyword = key, "Skipping keyword longer than 8 characters");
            continue;
        }
        cards.push(value_card(key, value));
    }
    for line in header.history() {
        cards.extend(history_cards(line));
    }
    cards
}

fn value_card(key: &str, value: &HeaderValue) -> String {
    let field = match value {
        HeaderValue::Str(s) => format!("'{:<8}'", quote_capped(key, s)),
        HeaderValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Int(i) => format!("{i:>20}"),
        HeaderValue::Float(f) => format!("{:>20}", format!("{f:?}").replace('e', "E")),
    };
    pad_card(format!("{key:<8}= {field}"))
}

/// Escape quotes and keep the result within one card, so the closing quote
/// always fits. Never splits an escaped `''` pair.
fn quote_capped(key: &str, value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(FITS_STRING_WIDTH));
    let mut used = 0;
    for c in value.chars() {
        let width = if c == '\'' { 2 } else { 1 };
        used += width;
        if used > FITS_STRING_WIDTH {
            warn!(keyword = key, "Truncating string value to {FITS_STRING_WIDTH} characters");
            break;
        }
        if c == '\'' {
            out.push_str("''");
        } else {
            out.push(c);
        }
    }
    out
}

fn history_cards(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![pad_card("HISTORY".to_string())];
    }
    chars
        .chunks(FITS_HISTORY_WIDTH)
        .map(|chunk| pad_card(format!("HISTORY {}", chunk.iter().collect::<String>())))
        .collect()
}

/// Pad or truncate to one 80-byte ASCII card.
fn pad_card(card: String) -> String {
    let mut card: String = card
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .take(FITS_CARD_SIZE)
        .collect();
    while card.len() < FITS_CARD_SIZE {
        card.push(' ');
    }
    card
}

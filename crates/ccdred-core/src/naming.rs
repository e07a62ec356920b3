use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::combine::CombineMethod;
use crate::frame::ProductKind;
use crate::group::GroupKey;
use crate::header::HeaderValue;

/// Maps (product, group key, optional counter) to an output path.
///
/// Must be injective within one run. The pipeline still refuses a plan in
/// which two outputs share a path, for namers that break this.
pub trait OutputNamer: Send + Sync {
    fn output_path(
        &self,
        product: ProductKind,
        keywords: &[String],
        key: &GroupKey,
        counter: Option<usize>,
    ) -> PathBuf;

    /// Region table written next to `output`.
    fn mask_path(&self, output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        output.with_file_name(format!("{stem}-MASK.reg"))
    }
}

/// `<dir>/<PRODUCT>[_<KEY>-<value>...][_<counter>].fits`
///
/// Keywords and values are escaped so distinct keys never share a name:
/// letters, digits, `.` and `+` are kept, a space in a value becomes `-`,
/// and every other byte becomes `%XX`. A string value that reads like a
/// number or a logical is prefixed with `~`, so `'60'` and `60` differ.
#[derive(Clone, Debug, Default)]
pub struct DefaultNamer {
    pub dir: PathBuf,
}

impl DefaultNamer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl OutputNamer for DefaultNamer {
    fn output_path(
        &self,
        product: ProductKind,
        keywords: &[String],
        key: &GroupKey,
        counter: Option<usize>,
    ) -> PathBuf {
        let mut name = product.tag().to_string();
        for (keyword, value) in keywords.iter().zip(key.values()) {
            name.push('_');
            name.push_str(&escape(&keyword.to_uppercase(), false));
            name.push('-');
            name.push_str(&encode_value(value));
        }
        if let Some(i) = counter {
            name.push_str(&format!("_{i:03}"));
        }
        name.push_str(".fits");
        self.dir.join(name)
    }
}

fn encode_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Str(s) if reads_as_scalar(s) => format!("~{}", escape(s, true)),
        HeaderValue::Str(s) => escape(s, true),
        // Equal numbers render alike whichever kind was seen first.
        other => match other.as_integral() {
            Some(i) => escape(&i.to_string(), true),
            None => escape(&other.to_string(), true),
        },
    }
}

/// True when `s` is spelled like a rendered number or logical.
fn reads_as_scalar(s: &str) -> bool {
    matches!(s, "T" | "F") || s.parse::<f64>().is_ok()
}

/// Reversible file-name escape. `-`, `_` and `~` are always encoded, so
/// they stay free to separate fields.
fn escape(text: &str, space_as_dash: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '+') {
            out.push(c);
        } else if c == ' ' && space_as_dash {
            out.push('-');
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{b:02X}"));
            }
        }
    }
    out
}

/// Timestamped provenance record: `<UTC ISO-8601> <text>`.
pub fn history_line(text: &str) -> String {
    format!("{} {}", Utc::now().format("%Y-%m-%dT%H:%M:%S"), text)
}

/// Text describing how an output was produced, e.g.
/// `MFLAT median of 5 frames: bias-subtracted, normalized`.
pub fn describe_correction(
    product: ProductKind,
    method: CombineMethod,
    used: usize,
    steps: &[&str],
    normalized: bool,
) -> String {
    let noun = if used == 1 { "frame" } else { "frames" };
    let mut text = format!("{product} {method} of {used} {noun}");
    let mut applied: Vec<&str> = steps.to_vec();
    if normalized {
        applied.push("normalized");
    }
    if !applied.is_empty() {
        text.push_str(": ");
        text.push_str(&applied.join(", "));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_without_steps() {
        let text = describe_correction(ProductKind::Bias, CombineMethod::Median, 5, &[], false);
        assert_eq!(text, "MBIAS median of 5 frames");
    }

    #[test]
    fn test_escape_is_reversible_per_character() {
        assert_eq!(escape("vacio + B3", true), "vacio-+-B3");
        assert_eq!(escape("R G", true), "R-G");
        assert_eq!(escape("R-G", true), "R%2DG");
        assert_eq!(escape("R/G", true), "R%2FG");
        assert_eq!(escape("a b", false), "a%20b");
        assert_eq!(escape("Hα", true), "H%CE%B1");
    }

    #[test]
    fn test_value_encoding_tags_numeric_strings() {
        assert_eq!(encode_value(&HeaderValue::Int(60)), "60");
        assert_eq!(encode_value(&HeaderValue::Float(60.0)), "60");
        assert_eq!(encode_value(&HeaderValue::Float(60.5)), "60.5");
        assert_eq!(encode_value(&HeaderValue::Int(-5)), "%2D5");
        assert_eq!(encode_value(&HeaderValue::Str("60".into())), "~60");
        assert_eq!(encode_value(&HeaderValue::Str("-5".into())), "~%2D5");
        assert_eq!(encode_value(&HeaderValue::Str("T".into())), "~T");
        assert_eq!(encode_value(&HeaderValue::Bool(true)), "T");
        assert_eq!(encode_value(&HeaderValue::Str("~60".into())), "%7E60");
    }
}

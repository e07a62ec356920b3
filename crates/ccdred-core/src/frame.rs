use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::combine::CombineMethod;
use crate::error::Result;
use crate::header::Header;
use crate::io::FrameStore;

/// A raw exposure on disk: its path and header.
/// Pixels are loaded on demand through a [`FrameStore`].
#[derive(Clone, Debug)]
pub struct Frame {
    pub path: PathBuf,
    pub header: Header,
}

impl Frame {
    pub fn new(path: impl Into<PathBuf>, header: Header) -> Self {
        Self {
            path: path.into(),
            header,
        }
    }

    /// Read the header of `path` through the store.
    pub fn open(store: &dyn FrameStore, path: &Path) -> Result<Self> {
        let header = store.read_header(path)?;
        Ok(Self::new(path, header))
    }
}

/// Where a pixel array comes from: a file still to be read, or an array
/// already in memory. Shared arrays are never mutated.
#[derive(Clone, Debug)]
pub enum ArraySource {
    File(PathBuf),
    InMemory(Arc<Array2<f32>>),
}

impl ArraySource {
    pub fn from_array(data: Array2<f32>) -> Self {
        Self::InMemory(Arc::new(data))
    }

    /// Load the array, reading the file if needed.
    pub fn resolve(&self, store: &dyn FrameStore) -> Result<Arc<Array2<f32>>> {
        match self {
            Self::File(path) => Ok(Arc::new(store.read_array(path)?)),
            Self::InMemory(data) => Ok(Arc::clone(data)),
        }
    }

    /// Human-readable label used in logs and errors.
    pub fn label(&self, index: usize) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::InMemory(_) => format!("memory[{index}]"),
        }
    }
}

impl From<PathBuf> for ArraySource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for ArraySource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<Array2<f32>> for ArraySource {
    fn from(data: Array2<f32>) -> Self {
        Self::from_array(data)
    }
}

/// Output of a combination: a single frame or an unreduced cube
/// with the stack along axis 0.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    Frame(Array2<f32>),
    Cube(Array3<f32>),
}

impl PixelData {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Frame(a) => a.shape(),
            Self::Cube(a) => a.shape(),
        }
    }

    pub fn as_frame(&self) -> Option<&Array2<f32>> {
        match self {
            Self::Frame(a) => Some(a),
            Self::Cube(_) => None,
        }
    }

    pub fn into_frame(self) -> Option<Array2<f32>> {
        match self {
            Self::Frame(a) => Some(a),
            Self::Cube(_) => None,
        }
    }
}

/// Calibration product kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Bias,
    Dark,
    Flat,
    Clean,
}

impl ProductKind {
    /// Tag used in output names and the PRODUCT keyword.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Bias => "MBIAS",
            Self::Dark => "MDARK",
            Self::Flat => "MFLAT",
            Self::Clean => "CLEAN",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Where a master frame came from.
#[derive(Clone, Debug)]
pub struct Provenance {
    pub product: ProductKind,
    pub frame_count: usize,
    pub method: CombineMethod,
    pub history: Vec<String>,
}

/// A combined calibration frame, shareable across concurrent groups.
#[derive(Clone, Debug)]
pub struct MasterFrame {
    pub data: Arc<Array2<f32>>,
    pub provenance: Provenance,
}

impl MasterFrame {
    pub fn source(&self) -> ArraySource {
        ArraySource::InMemory(Arc::clone(&self.data))
    }
}

/// Optional master bias, dark and flat.
///
/// Always applied in the order bias, dark, flat.
#[derive(Clone, Debug, Default)]
pub struct CorrectionSet {
    pub bias: Option<ArraySource>,
    pub dark: Option<ArraySource>,
    pub flat: Option<ArraySource>,
}

impl CorrectionSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_bias(mut self, bias: impl Into<ArraySource>) -> Self {
        self.bias = Some(bias.into());
        self
    }

    pub fn with_dark(mut self, dark: impl Into<ArraySource>) -> Self {
        self.dark = Some(dark.into());
        self
    }

    pub fn with_flat(mut self, flat: impl Into<ArraySource>) -> Self {
        self.flat = Some(flat.into());
        self
    }

    /// Read every file reference once so the set can be shared in memory.
    pub fn load(&self, store: &dyn FrameStore) -> Result<ResolvedCorrections> {
        let load = |src: &Option<ArraySource>| -> Result<Option<Arc<Array2<f32>>>> {
            match src {
                Some(s) => {
                    let data = s.resolve(store)?;
                    Ok((!data.is_empty()).then_some(data))
                }
                None => Ok(None),
            }
        };
        Ok(ResolvedCorrections {
            bias: load(&self.bias)?,
            dark: load(&self.dark)?,
            flat: load(&self.flat)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bias.is_none() && self.dark.is_none() && self.flat.is_none()
    }
}

/// A [`CorrectionSet`] with every master in memory. Empty masters are dropped.
#[derive(Clone, Debug, Default)]
pub struct ResolvedCorrections {
    pub bias: Option<Arc<Array2<f32>>>,
    pub dark: Option<Arc<Array2<f32>>>,
    pub flat: Option<Arc<Array2<f32>>>,
}

impl ResolvedCorrections {
    pub fn into_set(self) -> CorrectionSet {
        CorrectionSet {
            bias: self.bias.map(ArraySource::InMemory),
            dark: self.dark.map(ArraySource::InMemory),
            flat: self.flat.map(ArraySource::InMemory),
        }
    }

    /// Names of the applied steps, in application order.
    pub fn steps(&self) -> Vec<&'static str> {
        let mut steps = Vec::new();
        if self.bias.is_some() {
            steps.push("bias-subtracted");
        }
        if self.dark.is_some() {
            steps.push("dark-subtracted");
        }
        if self.flat.is_some() {
            steps.push("flat-fielded");
        }
        steps
    }
}

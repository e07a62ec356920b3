use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::Result;

/// Write flagged pixels as a `point x y` table, 1-based, row-major order.
///
/// Returns the number of rows written.
pub fn write_region(mask: &Array2<bool>, path: &Path) -> Result<usize> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    let rows = write_region_to(&mut w, mask)?;
    w.flush()?;
    Ok(rows)
}

pub fn write_region_to(w: &mut impl Write, mask: &Array2<bool>) -> Result<usize> {
    writeln!(w, "# point x y")?;
    let mut rows = 0;
    for ((y, x), &flagged) in mask.indexed_iter() {
        if flagged {
            writeln!(w, "point {} {}", x + 1, y + 1)?;
            rows += 1;
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_rows_are_one_based() {
        let mut mask = Array2::from_elem((2, 3), false);
        mask[[1, 2]] = true;
        let mut out = Vec::new();
        let rows = write_region_to(&mut out, &mask).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "# point x y\npoint 3 2\n");
    }
}

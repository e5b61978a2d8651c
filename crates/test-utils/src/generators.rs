//! Generators for filter transmission curves.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Trapezoidal bandpass: zero outside `[center - width, center + width]`,
/// `peak` on the inner half, linear in between. Wavelengths in Ångström.
pub fn bandpass_curve(center: f64, width: f64, peak: f64) -> Vec<(f64, f64)> {
    let step = width / 10.0;
    (0..=40)
        .map(|i| {
            let wavelength = center - 2.0 * width + i as f64 * step;
            let offset = (wavelength - center).abs();
            let transmission = if offset <= width / 2.0 {
                peak
            } else if offset >= width {
                0.0
            } else {
                peak * (width - offset) / (width / 2.0)
            };
            (wavelength, transmission)
        })
        .collect()
}

/// Write a curve as `<root>/<instrument_dir>/<name>.txt`.
pub fn write_filter_curve(
    root: &Path,
    instrument_dir: &str,
    name: &str,
    curve: &[(f64, f64)],
) -> io::Result<PathBuf> {
    let dir = root.join(instrument_dir);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.txt", name));
    let mut text = String::from("! Wavelength (A)  Transmission\n");
    for (wavelength, transmission) in curve {
        text.push_str(&format!("{:.2} {:.4}\n", wavelength, transmission));
    }
    fs::write(&path, text)?;
    Ok(path)
}

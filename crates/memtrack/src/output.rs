use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

/// A line of `=` characters used to frame report sections.
pub fn rule(width: usize) -> String {
    "=".repeat(width)
}

/// Formats bytes into a human-readable string with appropriate units (B, KB, MB, GB).
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let exp = (bytes_f.ln() / UNIT.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / UNIT.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}

/// In-memory log destination.
///
/// Clones share one buffer, so a clone handed to
/// [`LogDestination::Writer`](crate::LogDestination::Writer) can be read back
/// through the original.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
/// use memtrack::CaptureBuffer;
///
/// let buffer = CaptureBuffer::new();
/// let mut writer = buffer.clone();
/// writeln!(writer, "0: --:0: free at 0x10").unwrap();
/// assert_eq!(buffer.contents(), "0: --:0: free at 0x10\n");
/// ```
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

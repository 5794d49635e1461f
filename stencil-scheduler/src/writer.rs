//! Encoded, cancellable, atomically published output files.
//!
//! ## `write_atomically` protocol
//!
//! 1. Create `<target>.stencil.tmp` next to the target.
//! 2. Write the byte-order mark, if any.
//! 3. Render through `Cancellable → Encoding → BufWriter → File`.
//! 4. Flush; on any failure remove the temp file and leave the target alone.
//! 5. Rename the temp file over the target. If the platform refuses to
//!    rename over an existing file, remove the target and rename again.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use stencil_core::Encoding;

use crate::error::{io_err, SchedulerError};
use crate::pool::CancelToken;

/// Suffix appended to the target file name for the temporary sibling.
pub const TEMP_SUFFIX: &str = ".stencil.tmp";

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Transcodes UTF-8 input to `encoding` on the way through.
///
/// Multi-byte sequences split across `write` calls are held back until
/// complete; [`EncodingWriter::finish`] rejects a dangling partial sequence.
pub struct EncodingWriter<W: Write> {
    inner: W,
    encoding: Encoding,
    pending: Vec<u8>,
    scratch: Vec<u8>,
}

impl<W: Write> EncodingWriter<W> {
    pub fn new(inner: W, encoding: Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Flush and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "output ended inside a UTF-8 sequence",
            ));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, text: &str) -> io::Result<()> {
        self.scratch.clear();
        self.encoding.encode_into(text, &mut self.scratch);
        self.inner.write_all(&self.scratch)
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.encoding == Encoding::Utf8 && self.pending.is_empty() {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }

        self.pending.extend_from_slice(buf);
        let pending = std::mem::take(&mut self.pending);
        let (valid, rest) = match std::str::from_utf8(&pending) {
            Ok(text) => (text, &[][..]),
            Err(e) if e.error_len().is_none() => {
                let (head, tail) = pending.split_at(e.valid_up_to());
                // valid_up_to marks a char boundary
                let text = std::str::from_utf8(head)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                (text, tail)
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        self.emit(valid)?;
        self.pending = rest.to_vec();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Fails every write once its token is cancelled.
pub struct CancellableWriter<W: Write> {
    inner: W,
    token: CancelToken,
}

impl<W: Write> CancellableWriter<W> {
    pub fn new(inner: W, token: CancelToken) -> Self {
        Self { inner, token }
    }

    fn check(&self) -> io::Result<()> {
        if self.token.is_cancelled() {
            Err(io::Error::new(io::ErrorKind::Other, "render cancelled"))
        } else {
            Ok(())
        }
    }
}

impl<W: Write> Write for CancellableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Atomic publish
// ---------------------------------------------------------------------------

/// `<dir>/<name>` → `<dir>/<name>.stencil.tmp`.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(TEMP_SUFFIX);
    target.with_file_name(name)
}

/// Render via `render` into a temp sibling of `target`, then publish it.
pub fn write_atomically<F>(
    target: &Path,
    encoding: Encoding,
    bom: Option<&[u8]>,
    token: &CancelToken,
    render: F,
) -> Result<(), SchedulerError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), SchedulerError>,
{
    let tmp = temp_path_for(target);
    let file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;

    let written = write_encoded(file, encoding, bom, token, render, &tmp).and_then(|()| {
        // a render that outlived its token must not replace the target
        if token.is_cancelled() {
            Err(SchedulerError::Cancelled {
                entity: target.display().to_string(),
            })
        } else {
            Ok(())
        }
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    publish(&tmp, target)
}

fn write_encoded<F>(
    file: File,
    encoding: Encoding,
    bom: Option<&[u8]>,
    token: &CancelToken,
    render: F,
    tmp: &Path,
) -> Result<(), SchedulerError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), SchedulerError>,
{
    let mut buffered = BufWriter::new(file);
    if let Some(bom) = bom {
        buffered.write_all(bom).map_err(|e| io_err(tmp, e))?;
    }
    let mut encoder = EncodingWriter::new(buffered, encoding);
    {
        let mut out = CancellableWriter::new(&mut encoder, token.clone());
        render(&mut out)?;
    }
    let buffered = encoder.finish().map_err(|e| io_err(tmp, e))?;
    buffered
        .into_inner()
        .map_err(|e| io_err(tmp, e.into_error()))?;
    Ok(())
}

/// Move `tmp` over `target`.
pub fn publish(tmp: &Path, target: &Path) -> Result<(), SchedulerError> {
    if let Err(first) = fs::rename(tmp, target) {
        tracing::debug!(
            target = %target.display(),
            error = %first,
            "rename over target failed; replacing non-atomically"
        );
        match fs::remove_file(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                let _ = fs::remove_file(tmp);
                return Err(io_err(target, e));
            }
        }
        if let Err(e) = fs::rename(tmp, target) {
            let _ = fs::remove_file(tmp);
            return Err(io_err(target, e));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

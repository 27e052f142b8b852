// Raw file access against tracefs control nodes. Every helper surfaces the OS
// error untouched, wrapped with the path it failed on.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Read a whole control file.
pub fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Read a control file and strip surrounding whitespace, the kernel terminates
/// most values with a newline.
pub fn read_trimmed(path: &Path) -> Result<String> {
    let data = read(path)?;
    Ok(String::from_utf8_lossy(&data).trim().to_string())
}

/// Truncating write of `data` to a control file.
pub fn write(path: &Path, data: &[u8]) -> Result<()> {
    tracing::trace!("write {} <- {:?}", path.display(), String::from_utf8_lossy(data));
    fs::write(path, data).map_err(|e| Error::io(path, e))
}

/// Open a control file for appending, creating it when it does not exist.
pub fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// Append a single newline terminated line and close the file. The kernel
/// parses the line when it is written, so a malformed rule fails here.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    tracing::trace!("append {} <- {:?}", path.display(), line);
    let mut file = open_append(path)?;
    writeln!(file, "{}", line).map_err(|e| Error::io(path, e))?;
    file.flush().map_err(|e| Error::io(path, e))
}

/// Open a file for sequential reading.
pub fn open_read(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::io(path, e))
}

/// Entry names of a directory, in the order the OS returns them.
pub fn list_dir(path: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| Error::io(path, e))? {
        let entry = entry.map_err(|e| Error::io(path, e))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

pub fn metadata(path: &Path) -> Result<Metadata> {
    fs::metadata(path).map_err(|e| Error::io(path, e))
}

pub fn make_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).map_err(|e| Error::io(path, e))
}

pub fn remove_dir(path: &Path) -> Result<()> {
    fs::remove_dir(path).map_err(|e| Error::io(path, e))
}

//! PEM persistence for the TLS listener.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::info;

use super::{PkiError, Result, ServerCertificate};

/// CA certificate file name
pub const CA_CERT_FILE: &str = "ca.crt";
/// Serving certificate file name
pub const TLS_CERT_FILE: &str = "tls.crt";
/// Serving private key file name
pub const TLS_KEY_FILE: &str = "tls.key";

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Write `ca.crt`, `tls.crt` and `tls.key` into `dir`, creating it if missing.
///
/// Existing files are overwritten. A failure part way through may leave some
/// of the files written.
pub fn write_bundle(dir: &Path, ca_pem: &str, server: &ServerCertificate) -> Result<()> {
    create_dir(dir)?;

    for (name, contents) in [
        (CA_CERT_FILE, ca_pem),
        (TLS_CERT_FILE, server.cert_pem.as_str()),
        (TLS_KEY_FILE, server.key_pem.as_str()),
    ] {
        write_file(&dir.join(name), contents.as_bytes())?;
    }

    info!(dir = %dir.display(), "Wrote certificate bundle");
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PkiError + '_ {
    move |source| PkiError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir).map_err(io_error(dir))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(path).map_err(io_error(path))?;
    file.write_all(contents).map_err(io_error(path))?;
    file.sync_all().map_err(io_error(path))
}

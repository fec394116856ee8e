//! On-disk artifacts: the report/table pair per analysis run, the temporary
//! flow table handed to the wash-trading detector, and discovery over the
//! output directory.

pub mod flows;
pub mod naming;
pub mod report;
pub mod store;
pub mod table;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use naming::{ArtifactKind, ArtifactName};
pub use store::{default_selection, ArtifactIndex, ArtifactPair, ArtifactStore, LoadedRun};
pub use table::{top_wallets, TableRow};

/// Suffix for in-progress writes. The filename parser rejects it, so a crash
/// mid-write never produces a discoverable artifact.
pub const TMP_SUFFIX: &str = ".tmp";

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

/// Write `path` through a `.tmp` sibling that is synced and then renamed into
/// place. The temporary file is removed if `write` fails.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let tmp = tmp_path(path);
    let written: Result<()> = (|| {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write(&mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();

    match written {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

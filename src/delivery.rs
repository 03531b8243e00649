use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Hands finished document bytes to the user under a suggested file name.
pub trait FileDelivery {
    /// Returns where the file ended up.
    fn deliver(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf>;
}

impl<T: FileDelivery + ?Sized> FileDelivery for &T {
    fn deliver(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf> {
        (**self).deliver(bytes, suggested_name)
    }
}

/// Writes into a directory. The file appears whole or not at all.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: true,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn target_path(&self, suggested_name: &str) -> io::Result<PathBuf> {
        let name = Path::new(suggested_name);
        let plain = name.file_name().is_some_and(|file| file == name.as_os_str());
        if !plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a plain file name: {suggested_name}"),
            ));
        }
        Ok(self.dir.join(name))
    }
}

impl FileDelivery for DirectoryDelivery {
    fn deliver(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf> {
        let target = self.target_path(suggested_name)?;
        std::fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        if self.overwrite {
            file.persist(&target).map_err(|err| err.error)?;
        } else {
            file.persist_noclobber(&target).map_err(|err| err.error)?;
        }
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "delivered file");
        Ok(target)
    }
}

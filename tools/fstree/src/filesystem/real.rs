use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::{lchown, symlink, FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::{set_symlink_file_times, FileTime};
use log::warn;
use nix::unistd::{access, AccessFlags, Group, User};

use super::{FileSystem, FileSystemError, NodeKind, NodeMetadata, Result};

#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

fn kind_of(file_type: fs::FileType) -> NodeKind {
    if file_type.is_symlink() {
        NodeKind::Link
    } else if file_type.is_dir() {
        NodeKind::Directory
    } else if file_type.is_file() {
        NodeKind::Regular
    } else if file_type.is_socket() {
        NodeKind::Socket
    } else if file_type.is_fifo() {
        NodeKind::Fifo
    } else if file_type.is_char_device() {
        NodeKind::Char
    } else if file_type.is_block_device() {
        NodeKind::Block
    } else {
        NodeKind::Unknown
    }
}

fn to_node_metadata(path: &Path, metadata: fs::Metadata) -> Result<NodeMetadata> {
    let io = |e| FileSystemError::from_io(e, path);
    Ok(NodeMetadata {
        path: path.to_path_buf(),
        kind: kind_of(metadata.file_type()),
        mode: metadata.mode() & 0o7777,
        uid: metadata.uid(),
        gid: metadata.gid(),
        len: metadata.len(),
        modified: metadata.modified().map_err(io)?,
        accessed: metadata.accessed().map_err(io)?,
    })
}

impl FileSystem for RealFileSystem {
    fn stat(&self, path: &Path) -> Result<NodeMetadata> {
        let metadata =
            fs::symlink_metadata(path).map_err(|e| FileSystemError::from_io(e, path))?;
        to_node_metadata(path, metadata)
    }

    fn metadata(&self, path: &Path) -> Result<NodeMetadata> {
        let metadata = fs::metadata(path).map_err(|e| FileSystemError::from_io(e, path))?;
        to_node_metadata(path, metadata)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileSystemError::from_io(e, path)),
        }
    }

    fn list_children(&self, path: &Path) -> Result<Vec<String>> {
        let entries = fs::read_dir(path).map_err(|e| FileSystemError::from_io(e, path))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FileSystemError::from_io(e, path))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF-8 entry {:?} in {}", raw, path.display());
                    continue;
                }
            };
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(|e| FileSystemError::from_io(e, path))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::DirBuilderExt;

        fs::DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(|e| FileSystemError::from_io(e, path))
    }

    fn symlink(&self, source: &Path, dest: &Path) -> Result<()> {
        symlink(source, dest).map_err(|e| FileSystemError::from_io(e, dest))
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| FileSystemError::from_io(e, path))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| FileSystemError::from_io(e, path))
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| FileSystemError::from_io(e, path))
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        lchown(path, uid, gid).map_err(|e| FileSystemError::from_io(e, path))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| FileSystemError::from_io(e, path))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BufRead + Send>> {
        let file = fs::File::open(path).map_err(|e| FileSystemError::from_io(e, path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write_file(&self, path: &Path, contents: &[u8], append: bool) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| FileSystemError::from_io(e, path))?;

        file.write_all(contents)
            .map_err(|e| FileSystemError::from_io(e, path))
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()> {
        fs::copy(source, dest).map_err(|e| FileSystemError::from_io(e, source))?;
        Ok(())
    }

    fn is_readable(&self, path: &Path) -> bool {
        access(path, AccessFlags::R_OK).is_ok()
    }

    fn is_writable(&self, path: &Path) -> bool {
        access(path, AccessFlags::W_OK).is_ok()
    }

    fn resolve_user(&self, name: &str) -> Result<u32> {
        match User::from_name(name) {
            Ok(Some(user)) => Ok(user.uid.as_raw()),
            Ok(None) => Err(FileSystemError::PathError(format!("unknown user: {name}"))),
            Err(errno) => Err(FileSystemError::Io(errno.into())),
        }
    }

    fn resolve_group(&self, name: &str) -> Result<u32> {
        match Group::from_name(name) {
            Ok(Some(group)) => Ok(group.gid.as_raw()),
            Ok(None) => Err(FileSystemError::PathError(format!("unknown group: {name}"))),
            Err(errno) => Err(FileSystemError::Io(errno.into())),
        }
    }

    fn set_times(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        set_symlink_file_times(path, FileTime::from(accessed), FileTime::from(modified))
            .map_err(|e| FileSystemError::from_io(e, path))
    }
}

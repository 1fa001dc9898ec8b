mod entities;
mod typed;

pub use entities::{
    CollectionRules, Directories, DirectoryCollection, EntityCollection, FileCollection, Files,
    JsonFileCollection, JsonFiles, LinkCollection, Links, ReadWriteFileCollection, ReadWriteFiles,
    ReadableFileCollection, ReadableFiles, LineReadable, WritableFileCollection, WritableFiles,
};
pub use typed::{Key, TypedCollection};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, File, FsNode};
    use crate::error::FileError;
    use crate::filesystem::{NodeKind, SharedFileSystem};
    use crate::mock::MockFileSystem;
    use std::error::Error as _;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn setup() -> (MockFileSystem, SharedFileSystem) {
        let mock = MockFileSystem::new();
        let fs: SharedFileSystem = Arc::new(mock.clone());
        (mock, fs)
    }

    #[test]
    fn test_file_collection_accepts_paths_and_rejects_directories() {
        let (mock, fs) = setup();
        mock.add_file("/tmp/t/a.txt", "a");

        let mut files = FileCollection::new(fs);
        let key = files.append("/tmp/t/a.txt").unwrap();
        let stored = files.get(&key).unwrap();
        assert_eq!(stored.kind(), EntityKind::File);
        assert_eq!(stored.path(), Path::new("/tmp/t/a.txt"));

        let err = files.append("/tmp/t").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_missing_path_surfaces_constructor_error() {
        let (_mock, fs) = setup();
        let mut files = FileCollection::new(fs);

        assert!(files.append("/does/not/exist").unwrap_err().is_exists());
    }

    #[test]
    fn test_domain_chains_are_locked_after_construction() {
        let (_mock, fs) = setup();
        let files = ReadWriteFileCollection::new(fs);

        assert!(files.chain().is_locked());
        assert_eq!(files.chain().len(), 4);
    }

    #[test]
    fn test_writable_collection_rejects_denied_files() {
        let (mock, fs) = setup();
        mock.add_file("/data/open.txt", "");
        mock.add_file("/data/locked.txt", "");
        mock.deny_writes("/data/locked.txt");

        let mut writable = WritableFileCollection::new(fs);
        writable.append("/data/open.txt").unwrap();
        let err = writable.append("/data/locked.txt").unwrap_err();

        match err {
            FileError::Validation(validation) => {
                assert_eq!(validation.criterion, "node is writable")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_iterable_wraps_failures_in_factory_error() {
        let (mock, fs) = setup();
        mock.add_file("/data/a.txt", "");
        mock.add_directory("/data/dir");

        let err = FileCollection::from_iterable(fs, ["/data/a.txt", "/data/dir"]).unwrap_err();
        match &err {
            FileError::Factory {
                collection, key, ..
            } => {
                assert_eq!(*collection, "FileCollection");
                assert_eq!(*key, Key::Index(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn test_filters_on_names_and_types() {
        let (mock, fs) = setup();
        mock.add_file("/data/.hidden", "");
        mock.add_file("/data/a.JSON", "");
        mock.add_file("/data/b.txt", "");
        mock.add_special("/data/sock", NodeKind::Socket);

        let files = FileCollection::from_iterable(
            fs,
            ["/data/.hidden", "/data/a.JSON", "/data/b.txt", "/data/sock"],
        )
        .unwrap();

        assert_eq!(files.filter_hidden_files().len(), 3);
        assert_eq!(
            files.filter_by_extensions(&["json", ".txt"]).paths(),
            vec![PathBuf::from("/data/a.JSON"), PathBuf::from("/data/b.txt")]
        );
        assert_eq!(
            files.filter_by_file_type(NodeKind::Socket, false).paths(),
            vec![PathBuf::from("/data/sock")]
        );
        assert_eq!(files.filter_by_file_type(NodeKind::Socket, true).len(), 3);
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn test_readable_collection_concatenates_lines() {
        let (mock, fs) = setup();
        mock.add_file("/logs/a.log", "a1\na2\n");
        mock.add_file("/logs/b.log", "b1\n");

        let logs = ReadableFileCollection::from_iterable(fs, ["/logs/a.log", "/logs/b.log"]).unwrap();

        assert_eq!(logs.lines().unwrap(), vec!["a1", "a2", "b1"]);
        assert_eq!(logs.lines_as_string(",").unwrap(), "a1,a2,b1");
    }

    #[test]
    fn test_json_collection_validates_and_decodes() {
        let (mock, fs) = setup();
        mock.add_file("/cfg/good.json", r#"{"name": "fstree"}"#);
        mock.add_file("/cfg/bad.json", "{not json");

        let mut configs = JsonFileCollection::new(fs.clone());
        configs.append("/cfg/good.json").unwrap();
        assert!(configs.append("/cfg/bad.json").unwrap_err().is_validation());

        let decoded = configs.decode().unwrap();
        assert_eq!(decoded[0]["name"], "fstree");
    }

    #[test]
    fn test_append_many_has_no_rollback() {
        let (mock, fs) = setup();
        mock.add_file("/d/a", "");
        mock.add_directory("/d/b");
        mock.add_file("/d/c", "");

        let mut files = FileCollection::new(fs.clone());
        let result = files.append_many(["/d/a", "/d/b", "/d/c"]);

        assert!(result.is_err());
        assert_eq!(files.paths(), vec![PathBuf::from("/d/a")]);

        let file = File::open(fs, "/d/c").unwrap();
        files.append(file).unwrap();
        assert_eq!(files.len(), 2);
    }
}

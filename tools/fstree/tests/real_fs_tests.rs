use fstree::{
    Directory, Entity, EntityKind, File, FsNode, HasOwnership, HasPermissions, Link,
    RealFileSystem, SharedFileSystem, SortOrder,
};
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

fn real_fs() -> SharedFileSystem {
    Arc::new(RealFileSystem::new())
}

fn create_test_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn set_file_time(path: &Path, secs: u64) {
    let time = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    let file_time = filetime::FileTime::from(time);
    filetime::set_file_times(path, file_time, file_time).unwrap();
}

fn mode_of(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
}

#[test]
fn test_get_tree_wraps_each_kind() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    create_test_file(&root.join("a.txt"), b"a");
    create_test_file(&root.join("sub").join("b.txt"), b"b");
    symlink(root.join("a.txt"), root.join("link"))?;

    let mut dir = Directory::open(real_fs(), root)?;
    let tree = dir.get_tree()?;

    let kinds: Vec<(String, EntityKind)> = tree
        .entities()
        .iter()
        .map(|entity| (entity.name(), entity.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("a.txt".to_string(), EntityKind::File),
            ("link".to_string(), EntityKind::Link),
            ("sub".to_string(), EntityKind::Directory),
        ]
    );

    let link = tree.get(root.join("link")).unwrap();
    assert_eq!(link.as_link().unwrap().target().path(), root.join("a.txt"));

    Ok(())
}

#[test]
fn test_traverse_expands_directories_lazily() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    create_test_file(&root.join("a.txt"), b"");
    create_test_file(&root.join("m").join("b.txt"), b"");
    create_test_file(&root.join("m").join("n").join("c.txt"), b"");
    symlink(root, root.join("z-loop"))?;

    let mut dir = Directory::open(real_fs(), root)?;
    let tree = dir.get_tree()?;
    let walked = tree
        .traverse()
        .map(|entity| entity.map(|e| e.path().to_path_buf()))
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(
        walked,
        vec![
            root.join("a.txt"),
            root.join("m/b.txt"),
            root.join("m/n/c.txt"),
            root.join("z-loop"),
        ]
    );

    Ok(())
}

#[test]
fn test_sort_by_pinned_timestamps() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    for (name, secs) in [("a", 3_000), ("b", 1_000), ("c", 1_000), ("d", 2_000)] {
        create_test_file(&root.join(name), b"");
        set_file_time(&root.join(name), secs);
    }

    let mut dir = Directory::open(real_fs(), root)?;
    let tree = dir.get_tree()?;

    let ascending = tree.sort_by_date_created(SortOrder::Ascending)?;
    let names: Vec<String> = ascending.entities().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["b", "c", "d", "a"]);

    let descending = tree.sort_by_date_accessed(SortOrder::Descending)?;
    let names: Vec<String> = descending.entities().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["a", "d", "b", "c"]);

    // Sorting never reorders the source tree.
    let names: Vec<String> = tree.entities().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);

    Ok(())
}

#[test]
fn test_directory_copy_preserves_content_and_permissions() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("source");
    create_test_file(&source.join("x.txt"), b"x");
    create_test_file(&source.join("nested").join("y.txt"), b"y");
    fs::set_permissions(source.join("nested"), fs::Permissions::from_mode(0o700))?;

    let dir = Directory::open(real_fs(), &source)?;
    let dest = temp.path().join("copy");
    let report = dir.copy(&dest, false)?;

    assert!(report.is_complete());
    assert_eq!(WalkDir::new(&dest).into_iter().count(), 4);
    assert_eq!(fs::read_to_string(dest.join("nested/y.txt"))?, "y");
    assert_eq!(mode_of(&dest.join("nested")), 0o700);

    let err = dir.copy(&dest, false).unwrap_err();
    assert!(err.is_exists());

    Ok(())
}

#[test]
fn test_delete_does_not_follow_links_out_of_the_tree() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let outside = temp.path().join("outside.txt");
    create_test_file(&outside, b"keep me");
    let doomed = temp.path().join("doomed");
    create_test_file(&doomed.join("inner.txt"), b"");
    symlink(&outside, doomed.join("alias"))?;

    let mut dir = Directory::open(real_fs(), &doomed)?;
    dir.delete()?;

    assert!(!doomed.exists());
    assert_eq!(fs::read_to_string(&outside)?, "keep me");
    assert!(dir.is_deleted());
    assert!(dir.delete().unwrap_err().is_exists());

    Ok(())
}

#[test]
fn test_file_move_between_directories() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("a").join("report.csv");
    create_test_file(&source, b"1,2\n3,4\n");
    fs::create_dir_all(temp.path().join("b"))?;

    let mut file = File::open(real_fs(), &source)?;
    let moved = file.move_to(temp.path().join("b"), false)?;

    assert_eq!(moved.path(), temp.path().join("b").join("report.csv"));
    assert!(!source.exists());
    assert!(file.is_deleted());
    assert_eq!(moved.lines()?, vec!["1,2", "3,4"]);

    Ok(())
}

#[test]
fn test_file_move_onto_itself_keeps_content() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("keep.txt");
    create_test_file(&path, b"payload");

    let mut file = File::open(real_fs(), &path)?;
    let err = file.move_to(&path, true).unwrap_err();

    assert!(matches!(err, fstree::FileError::InvalidArgument(_)));
    assert!(!file.is_deleted());
    assert_eq!(fs::read_to_string(&path)?, "payload");

    Ok(())
}

#[test]
fn test_refresh_after_external_changes() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    create_test_file(&temp.path().join("first"), b"");

    let mut dir = Directory::open(real_fs(), temp.path())?;
    let mut tree = dir.get_tree()?;
    assert_eq!(tree.len(), 1);

    create_test_file(&temp.path().join("second"), b"");
    tree.refresh()?;

    assert_eq!(
        tree.paths(),
        vec![temp.path().join("first"), temp.path().join("second")]
    );

    Ok(())
}

#[test]
fn test_recursive_chmod_skips_links() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let outside = temp.path().join("outside.txt");
    create_test_file(&outside, b"");
    fs::set_permissions(&outside, fs::Permissions::from_mode(0o644))?;

    let root = temp.path().join("root");
    create_test_file(&root.join("sub").join("inner.txt"), b"");
    symlink(&outside, root.join("alias"))?;

    let dir = Directory::open(real_fs(), &root)?;
    dir.chmod(0o750, true)?;

    assert_eq!(mode_of(&root), 0o750);
    assert_eq!(mode_of(&root.join("sub")), 0o750);
    assert_eq!(mode_of(&root.join("sub/inner.txt")), 0o750);
    assert_eq!(mode_of(&outside), 0o644);

    Ok(())
}

#[test]
fn test_link_create_and_force_replace() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("target.txt");
    create_test_file(&target, b"t");
    let occupied = temp.path().join("occupied");
    create_test_file(&occupied.join("x"), b"");

    let fs_gateway = real_fs();
    assert!(Link::create(fs_gateway.clone(), &target, &occupied, false)
        .unwrap_err()
        .is_exists());

    let link = Link::create(fs_gateway, &target, &occupied, true)?;
    assert_eq!(fs::read_link(&occupied)?, target);
    assert_eq!(link.target().path(), target);

    Ok(())
}

#[test]
fn test_chown_to_current_owner() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("owned.txt");
    create_test_file(&path, b"");

    let mut entity = Entity::open(real_fs(), &path)?;
    let uid = entity.owner()?;
    entity.chown(Some(uid.to_string().as_str()), None, false)?;
    assert_eq!(entity.owner()?, uid);

    let err = entity.chown(None, None, false).unwrap_err();
    assert!(matches!(err, fstree::FileError::InvalidArgument(_)));

    Ok(())
}

#[test]
fn test_mkdir_and_mkfile_apply_permissions() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let dir = Directory::open(real_fs(), temp.path())?;

    let nested = dir.mkdir("a/b", 0o750, false)?;
    assert_eq!(mode_of(&temp.path().join("a")), 0o750);
    assert_eq!(mode_of(nested.path()), 0o750);

    let file = nested.mkfile("notes.txt", "hello", 0o600, false)?;
    assert_eq!(file.perms()?, 0o600);
    assert_eq!(file.read_to_string()?, "hello");
    assert_eq!(
        file.path(),
        PathBuf::from(temp.path()).join("a/b/notes.txt")
    );

    Ok(())
}

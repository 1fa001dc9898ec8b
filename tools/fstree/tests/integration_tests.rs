use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Output;
use tempfile::TempDir;

fn fstree(args: &[&str]) -> anyhow::Result<Output> {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_fstree"))
        .args(args)
        .env_remove("FSTREE_FILE_MODE")
        .env_remove("FSTREE_DIR_MODE")
        .output()?;
    Ok(output)
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_ls_lists_kinds_and_names() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("a.txt"), "a")?;
    fs::create_dir_all(temp.path().join("sub"))?;

    let output = fstree(&["ls", arg(temp.path())])?;
    assert!(output.status.success(), "Command failed: {:?}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "file\ta.txt\ndirectory\tsub\n");

    let output = fstree(&["ls", arg(temp.path()), "--type", "directory"])?;
    assert_eq!(String::from_utf8_lossy(&output.stdout), "directory\tsub\n");

    Ok(())
}

#[test]
fn test_ls_sorted_by_modification_time() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    for (name, secs) in [("old", 1_000), ("new", 3_000), ("mid", 2_000)] {
        let path = temp.path().join(name);
        fs::write(&path, "")?;
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(secs, 0))?;
    }

    let output = fstree(&["ls", arg(temp.path()), "--sort", "created", "--desc"])?;
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "file\tnew\nfile\tmid\nfile\told\n"
    );

    Ok(())
}

#[test]
fn test_traverse_prints_files_depth_first() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    fs::create_dir_all(temp.path().join("m"))?;
    fs::write(temp.path().join("a.txt"), "")?;
    fs::write(temp.path().join("m").join("b.txt"), "")?;

    let output = fstree(&["traverse", arg(temp.path())])?;
    assert!(output.status.success());

    let expected = format!(
        "{}\n{}\n",
        temp.path().join("a.txt").display(),
        temp.path().join("m/b.txt").display()
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout), expected);

    Ok(())
}

#[test]
fn test_mkdir_and_touch_with_modes() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let dir = temp.path().join("x").join("y");
    let file = dir.join("f.txt");

    let output = fstree(&["mkdir", arg(&dir), "--mode", "750"])?;
    assert!(output.status.success(), "Command failed: {:?}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::metadata(&dir)?.permissions().mode() & 0o7777, 0o750);

    let output = fstree(&["touch", arg(&file)])?;
    assert!(output.status.success());
    assert_eq!(fs::metadata(&file)?.permissions().mode() & 0o7777, 0o644);

    // Second touch without --overwrite refuses.
    let output = fstree(&["touch", arg(&file)])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    let output = fstree(&["mkdir", arg(&dir), "--mode", "9z"])?;
    assert!(!output.status.success());

    Ok(())
}

#[test]
fn test_cp_mv_rm_round() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("src");
    fs::create_dir_all(source.join("inner"))?;
    fs::write(source.join("inner").join("f.txt"), "payload")?;

    let copy = temp.path().join("copy");
    let output = fstree(&["cp", arg(&source), arg(&copy)])?;
    assert!(output.status.success(), "Command failed: {:?}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(copy.join("inner/f.txt"))?, "payload");

    let moved = temp.path().join("moved");
    let output = fstree(&["mv", arg(&copy), arg(&moved)])?;
    assert!(output.status.success());
    assert!(!copy.exists());
    assert!(moved.join("inner/f.txt").exists());

    let output = fstree(&["rm", arg(&moved)])?;
    assert!(output.status.success());
    assert!(!moved.exists());
    assert!(source.join("inner/f.txt").exists());

    Ok(())
}

#[test]
fn test_ln_and_chmod() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let target = temp.path().join("target.txt");
    fs::write(&target, "t")?;
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644))?;
    let link = temp.path().join("alias");

    let output = fstree(&["ln", arg(&target), arg(&link)])?;
    assert!(output.status.success());
    assert_eq!(fs::read_link(&link)?, target);

    let output = fstree(&["ln", arg(&target), arg(&link)])?;
    assert!(!output.status.success());
    let output = fstree(&["ln", "--force", arg(&target), arg(&link)])?;
    assert!(output.status.success());

    let output = fstree(&["chmod", "600", arg(&target)])?;
    assert!(output.status.success());
    assert_eq!(fs::metadata(&target)?.permissions().mode() & 0o7777, 0o600);

    Ok(())
}

#[test]
fn test_chown_requires_user_or_group() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let file = temp.path().join("f");
    fs::write(&file, "")?;

    let output = fstree(&["chown", arg(&file)])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("either user or group"));

    Ok(())
}

#[test]
fn test_missing_path_is_reported() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let missing = temp.path().join("nope");

    let output = fstree(&["rm", arg(&missing)])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to open"));

    Ok(())
}

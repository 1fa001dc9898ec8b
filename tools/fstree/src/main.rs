use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fstree::config::parse_mode;
use fstree::path_utils;
use fstree::{
    Directory, Entity, File, FsConfig, FsNode, HasOwnership, NodeKind, RealFileSystem,
    SharedFileSystem, SortOrder,
};
use log::warn;

#[derive(Parser, Debug)]
#[command(name = "fstree")]
#[command(about = "Inspect and manipulate files, directories and links", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SortKey {
    Created,
    Accessed,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the immediate children of a directory
    Ls {
        dir: PathBuf,

        /// Only show entries of this node type (regular, directory, link, ...)
        #[arg(short = 't', long = "type")]
        node_type: Option<String>,

        /// Sort by modification (created) or access time
        #[arg(short, long, value_enum)]
        sort: Option<SortKey>,

        /// Sort in descending order
        #[arg(long, requires = "sort")]
        desc: bool,
    },

    /// Walk a directory depth-first, printing files and links
    Traverse { dir: PathBuf },

    /// Create a directory and any missing parents
    Mkdir {
        path: PathBuf,

        /// Octal permissions (defaults to $FSTREE_DIR_MODE or 755)
        #[arg(short, long)]
        mode: Option<String>,

        /// Replace whatever already exists at the path
        #[arg(long)]
        overwrite: bool,
    },

    /// Create an empty file
    Touch {
        path: PathBuf,

        /// Octal permissions (defaults to $FSTREE_FILE_MODE or 644)
        #[arg(short, long)]
        mode: Option<String>,

        /// Truncate an existing file
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy a file, directory or link
    Cp {
        source: PathBuf,
        dest: PathBuf,

        #[arg(long)]
        overwrite: bool,
    },

    /// Move a file, directory or link
    Mv {
        source: PathBuf,
        dest: PathBuf,

        #[arg(long)]
        overwrite: bool,
    },

    /// Delete a file, link or whole directory
    Rm { path: PathBuf },

    /// Change permissions
    Chmod {
        /// Octal permissions, e.g. 640
        mode: String,
        path: PathBuf,

        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Change owner and/or group
    Chown {
        path: PathBuf,

        /// User name or numeric uid
        #[arg(short, long)]
        user: Option<String>,

        /// Group name or numeric gid
        #[arg(short, long)]
        group: Option<String>,

        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Create a symbolic link at DEST pointing to SOURCE
    Ln {
        source: PathBuf,
        dest: PathBuf,

        /// Replace an existing node at DEST
        #[arg(short, long)]
        force: bool,
    },
}

/// Resolves a command-line path against the current and home directories.
fn resolve(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let home = dirs::home_dir();
    path_utils::absolutize(path, &cwd, home.as_deref())
        .with_context(|| format!("Invalid path: {}", path.display()))
}

fn mode_or(raw: Option<&str>, default: u32) -> Result<u32> {
    match raw {
        Some(raw) => parse_mode(raw).with_context(|| format!("Invalid mode: {raw}")),
        None => Ok(default),
    }
}

fn open_entity(fs: &SharedFileSystem, path: &Path) -> Result<Entity> {
    let path = resolve(path)?;
    Entity::open(fs.clone(), &path).with_context(|| format!("Failed to open {}", path.display()))
}

fn ls_command(
    fs: SharedFileSystem,
    dir: &Path,
    node_type: Option<&str>,
    sort: Option<SortKey>,
    desc: bool,
) -> Result<()> {
    let path = resolve(dir)?;
    let mut root = Directory::open(fs, &path)
        .with_context(|| format!("Failed to open directory {}", path.display()))?;
    let mut tree = root
        .get_tree()
        .with_context(|| format!("Failed to read directory {}", path.display()))?;

    if let Some(raw) = node_type {
        let kind: NodeKind = raw
            .parse()
            .with_context(|| format!("Unknown node type: {raw}"))?;
        tree = tree.filter_by_file_type(kind, false);
    }

    let order = if desc {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    tree = match sort {
        Some(SortKey::Created) => tree.sort_by_date_created(order)?,
        Some(SortKey::Accessed) => tree.sort_by_date_accessed(order)?,
        None => tree,
    };

    for entity in tree.entities() {
        println!("{}\t{}", entity.kind(), entity.name());
    }
    Ok(())
}

fn traverse_command(fs: SharedFileSystem, dir: &Path) -> Result<()> {
    let path = resolve(dir)?;
    let mut root = Directory::open(fs, &path)
        .with_context(|| format!("Failed to open directory {}", path.display()))?;
    let tree = root.get_tree()?;

    for entity in tree.traverse() {
        match entity {
            Ok(entity) => println!("{}", entity.path().display()),
            Err(e) => {
                warn!("{}", e);
                eprintln!("  - {}", e);
            }
        }
    }
    Ok(())
}

fn mkdir_command(fs: SharedFileSystem, path: &Path, mode: u32, overwrite: bool) -> Result<()> {
    let path = resolve(path)?;
    let dir = Directory::create(fs, &path, mode, overwrite)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    println!("Created: {}", dir.path().display());
    Ok(())
}

fn touch_command(fs: SharedFileSystem, path: &Path, mode: u32, overwrite: bool) -> Result<()> {
    let path = resolve(path)?;
    let file = File::create(fs, &path, b"", mode, overwrite)
        .with_context(|| format!("Failed to create file {}", path.display()))?;
    println!("Created: {}", file.path().display());
    Ok(())
}

fn cp_command(fs: SharedFileSystem, source: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let entity = open_entity(&fs, source)?;
    let dest = resolve(dest)?;
    let report = entity
        .copy(&dest, overwrite)
        .with_context(|| format!("Failed to copy {}", entity.path().display()))?;

    println!("Copied to: {}", report.destination.path().display());
    println!("  Entries copied: {}", report.copied.len());
    if !report.is_complete() {
        println!("\nErrors encountered:");
        for failure in &report.failed {
            eprintln!("  - {}: {}", failure.source.display(), failure.error);
        }
        anyhow::bail!("{} entries could not be copied", report.failed.len());
    }
    Ok(())
}

fn mv_command(fs: SharedFileSystem, source: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    let mut entity = open_entity(&fs, source)?;
    let dest = resolve(dest)?;
    let moved = entity
        .move_to(&dest, overwrite)
        .with_context(|| format!("Failed to move {}", entity.path().display()))?;
    println!("Moved to: {}", moved.path().display());
    Ok(())
}

fn rm_command(fs: SharedFileSystem, path: &Path) -> Result<()> {
    let mut entity = open_entity(&fs, path)?;
    entity
        .delete()
        .with_context(|| format!("Failed to delete {}", entity.path().display()))?;
    println!("Deleted: {}", entity.path().display());
    Ok(())
}

fn chmod_command(fs: SharedFileSystem, mode: &str, path: &Path, recursive: bool) -> Result<()> {
    let mode = parse_mode(mode).with_context(|| format!("Invalid mode: {mode}"))?;
    let entity = open_entity(&fs, path)?;
    entity
        .chmod(mode, recursive)
        .with_context(|| format!("Failed to change permissions of {}", entity.path().display()))?;
    Ok(())
}

fn chown_command(
    fs: SharedFileSystem,
    path: &Path,
    user: Option<&str>,
    group: Option<&str>,
    recursive: bool,
) -> Result<()> {
    let mut entity = open_entity(&fs, path)?;
    entity
        .chown(user, group, recursive)
        .with_context(|| format!("Failed to change ownership of {}", entity.path().display()))?;
    Ok(())
}

fn ln_command(fs: SharedFileSystem, source: &Path, dest: &Path, force: bool) -> Result<()> {
    let entity = open_entity(&fs, source)?;
    let dest = resolve(dest)?;
    let link = entity
        .link(&dest, force)
        .with_context(|| format!("Failed to link {}", dest.display()))?;
    println!("{} -> {}", link.path().display(), link.target().path().display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "info" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Stderr)
        .init();

    let config = FsConfig::from_env();
    let fs: SharedFileSystem = Arc::new(RealFileSystem::new());

    match cli.command {
        Commands::Ls {
            dir,
            node_type,
            sort,
            desc,
        } => ls_command(fs, &dir, node_type.as_deref(), sort, desc),
        Commands::Traverse { dir } => traverse_command(fs, &dir),
        Commands::Mkdir {
            path,
            mode,
            overwrite,
        } => {
            let mode = mode_or(mode.as_deref(), config.directory_permissions)?;
            mkdir_command(fs, &path, mode, overwrite)
        }
        Commands::Touch {
            path,
            mode,
            overwrite,
        } => {
            let mode = mode_or(mode.as_deref(), config.file_permissions)?;
            touch_command(fs, &path, mode, overwrite)
        }
        Commands::Cp {
            source,
            dest,
            overwrite,
        } => cp_command(fs, &source, &dest, overwrite),
        Commands::Mv {
            source,
            dest,
            overwrite,
        } => mv_command(fs, &source, &dest, overwrite),
        Commands::Rm { path } => rm_command(fs, &path),
        Commands::Chmod {
            mode,
            path,
            recursive,
        } => chmod_command(fs, &mode, &path, recursive),
        Commands::Chown {
            path,
            user,
            group,
            recursive,
        } => chown_command(fs, &path, user.as_deref(), group.as_deref(), recursive),
        Commands::Ln {
            source,
            dest,
            force,
        } => ln_command(fs, &source, &dest, force),
    }
}

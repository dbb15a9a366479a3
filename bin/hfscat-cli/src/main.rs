//! hfscat CLI - catalog snapshot tool
//!
//! Formats, inspects and edits an HFS catalog kept in a snapshot file. Every
//! command mounts the snapshot through the entry cache, so edits go through
//! the same create, delete and rename paths a file system would use.

mod session;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hfscat::{Entry, EntryDetail, FileRecord, Fork};
use hfscat_common::{Config, MAC_EPOCH_OFFSET};
use session::Session;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hfscat-cli")]
#[command(about = "HFS catalog snapshot tool")]
#[command(version)]
struct Args {
    /// Catalog snapshot file
    #[arg(short, long, env = "HFSCAT_IMAGE", default_value = "catalog.img")]
    image: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override cache.max_entries
    #[arg(long)]
    max_entries: Option<usize>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty volume
    Format {
        /// Volume name (defaults to volume.name from the config)
        #[arg(short, long)]
        name: Option<String>,
        /// Overwrite an existing snapshot
        #[arg(short, long)]
        force: bool,
    },
    /// Show volume counters
    Info,
    /// List a directory
    Ls {
        /// Path such as docs:letters (empty for the root)
        #[arg(default_value = "")]
        path: String,
    },
    /// Show an entry's catalog fields
    Stat {
        path: String,
    },
    /// Print the directory hierarchy
    Tree {
        #[arg(default_value = "")]
        path: String,
    },
    /// Create a directory
    Mkdir {
        path: String,
    },
    /// Create an empty file
    Touch {
        path: String,
        /// Four-character file type
        #[arg(long, default_value = "TEXT")]
        file_type: String,
        /// Four-character creator code
        #[arg(long, default_value = "????")]
        creator: String,
        /// Also write a file thread record
        #[arg(long)]
        thread: bool,
    },
    /// Delete a file
    Rm {
        path: String,
    },
    /// Delete an empty directory
    Rmdir {
        path: String,
    },
    /// Move or rename an entry
    Mv {
        from: String,
        to: String,
    },
}

/// Pack a Finder type or creator code, space padded
fn four_char_code(code: &str) -> Result<u32> {
    let bytes = code.as_bytes();
    if bytes.len() > 4 {
        bail!("'{code}' is longer than four bytes");
    }
    let mut packed = [b' '; 4];
    packed[..bytes.len()].copy_from_slice(bytes);
    Ok(u32::from_be_bytes(packed))
}

fn unpack_code(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Mac timestamp as Unix seconds
fn unix_time(mac: u32) -> i64 {
    i64::from(mac) - MAC_EPOCH_OFFSET as i64
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config: Config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => Config::default(),
    };

    // CLI args take precedence over the config file
    if let Some(max_entries) = args.max_entries {
        config.cache.max_entries = max_entries;
    }
    config.validate()?;
    Ok(config)
}

fn print_fork(label: &str, fork: &Fork) {
    println!(
        "{label:<10} {} bytes logical, {} physical, {} blocks in first extents",
        fork.logical_size,
        fork.physical_size,
        fork.first_extents.blocks()
    );
}

fn print_stat(entry: &Entry) {
    let data = entry.data();
    let key = entry.key();
    println!("Name:      {}", key.name());
    println!("Parent:    {}", key.parent());
    println!("CNID:      {}", data.cnid);
    println!("Created:   {}", unix_time(data.create_date));
    println!("Modified:  {}", unix_time(data.modify_date));
    match &data.detail {
        EntryDetail::Directory(dir) => {
            println!("Kind:      directory");
            println!("Valence:   {} ({} files, {} dirs)", dir.valence(), dir.files, dir.dirs);
        }
        EntryDetail::File(file) => {
            println!("Kind:      file");
            println!(
                "Type:      {} / {}",
                unpack_code(&file.user_info[0..4]),
                unpack_code(&file.user_info[4..8])
            );
            println!(
                "Flags:     {:#04x}{}{}",
                file.flags,
                if file.flags & FileRecord::FLAG_LOCKED != 0 { " locked" } else { "" },
                if file.has_thread() { " thread" } else { "" }
            );
            print_fork("Data:", &file.data);
            print_fork("Resource:", &file.rsrc);
        }
        EntryDetail::Empty => println!("Kind:      unknown"),
    }
}

fn print_tree(session: &Session, dir: &Entry, depth: usize) -> Result<()> {
    for child in session.list(dir)? {
        let suffix = if child.is_dir() { ":" } else { "" };
        println!("{:indent$}{}{suffix}", "", child.name, indent = depth * 2);
        if child.is_dir() {
            let entry = session.child(dir, &child.name)?;
            print_tree(session, &entry, depth + 1)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_config(&args)?;

    match args.command {
        Commands::Format { name, force } => {
            if let Some(name) = name {
                config.volume.name = name;
            }
            config.volume.validate()?;
            session::format(&args.image, &config, force)?;
            println!("Formatted {} ({})", args.image.display(), config.volume.name);
        }
        Commands::Info => {
            let session = Session::open(&args.image, &config)?;
            let volume = session.volume();
            let counts = volume.counts();
            println!("Volume:     {}", volume.name());
            println!("Next CNID:  {}", volume.next_cnid());
            println!("Files:      {} ({} in root)", counts.files, counts.root_files);
            println!("Folders:    {} ({} in root)", counts.dirs, counts.root_dirs);
        }
        Commands::Ls { path } => {
            let session = Session::open(&args.image, &config)?;
            let dir = session.resolve(&path)?;
            if !dir.is_dir() {
                bail!("{path}: not a directory");
            }
            for child in session.list(&dir)? {
                let kind = if child.is_dir() { "d" } else { "-" };
                println!("{kind} {:>8} {}", child.cnid, child.name);
            }
        }
        Commands::Stat { path } => {
            let session = Session::open(&args.image, &config)?;
            print_stat(&session.resolve(&path)?);
        }
        Commands::Tree { path } => {
            let session = Session::open(&args.image, &config)?;
            let dir = session.resolve(&path)?;
            if !dir.is_dir() {
                bail!("{path}: not a directory");
            }
            println!("{}:", dir.key().name());
            print_tree(&session, &dir, 1)?;
        }
        Commands::Mkdir { path } => {
            let session = Session::open(&args.image, &config)?;
            let entry = session.mkdir(&path)?;
            println!("Created directory {path} (CNID {})", entry.cnid());
            drop(entry);
            session.close()?;
        }
        Commands::Touch {
            path,
            file_type,
            creator,
            thread,
        } => {
            let flags = if thread { FileRecord::FLAG_THREAD } else { 0 };
            let file_type = four_char_code(&file_type)?;
            let creator = four_char_code(&creator)?;
            let session = Session::open(&args.image, &config)?;
            let entry = session.touch(&path, flags, file_type, creator)?;
            println!("Created file {path} (CNID {})", entry.cnid());
            drop(entry);
            session.close()?;
        }
        Commands::Rm { path } => {
            let session = Session::open(&args.image, &config)?;
            session.remove(&path, false)?;
            println!("Removed {path}");
            session.close()?;
        }
        Commands::Rmdir { path } => {
            let session = Session::open(&args.image, &config)?;
            session.remove(&path, true)?;
            println!("Removed directory {path}");
            session.close()?;
        }
        Commands::Mv { from, to } => {
            let session = Session::open(&args.image, &config)?;
            match session.rename(&from, &to)? {
                Some(cnid) => println!("Moved {from} to {to}, replacing CNID {cnid}"),
                None => println!("Moved {from} to {to}"),
            }
            session.close()?;
        }
    }

    Ok(())
}

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use cfs_core::{EntryKind, FileStore, StoreConfig};
use serde::Serialize;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, Serialize)]
struct ListRow {
    name: String,
    kind: &'static str,
    size: u64,
}

#[derive(Debug, Serialize)]
struct SpaceReport {
    page_size: u32,
    capacity_pages: u32,
    free_pages: u64,
    free_bytes: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    if matches!(command.as_str(), "--help" | "-h" | "help") {
        print_usage();
        return Ok(());
    }

    if command == "mkfs" {
        return mkfs(&mut args);
    }

    let Some(image) = args.next() else {
        bail!("{command} requires an <image> argument");
    };
    let store = FileStore::open(Path::new(&image), DEFAULT_CONCURRENCY)
        .with_context(|| format!("failed to open capsule image: {image}"))?;
    tracing::debug!(image, command, "opened capsule");

    match command.as_str() {
        "mkdir" => {
            let (parent, name) = two(&mut args, "mkdir requires <parent> <name>")?;
            store.create_directory(&parent, &name)?;
            Ok(())
        }
        "touch" => {
            let (parent, name) = two(&mut args, "touch requires <parent> <name> [hint]")?;
            let hint = match args.next() {
                Some(raw) => raw.parse().context("size hint must be a byte count")?,
                None => 0,
            };
            store.create_file(&parent, &name, hint)?;
            Ok(())
        }
        "put" => {
            let (path, local) = two(&mut args, "put requires <path> <local-file>")?;
            let mut reader = File::open(&local)
                .with_context(|| format!("failed to open local file: {local}"))?;
            let copied = store.write_from(&path, &mut reader)?;
            eprintln!("{copied} bytes written to {path}");
            Ok(())
        }
        "get" => {
            let (path, local) = two(&mut args, "get requires <path> <local-file>")?;
            let mut writer = File::create(&local)
                .with_context(|| format!("failed to create local file: {local}"))?;
            let copied = store.copy_to(&path, &mut writer)?;
            eprintln!("{copied} bytes read from {path}");
            Ok(())
        }
        "write" => {
            let (path, text) = two(&mut args, "write requires <path> <text>")?;
            store.write(&path, text.as_bytes())?;
            Ok(())
        }
        "cat" => {
            let Some(path) = args.next() else {
                bail!("cat requires a <path> argument");
            };
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            store.copy_to(&path, &mut handle)?;
            handle.flush()?;
            Ok(())
        }
        "ls" => {
            let rest: Vec<String> = args.collect();
            let json = rest.iter().any(|arg| arg == "--json");
            let path = rest
                .iter()
                .find(|arg| !arg.starts_with("--"))
                .cloned()
                .unwrap_or_default();
            list(&store, &path, json)
        }
        "ln" => {
            let (source, rest) = two(&mut args, "ln requires <source> <target-dir> <name>")?;
            let Some(name) = args.next() else {
                bail!("ln requires <source> <target-dir> <name>");
            };
            store.create_hard_link(&source, &rest, &name)?;
            Ok(())
        }
        "mv" => {
            let (parent, rest) = two(&mut args, "mv requires <parent> <target-dir> <name>")?;
            let Some(name) = args.next() else {
                bail!("mv requires <parent> <target-dir> <name>");
            };
            store.move_entry(&parent, &rest, &name)?;
            Ok(())
        }
        "cp" => {
            let (source, rest) = two(&mut args, "cp requires <source> <target-dir> <name>")?;
            let Some(name) = args.next() else {
                bail!("cp requires <source> <target-dir> <name>");
            };
            store.copy_file(&source, &rest, &name)?;
            Ok(())
        }
        "rm" => {
            let Some(path) = args.next() else {
                bail!("rm requires a <path> argument");
            };
            store.remove(&path)?;
            Ok(())
        }
        "du" => {
            let path = args.next().unwrap_or_default();
            println!("{}", store.tree_size(&path)?);
            Ok(())
        }
        "df" => {
            let json = args.any(|arg| arg == "--json");
            space(&store, json)
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn two(args: &mut impl Iterator<Item = String>, usage: &str) -> Result<(String, String)> {
    let Some(first) = args.next() else {
        bail!("{usage}");
    };
    let Some(second) = args.next() else {
        bail!("{usage}");
    };
    Ok((first, second))
}

fn print_usage() {
    println!("cfs\n");
    println!("USAGE:");
    println!("  cfs mkfs <image> <size-bytes> <page-bytes> <inode-count>");
    println!("  cfs mkdir <image> <parent> <name>");
    println!("  cfs touch <image> <parent> <name> [size-hint]");
    println!("  cfs put <image> <path> <local-file>");
    println!("  cfs get <image> <path> <local-file>");
    println!("  cfs write <image> <path> <text>");
    println!("  cfs cat <image> <path>");
    println!("  cfs ls <image> [path] [--json]");
    println!("  cfs ln <image> <source> <target-dir> <name>");
    println!("  cfs mv <image> <parent> <target-dir> <name>");
    println!("  cfs cp <image> <source> <target-dir> <name>");
    println!("  cfs rm <image> <path>");
    println!("  cfs du <image> [path]");
    println!("  cfs df <image> [--json]");
}

fn mkfs(args: &mut impl Iterator<Item = String>) -> Result<()> {
    let Some(image) = args.next() else {
        bail!("mkfs requires <image> <size-bytes> <page-bytes> <inode-count>");
    };
    let (size, page) = two(args, "mkfs requires <image> <size-bytes> <page-bytes> <inode-count>")?;
    let Some(inodes) = args.next() else {
        bail!("mkfs requires <image> <size-bytes> <page-bytes> <inode-count>");
    };

    let size: u64 = size.parse().context("size must be a byte count")?;
    let page: u32 = page.parse().context("page size must be a byte count")?;
    let inodes: u32 = inodes.parse().context("inode count must be a number")?;

    let config = StoreConfig::new(size, page, inodes, DEFAULT_CONCURRENCY)?;
    let store = FileStore::create(Path::new(&image), &config)
        .with_context(|| format!("failed to create capsule image: {image}"))?;
    eprintln!(
        "formatted {image}: {} pages of {} bytes, {inodes} inodes",
        store.capacity_pages(),
        store.page_size()
    );
    Ok(())
}

fn list(store: &FileStore, path: &str, json: bool) -> Result<()> {
    let rows: Vec<ListRow> = store
        .list(path, true)?
        .into_iter()
        .map(|entry| ListRow {
            name: entry.name,
            kind: match entry.file_type {
                EntryKind::Directory => "directory",
                EntryKind::File => "file",
            },
            size: entry.size,
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("serialize listing")?
        );
    } else {
        for row in &rows {
            println!("{:>12}  {:<9}  {}", row.size, row.kind, row.name);
        }
    }
    Ok(())
}

fn space(store: &FileStore, json: bool) -> Result<()> {
    let report = SpaceReport {
        page_size: store.page_size(),
        capacity_pages: store.capacity_pages(),
        free_pages: store.free_pages(),
        free_bytes: store.free_pages() * u64::from(store.page_size()),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        println!("page_size: {}", report.page_size);
        println!("capacity_pages: {}", report.capacity_pages);
        println!("free_pages: {}", report.free_pages);
        println!("free_bytes: {}", report.free_bytes);
    }
    Ok(())
}

//! Plain-text exports of stored chat and viewer snapshots.
//!
//! All times are rendered in UTC.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use chatscribe_core::{normalize_handle, Error, Result, Target};
use chatscribe_store::{ChatEntry, SqliteStore};

const DATE_RULE: &str = "--------------------";

/// Each snapshot of `target`: its timestamp, then the viewers on one
/// indented comma-separated line.
pub fn write_viewer_lists(store: &SqliteStore, target: &Target, out: &mut impl Write) -> Result<()> {
    for at in store.snapshot_times(target)? {
        let viewers = store.snapshot_members(target, at)?;
        writeln!(out, "{}", snapshot_stamp(at))?;
        writeln!(out, "    {}", viewers.join(", "))?;
    }
    Ok(())
}

/// One `<handle>.txt` per stored target. Returns the files written.
pub fn dump_viewer_lists(store: &SqliteStore, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for row in store.list_targets()? {
        let Some(target) = store.find_target(&row.handle)? else {
            continue;
        };
        let path = dir.join(format!("{}.txt", row.handle));
        let mut out = BufWriter::new(File::create(&path)?);
        write_viewer_lists(store, &target, &mut out)?;
        out.flush()?;
        written.push(path);
    }
    info!("Wrote {} viewer list files to {}", written.len(), dir.display());
    Ok(written)
}

/// Messages grouped under a date header whenever the date changes.
pub fn write_chat(entries: &[ChatEntry], out: &mut impl Write) -> Result<()> {
    let mut last_date = None;
    for entry in entries {
        let date = entry.observed_at.date_naive();
        if last_date != Some(date) {
            writeln!(out, "{}", date.format("%Y-%m-%d"))?;
            writeln!(out, "{}", DATE_RULE)?;
            last_date = Some(date);
        }
        writeln!(
            out,
            "[{}] <{}> {}",
            entry.observed_at.format("%H:%M"),
            entry.author,
            entry.body
        )?;
    }
    Ok(())
}

/// Write the chat of `handle` to `<dir>/<handle>.txt`.
pub fn dump_chat(store: &SqliteStore, handle: &str, dir: &Path) -> Result<PathBuf> {
    let handle = normalize_handle(handle);
    if handle.is_empty() {
        return Err(Error::NotFound("empty handle".into()));
    }
    let entries = store.chat_for_target(&handle)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.txt", handle));
    let mut out = BufWriter::new(File::create(&path)?);
    write_chat(&entries, &mut out)?;
    out.flush()?;
    info!("Wrote {} messages to {}", entries.len(), path.display());
    Ok(path)
}

/// Every message, one per line, prefixed by its chat room.
pub fn write_all(entries: &[ChatEntry], timestamps: bool, out: &mut impl Write) -> Result<()> {
    for entry in entries {
        if timestamps {
            writeln!(
                out,
                "[{}] {} <{}> {}",
                entry.target,
                entry.observed_at.format("%Y-%m-%d %H:%M:%S"),
                entry.author,
                entry.body
            )?;
        } else {
            writeln!(out, "[{}] <{}> {}", entry.target, entry.author, entry.body)?;
        }
    }
    Ok(())
}

fn snapshot_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

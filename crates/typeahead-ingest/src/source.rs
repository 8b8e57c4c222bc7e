use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use typeahead_core::traits::RecordSource;
use typeahead_core::types::Record;

const RECORD_EXTENSIONS: [&str; 2] = ["jsonl", "txt"];

/// One record per line of a file, or of every `.jsonl`/`.txt` file under a
/// directory (walked recursively, in sorted path order).
#[derive(Debug, Clone)]
pub struct LineSource {
    root: PathBuf,
}

impl LineSource {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if self.root.is_file() {
            return Ok(vec![self.root.clone()]);
        }
        if !self.root.is_dir() {
            bail!("record source {} does not exist", self.root.display());
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = entry.with_context(|| format!("walking {}", self.root.display()))?;
            if entry.file_type().is_file() && has_record_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn has_record_extension(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()).is_some_and(|ext| RECORD_EXTENSIONS.contains(&ext))
}

impl RecordSource for LineSource {
    fn describe(&self) -> String { self.root.display().to_string() }

    fn records(&self) -> Result<Box<dyn Iterator<Item = io::Result<Record>> + Send + '_>> {
        let files = self.files()?;
        tracing::debug!(source = %self.root.display(), files = files.len(), "opening record source");
        Ok(numbered(files))
    }
}

/// Ids run from 1 across all files and count failed lines too, so a record's
/// id is its position in the source.
fn numbered(files: Vec<PathBuf>) -> Box<dyn Iterator<Item = io::Result<Record>> + Send> {
    let lines = files.into_iter().flat_map(file_lines);
    Box::new(lines.zip(1u64..).map(|(line, id)| line.map(|line| Record { id, line })))
}

/// Lines of one file. A line that is not UTF-8 is yielded as an error and
/// reading carries on; any other read error ends this file after yielding it.
/// A file that cannot be opened yields a single error.
fn file_lines(path: PathBuf) -> Box<dyn Iterator<Item = io::Result<String>> + Send> {
    match File::open(&path) {
        Ok(file) => {
            let mut broken = false;
            Box::new(BufReader::new(file).lines().map_while(move |line| {
                if broken {
                    return None;
                }
                Some(line.map_err(|e| {
                    broken = e.kind() != io::ErrorKind::InvalidData;
                    with_path(&path, &e)
                }))
            }))
        }
        Err(e) => Box::new(std::iter::once(Err(with_path(&path, &e)))),
    }
}

fn with_path(path: &Path, e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
}

/// Records held in memory, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    lines: Vec<String>,
}

impl MemorySource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: lines.into_iter().map(Into::into).collect() }
    }
}

impl RecordSource for MemorySource {
    fn describe(&self) -> String { format!("memory ({} lines)", self.lines.len()) }

    fn records(&self) -> Result<Box<dyn Iterator<Item = io::Result<Record>> + Send + '_>> {
        Ok(Box::new(self.lines.iter().zip(1u64..).map(|(line, id)| Ok(Record { id, line: line.clone() }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_file_fails_once_and_the_next_file_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.jsonl");
        let last = dir.path().join("c.jsonl");
        std::fs::write(&first, "one\ntwo\n").expect("write");
        std::fs::write(&last, "three\n").expect("write");
        // Opening a directory succeeds but reading it does not.
        let unreadable = dir.path().join("b.jsonl");
        std::fs::create_dir(&unreadable).expect("mkdir");

        let items: Vec<_> = numbered(vec![first, unreadable, last]).collect();
        assert_eq!(items.len(), 4);
        assert!(items[2].is_err());
        let ok: Vec<_> = items.into_iter().filter_map(Result::ok).map(|r| (r.id, r.line)).collect();
        assert_eq!(ok, vec![(1, "one".to_string()), (2, "two".to_string()), (4, "three".to_string())]);
    }

    #[test]
    fn invalid_utf8_line_is_skipped_over() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"good\n\xff\xfe\nafter\n").expect("write");
        let items: Vec<_> = file_lines(path).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_ref().map_err(io::Error::kind).unwrap_err(), io::ErrorKind::InvalidData);
        assert_eq!(items[2].as_deref().ok(), Some("after"));
    }
}

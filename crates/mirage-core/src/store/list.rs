//! Ordered list storage with head-push semantics.
//!
//! Lists behave like a stack: `push` adds to the head, `list` returns values
//! newest first, `pop` removes the newest value. Appends from concurrent
//! requests are independent; no cross-request invariant depends on order.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Ordered list store, Redis-list-like semantics.
pub trait ListStore: Send + Sync {
    /// Push a value to the head of the named list.
    fn push(&self, list: &str, value: &str) -> Result<()>;

    /// All values in the named list, newest first.
    fn list(&self, list: &str) -> Result<Vec<String>>;

    /// Remove and return the newest value, if any.
    fn pop(&self, list: &str) -> Result<Option<String>>;

    /// Number of values in the named list.
    fn len(&self, list: &str) -> Result<usize>;
}

/// In-memory list store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryListStore {
    // Values kept oldest first; the head of the list is the tail of the Vec.
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ListStore for MemoryListStore {
    fn push(&self, list: &str, value: &str) -> Result<()> {
        let mut lists = self.lists.lock().unwrap();
        lists.entry(list.to_string()).or_default().push(value.to_string());
        Ok(())
    }

    fn list(&self, list: &str) -> Result<Vec<String>> {
        let lists = self.lists.lock().unwrap();
        Ok(lists
            .get(list)
            .map(|v| v.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn pop(&self, list: &str) -> Result<Option<String>> {
        let mut lists = self.lists.lock().unwrap();
        Ok(lists.get_mut(list).and_then(|v| v.pop()))
    }

    fn len(&self, list: &str) -> Result<usize> {
        let lists = self.lists.lock().unwrap();
        Ok(lists.get(list).map_or(0, |v| v.len()))
    }
}

/// File-backed list store: one line-per-value file per list under a
/// directory. Pushes append; reads reverse, so the newest value is the file's
/// last line.
pub struct FileListStore {
    dir: PathBuf,
    // Serializes the read-modify-write in pop against concurrent pushes.
    write_lock: Mutex<()>,
}

impl FileListStore {
    /// Create a store rooted at `dir`, creating the directory as needed.
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating list store directory {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, list: &str) -> PathBuf {
        self.dir.join(format!("{list}.list"))
    }

    fn read_lines(&self, list: &str) -> Result<Vec<String>> {
        let path = self.path_for(list);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading list {}", path.display()))?;
        Ok(contents.lines().map(str::to_string).collect())
    }
}

impl ListStore for FileListStore {
    fn push(&self, list: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let path = self.path_for(list);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening list {}", path.display()))?;
        // Values are stored one per line; embedded newlines would corrupt
        // the list, so they are escaped on the way in.
        writeln!(file, "{}", escape_line(value))?;
        Ok(())
    }

    fn list(&self, list: &str) -> Result<Vec<String>> {
        let lines = self.read_lines(list)?;
        Ok(lines.into_iter().rev().map(|l| unescape_line(&l)).collect())
    }

    fn pop(&self, list: &str) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().unwrap();
        let mut lines = self.read_lines(list)?;
        let newest = lines.pop();
        if newest.is_some() {
            let mut contents = lines.join("\n");
            if !contents.is_empty() {
                contents.push('\n');
            }
            fs::write(self.path_for(list), contents)?;
        }
        Ok(newest.map(|l| unescape_line(&l)))
    }

    fn len(&self, list: &str) -> Result<usize> {
        Ok(self.read_lines(list)?.len())
    }
}

// Backslashes are escaped before newlines so values that already contain a
// literal `\n` sequence (JSON-encoded strings do) round-trip unchanged.
fn escape_line(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_semantics(store: &dyn ListStore) {
        assert_eq!(store.len("t").unwrap(), 0);
        assert!(store.list("t").unwrap().is_empty());
        assert!(store.pop("t").unwrap().is_none());

        store.push("t", "a").unwrap();
        store.push("t", "b").unwrap();
        store.push("t", "c").unwrap();

        // Newest first.
        assert_eq!(store.list("t").unwrap(), vec!["c", "b", "a"]);
        assert_eq!(store.len("t").unwrap(), 3);

        // Pop removes the newest.
        assert_eq!(store.pop("t").unwrap().as_deref(), Some("c"));
        assert_eq!(store.list("t").unwrap(), vec!["b", "a"]);

        // Lists are independent.
        store.push("u", "x").unwrap();
        assert_eq!(store.len("t").unwrap(), 2);
        assert_eq!(store.len("u").unwrap(), 1);
    }

    #[test]
    fn memory_store_semantics() {
        check_semantics(&MemoryListStore::new());
    }

    #[test]
    fn file_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
        check_semantics(&store);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
            store.push("rules", "union").unwrap();
            store.push("rules", "select").unwrap();
        }
        let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.list("rules").unwrap(), vec!["select", "union"]);
    }

    #[test]
    fn file_store_escapes_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
        store.push("p", "line one\nline two").unwrap();
        store.push("p", "after").unwrap();
        assert_eq!(store.len("p").unwrap(), 2);
        assert_eq!(store.pop("p").unwrap().as_deref(), Some("after"));
        assert_eq!(store.pop("p").unwrap().as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn file_store_preserves_literal_escape_sequences() {
        // A JSON-encoded value carries literal backslash-n; it must come
        // back byte-identical, not as a real newline.
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
        let json = r#"{"patch":"line1\nline2","rule":"/a\\s+b/i"}"#;
        store.push("h", json).unwrap();
        assert_eq!(store.list("h").unwrap(), vec![json.to_string()]);
        assert_eq!(store.pop("h").unwrap().as_deref(), Some(json));
    }

    #[test]
    fn file_store_pop_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::open(dir.path().to_path_buf()).unwrap();
        store.push("q", "only").unwrap();
        assert_eq!(store.pop("q").unwrap().as_deref(), Some("only"));
        assert!(store.pop("q").unwrap().is_none());
        assert_eq!(store.len("q").unwrap(), 0);
    }
}

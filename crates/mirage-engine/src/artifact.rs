//! The protected artifact: the decoy source file subject to whole-file
//! patching.
//!
//! The evolution engine is the only writer; observers read the file to
//! report patch status. Whole-file replacement is the only mutation. Writes
//! go through a scoped lock so a run's overwrite can never interleave with
//! another write, but a reader may still observe a replacement committed
//! mid-analysis -- an accepted race for a single-purpose, non-critical file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{EngineError, Result};

/// Markers whose presence means the decoy source now uses parameterized
/// queries, i.e. the vulnerability has been patched.
const PATCHED_MARKERS: &[&str] = &["WHERE username = ?", "cursor.execute(query, (username,))"];

/// Seed content for a fresh deployment: the deliberately vulnerable decoy
/// service, f-string SQL and all.
pub const SEED_SOURCE: &str = r#"import sqlite3
from flask import Flask, request

app = Flask(__name__)

@app.route('/users')
def get_user():
    username = request.args.get('username')

    # Build the lookup query for the requested user.
    query = f"SELECT * FROM users WHERE username = '{username}'"

    conn = sqlite3.connect('database.db')
    cursor = conn.cursor()
    cursor.execute(query)
    data = cursor.fetchall()
    conn.close()

    return str(data)

if __name__ == '__main__':
    app.run(debug=True)
"#;

/// Current patch status of the artifact, for the observer surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PatchStatus {
    pub is_patched: bool,
    /// Full current text of the artifact for display.
    pub source: String,
}

pub struct ProtectedArtifact {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProtectedArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the seed source if the artifact does not exist yet.
    pub fn ensure_seeded(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(EngineError::ArtifactWrite)?;
        }
        std::fs::write(&self.path, SEED_SOURCE).map_err(EngineError::ArtifactWrite)?;
        info!(path = %self.path.display(), "seeded protected artifact");
        Ok(())
    }

    /// Full current text of the artifact.
    pub fn read(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(EngineError::ArtifactRead)
    }

    /// Overwrite the artifact in full. The scoped lock serializes writers;
    /// it is released on every path out.
    pub async fn replace(&self, content: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        std::fs::write(&self.path, content).map_err(EngineError::ArtifactWrite)
    }

    /// Whether the current content shows parameterized-query usage.
    pub fn status(&self) -> PatchStatus {
        let source = self.read().unwrap_or_default();
        let is_patched = PATCHED_MARKERS.iter().any(|m| source.contains(m));
        PatchStatus { is_patched, source }
    }
}

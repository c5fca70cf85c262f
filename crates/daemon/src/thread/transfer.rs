// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread transfer packages: a self-contained directory (`manifest.json`,
//! `session.jsonl`, `index.sha256`) that moves one thread's event history
//! between daemons.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::envelope::Envelope;
use crate::error::BridgeError;
use crate::store::Store;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    thread_id: String,
    project_path: String,
    exported_at: chrono::DateTime<chrono::Utc>,
    item_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub package_path: PathBuf,
    pub item_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportResult {
    pub thread_id: String,
    pub item_count: usize,
    /// The rewritten package written for the imported thread.
    pub package_path: PathBuf,
}

/// Exports and imports thread packages against a base directory
/// (`BRIDGED_PACKAGE_DIR`), one subdirectory per package keyed by thread id.
pub struct ThreadTransfer {
    store: Store,
    base_dir: PathBuf,
}

impl ThreadTransfer {
    pub fn new(store: Store, base_dir: PathBuf) -> Self {
        Self { store, base_dir }
    }

    /// Write a full export package for `thread_id`. Refuses to overwrite an
    /// existing package directory for the same thread id.
    pub async fn export(&self, thread_id: &str) -> Result<ExportResult, BridgeError> {
        let thread = self.store.get_thread(thread_id).await?;
        let (envelopes, _next_cursor, _has_more, _total) =
            self.store.list_thread_events(thread_id, -1, i64::MAX).await?;

        let package_path = self.base_dir.join(thread_id);
        if package_path.exists() {
            return Err(BridgeError::new(crate::error::ErrorCode::Conflict, "export package already exists for this thread"));
        }
        std::fs::create_dir_all(&package_path).map_err(|e| BridgeError::internal(format!("creating package dir: {e}")))?;

        let session_lines: Vec<String> = envelopes
            .iter()
            .map(|e| session_line(thread_id, e))
            .collect::<Result<_, _>>()?;
        let session_text = session_lines.join("\n") + if session_lines.is_empty() { "" } else { "\n" };

        let manifest = Manifest {
            thread_id: thread_id.to_string(),
            project_path: thread.project_path.clone(),
            exported_at: chrono::Utc::now(),
            item_count: envelopes.len(),
        };
        let manifest_text = serde_json::to_string_pretty(&manifest).map_err(|e| BridgeError::internal(e.to_string()))?;

        std::fs::write(package_path.join("manifest.json"), &manifest_text)
            .map_err(|e| BridgeError::internal(format!("writing manifest: {e}")))?;
        std::fs::write(package_path.join("session.jsonl"), &session_text)
            .map_err(|e| BridgeError::internal(format!("writing session: {e}")))?;

        let index = coreutils_sha256_index(&[("manifest.json", manifest_text.as_bytes()), ("session.jsonl", session_text.as_bytes())]);
        std::fs::write(package_path.join("index.sha256"), &index).map_err(|e| BridgeError::internal(format!("writing index: {e}")))?;

        Ok(ExportResult { package_path, item_count: envelopes.len() })
    }

    /// Import a package directory: generate a fresh thread id, rewrite
    /// every case-insensitive occurrence of the old id in-line throughout
    /// the session file, write the rewritten package under the new id, and
    /// re-insert the items as the new thread's projection, which ends up
    /// holding exactly the source thread's items under the new id.
    pub async fn import(&self, package_path: &Path) -> Result<ImportResult, BridgeError> {
        let package_path = normalize_path_separators(package_path);
        let manifest_text = std::fs::read_to_string(package_path.join("manifest.json"))
            .map_err(|e| BridgeError::bad_request(format!("reading manifest: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&manifest_text).map_err(|e| BridgeError::bad_request(format!("parsing manifest: {e}")))?;
        let session_text = std::fs::read_to_string(package_path.join("session.jsonl"))
            .map_err(|e| BridgeError::bad_request(format!("reading session: {e}")))?;

        let new_thread_id = uuid::Uuid::new_v4().to_string();
        let rewritten = rewrite_id_case_insensitive(&session_text, &manifest.thread_id, &new_thread_id);

        if self.store.get_thread(&new_thread_id).await.is_ok() {
            return Err(BridgeError::new(crate::error::ErrorCode::Conflict, "generated thread id already exists"));
        }

        // The imported thread gets its own self-contained package; an
        // existing directory under the fresh id is never overwritten.
        let target_path = self.base_dir.join(&new_thread_id);
        if target_path.exists() {
            return Err(BridgeError::new(crate::error::ErrorCode::Conflict, "package directory for generated thread id already exists"));
        }

        self.store.create_thread(&new_thread_id, &manifest.project_path, None).await?;
        let job_id = format!("{new_thread_id}-import");
        self.store.create_job(&job_id, &new_thread_id).await?;

        let mut envelopes = Vec::new();
        for line in rewritten.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let mut envelope: Envelope = serde_json::from_str(line).map_err(|e| BridgeError::bad_request(format!("parsing session line: {e}")))?;
            envelope.job_id = job_id.clone();
            envelopes.push(envelope);
        }

        self.store.import_events(&new_thread_id, &job_id, &envelopes).await?;

        let target_manifest = Manifest {
            thread_id: new_thread_id.clone(),
            project_path: manifest.project_path.clone(),
            exported_at: chrono::Utc::now(),
            item_count: envelopes.len(),
        };
        let target_manifest_text = serde_json::to_string_pretty(&target_manifest).map_err(|e| BridgeError::internal(e.to_string()))?;
        std::fs::create_dir_all(&target_path).map_err(|e| BridgeError::internal(format!("creating package dir: {e}")))?;
        std::fs::write(target_path.join("manifest.json"), &target_manifest_text)
            .map_err(|e| BridgeError::internal(format!("writing manifest: {e}")))?;
        std::fs::write(target_path.join("session.jsonl"), &rewritten)
            .map_err(|e| BridgeError::internal(format!("writing session: {e}")))?;
        let index = coreutils_sha256_index(&[("manifest.json", target_manifest_text.as_bytes()), ("session.jsonl", rewritten.as_bytes())]);
        std::fs::write(target_path.join("index.sha256"), &index).map_err(|e| BridgeError::internal(format!("writing index: {e}")))?;

        Ok(ImportResult { thread_id: new_thread_id, item_count: envelopes.len(), package_path: target_path })
    }
}

/// One session line: the envelope's JSON with the owning `threadId` folded
/// in, so a package is self-describing line by line and the import-time id
/// rewrite has a concrete occurrence to rewrite on every line.
fn session_line(thread_id: &str, envelope: &Envelope) -> Result<String, BridgeError> {
    let mut value = serde_json::to_value(envelope).map_err(|e| BridgeError::internal(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("threadId".to_string(), serde_json::Value::String(thread_id.to_string()));
    }
    serde_json::to_string(&value).map_err(|e| BridgeError::internal(e.to_string()))
}

/// Treats backslashes as forward slashes on input, so a client-supplied
/// Windows-style package path still resolves.
fn normalize_path_separators(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}

/// Replace every case-insensitive occurrence of `old_id` in `text` with
/// `new_id`, walking characters rather than byte offsets into a lowercased
/// copy: lowercasing can change a character's UTF-8 length (e.g. U+0130),
/// so offsets found in a folded copy do not transfer back to the original.
fn rewrite_id_case_insensitive(text: &str, old_id: &str, new_id: &str) -> String {
    let needle: Vec<char> = old_id.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(first) = rest.chars().next() {
        if let Some(matched) = prefix_match_len(rest, &needle) {
            out.push_str(new_id);
            rest = &rest[matched..];
        } else {
            out.push(first);
            rest = &rest[first.len_utf8()..];
        }
    }
    out
}

/// Byte length of a case-insensitive occurrence of `needle` at the start
/// of `haystack`, if one is there. A haystack character whose lowercase
/// folding runs past the end of the needle is not a match; the matched
/// span always ends on a character boundary of the original text.
fn prefix_match_len(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut pos = 0;
    for (idx, ch) in haystack.char_indices() {
        if pos == needle.len() {
            return Some(idx);
        }
        for folded in ch.to_lowercase() {
            if pos >= needle.len() || folded != needle[pos] {
                return None;
            }
            pos += 1;
        }
    }
    (pos == needle.len()).then_some(haystack.len())
}

fn coreutils_sha256_index(files: &[(&str, &[u8])]) -> String {
    let mut out = String::new();
    for (name, contents) in files {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        out.push_str(&format!("{:x}  {}\n", hasher.finalize(), name));
    }
    out
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;

//! Reloadable seed list
//!
//! A plain text file with one seed per line. Lines starting with `//` are
//! comments, blank lines are skipped and a line that does not parse is
//! logged and skipped without aborting the load. The file is reloaded when
//! the watcher reports an outside change and written back through the
//! [`WriteSuppressionLock`] so our own saves do not trigger a reload.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::{Callbacks, WriteSuppressionLock};

const NUMERIC_HEADER: &str = "// Paste your seeds in this file (each seed in a new line) and save it.";
const TEXT_HEADER: &str =
    "// Paste your seeds in this file (each seed in a new line) and save it. Also supports text as seeds!";

/// How a non-comment line is turned into a seed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedGrammar {
    /// Signed 64-bit integers only
    #[default]
    Numeric,
    /// Integers, or any other text hashed to a seed
    Text,
}

impl SeedGrammar {
    /// Header written to new seed files.
    pub fn default_header(self) -> &'static str {
        match self {
            SeedGrammar::Numeric => NUMERIC_HEADER,
            SeedGrammar::Text => TEXT_HEADER,
        }
    }

    pub fn parse(self, line: &str) -> Option<i64> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match (self, line.parse::<i64>()) {
            (_, Ok(seed)) => Some(seed),
            (SeedGrammar::Numeric, Err(_)) => None,
            (SeedGrammar::Text, Err(_)) => Some(i64::from(java_string_hash(line))),
        }
    }
}

/// 32-bit string hash over UTF-16 code units (`h = 31 * h + c`), the value
/// game launchers derive from text seeds.
pub fn java_string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    pub text: String,
}

/// Outcome of parsing a seed list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub values: Vec<i64>,
    pub skipped: Vec<SkippedLine>,
    /// First comment line, kept verbatim
    pub header: Option<String>,
}

/// Parses seed list text. Unparseable lines are logged and reported.
pub fn parse_seed_list(content: &str, grammar: SeedGrammar) -> LoadReport {
    let mut report = LoadReport::default();

    for (index, line) in content.lines().enumerate() {
        if line.starts_with("//") {
            if report.header.is_none() {
                report.header = Some(line.to_string());
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match grammar.parse(line) {
            Some(seed) => report.values.push(seed),
            None => {
                tracing::warn!("Could not parse seed in line {}: {}", index + 1, line);
                report.skipped.push(SkippedLine {
                    line: index + 1,
                    text: line.to_string(),
                });
            }
        }
    }

    report
}

#[derive(Debug)]
struct SeedState {
    seeds: VecDeque<i64>,
    header: String,
}

impl SeedState {
    fn lines(&self) -> Vec<String> {
        std::iter::once(self.header.clone())
            .chain(self.seeds.iter().map(i64::to_string))
            .collect()
    }
}

/// Seed list backed by a tracked file.
#[derive(Debug)]
pub struct SeedFile {
    path: PathBuf,
    grammar: SeedGrammar,
    lock: WriteSuppressionLock,
    state: Mutex<SeedState>,
}

impl SeedFile {
    /// Opens the seed list at `path`, creating the file (and its directory)
    /// when missing.
    pub fn open<P: AsRef<Path>>(path: P, lock: WriteSuppressionLock, grammar: SeedGrammar) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                tracing::info!("Creating new directories {}", parent.display());
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut seeds = Self {
            path: path.to_path_buf(),
            grammar,
            lock,
            state: Mutex::new(SeedState {
                seeds: VecDeque::new(),
                header: grammar.default_header().to_string(),
            }),
        };

        let exists = path.exists();
        if !exists {
            seeds.create_new()?;
        }

        seeds.path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        if exists {
            seeds.load()?;
        }
        Ok(seeds)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a file holding only the header.
    pub fn create_new(&self) -> Result<()> {
        tracing::info!("Creating new {}", self.path.display());
        let header = self.state.lock().header.clone();
        self.write(&[header])
    }

    /// Replaces the in-memory list with the file's current contents.
    pub fn load(&self) -> Result<LoadReport> {
        tracing::info!("Loading {}", self.path.display());
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let report = parse_seed_list(&content, self.grammar);

        let mut state = self.state.lock();
        state.seeds = report.values.iter().copied().collect();
        if let Some(header) = &report.header {
            state.header = header.clone();
        }
        Ok(report)
    }

    /// Writes the list back without triggering our own reload.
    pub fn save(&self) -> Result<()> {
        let lines = self.state.lock().lines();
        self.write(&lines)
    }

    pub fn seeds(&self) -> Vec<i64> {
        self.state.lock().seeds.iter().copied().collect()
    }

    pub fn set_seeds<I: IntoIterator<Item = i64>>(&self, seeds: I) {
        self.state.lock().seeds = seeds.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.state.lock().seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().seeds.is_empty()
    }

    /// Takes the first seed off the list and saves the rest.
    pub fn next_seed(&self) -> Result<Option<i64>> {
        let (seed, lines) = {
            let mut state = self.state.lock();
            let seed = state.seeds.pop_front();
            (seed, state.lines())
        };
        if seed.is_some() {
            self.write(&lines)?;
        }
        Ok(seed)
    }

    /// Whether `path` refers to this seed file.
    pub fn is_tracked(&self, path: &Path) -> bool {
        path == self.path || path.canonicalize().is_ok_and(|resolved| resolved == self.path)
    }

    /// Reloads when `path` is this seed file. Returns the report of the
    /// reload, or `None` for other paths and failed reads.
    pub fn reload_if_tracked(&self, path: &Path) -> Option<LoadReport> {
        if !self.is_tracked(path) {
            return None;
        }

        match self.load() {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!("An error occurred while reading the seed file: {:#}", err);
                None
            }
        }
    }

    /// Callbacks reloading this file on outside changes.
    pub fn callbacks(self: &Arc<Self>) -> Callbacks {
        let created = Arc::clone(self);
        let modified = Arc::clone(self);
        let deleted = Arc::clone(self);

        Callbacks::new()
            .on_new_file(move |path| {
                created.reload_if_tracked(path);
            })
            .on_modify_file(move |path| {
                modified.reload_if_tracked(path);
            })
            .on_delete_file(move |path| {
                if deleted.is_tracked(path) {
                    tracing::warn!("Seed file {} was deleted, keeping {} seeds in memory", path.display(), deleted.len());
                }
            })
    }

    fn write(&self, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        content.push('\n');

        tracing::info!("Saving {}", self.path.display());
        self.lock.schedule_and_lock(&self.path);
        if let Err(err) = fs::write(&self.path, content) {
            // No event will follow a failed write
            self.lock.consume(&self.path);
            return Err(err).with_context(|| format!("Failed to write {}", self.path.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_numeric_grammar() {
        assert_eq!(SeedGrammar::Numeric.parse("12345"), Some(12345));
        assert_eq!(SeedGrammar::Numeric.parse("  -42 "), Some(-42));
        assert_eq!(SeedGrammar::Numeric.parse("+7"), Some(7));
        assert_eq!(SeedGrammar::Numeric.parse("abcde"), None);
        assert_eq!(SeedGrammar::Numeric.parse("99999999999999999999"), None);
        assert_eq!(SeedGrammar::Numeric.parse("   "), None);
    }

    #[test]
    fn test_text_grammar_hashes_words() {
        assert_eq!(java_string_hash(""), 0);
        assert_eq!(java_string_hash("a"), 97);
        assert_eq!(java_string_hash("hello"), 99_162_322);
        assert_eq!(java_string_hash("Minecraft"), -1_595_926_131);

        assert_eq!(SeedGrammar::Text.parse("12345"), Some(12345));
        assert_eq!(SeedGrammar::Text.parse("hello"), Some(99_162_322));
        assert_eq!(SeedGrammar::Text.parse(" hello "), Some(99_162_322));
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let report = parse_seed_list("// comment\n\n12345\nabcde\n67890\n// trailing\n", SeedGrammar::Numeric);

        assert_eq!(report.values, vec![12345, 67890]);
        assert_eq!(
            report.skipped,
            vec![SkippedLine {
                line: 4,
                text: "abcde".to_string()
            }]
        );
        assert_eq!(report.header.as_deref(), Some("// comment"));
    }

    #[test]
    fn test_open_creates_file_with_header() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedchecker/seedlist.txt");

        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();

        assert!(seeds.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", SeedGrammar::Numeric.default_header()));
    }

    #[test]
    fn test_save_then_reload_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();

        seeds.set_seeds([12345, 67890]);
        seeds.save().unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n12345\n67890\n", SeedGrammar::Numeric.default_header())
        );

        fs::write(&path, "// comment\n12345\nabcde\n67890\n").unwrap();
        let report = seeds.load().unwrap();

        assert_eq!(report.values, vec![12345, 67890]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 3);
        assert_eq!(seeds.seeds(), vec![12345, 67890]);
    }

    #[test]
    fn test_header_is_kept_on_save() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        fs::write(&path, "// my seeds\n1\n2\n").unwrap();

        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();
        assert_eq!(seeds.seeds(), vec![1, 2]);

        assert_eq!(seeds.next_seed().unwrap(), Some(1));
        assert_eq!(fs::read_to_string(&path).unwrap(), "// my seeds\n2\n");
    }

    #[test]
    fn test_save_schedules_suppression() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        let lock = WriteSuppressionLock::default();
        let seeds = SeedFile::open(&path, lock.clone(), SeedGrammar::Numeric).unwrap();
        lock.consume(&path);

        seeds.set_seeds([1]);
        seeds.save().unwrap();

        assert!(lock.is_locked(&path));
    }

    #[test]
    fn test_header_matches_grammar() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let numeric = temp_dir.path().join("numeric.txt");
        let text = temp_dir.path().join("text.txt");

        SeedFile::open(&numeric, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();
        SeedFile::open(&text, WriteSuppressionLock::default(), SeedGrammar::Text).unwrap();

        assert!(!fs::read_to_string(&numeric).unwrap().contains("text"));
        assert!(fs::read_to_string(&text).unwrap().contains("supports text"));
    }

    #[test]
    fn test_next_seed_saves_the_list_it_popped_from() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        fs::write(&path, "// seeds\n1\n2\n3\n").unwrap();
        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();

        for (expected, remainder) in [(1, "2\n3\n"), (2, "3\n"), (3, "")] {
            assert_eq!(seeds.next_seed().unwrap(), Some(expected));
            assert_eq!(fs::read_to_string(&path).unwrap(), format!("// seeds\n{}", remainder));
        }
        assert!(seeds.is_empty());
    }

    #[test]
    fn test_failed_write_releases_suppression() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        let lock = WriteSuppressionLock::default();
        let seeds = SeedFile::open(&path, lock.clone(), SeedGrammar::Numeric).unwrap();
        lock.consume(&path);

        // A directory in place of the file makes the write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        seeds.set_seeds([1]);
        assert!(seeds.save().is_err());
        assert!(!lock.is_locked(&path));
        assert_eq!(lock.pending(), 0);
    }

    #[test]
    fn test_next_seed_on_empty_list() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();

        assert_eq!(seeds.next_seed().unwrap(), None);
    }

    #[test]
    fn test_reload_only_for_tracked_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("seedlist.txt");
        let other = temp_dir.path().join("other.txt");
        fs::write(&path, "5\n").unwrap();
        fs::write(&other, "6\n").unwrap();
        let seeds = SeedFile::open(&path, WriteSuppressionLock::default(), SeedGrammar::Numeric).unwrap();

        fs::write(&path, "7\n8\n").unwrap();
        assert!(seeds.reload_if_tracked(&other).is_none());
        assert_eq!(seeds.seeds(), vec![5]);

        let report = seeds.reload_if_tracked(&path).unwrap();
        assert_eq!(report.values, vec![7, 8]);
        assert_eq!(seeds.seeds(), vec![7, 8]);
    }
}

//! Vocabulary list loading and lookup.
//!
//! Vocabulary lists live in a directory of YAML definition files, one list
//! per file:
//!
//! ```yaml
//! id: animals
//! type: vocabulary
//! name: Animals
//! spec:
//!   data:
//!     - english: dog
//!       spanish: perro
//!     - english: cat
//!       spanish: gato
//!       context: El gato duerme. (The cat sleeps.)
//! ```
//!
//! The directory is read once into an immutable [`VocabularyStore`] which is
//! shared by the request handlers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, warn};

use crate::error::{HablaError, Result};

/// The list type consumed by the flashcard and sentence game views.
pub const VOCABULARY_TYPE: &str = "vocabulary";

/// A word in the learner's language paired with its Spanish translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPair {
    /// Source-language text.
    pub english: String,
    /// Target-language text.
    pub spanish: String,
    /// Optional example sentence shown with the card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl WordPair {
    /// Creates a word pair without context.
    #[must_use]
    pub fn new(english: impl Into<String>, spanish: impl Into<String>) -> Self {
        Self {
            english: english.into(),
            spanish: spanish.into(),
            context: None,
        }
    }

    /// Text in the learner's own language.
    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.english
    }

    /// Text in the language being learned.
    #[must_use]
    pub fn target_text(&self) -> &str {
        &self.spanish
    }
}

/// The `spec` block of a definition file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySpec {
    /// Ordered word pairs.
    #[serde(default)]
    pub data: Vec<WordPair>,
}

/// A named vocabulary list as declared by one definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyList {
    /// Identifier used in URLs.
    #[serde(deserialize_with = "scalar_to_string")]
    pub id: String,
    /// List type; only `vocabulary` lists are addressable by id.
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name.
    pub name: String,
    /// The word pairs.
    #[serde(default)]
    pub spec: VocabularySpec,
}

impl VocabularyList {
    /// Creates a `vocabulary` list from word pairs.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, words: Vec<WordPair>) -> Self {
        Self {
            id: id.into(),
            kind: VOCABULARY_TYPE.to_string(),
            name: name.into(),
            spec: VocabularySpec { data: words },
        }
    }

    /// Parses a list from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `HablaError::VocabularyParseError` naming `path` if the text is
    /// not a valid definition.
    pub fn from_yaml(path: &Path, yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| HablaError::vocabulary_parse(path, e.to_string()))
    }

    /// Returns the word pairs in order.
    #[must_use]
    pub fn words(&self) -> &[WordPair] {
        &self.spec.data
    }

    /// Number of cards in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spec.data.len()
    }

    /// Returns `true` if the list has no cards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spec.data.is_empty()
    }

    /// Returns `true` if this is a vocabulary list.
    #[must_use]
    pub fn is_vocabulary(&self) -> bool {
        self.kind == VOCABULARY_TYPE
    }
}

/// Ids may be written as YAML numbers; they are served as strings.
fn scalar_to_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or number, got {other:?}"
        ))),
    }
}

/// One entry of the `GET /api/languages` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    /// File name the list was read from.
    pub file: String,
    /// Display name.
    pub name: String,
    /// Identifier.
    pub id: String,
    /// Number of word pairs.
    pub num_cards: usize,
    /// List type.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Immutable lookup structure over all loaded vocabulary lists.
#[derive(Debug, Clone, Default)]
pub struct VocabularyStore {
    lists: HashMap<String, Arc<VocabularyList>>,
    summaries: Vec<ListSummary>,
}

impl VocabularyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a store from already-parsed lists, keyed by file name.
    ///
    /// Files are processed in the given order; when two files declare the
    /// same id the later one replaces the earlier one in both the summaries
    /// and the lookup table.
    #[must_use]
    pub fn from_lists(files: impl IntoIterator<Item = (String, VocabularyList)>) -> Self {
        let mut store = Self::default();
        for (file, list) in files {
            store.insert(file, list);
        }
        store
    }

    fn insert(&mut self, file: String, list: VocabularyList) {
        if let Some(pos) = self.summaries.iter().position(|s| s.id == list.id) {
            let earlier = self.summaries.remove(pos);
            self.lists.remove(&list.id);
            warn!(
                id = %list.id,
                kept = %file,
                dropped = %earlier.file,
                "Duplicate list id, keeping the later file"
            );
        }

        self.summaries.push(ListSummary {
            file,
            name: list.name.clone(),
            id: list.id.clone(),
            num_cards: list.len(),
            kind: list.kind.clone(),
        });

        if list.is_vocabulary() {
            self.lists.insert(list.id.clone(), Arc::new(list));
        }
    }

    /// Loads every `.yaml`/`.yml` file in `dir`, in file-name order.
    ///
    /// Files that fail to parse are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `HablaError::VocabularyDirUnreadable` if the directory itself
    /// cannot be listed.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries =
            std::fs::read_dir(dir).map_err(|e| HablaError::vocabulary_dir(dir, e.to_string()))?;

        let mut paths: Vec<_> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_yaml_extension(path))
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| HablaError::vocabulary_parse(&path, e.to_string()))
                .and_then(|text| VocabularyList::from_yaml(&path, &text));

            match parsed {
                Ok(list) => {
                    debug!(file = %file_name, id = %list.id, cards = list.len(), "Loaded vocabulary file");
                    files.push((file_name, list));
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping vocabulary file"),
            }
        }

        Ok(Self::from_lists(files))
    }

    /// Loads `dir`, degrading to an empty store when it cannot be read.
    ///
    /// Every lookup on the returned store then answers "not found".
    #[must_use]
    pub fn load_dir_or_empty(dir: impl AsRef<Path>) -> Self {
        match Self::load_dir(dir) {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "Failed to load vocabulary; serving no lists");
                Self::empty()
            }
        }
    }

    /// Looks up a vocabulary list by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<VocabularyList>> {
        self.lists.get(id).cloned()
    }

    /// Summaries of every loaded file, in load order.
    #[must_use]
    pub fn summaries(&self) -> &[ListSummary] {
        &self.summaries
    }

    /// Number of addressable vocabulary lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Returns `true` if no vocabulary list is addressable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

fn has_yaml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

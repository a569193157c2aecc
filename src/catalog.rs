//! Field catalog: which names a playlist may reference, the SQL column behind
//! each one, its value type and the comparators it accepts.
//!
//! Catalogs are loaded from JSON files keyed by field name, or taken from the
//! built-in [`FieldCatalog::media_library`] mapping of the `files` table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::Comparator;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read catalog file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("field `{field}` allows `{operator}`, which a {kind} field cannot support")]
    UnsupportedOperator {
        field: String,
        operator: Comparator,
        kind: &'static str,
    },
}

/// Value type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    /// Unix epoch seconds.
    Date,
    Boolean,
    /// Named values stored as integer codes.
    Enum { values: BTreeMap<String, i64> },
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Enum { .. } => "enum",
        }
    }

    /// Every comparator that has a meaning for this type.
    pub fn supported_operators(&self) -> &'static [Comparator] {
        use Comparator as C;
        match self {
            FieldType::String => &[C::Eq, C::NotEq, C::Contains, C::StartsWith, C::EndsWith],
            FieldType::Number => &[C::Eq, C::NotEq, C::Gt, C::Lt, C::Gte, C::Lte],
            FieldType::Date => &[C::Eq, C::NotEq, C::Gt, C::Lt, C::Gte, C::Lte, C::InLast],
            FieldType::Boolean | FieldType::Enum { .. } => &[C::Eq, C::NotEq],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// SQL column expression, e.g. `f.artist`.
    pub column: String,
    #[serde(flatten)]
    pub kind: FieldType,
    /// Restricts the comparators below the type's full set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<Comparator>>,
    /// May appear in a `having` clause.
    #[serde(default)]
    pub aggregate: bool,
}

impl FieldSpec {
    pub fn new(column: impl Into<String>, kind: FieldType) -> Self {
        Self {
            column: column.into(),
            kind,
            operators: None,
            aggregate: false,
        }
    }

    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    pub fn with_operators(mut self, operators: Vec<Comparator>) -> Self {
        self.operators = Some(operators);
        self
    }

    pub fn allows(&self, op: Comparator) -> bool {
        match &self.operators {
            Some(ops) => ops.contains(&op),
            None => self.kind.supported_operators().contains(&op),
        }
    }
}

/// Case-insensitive mapping from field name to [`FieldSpec`].
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: HashMap<String, FieldSpec>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    pub fn insert(&mut self, name: &str, spec: FieldSpec) -> Result<(), CatalogError> {
        if let Some(ops) = &spec.operators {
            let supported = spec.kind.supported_operators();
            if let Some(op) = ops.iter().find(|op| !supported.contains(op)) {
                return Err(CatalogError::UnsupportedOperator {
                    field: name.to_string(),
                    operator: *op,
                    kind: spec.kind.name(),
                });
            }
        }
        self.fields.insert(name.to_ascii_lowercase(), spec);
        Ok(())
    }

    pub fn with_field(mut self, name: &str, spec: FieldSpec) -> Result<Self, CatalogError> {
        self.insert(name, spec)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let fields: BTreeMap<String, FieldSpec> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for (name, spec) in fields {
            catalog.insert(&name, spec)?;
        }
        Ok(catalog)
    }

    /// Loads a catalog from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(CatalogError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| CatalogError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&content)
    }

    /// The media server's `files` table, aliased `f`.
    pub fn media_library() -> Self {
        let string = |column: &str| FieldSpec::new(column, FieldType::String);
        let number = |column: &str| FieldSpec::new(column, FieldType::Number);
        let date = |column: &str| FieldSpec::new(column, FieldType::Date);

        let media_kinds = [
            ("music", 1),
            ("movie", 2),
            ("podcast", 4),
            ("audiobook", 8),
            ("musicvideo", 32),
            ("tvshow", 64),
        ];
        let data_kinds = [("file", 0), ("url", 1), ("spotify", 2), ("pipe", 3)];
        let enumeration = |values: &[(&str, i64)]| FieldType::Enum {
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        };

        let fields = [
            ("artist", string("f.artist")),
            ("album_artist", string("f.album_artist")),
            ("album", string("f.album")),
            ("title", string("f.title")),
            ("genre", string("f.genre")),
            ("composer", string("f.composer")),
            ("conductor", string("f.conductor")),
            ("grouping", string("f.grouping")),
            ("comment", string("f.comment")),
            ("description", string("f.description")),
            ("path", string("f.path")),
            ("type", string("f.type")),
            ("play_count", number("f.play_count").aggregate()),
            ("skip_count", number("f.skip_count").aggregate()),
            ("rating", number("f.rating").aggregate()),
            ("year", number("f.year")),
            ("track", number("f.track")),
            ("disc", number("f.disc")),
            ("bitrate", number("f.bitrate")),
            ("samplerate", number("f.samplerate")),
            ("song_length", number("f.song_length").aggregate()),
            ("file_size", number("f.file_size")),
            ("bpm", number("f.bpm")),
            ("time_added", date("f.time_added").aggregate()),
            ("date_added", date("f.time_added").aggregate()),
            ("time_modified", date("f.time_modified")),
            ("time_played", date("f.time_played").aggregate()),
            ("time_skipped", date("f.time_skipped")),
            ("date_released", date("f.date_released")),
            (
                "compilation",
                FieldSpec::new("f.compilation", FieldType::Boolean),
            ),
            (
                "media_kind",
                FieldSpec::new("f.media_kind", enumeration(&media_kinds)),
            ),
            (
                "data_kind",
                FieldSpec::new("f.data_kind", enumeration(&data_kinds)),
            ),
        ];

        let fields = fields
            .into_iter()
            .map(|(name, spec)| (name.to_string(), spec))
            .collect();
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "Artist": {{ "column": "t.artist", "type": "string" }},
                "plays": {{ "column": "t.plays", "type": "number", "aggregate": true,
                            "operators": ["gt", "lt"] }},
                "kind": {{ "column": "t.kind", "type": "enum", "values": {{ "song": 1 }} }}
            }}"#
        )
        .unwrap();

        let catalog = FieldCatalog::from_json_file(file.path()).unwrap();
        assert_eq!(catalog.len(), 3);

        let artist = catalog.get("ARTIST").unwrap();
        assert_eq!(artist.column, "t.artist");
        assert_eq!(artist.kind, FieldType::String);
        assert!(artist.allows(Comparator::Contains));
        assert!(!artist.aggregate);

        let plays = catalog.get("plays").unwrap();
        assert!(plays.aggregate);
        assert!(plays.allows(Comparator::Gt));
        assert!(!plays.allows(Comparator::Eq));

        let kind = catalog.get("kind").unwrap();
        match &kind.kind {
            FieldType::Enum { values } => assert_eq!(values.get("song"), Some(&1)),
            other => panic!("Expected enum field, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = FieldCatalog::from_json_file(file.path());
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FieldCatalog::from_json_file("non_existent_catalog.json");
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_operator_outside_type_is_rejected() {
        let json = r#"{ "artist": { "column": "f.artist", "type": "string", "operators": ["gt"] } }"#;
        let err = FieldCatalog::from_json_str(json).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field `artist` allows `>`, which a string field cannot support"
        );
    }

    #[test]
    fn test_media_library_catalog() {
        let catalog = FieldCatalog::media_library();
        assert_eq!(catalog.get("Genre").unwrap().column, "f.genre");
        assert_eq!(catalog.get("date_added").unwrap().kind, FieldType::Date);
        assert!(catalog.get("play_count").unwrap().aggregate);
        assert!(!catalog.get("artist").unwrap().aggregate);
        assert!(catalog.get("date_added").unwrap().allows(Comparator::InLast));
        assert!(!catalog.get("year").unwrap().allows(Comparator::Contains));
        assert!(catalog.get("bogus_field").is_none());
        assert!(catalog.names().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_catalog_round_trips_through_json() {
        let spec = FieldSpec::new("f.rating", FieldType::Number)
            .aggregate()
            .with_operators(vec![Comparator::Gte]);
        let json = serde_json::to_string(&spec).unwrap();
        let back: FieldSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}

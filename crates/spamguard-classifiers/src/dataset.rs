//! Labeled dataset loading
//!
//! Training files are delimited text with a header row: column 0 holds the
//! message text, column 1 the boolean label. The expected column names are
//! declared once in a [`DatasetSchema`] and checked against the header, so a
//! file with swapped or unexpected columns fails fast instead of training on
//! misaligned data.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use spamguard_core::{Error, LabeledExample, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Layout of a training file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// Field separator, must be a single ASCII character
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Whether the first line is a header row
    #[serde(default = "default_true")]
    pub has_header: bool,

    /// Expected header of column 0
    #[serde(default = "default_text_column")]
    pub text_column: String,

    /// Expected header of column 1
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

impl DatasetSchema {
    /// Schema with a custom separator and default column names
    pub fn with_separator(separator: char) -> Self {
        Self {
            separator,
            ..Default::default()
        }
    }

    /// Separator as the single byte the CSV reader expects
    pub fn delimiter(&self) -> Result<u8> {
        if self.separator.is_ascii() {
            Ok(self.separator as u8)
        } else {
            Err(Error::config(format!(
                "separator must be a single ASCII character, got '{}'",
                self.separator
            )))
        }
    }

    fn check_header(&self, header: &csv::StringRecord) -> Result<()> {
        if header.len() < 2 {
            return Err(Error::dataset(format!(
                "header has {} column(s), expected at least 2 ('{}', '{}')",
                header.len(),
                self.text_column,
                self.label_column
            )));
        }

        for (index, expected) in [(0, &self.text_column), (1, &self.label_column)] {
            let found = header.get(index).unwrap_or_default();
            if normalize_column(found) != normalize_column(expected) {
                return Err(Error::dataset(format!(
                    "header column {} is '{}', expected '{}'",
                    index, found, expected
                )));
            }
        }

        Ok(())
    }
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            has_header: default_true(),
            text_column: default_text_column(),
            label_column: default_label_column(),
        }
    }
}

/// Ordered collection of labeled examples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    examples: Vec<LabeledExample>,
}

impl Dataset {
    /// Build a dataset from in-memory examples
    pub fn from_examples(examples: impl IntoIterator<Item = LabeledExample>) -> Self {
        Self {
            examples: examples.into_iter().collect(),
        }
    }

    /// Load a dataset file
    pub fn load(path: impl AsRef<Path>, schema: &DatasetSchema) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let dataset = Self::from_reader(file, schema)?;
        info!(
            "Loaded {} examples ({} spam) from '{}'",
            dataset.len(),
            dataset.spam_count(),
            path.display()
        );
        Ok(dataset)
    }

    /// Parse a dataset from any reader
    pub fn from_reader<R: Read>(reader: R, schema: &DatasetSchema) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(schema.delimiter()?)
            .has_headers(schema.has_header)
            .flexible(false)
            .from_reader(reader);

        if schema.has_header {
            let header = reader
                .headers()
                .map_err(|e| Error::dataset(format!("cannot read header: {}", e)))?;
            schema.check_header(header)?;
        }

        let mut examples = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::dataset(e.to_string()))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            if record.len() < 2 {
                return Err(Error::dataset(format!(
                    "line {}: expected 2 fields, found {}",
                    line,
                    record.len()
                )));
            }

            let text = record.get(0).unwrap_or_default();
            let raw_label = record.get(1).unwrap_or_default();
            let is_spam = parse_bool(raw_label).ok_or_else(|| {
                Error::dataset(format!("line {}: '{}' is not a boolean label", line, raw_label))
            })?;

            examples.push(LabeledExample::new(text, is_spam));
        }

        debug!("Parsed {} dataset rows", examples.len());
        Ok(Self { examples })
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the dataset has no examples
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// All examples in file order
    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    /// Iterate over examples
    pub fn iter(&self) -> std::slice::Iter<'_, LabeledExample> {
        self.examples.iter()
    }

    /// Message texts in file order
    pub fn texts(&self) -> Vec<&str> {
        self.examples.iter().map(|e| e.text.as_str()).collect()
    }

    /// Labels in file order
    pub fn labels(&self) -> Vec<bool> {
        self.examples.iter().map(|e| e.is_spam).collect()
    }

    /// Number of spam examples
    pub fn spam_count(&self) -> usize {
        self.examples.iter().filter(|e| e.is_spam).count()
    }

    /// Number of distinct label values present (0, 1 or 2)
    pub fn distinct_labels(&self) -> usize {
        let spam = self.spam_count();
        usize::from(spam > 0) + usize::from(spam < self.len())
    }

    /// Deterministically split into `(train, holdout)`.
    ///
    /// `holdout_fraction` of the examples, rounded down, go to the holdout set.
    pub fn split(&self, holdout_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
            return Err(Error::config(format!(
                "holdout fraction must be within (0, 1), got {}",
                holdout_fraction
            )));
        }

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let holdout_len = (self.len() as f64 * holdout_fraction).floor() as usize;
        let (holdout_idx, train_idx) = order.split_at(holdout_len);

        let pick = |indices: &[usize]| {
            Dataset::from_examples(indices.iter().map(|&i| self.examples[i].clone()))
        };
        Ok((pick(train_idx), pick(holdout_idx)))
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a LabeledExample;
    type IntoIter = std::slice::Iter<'a, LabeledExample>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}

/// Parse the boolean literals accepted in label columns
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "f" | "n" => Some(false),
        _ => None,
    }
}

fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn default_separator() -> char {
    ';'
}

fn default_true() -> bool {
    true
}

fn default_text_column() -> String {
    "Message".to_string()
}

fn default_label_column() -> String {
    "IsSpam".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Message;IsSpam\n\
                          WIN FREE MONEY NOW;true\n\
                          meeting at 5pm tomorrow;false\n\
                          ;0\n";

    #[test]
    fn test_load_from_reader() {
        let dataset = Dataset::from_reader(SAMPLE.as_bytes(), &DatasetSchema::default()).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.examples()[0], LabeledExample::spam("WIN FREE MONEY NOW"));
        assert_eq!(dataset.examples()[2], LabeledExample::ham(""));
        assert_eq!(dataset.distinct_labels(), 2);
    }

    #[test]
    fn test_header_names_are_normalized() {
        let data = "message;is_spam\nhello;no\n";
        let dataset = Dataset::from_reader(data.as_bytes(), &DatasetSchema::default()).unwrap();
        assert_eq!(dataset.labels(), vec![false]);
    }

    #[test]
    fn test_swapped_columns_fail_fast() {
        let data = "IsSpam;Message\ntrue;hello\n";
        let err = Dataset::from_reader(data.as_bytes(), &DatasetSchema::default()).unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
    }

    #[test]
    fn test_bad_label_reports_line() {
        let data = "Message;IsSpam\nhello;maybe\n";
        let err = Dataset::from_reader(data.as_bytes(), &DatasetSchema::default()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_unequal_row_length_rejected() {
        let data = "Message;IsSpam\nhello;true;extra\n";
        assert!(Dataset::from_reader(data.as_bytes(), &DatasetSchema::default()).is_err());
    }

    #[test]
    fn test_custom_separator_without_header() {
        let schema = DatasetSchema {
            has_header: false,
            ..DatasetSchema::with_separator(',')
        };
        let data = "claim your prize,yes\nproject status update,no\n";
        let dataset = Dataset::from_reader(data.as_bytes(), &schema).unwrap();
        assert_eq!(dataset.labels(), vec![true, false]);
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::load("/definitely/not/here.csv", &DatasetSchema::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_split_is_deterministic() {
        let dataset = Dataset::from_examples(
            (0..10).map(|i| LabeledExample::new(format!("message {}", i), i % 2 == 0)),
        );

        let (train_a, holdout_a) = dataset.split(0.3, 9).unwrap();
        let (train_b, holdout_b) = dataset.split(0.3, 9).unwrap();
        assert_eq!(holdout_a.len(), 3);
        assert_eq!(train_a.len(), 7);
        assert_eq!(train_a, train_b);
        assert_eq!(holdout_a, holdout_b);

        assert!(dataset.split(1.0, 9).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("spam"), None);
    }
}

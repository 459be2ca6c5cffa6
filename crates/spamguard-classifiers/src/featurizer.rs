//! Text featurization
//!
//! Messages are lower-cased and split on anything that is not a Unicode
//! letter or digit. Each message yields word n-grams and character n-grams
//! over the normalized token stream. A vocabulary fitted on the training
//! corpus fixes the feature layout; per-message term counts are L2-normalized
//! and then min-max scaled with bounds learned from the same corpus.
//!
//! Terms outside the vocabulary contribute nothing. `transform` accepts any
//! string and always returns a vector of the fitted dimension.

use crate::config::FeaturizerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use spamguard_core::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

/// Dense feature vector with one slot per vocabulary term
pub type FeatureVector = Vec<f64>;

/// Batches smaller than this are vectorized on the calling thread
const PARALLEL_BATCH_MIN: usize = 512;

static TOKEN_SEPARATOR: OnceLock<Regex> = OnceLock::new();

fn token_separator() -> &'static Regex {
    TOKEN_SEPARATOR.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{N}]+").expect("token separator pattern is valid")
    })
}

/// Split text into lower-cased word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_separator()
        .split(&lowered)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Which n-grams are extracted from a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgramSettings {
    /// Longest word n-gram
    pub word_ngrams: usize,

    /// Character n-gram length, 0 when disabled
    pub char_ngrams: usize,
}

impl NgramSettings {
    /// Extract all terms of a message, with repetitions
    pub fn terms(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        let mut terms = Vec::new();

        for n in 1..=self.word_ngrams {
            for window in tokens.windows(n) {
                terms.push(format!("w:{}", window.join(" ")));
            }
        }

        if self.char_ngrams > 0 && !tokens.is_empty() {
            let chars: Vec<char> = tokens.join(" ").chars().collect();
            if chars.len() <= self.char_ngrams {
                terms.push(format!("c:{}", chars.iter().collect::<String>()));
            } else {
                for window in chars.windows(self.char_ngrams) {
                    terms.push(format!("c:{}", window.iter().collect::<String>()));
                }
            }
        }

        terms
    }
}

impl From<&FeaturizerConfig> for NgramSettings {
    fn from(config: &FeaturizerConfig) -> Self {
        Self {
            word_ngrams: config.word_ngrams,
            char_ngrams: config.char_ngrams,
        }
    }
}

/// Ordered term list; a term's position is its feature index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn build(terms: Vec<String>) -> std::result::Result<Self, String> {
        let mut index = HashMap::with_capacity(terms.len());
        for (position, term) in terms.iter().enumerate() {
            if index.insert(term.clone(), position).is_some() {
                return Err(format!("duplicate vocabulary term '{}'", term));
            }
        }
        Ok(Self { terms, index })
    }

    /// Fit a vocabulary on a corpus.
    ///
    /// Terms are ranked by document frequency, ties broken lexicographically,
    /// so the same corpus always produces the same layout.
    pub fn fit<S: AsRef<str>>(corpus: &[S], config: &FeaturizerConfig) -> Result<Self> {
        if corpus.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let settings = NgramSettings::from(config);
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for text in corpus {
            let unique: HashSet<String> = settings.terms(text.as_ref()).into_iter().collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= config.min_document_frequency)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = config.max_features {
            ranked.truncate(max);
        }

        let terms = ranked.into_iter().map(|(term, _)| term).collect();
        Self::build(terms).map_err(Error::internal)
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Feature index of a term
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Term at a feature index
    pub fn term(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for Vocabulary {
    type Error = String;

    fn try_from(terms: Vec<String>) -> std::result::Result<Self, Self::Error> {
        Self::build(terms)
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(vocabulary: Vocabulary) -> Self {
        vocabulary.terms
    }
}

/// Non-zero entries of a feature vector, ascending by index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFeatures {
    entries: Vec<(usize, f64)>,
}

impl SparseFeatures {
    /// Iterate `(index, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Expand into a dense vector of the given dimension
    pub fn to_dense(&self, dimension: usize) -> FeatureVector {
        let mut dense = vec![0.0; dimension];
        for &(index, value) in &self.entries {
            if let Some(slot) = dense.get_mut(index) {
                *slot = value;
            }
        }
        dense
    }
}

/// Vocabulary plus n-gram settings: text to L2-normalized term frequencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextVectorizer {
    settings: NgramSettings,
    vocabulary: Vocabulary,
}

impl TextVectorizer {
    /// Number of features produced
    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Fitted vocabulary
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Raw (unscaled) features of one message
    pub fn vectorize(&self, text: &str) -> SparseFeatures {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.settings.terms(text) {
            if let Some(index) = self.vocabulary.index_of(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let norm = counts.values().map(|c| c * c).sum::<f64>().sqrt();
        SparseFeatures {
            entries: counts
                .into_iter()
                .map(|(index, count)| (index, count / norm))
                .collect(),
        }
    }

    /// Vectorize many messages, in order.
    ///
    /// Large batches are split across CPU cores; the result is identical to
    /// vectorizing one message at a time.
    pub fn vectorize_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<SparseFeatures> {
        let workers = num_cpus::get().max(1);
        if texts.len() < PARALLEL_BATCH_MIN || workers == 1 {
            return texts.iter().map(|t| self.vectorize(t.as_ref())).collect();
        }

        let chunk_size = texts.len().div_ceil(workers);
        debug!("Vectorizing {} texts on {} threads", texts.len(), workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = texts
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|t| self.vectorize(t.as_ref()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        })
    }
}

/// Per-feature min-max bounds learned from the training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit bounds over raw training rows; absent entries count as zero
    pub fn fit(dimension: usize, rows: &[SparseFeatures]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let mut min = vec![f64::INFINITY; dimension];
        let mut max = vec![f64::NEG_INFINITY; dimension];
        let mut seen = vec![0usize; dimension];

        for row in rows {
            for (index, value) in row.iter() {
                if index < dimension {
                    min[index] = min[index].min(value);
                    max[index] = max[index].max(value);
                    seen[index] += 1;
                }
            }
        }

        for index in 0..dimension {
            if seen[index] < rows.len() {
                min[index] = min[index].min(0.0);
                max[index] = max[index].max(0.0);
            }
        }

        Ok(Self { min, max })
    }

    /// Number of features covered
    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    /// Scale one value into [0, 1], clamping values outside the fitted range
    pub fn scale_value(&self, index: usize, value: f64) -> f64 {
        let (Some(&min), Some(&max)) = (self.min.get(index), self.max.get(index)) else {
            return 0.0;
        };
        let range = max - min;
        if range <= f64::EPSILON {
            return 0.0;
        }
        ((value - min) / range).clamp(0.0, 1.0)
    }

    /// Scale a sparse row.
    ///
    /// Raw values are non-negative and every lower bound is at least zero,
    /// so an absent (zero) entry always scales to zero and sparsity holds.
    pub fn scale(&self, row: &SparseFeatures) -> SparseFeatures {
        SparseFeatures {
            entries: row
                .iter()
                .map(|(index, value)| (index, self.scale_value(index, value)))
                .filter(|(_, value)| *value != 0.0)
                .collect(),
        }
    }

    fn is_consistent(&self) -> bool {
        self.min.len() == self.max.len()
            && self
                .min
                .iter()
                .zip(&self.max)
                .all(|(lo, hi)| lo.is_finite() && hi.is_finite() && lo <= hi)
    }
}

/// Unfitted featurizer
#[derive(Debug, Clone, Default)]
pub struct Featurizer {
    config: FeaturizerConfig,
}

impl Featurizer {
    /// Create a featurizer with the given settings
    pub fn new(config: FeaturizerConfig) -> Self {
        Self { config }
    }

    /// Fit the vocabulary only (term frequencies, no scaling)
    pub fn fit_vectorizer<S: AsRef<str>>(&self, corpus: &[S]) -> Result<TextVectorizer> {
        let vocabulary = Vocabulary::fit(corpus, &self.config)?;
        debug!(
            "Fitted vocabulary of {} terms on {} documents",
            vocabulary.len(),
            corpus.len()
        );
        Ok(TextVectorizer {
            settings: NgramSettings::from(&self.config),
            vocabulary,
        })
    }

    /// Fit vocabulary and scaling bounds on a corpus
    pub fn fit<S: AsRef<str> + Sync>(&self, corpus: &[S]) -> Result<FittedFeaturizer> {
        let vectorizer = self.fit_vectorizer(corpus)?;
        let raw = vectorizer.vectorize_batch(corpus);
        let scaler = MinMaxScaler::fit(vectorizer.dimension(), &raw)?;
        Ok(FittedFeaturizer::new(vectorizer, scaler))
    }
}

/// Fitted featurizer: deterministic text to fixed-length vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFeaturizer {
    vectorizer: TextVectorizer,
    scaler: MinMaxScaler,
}

impl FittedFeaturizer {
    /// Combine a fitted vectorizer with scaling bounds
    pub fn new(vectorizer: TextVectorizer, scaler: MinMaxScaler) -> Self {
        Self { vectorizer, scaler }
    }

    /// Length of every produced vector
    pub fn dimension(&self) -> usize {
        self.vectorizer.dimension()
    }

    /// Fitted vocabulary
    pub fn vocabulary(&self) -> &Vocabulary {
        self.vectorizer.vocabulary()
    }

    /// Scaled features of one message as a dense vector
    pub fn transform(&self, text: &str) -> FeatureVector {
        self.transform_sparse(text).to_dense(self.dimension())
    }

    /// Scaled features of one message, non-zero entries only
    pub fn transform_sparse(&self, text: &str) -> SparseFeatures {
        self.scaler.scale(&self.vectorizer.vectorize(text))
    }

    /// Scaled features of many messages, in order
    pub fn transform_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<FeatureVector> {
        self.vectorizer
            .vectorize_batch(texts)
            .iter()
            .map(|raw| self.scaler.scale(raw).to_dense(self.dimension()))
            .collect()
    }

    /// Check that vocabulary and scaler agree; used when loading artifacts
    pub fn validate(&self) -> Result<()> {
        if self.scaler.dimension() != self.dimension() {
            return Err(Error::corrupt(format!(
                "scaler covers {} features but vocabulary has {}",
                self.scaler.dimension(),
                self.dimension()
            )));
        }
        if !self.scaler.is_consistent() {
            return Err(Error::corrupt("scaler bounds are not finite or out of order"));
        }
        Ok(())
    }
}

//! 128-bit SimHash content fingerprints.
//!
//! # Pipeline
//!
//! ```text
//! text ─► lowercase ─► strip non letter/digit ─► split runs
//!      ─► CJK runs: dictionary segmentation (jieba, pinned vocabulary)
//!         other runs: whitespace tokens
//!      ─► drop 1-char tokens and stop words ─► synonym map
//!      ─► token frequencies ─► weighted SimHash over MD5(token)
//! ```
//!
//! Each distinct token contributes its MD5 digest, read as a big-endian
//! `u128`, weighted by its frequency: `+freq` to every bit position that is
//! set and `-freq` to every position that is clear. Bit *i* of the result
//! is set when the running total at *i* is positive. An empty token list
//! yields [`Fingerprint::EMPTY`].
//!
//! Nothing here depends on time or randomness, so unchanged content always
//! fingerprints identically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use jieba_rs::Jieba;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DedupConfig;
use crate::error::FingerprintError;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));
static HAN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\p{Han}+)|[^\p{Han}]+").expect("valid regex"));

/// Domain terms the segmenter must never split.
const PINNED_VOCABULARY: &[&str] = &[
    "人工智能",
    "机器学习",
    "深度学习",
    "大模型",
    "大语言模型",
    "图灵测试",
    "神经科学",
    "知识库",
    "公众号",
    "语雀",
    "自然语言处理",
];

const STOP_WORDS: &[&str] = &[
    "我们", "你们", "他们", "这个", "那个", "一个", "以及", "因为", "所以", "但是", "而且",
    "如果", "就是", "可以", "没有", "什么", "进行", "通过", "对于", "关于", "其中", "已经",
    "还是", "或者", "然后", "这些", "那些", "自己", "这样", "the", "and", "for", "with",
    "this", "that", "are", "was", "from", "into", "have", "has", "not", "but",
];

const SYNONYMS: &[(&str, &str)] = &[
    ("ai", "人工智能"),
    ("llm", "大语言模型"),
    ("llms", "大语言模型"),
    ("大模型", "大语言模型"),
    ("ml", "机器学习"),
    ("nlp", "自然语言处理"),
];

/// A 128-bit similarity-preserving signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(pub u128);

impl Fingerprint {
    /// Fingerprint of content with no usable tokens.
    pub const EMPTY: Fingerprint = Fingerprint(0);

    /// Hamming distance: number of differing bits.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Tokenizer plus SimHash, configured once per run.
///
/// Building the segmenter loads its dictionary, so construct one
/// `Fingerprinter` and reuse it for the whole batch.
pub struct Fingerprinter {
    segmenter: Jieba,
    stop_words: HashSet<String>,
    synonyms: HashMap<String, String>,
}

impl Fingerprinter {
    pub fn new(config: &DedupConfig) -> Self {
        let mut segmenter = Jieba::new();
        for word in PINNED_VOCABULARY
            .iter()
            .copied()
            .chain(config.extra_vocabulary.iter().map(String::as_str))
        {
            segmenter.add_word(word, None, None);
        }

        let stop_words = STOP_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(config.extra_stop_words.iter().map(|w| w.to_lowercase()))
            .collect();

        let mut synonyms: HashMap<String, String> = SYNONYMS
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        for (from, to) in &config.synonyms {
            synonyms.insert(from.to_lowercase(), to.clone());
        }

        Self {
            segmenter,
            stop_words,
            synonyms,
        }
    }

    /// Split text into normalized semantic tokens, in text order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = NON_WORD.replace_all(&lowered, " ");

        let mut tokens = Vec::new();
        for chunk in cleaned.split_whitespace() {
            for caps in HAN_RUNS.captures_iter(chunk) {
                match caps.get(1) {
                    Some(han) => tokens.extend(
                        self.segmenter
                            .cut(han.as_str(), false)
                            .into_iter()
                            .map(str::to_string),
                    ),
                    None => tokens.push(caps[0].to_string()),
                }
            }
        }

        tokens
            .into_iter()
            .filter(|t| t.chars().count() > 1 && !self.stop_words.contains(t))
            .map(|t| self.synonyms.get(&t).cloned().unwrap_or(t))
            .collect()
    }

    /// Fingerprint a piece of text.
    ///
    /// Fails only when the text carries NUL bytes (binary data decoded as text).
    pub fn fingerprint(&self, text: &str) -> Result<Fingerprint, FingerprintError> {
        let nul_bytes = text.bytes().filter(|b| *b == 0).count();
        if nul_bytes > 0 {
            return Err(FingerprintError::NotText { nul_bytes });
        }
        Ok(simhash(&self.tokenize(text)))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

/// Frequency-weighted SimHash of a token list.
pub fn simhash(tokens: &[String]) -> Fingerprint {
    if tokens.is_empty() {
        return Fingerprint::EMPTY;
    }

    let mut frequencies: BTreeMap<&str, i64> = BTreeMap::new();
    for token in tokens {
        *frequencies.entry(token.as_str()).or_default() += 1;
    }

    let mut totals = [0i64; 128];
    for (token, weight) in frequencies {
        let hash = u128::from_be_bytes(md5::compute(token.as_bytes()).0);
        for (bit, total) in totals.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *total += weight;
            } else {
                *total -= weight;
            }
        }
    }

    let value = totals
        .iter()
        .enumerate()
        .filter(|(_, total)| **total > 0)
        .fold(0u128, |acc, (bit, _)| acc | (1u128 << bit));
    Fingerprint(value)
}

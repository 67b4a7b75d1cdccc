//! Tokenizer and token-filter capabilities.
//!
//! Implementations live outside this crate and are registered on a
//! [`Namespace`](crate::Namespace); tables refer to them by name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TableError};

/// Splits text into tokens.
pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Rewrites or drops tokens produced by a [`Tokenizer`].
pub trait TokenFilter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn filter(&self, tokens: Vec<String>) -> Vec<String>;
}

/// Name-indexed registry of tokenizers and token filters.
#[derive(Debug, Default)]
pub struct Capabilities {
    tokenizers: BTreeMap<String, Arc<dyn Tokenizer>>,
    token_filters: BTreeMap<String, Arc<dyn TokenFilter>>,
}

impl Capabilities {
    /// Registers `tokenizer`, replacing any tokenizer of the same name.
    pub fn register_tokenizer(&mut self, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizers
            .insert(tokenizer.name().to_owned(), tokenizer);
    }

    pub fn register_token_filter(&mut self, filter: Arc<dyn TokenFilter>) {
        self.token_filters.insert(filter.name().to_owned(), filter);
    }

    pub fn tokenizer(&self, name: &str) -> Result<Arc<dyn Tokenizer>> {
        self.tokenizers
            .get(name)
            .cloned()
            .ok_or_else(|| TableError::NotFound(format!("tokenizer {name}")))
    }

    pub fn token_filter(&self, name: &str) -> Result<Arc<dyn TokenFilter>> {
        self.token_filters
            .get(name)
            .cloned()
            .ok_or_else(|| TableError::NotFound(format!("token filter {name}")))
    }

    /// Resolves every name in order; fails on the first unknown one.
    pub fn token_filters<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn TokenFilter>>> {
        names.iter().map(|n| self.token_filter(n.as_ref())).collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small capability implementations shared by the crate's tests.

    use super::*;

    /// Emits every overlapping pair of characters.
    #[derive(Debug)]
    pub struct Bigram;

    impl Tokenizer for Bigram {
        fn name(&self) -> &str {
            "TokenBigram"
        }

        fn tokenize(&self, text: &str) -> Vec<String> {
            let chars: Vec<char> = text.chars().collect();
            if chars.len() < 2 {
                return chars.iter().map(char::to_string).collect();
            }
            chars.windows(2).map(|w| w.iter().collect()).collect()
        }
    }

    /// Splits on whitespace.
    #[derive(Debug)]
    pub struct Delimit;

    impl Tokenizer for Delimit {
        fn name(&self) -> &str {
            "TokenDelimit"
        }

        fn tokenize(&self, text: &str) -> Vec<String> {
            text.split_whitespace().map(str::to_owned).collect()
        }
    }

    /// Drops the configured stop words.
    #[derive(Debug)]
    pub struct StopWord(pub &'static [&'static str]);

    impl TokenFilter for StopWord {
        fn name(&self) -> &str {
            "TokenFilterStopWord"
        }

        fn filter(&self, tokens: Vec<String>) -> Vec<String> {
            tokens
                .into_iter()
                .filter(|t| !self.0.contains(&t.as_str()))
                .collect()
        }
    }

    /// Lower-cases every token.
    #[derive(Debug)]
    pub struct Lowercase;

    impl TokenFilter for Lowercase {
        fn name(&self) -> &str {
            "TokenFilterLowercase"
        }

        fn filter(&self, tokens: Vec<String>) -> Vec<String> {
            tokens.into_iter().map(|t| t.to_lowercase()).collect()
        }
    }
}

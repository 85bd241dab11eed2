//! Name-keyed translator factories.
//!
//! Applications register a factory per translator name and resolve fresh
//! instances at call sites, so wiring stays data-driven without any dynamic
//! code loading.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::translator::Translator;

type TranslatorFactory<I, O> = Box<dyn Fn() -> Box<dyn Translator<I, O>> + Send + Sync>;

pub struct TranslatorRegistry<I, O> {
    factories: HashMap<String, TranslatorFactory<I, O>>,
}

impl<I, O> TranslatorRegistry<I, O> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Translator<I, O>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Builds a fresh translator instance for `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Translator<I, O>>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(EngineError::UnknownTranslator(name.to_string())),
        }
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }
}

impl<I, O> Default for TranslatorRegistry<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

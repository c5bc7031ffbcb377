use crate::error::Result;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::io::BufRead;

/// Token marking both ends of a padded sentence.
pub const BOUNDARY_SYMBOL: &str = "<s>";

/// A two-way map between symbols and dense integer ids.
///
/// Ids of removed symbols are handed out again before new ids are minted.
#[derive(Debug, Clone)]
pub struct SymbolTable<K> {
    ids: HashMap<K, usize>,
    symbols: Vec<Option<K>>,
    available_ids: Vec<usize>,
}

impl<K> Default for SymbolTable<K> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            symbols: Vec::new(),
            available_ids: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> SymbolTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id<Q>(&self, symbol: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.get(symbol).copied()
    }

    pub fn get_or_insert(&mut self, symbol: K) -> usize {
        if let Some(id) = self.ids.get(&symbol) {
            return *id;
        }
        let id = match self.available_ids.pop() {
            Some(id) => {
                self.symbols[id] = Some(symbol.clone());
                id
            }
            None => {
                self.symbols.push(Some(symbol.clone()));
                self.symbols.len() - 1
            }
        };
        self.ids.insert(symbol, id);
        id
    }

    pub fn symbol(&self, id: usize) -> Option<&K> {
        self.symbols.get(id).and_then(|s| s.as_ref())
    }

    /// Forgets the symbol bound to `id`; returns it if there was one.
    pub fn remove(&mut self, id: usize) -> Option<K> {
        let symbol = self.symbols.get_mut(id)?.take()?;
        self.ids.remove(&symbol);
        self.available_ids.push(id);
        Some(symbol)
    }

    /// Number of ids currently bound.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// One past the largest id ever handed out.
    pub fn capacity(&self) -> usize {
        self.symbols.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &K)> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .filter_map(|(id, s)| s.as_ref().map(|s| (id, s)))
    }
}

/// Whitespace tokenized sentences mapped to symbol ids.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sentences: Vec<Vec<usize>>,
    symbols: SymbolTable<String>,
}

impl Corpus {
    /// Reads one sentence per line. Blank lines are skipped. When `pad` is
    /// set, every sentence is wrapped in [`BOUNDARY_SYMBOL`], which has id 0.
    pub fn load<B: BufRead>(reader: B, pad: bool) -> Result<Self> {
        let mut symbols = SymbolTable::new();
        if pad {
            symbols.get_or_insert(BOUNDARY_SYMBOL.to_string());
        }
        let mut sentences = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let mut sentence = Vec::new();
            for token in line.split_whitespace() {
                sentence.push(symbols.get_or_insert(token.to_string()));
            }
            if sentence.is_empty() {
                continue;
            }
            if pad {
                sentence.insert(0, 0);
                sentence.push(0);
            }
            sentences.push(sentence);
        }
        Ok(Self { sentences, symbols })
    }

    pub fn size(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentence(&self, index: usize) -> &[usize] {
        &self.sentences[index][..]
    }

    pub fn sentences(&self) -> &[Vec<usize>] {
        &self.sentences[..]
    }

    pub fn vocab_size(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol(&self, id: usize) -> &str {
        self.symbols.symbol(id).map_or("?", |s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_table_reuses_ids() {
        let mut table = SymbolTable::new();
        assert_eq!(table.get_or_insert("a"), 0);
        assert_eq!(table.get_or_insert("b"), 1);
        assert_eq!(table.get_or_insert("a"), 0);
        assert_eq!(table.remove(0), Some("a"));
        assert_eq!(table.remove(0), None);
        assert_eq!(table.id(&"a"), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_or_insert("c"), 0);
        assert_eq!(table.symbol(0), Some(&"c"));
        assert_eq!(table.capacity(), 2);
    }

    #[test]
    fn test_load_padded() {
        let text = "the dog\n\nthe cat  sat\n";
        let corpus = Corpus::load(text.as_bytes(), true).unwrap();
        assert_eq!(corpus.size(), 2);
        assert_eq!(corpus.sentence(0), &[0, 1, 2, 0]);
        assert_eq!(corpus.sentence(1), &[0, 1, 3, 4, 0]);
        assert_eq!(corpus.vocab_size(), 5);
        assert_eq!(corpus.symbol(0), BOUNDARY_SYMBOL);
        assert_eq!(corpus.symbol(3), "cat");
    }

    #[test]
    fn test_load_unpadded() {
        let corpus = Corpus::load("a b a\nc\n".as_bytes(), false).unwrap();
        assert_eq!(corpus.sentence(0), &[0, 1, 0]);
        assert_eq!(corpus.sentence(1), &[2]);
        assert_eq!(corpus.vocab_size(), 3);
    }
}

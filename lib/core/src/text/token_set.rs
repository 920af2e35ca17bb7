use ahash::AHashMap;
use super::tokenizer::Token;

/// Weighted merge of the tokens of several texts
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    tokens: Vec<Token>,
    positions: AHashMap<String, usize>,
    total_freq: f64,
    max_freq: f64,
    next_offset: usize,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tokens` with every frequency multiplied by `factor`. Offsets of
    /// each added batch are shifted past those already in the set.
    pub fn add_all(&mut self, tokens: &[Token], factor: f64) {
        let base = self.next_offset;
        let mut batch_end = base;

        for token in tokens {
            let weighted = Token::new(token.text.clone(), token.frequency * factor, token.offsets.clone());
            self.total_freq += weighted.frequency;

            if let Some(max) = weighted.offsets.iter().max() {
                batch_end = batch_end.max(base + max + 1);
            }

            let i = match self.positions.get(&weighted.text) {
                Some(&i) => {
                    self.tokens[i].merge(&weighted, base);
                    i
                }
                None => {
                    let i = self.tokens.len();
                    self.positions.insert(weighted.text.clone(), i);
                    let offsets = weighted.offsets.iter().map(|o| o + base).collect();
                    self.tokens.push(Token::new(weighted.text, weighted.frequency, offsets));
                    i
                }
            };
            self.max_freq = self.max_freq.max(self.tokens[i].frequency);
        }

        self.next_offset = batch_end;
    }

    /// Divide every frequency by the total frequency
    pub fn normalize(&mut self) {
        if self.total_freq <= 0.0 {
            return;
        }
        for t in &mut self.tokens {
            t.frequency /= self.total_freq;
        }
        self.max_freq /= self.total_freq;
    }

    #[inline]
    pub fn total_freq(&self) -> f64 {
        self.total_freq
    }

    #[inline]
    pub fn max_freq(&self) -> f64 {
        self.max_freq
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, text: &str) -> Option<&Token> {
        self.positions.get(text).map(|&i| &self.tokens[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }
}

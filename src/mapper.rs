use crate::tokenizer::Token;

/// A byte-position index over an emitted token stream.
///
/// For each position of the input it records which tokens cover that byte,
/// so a renderer only has to act when the covering set changes. Filler
/// tokens (empty scope) are never inserted.
#[derive(Debug, Default)]
pub struct Mapper {
    /// All added tokens, in insertion order
    tokens: Vec<Token>,
    /// Per input byte, indices into `tokens` of the covering tokens
    positions: Vec<Vec<u32>>,
}

impl Mapper {
    /// An index for an input of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            tokens: Vec::new(),
            positions: vec![Vec::new(); len],
        }
    }

    /// Record the token for every byte it covers, clamped to the input
    /// length. Empty scopes are ignored.
    /// Note: O(token length); can be expensive for very long tokens.
    pub fn add(&mut self, token: Token) {
        if token.is_filler() {
            return;
        }
        let from = token.start.min(self.positions.len());
        let to = token.end().min(self.positions.len());
        let index = self.tokens.len() as u32;
        for position in &mut self.positions[from..to] {
            position.push(index);
        }
        self.tokens.push(token);
    }

    /// Positions where the set of covering tokens changes, with the tokens
    /// active there in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Vec<&Token>)> {
        let mut previous: Vec<u32> = Vec::new();
        self.positions.iter().enumerate().filter_map(move |(position, indices)| {
            let mut sorted = indices.clone();
            sorted.sort_by(|&a, &b| {
                Token::stable_order(&self.tokens[a as usize], &self.tokens[b as usize])
            });
            if sorted == previous {
                return None;
            }
            let active = sorted
                .iter()
                .map(|&index| &self.tokens[index as usize])
                .collect();
            previous = sorted;
            Some((position, active))
        })
    }
}

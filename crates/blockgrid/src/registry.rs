//! The catalog of tokens an editor may offer for placement.
//!
//! Parsing and evaluation never consult the catalog; it is handed explicitly
//! to whoever needs it (the editor, snapshot checks, the `blocks` command).

use std::collections::HashSet;

use serde::Serialize;

use crate::token::{Keyword, Operator, Structure, Token};

const VARIABLES: [&str; 6] = ["x", "y", "p", "a", "b", "c"];
const COLORS: [&str; 10] = [
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "black", "white", "gray",
];

#[derive(Clone, Debug, Serialize)]
pub struct BlockRegistry {
    blocks: Vec<Token>,
    #[serde(skip)]
    lookup: HashSet<Token>,
}

/// A placed token the catalog does not know about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnknownBlock {
    pub line_index: usize,
    pub slot: usize,
    pub token: Token,
}

impl BlockRegistry {
    pub fn new(blocks: impl IntoIterator<Item = Token>) -> Self {
        let mut lookup = HashSet::new();
        let blocks = blocks
            .into_iter()
            .filter(|token| lookup.insert(token.clone()))
            .collect();
        Self { blocks, lookup }
    }

    pub fn standard() -> Self {
        let variables = VARIABLES.into_iter().map(Token::variable);
        let numbers = (0..10).map(|n: u8| Token::number(n.to_string()));
        let operators = Operator::ALL.into_iter().map(Token::Operator);
        let colors = COLORS.into_iter().map(Token::color);
        let controls = [Keyword::If, Keyword::Else].map(Token::Control);
        Self::new(
            variables
                .chain(numbers)
                .chain(operators)
                .chain(colors)
                .chain(controls),
        )
    }

    pub fn blocks(&self) -> &[Token] {
        &self.blocks
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.lookup.contains(token)
    }

    pub fn colors(&self) -> impl Iterator<Item = &str> + '_ {
        self.blocks.iter().filter_map(|token| match token {
            Token::Color(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn unknown_tokens(&self, structure: &Structure) -> Vec<UnknownBlock> {
        let mut unknown = vec![];
        for (line_index, line) in structure.lines.iter().enumerate() {
            for (slot, placed) in line.slots.iter().enumerate() {
                let Some(placed) = placed else {
                    continue;
                };
                if !self.contains(&placed.token) {
                    unknown.push(UnknownBlock {
                        line_index,
                        slot,
                        token: placed.token.clone(),
                    });
                }
            }
        }
        unknown
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

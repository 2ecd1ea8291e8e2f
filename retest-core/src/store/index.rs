// Test name table for the indexed test id encoding.

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use super::format::{self, LineReader};
use super::TEST_INDEX_FILE;
use crate::error::StoreError;
use crate::types::TestId;

const KIND: &str = "test-index";

/// Dense, sorted test name table. Index `i` is the `i`-th line of the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestIndex {
    names: Vec<TestId>,
    positions: HashMap<TestId, usize>,
}

impl TestIndex {
    pub fn build<'a>(tests: impl IntoIterator<Item = &'a TestId>) -> Self {
        let sorted: BTreeSet<&TestId> = tests.into_iter().collect();
        let names: Vec<TestId> = sorted.into_iter().cloned().collect();
        let positions = names.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self { names, positions }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, test: &TestId) -> Option<usize> {
        self.positions.get(test).copied()
    }

    pub fn name(&self, index: usize) -> Option<&TestId> {
        self.names.get(index)
    }

    pub(crate) fn encode(&self, generation: Uuid) -> String {
        let mut out = format::header(KIND);
        format::push_field(&mut out, "generation", generation);
        for name in &self.names {
            out.push_str(name.as_str());
            out.push('\n');
        }
        format::push_end(&mut out, self.names.len());
        out
    }

    pub(crate) fn decode(text: &str) -> Result<(Uuid, Self), StoreError> {
        let mut r = LineReader::new(TEST_INDEX_FILE, text);
        r.expect_header(KIND)?;
        let generation = r.generation()?;

        let mut names = Vec::new();
        loop {
            let line = r.next_line()?;
            if let Some(count) = format::split_field(line, "end") {
                let count: usize = count
                    .parse()
                    .map_err(|_| r.corrupt(format!("bad end count {count:?}")))?;
                if count != names.len() {
                    return Err(r.corrupt(format!("end count {count} does not match {} names", names.len())));
                }
                r.expect_eof()?;
                break;
            }
            if line.is_empty() {
                return Err(r.corrupt("empty test name"));
            }
            names.push(TestId::from(line));
        }

        let positions: HashMap<TestId, usize> =
            names.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        if positions.len() != names.len() {
            return Err(StoreError::corrupt(TEST_INDEX_FILE, "duplicate test name"));
        }
        Ok((generation, Self { names, positions }))
    }
}

/// How a record's test id token is written and read back.
#[derive(Debug, Clone, Copy)]
pub(crate) enum IdCodec<'a> {
    Plain,
    Indexed(&'a TestIndex),
}

impl IdCodec<'_> {
    pub(crate) fn encode(self, test: &TestId) -> String {
        match self {
            Self::Plain => test.as_str().to_string(),
            // Every saved test is in the index built from the same snapshot.
            Self::Indexed(index) => index
                .position(test)
                .map_or_else(|| test.as_str().to_string(), |i| i.to_string()),
        }
    }

    pub(crate) fn decode(self, token: &str, reader: &LineReader<'_>) -> Result<TestId, StoreError> {
        match self {
            Self::Plain => Ok(TestId::from(token)),
            Self::Indexed(index) => token
                .parse::<usize>()
                .ok()
                .and_then(|i| index.name(i))
                .cloned()
                .ok_or_else(|| reader.corrupt(format!("bad test index {token:?}"))),
        }
    }
}

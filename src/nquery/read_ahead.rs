//! Reserved-word read-ahead
//!
//! Boolean-statement text is free-form up to the next stop-word. Candidates
//! for every stop-word are tracked at once; input stays buffered while any
//! candidate is still partial, so `OR` is not mistaken for the start of
//! `ORDERBY`. Once nothing is partial and something matched, the match that
//! completed earliest wins and everything read after it is handed back for
//! reparsing.

/// Words ending an expression inside a boolean statement
pub const STOP_WORDS: [&str; 7] = ["(", ")", "AND", "OR", "ORDERBY", "LIMIT", "OFFSET"];

fn is_symbol(word: &str) -> bool {
    word == "(" || word == ")"
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')'
}

/// A fired stop-word with the text around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWordMatch {
    pub word: &'static str,
    /// Text read before the stop-word
    pub preceding: String,
    /// Text read after the stop-word, to be reparsed
    pub trailing: String,
}

/// Result of draining the buffer at end of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOfInput {
    StopWord(StopWordMatch),
    Text(String),
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    word: &'static str,
    start: usize,
    matched: usize,
    /// Exclusive end once the candidate fully matched
    end: Option<usize>,
}

impl Candidate {
    fn is_partial(&self) -> bool {
        self.end.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReservedWordReadAhead {
    buffer: Vec<char>,
    candidates: Vec<Candidate>,
}

impl ReservedWordReadAhead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Feed one character, returning a match once one can be decided
    pub fn push(&mut self, c: char) -> Option<StopWordMatch> {
        let position = self.buffer.len();
        self.buffer.push(c);

        let mut advanced = Vec::with_capacity(self.candidates.len());
        for mut candidate in self.candidates.drain(..) {
            if !candidate.is_partial() {
                advanced.push(candidate);
                continue;
            }
            let chars: Vec<char> = candidate.word.chars().collect();
            if candidate.matched == chars.len() {
                // Fully spelled, waiting for the closing boundary
                if is_boundary(c) {
                    candidate.end = Some(position);
                    advanced.push(candidate);
                }
            } else if chars[candidate.matched] == c {
                candidate.matched += 1;
                if candidate.matched == chars.len() && is_symbol(candidate.word) {
                    candidate.end = Some(position + 1);
                }
                advanced.push(candidate);
            }
        }
        self.candidates = advanced;

        let at_boundary = position == 0 || is_boundary(self.buffer[position - 1]);
        for word in STOP_WORDS {
            if !word.starts_with(c) {
                continue;
            }
            if is_symbol(word) {
                self.candidates.push(Candidate {
                    word,
                    start: position,
                    matched: 1,
                    end: Some(position + 1),
                });
            } else if at_boundary {
                self.candidates.push(Candidate {
                    word,
                    start: position,
                    matched: 1,
                    end: None,
                });
            }
        }

        if self.candidates.iter().any(Candidate::is_partial) {
            return None;
        }
        let best = self.best()?;
        Some(self.take(best))
    }

    /// Decide what is left once the input ended
    pub fn finish(&mut self) -> EndOfInput {
        let length = self.buffer.len();
        for candidate in &mut self.candidates {
            if candidate.is_partial() && candidate.matched == candidate.word.chars().count() {
                candidate.end = Some(length);
            }
        }
        self.candidates.retain(|c| !c.is_partial());
        match self.best() {
            Some(best) => EndOfInput::StopWord(self.take(best)),
            None => {
                let text: String = self.buffer.drain(..).collect();
                EndOfInput::Text(text)
            }
        }
    }

    /// Completed candidate with the earliest end, then the earliest start
    fn best(&self) -> Option<Candidate> {
        self.candidates
            .iter()
            .filter_map(|c| c.end.map(|end| (end, c.start, *c)))
            .min_by_key(|(end, start, _)| (*end, *start))
            .map(|(_, _, c)| c)
    }

    fn take(&mut self, candidate: Candidate) -> StopWordMatch {
        let end = candidate.end.unwrap_or(self.buffer.len());
        let preceding: String = self.buffer[..candidate.start].iter().collect();
        let trailing: String = self.buffer[end..].iter().collect();
        self.buffer.clear();
        self.candidates.clear();
        StopWordMatch {
            word: candidate.word,
            preceding,
            trailing,
        }
    }
}

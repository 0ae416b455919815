use serde::{Deserialize, Serialize};

/// A position in a piece of text. `line` is zero-based and may be negative for
/// ranges that a backend could not place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub offset: usize,
    pub line: i32,
    pub column: usize,
}

impl Location {
    pub fn new(offset: usize, line: i32, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    pub fn add(self, other: Location) -> Location {
        Location {
            offset: self.offset + other.offset,
            line: self.line + other.line,
            column: self.column + other.column,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

impl Range {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn add(self, amount: Location) -> Range {
        Range {
            start: self.start.add(amount),
            end: self.end.add(amount),
        }
    }
}

/// Text together with the ranges inside it that matched the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedString {
    pub content: String,
    pub matched_ranges: Vec<Range>,
}

impl MatchedString {
    pub fn new(content: impl Into<String>, matched_ranges: Vec<Range>) -> Self {
        Self {
            content: content.into(),
            matched_ranges,
        }
    }

    /// Shift every range by `amount`.
    pub fn shifted(&self, amount: Location) -> Vec<Range> {
        self.matched_ranges.iter().map(|r| r.add(amount)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_ranges() {
        let ms = MatchedString::new(
            "hello world",
            vec![Range::new(Location::new(6, 0, 6), Location::new(11, 0, 11))],
        );
        let shifted = ms.shifted(Location::new(8, 1, 0));
        assert_eq!(shifted[0].start, Location::new(14, 1, 6));
        assert_eq!(shifted[0].end, Location::new(19, 1, 11));
    }
}

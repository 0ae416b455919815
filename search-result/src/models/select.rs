use std::fmt;
use std::str::FromStr;

/// Root field of a select path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectRoot {
    Repository,
    File,
    Content,
    Symbol,
    Commit,
}

impl fmt::Display for SelectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectRoot::Repository => write!(f, "repo"),
            SelectRoot::File => write!(f, "file"),
            SelectRoot::Content => write!(f, "content"),
            SelectRoot::Symbol => write!(f, "symbol"),
            SelectRoot::Commit => write!(f, "commit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectPathError {
    #[error("invalid select type '{0}'")]
    InvalidRoot(String),
    #[error("invalid field '{field}' on select path '{root}'")]
    InvalidField { root: SelectRoot, field: String },
}

const SYMBOL_KINDS: &[&str] = &[
    "file",
    "module",
    "namespace",
    "package",
    "class",
    "method",
    "property",
    "field",
    "constructor",
    "enum",
    "interface",
    "function",
    "variable",
    "constant",
    "string",
    "number",
    "boolean",
    "array",
    "object",
    "key",
    "null",
    "enum-member",
    "struct",
    "event",
    "operator",
    "type-parameter",
];

/// A dotted projection such as `repo`, `file.directory` or `commit.diff.added`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectPath {
    root: SelectRoot,
    fields: Vec<String>,
}

impl SelectPath {
    pub fn new(root: SelectRoot) -> Self {
        Self {
            root,
            fields: Vec::new(),
        }
    }

    pub fn root(&self) -> SelectRoot {
        self.root
    }

    /// Fields after the root, e.g. `["diff", "added"]` for `commit.diff.added`.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl FromStr for SelectPath {
    type Err = SelectPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let root_str = parts.next().unwrap_or_default();
        let root = match root_str {
            "repo" => SelectRoot::Repository,
            "file" => SelectRoot::File,
            "content" => SelectRoot::Content,
            "symbol" => SelectRoot::Symbol,
            "commit" => SelectRoot::Commit,
            other => return Err(SelectPathError::InvalidRoot(other.to_string())),
        };
        let fields: Vec<String> = parts.map(str::to_string).collect();

        let valid = match (root, fields.as_slice()) {
            (_, []) => true,
            (SelectRoot::File, [f]) => f == "directory" || f == "path",
            (SelectRoot::Symbol, [kind]) => SYMBOL_KINDS.contains(&kind.as_str()),
            (SelectRoot::Commit, [diff]) => diff == "diff",
            (SelectRoot::Commit, [diff, kind]) => {
                diff == "diff" && (kind == "added" || kind == "removed")
            }
            _ => false,
        };
        if !valid {
            return Err(SelectPathError::InvalidField {
                root,
                field: fields.join("."),
            });
        }

        Ok(Self { root, fields })
    }
}

impl fmt::Display for SelectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roots() {
        let path: SelectPath = "repo".parse().unwrap();
        assert_eq!(path.root(), SelectRoot::Repository);
        assert!(path.fields().is_empty());

        let path: SelectPath = "commit.diff.added".parse().unwrap();
        assert_eq!(path.root(), SelectRoot::Commit);
        assert_eq!(path.fields(), ["diff".to_string(), "added".to_string()]);
        assert_eq!(path.to_string(), "commit.diff.added");
    }

    #[test]
    fn reject_unknown_root() {
        let err = "nope".parse::<SelectPath>().unwrap_err();
        assert_eq!(err, SelectPathError::InvalidRoot("nope".to_string()));
    }

    #[test]
    fn reject_invalid_fields() {
        assert!("repo.name".parse::<SelectPath>().is_err());
        assert!("commit.diff.changed".parse::<SelectPath>().is_err());
        assert!("symbol.function".parse::<SelectPath>().is_ok());
        assert!("symbol.widget".parse::<SelectPath>().is_err());
    }
}

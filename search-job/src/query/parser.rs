use std::str::FromStr;

use super::types::{Basic, Node, Parameter, Pattern, Plan};
use super::{QueryError, SearchType, FIELD_PATTERN_TYPE};

/// Field names and their aliases.
const FIELDS: &[(&str, &str)] = &[
    ("repo", "repo"),
    ("r", "repo"),
    ("file", "file"),
    ("f", "file"),
    ("rev", "rev"),
    ("revision", "rev"),
    ("select", "select"),
    ("count", "count"),
    ("timeout", "timeout"),
    ("type", "type"),
    ("patterntype", "patterntype"),
    ("case", "case"),
    ("fork", "fork"),
    ("archived", "archived"),
    ("index", "index"),
    ("lang", "lang"),
    ("l", "lang"),
    ("language", "lang"),
    ("after", "after"),
    ("since", "after"),
    ("before", "before"),
    ("until", "before"),
    ("author", "author"),
    ("message", "message"),
    ("msg", "message"),
    ("m", "message"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(Parameter),
    Word(String),
    Quoted(String),
    And,
    Or,
    Not,
}

/// Builds a plan from a query string.
///
/// Recognizes `field:value` filters (a leading `-` negates), double quoted
/// phrases, the `and`, `or` and `not` keywords and `patterntype:`. Top-level
/// `or` splits the query into clauses sharing the same parameters. This is a
/// scanner, not a validator: field values are checked when the plan is
/// compiled.
///
/// ```
/// use search_job::query::{parse, SearchType};
///
/// let plan = parse("repo:sourcegraph func parse", SearchType::Literal).unwrap();
/// assert_eq!(plan[0].string_human(), "repo:sourcegraph func parse");
/// ```
pub fn parse(query: &str, search_type: SearchType) -> Result<Plan, QueryError> {
    let tokens = scan(query)?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let parameters: Vec<Parameter> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Field(p) => Some(p.clone()),
            _ => None,
        })
        .collect();

    let search_type = match parameters
        .iter()
        .find(|p| p.field == FIELD_PATTERN_TYPE && !p.negated)
    {
        Some(p) => SearchType::from_str(&p.value).map_err(|_| QueryError::InvalidValue {
            field: p.field.clone(),
            value: p.value.clone(),
        })?,
        None => search_type,
    };

    let alternatives: Vec<Node> = tokens
        .split(|t| *t == Token::Or)
        .filter_map(|alt| build_pattern(alt, search_type))
        .collect();

    let clauses = if alternatives.is_empty() {
        vec![Basic::new(parameters, None)]
    } else {
        alternatives
            .into_iter()
            .map(|node| Basic::new(parameters.clone(), Some(node)))
            .collect()
    };
    Plan::new(clauses)
}

fn build_pattern(tokens: &[Token], search_type: SearchType) -> Option<Node> {
    let mut groups: Vec<Vec<Node>> = vec![Vec::new()];
    let mut negate = false;
    for token in tokens {
        let pattern = match token {
            Token::Field(_) | Token::Or => continue,
            Token::And => {
                groups.push(Vec::new());
                continue;
            }
            Token::Not => {
                negate = true;
                continue;
            }
            Token::Quoted(value) => Pattern::quoted(value.as_str()),
            Token::Word(value) => word_pattern(value, search_type),
        };
        let pattern = if std::mem::take(&mut negate) {
            pattern.negate()
        } else {
            pattern
        };
        if let Some(group) = groups.last_mut() {
            group.push(Node::Pattern(pattern));
        }
    }
    Node::and(groups.into_iter().filter_map(Node::concat).collect())
}

fn word_pattern(value: &str, search_type: SearchType) -> Pattern {
    match search_type {
        SearchType::Literal => Pattern::literal(value),
        SearchType::Regexp => Pattern::regexp(value),
        SearchType::Standard => match value
            .strip_prefix('/')
            .and_then(|v| v.strip_suffix('/'))
        {
            Some(re) if !re.is_empty() => Pattern::regexp(re),
            _ => Pattern::literal(value),
        },
    }
}

fn scan(query: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<(usize, char)> = query.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let (value, next) = scan_quoted(&chars, i)?;
            tokens.push(Token::Quoted(value));
            i = next;
            continue;
        }

        if let Some((param, next)) = scan_field(&chars, i)? {
            tokens.push(Token::Field(param));
            i = next;
            continue;
        }

        let end = chars[i..]
            .iter()
            .position(|(_, c)| c.is_whitespace())
            .map_or(chars.len(), |n| i + n);
        let word = &query[pos..chars.get(end).map_or(query.len(), |(p, _)| *p)];
        tokens.push(match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Word(word.to_string()),
        });
        i = end;
    }
    Ok(tokens)
}

/// Scans `[-]field:value` starting at `start`. Unknown fields are left for the
/// pattern scanner so that things like URLs stay patterns.
fn scan_field(
    chars: &[(usize, char)],
    start: usize,
) -> Result<Option<(Parameter, usize)>, QueryError> {
    let mut i = start;
    let negated = chars[i].1 == '-';
    if negated {
        i += 1;
    }
    let name_start = i;
    while i < chars.len() && chars[i].1.is_ascii_alphabetic() {
        i += 1;
    }
    if i == name_start || i >= chars.len() || chars[i].1 != ':' {
        return Ok(None);
    }
    let name: String = chars[name_start..i]
        .iter()
        .map(|(_, c)| c.to_ascii_lowercase())
        .collect();
    let Some((_, field)) = FIELDS.iter().find(|(alias, _)| *alias == name) else {
        return Ok(None);
    };
    i += 1;

    let (value, next) = if i < chars.len() && chars[i].1 == '"' {
        scan_quoted(chars, i)?
    } else {
        let end = chars[i..]
            .iter()
            .position(|(_, c)| c.is_whitespace())
            .map_or(chars.len(), |n| i + n);
        (chars[i..end].iter().map(|(_, c)| c).collect(), end)
    };

    let param = Parameter {
        field: field.to_string(),
        value,
        negated,
    };
    Ok(Some((param, next)))
}

/// Scans a double quoted string starting at the opening quote and returns the
/// unescaped value and the index after the closing quote.
fn scan_quoted(chars: &[(usize, char)], start: usize) -> Result<(String, usize), QueryError> {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' if i + 1 < chars.len() => {
                value.push(chars[i + 1].1);
                i += 2;
            }
            '"' => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(QueryError::UnterminatedQuote(chars[start].0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PatternKind;

    fn human(q: &str) -> Vec<String> {
        parse(q, SearchType::Literal)
            .unwrap()
            .iter()
            .map(Basic::string_human)
            .collect()
    }

    #[test]
    fn fields_and_patterns() {
        let plan = parse("repo:sourcegraph -f:test func parse", SearchType::Literal).unwrap();
        let b = &plan[0];
        assert_eq!(b.parameters.len(), 2);
        assert_eq!(b.parameters[1], Parameter::new("file", "test").negated());
        assert_eq!(
            b.pattern,
            Some(Node::Concat(vec![
                Node::Pattern(Pattern::literal("func")),
                Node::Pattern(Pattern::literal("parse")),
            ]))
        );
    }

    #[test]
    fn unknown_fields_stay_patterns() {
        assert_eq!(human("https://github.com/a/b"), vec![" https://github.com/a/b"]);
        assert_eq!(human("foo:bar"), vec![" foo:bar"]);
    }

    #[test]
    fn quoted_values() {
        let plan = parse(r#""result please" unless? "maybe" ok"#, SearchType::Literal).unwrap();
        let leaves = plan[0].pattern.as_ref().unwrap().leaves();
        let kinds: Vec<PatternKind> = leaves.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PatternKind::Quoted,
                PatternKind::Literal,
                PatternKind::Quoted,
                PatternKind::Literal
            ]
        );
        assert_eq!(leaves[0].value, "result please");

        let plan = parse(r#"file:"a b" x"#, SearchType::Literal).unwrap();
        assert_eq!(plan[0].string_value("file"), Some("a b"));
        assert!(matches!(
            parse(r#""open"#, SearchType::Literal),
            Err(QueryError::UnterminatedQuote(0))
        ));
    }

    #[test]
    fn keywords() {
        assert_eq!(human("a b and not c"), vec![" (a b AND NOT c)"]);
        assert_eq!(human("repo:x a or b"), vec!["repo:x a", "repo:x b"]);
    }

    #[test]
    fn pattern_types() {
        let plan = parse("patterntype:regexp fo+", SearchType::Literal).unwrap();
        assert!(plan[0].pattern.as_ref().unwrap().leaves()[0].is_regexp());
        let plan = parse("/fo+/ bar", SearchType::Standard).unwrap();
        assert_eq!(plan[0].string_human(), " /fo+/ bar");
        assert!(parse("patterntype:fuzzy x", SearchType::Literal).is_err());
    }

    #[test]
    fn empty_queries() {
        assert!(matches!(parse("   ", SearchType::Literal), Err(QueryError::Empty)));
        assert_eq!(human("repo:a"), vec!["repo:a"]);
    }
}

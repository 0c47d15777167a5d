#![forbid(unsafe_code)]

//! Path expression parser.
//!
//! Grammar, informally:
//!
//! ```text
//! path      := '/'? step ('/' step)* '/'?
//! step      := name ('[' predicate ']')?
//! name      := '*' | '..' | '.' | [A-Za-z#@][A-Za-z0-9.#@_-]*
//! predicate := conj ('or' conj)*
//! conj      := term ('and' term)*
//! term      := '*' | index | 'last' | 'last()' | prop | prop op literal
//! ```
//!
//! Parsing is pure and deterministic, so callers may cache compiled steps.

use crate::query::ast::{
    CompareOp, CompiledStep, Literal, Predicate, PredicateTerm, PropertyPath, Selector,
};
use crate::query::errors::PathError;

const OPERATOR_CHARS: &[char] = &['!', '<', '>', '=', '~'];

/// Compiles a path expression into its ordered steps.
pub fn compile(expr: &str) -> Result<Vec<CompiledStep>, PathError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    let mut segments = split_segments(trimmed)?;
    if segments.first().is_some_and(|s| s.is_empty()) {
        segments.remove(0);
    }
    if segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    segments
        .iter()
        .enumerate()
        .map(|(position, segment)| {
            if segment.trim().is_empty() {
                return Err(PathError::EmptySegment {
                    expr: expr.to_owned(),
                    position,
                });
            }
            compile_step(segment.trim())
        })
        .collect()
}

/// Splits a dotted property name into its segments, honouring `\.` escapes.
///
/// Returns `None` when any segment is empty.
pub fn split_property_path(name: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = name.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            '.' => {
                if current.is_empty() {
                    return None;
                }
                segments.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    if current.is_empty() {
        return None;
    }
    segments.push(current);
    Some(segments)
}

fn split_segments(expr: &str) -> Result<Vec<&str>, PathError> {
    let unbalanced = || PathError::UnbalancedBrackets {
        fragment: expr.to_owned(),
    };
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;
    for (idx, ch) in expr.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' if depth > 0 => quote = Some(ch),
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1).ok_or_else(unbalanced)?,
            '/' if depth == 0 => {
                segments.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return Err(unbalanced());
    }
    segments.push(&expr[start..]);
    Ok(segments)
}

fn compile_step(segment: &str) -> Result<CompiledStep, PathError> {
    let Some(open) = segment.find('[') else {
        if segment.contains(']') {
            return Err(PathError::UnbalancedBrackets {
                fragment: segment.to_owned(),
            });
        }
        return Ok(CompiledStep::new(parse_selector(segment)?));
    };
    let close = matching_bracket(segment, open).ok_or_else(|| PathError::UnbalancedBrackets {
        fragment: segment.to_owned(),
    })?;
    if close != segment.len() - 1 {
        return Err(PathError::MalformedStep {
            step: segment.to_owned(),
        });
    }
    let selector = parse_selector(&segment[..open])?;
    let inner = segment[open + 1..close].trim();
    if inner.is_empty() {
        return Err(PathError::EmptyPredicate {
            step: segment.to_owned(),
        });
    }
    Ok(CompiledStep::new(selector).with_predicate(parse_predicate(inner)?))
}

fn matching_bracket(segment: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in segment[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_selector(name: &str) -> Result<Selector, PathError> {
    match name {
        "*" => return Ok(Selector::Wildcard),
        ".." => return Ok(Selector::Ancestor),
        "." => return Ok(Selector::Current),
        _ => {}
    }
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '#' || c == '@');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '#' | '@' | '_' | '-'));
    if valid_head && valid_tail {
        Ok(Selector::Child(name.to_owned()))
    } else {
        Err(PathError::MalformedStep {
            step: name.to_owned(),
        })
    }
}

enum Token {
    And,
    Or,
    Term(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, PathError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        if ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch == '\'' || ch == '"' {
            quote = Some(ch);
        }
        current.push(ch);
    }
    if quote.is_some() {
        return Err(PathError::InvalidLiteral { literal: current });
    }
    if !current.is_empty() {
        words.push(current);
    }

    // Words around an operator written with spaces (`Reading > 40`) merge
    // back into a single term.
    let mut tokens: Vec<Token> = Vec::new();
    for word in words {
        match word.as_str() {
            "and" => tokens.push(Token::And),
            "or" => tokens.push(Token::Or),
            _ => match tokens.last_mut() {
                Some(Token::Term(prev))
                    if prev.ends_with(OPERATOR_CHARS) || word.starts_with(OPERATOR_CHARS) =>
                {
                    prev.push_str(&word);
                }
                Some(Token::Term(prev)) => {
                    return Err(PathError::MalformedPredicate {
                        term: format!("{prev} {word}"),
                    });
                }
                _ => tokens.push(Token::Term(word)),
            },
        }
    }
    Ok(tokens)
}

fn parse_predicate(text: &str) -> Result<Predicate, PathError> {
    let malformed = || PathError::MalformedPredicate {
        term: text.to_owned(),
    };
    let mut disjuncts: Vec<Predicate> = Vec::new();
    let mut conjuncts: Vec<Predicate> = Vec::new();
    let mut expect_term = true;
    for token in tokenize(text)? {
        match (token, expect_term) {
            (Token::Term(term), true) => {
                conjuncts.push(Predicate::Term(parse_term(&term)?));
                expect_term = false;
            }
            (Token::And, false) => expect_term = true,
            (Token::Or, false) => {
                disjuncts.push(collapse(std::mem::take(&mut conjuncts), Predicate::And));
                expect_term = true;
            }
            _ => return Err(malformed()),
        }
    }
    if expect_term {
        return Err(malformed());
    }
    disjuncts.push(collapse(conjuncts, Predicate::And));
    Ok(collapse(disjuncts, Predicate::Or))
}

fn collapse(mut parts: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

fn parse_term(term: &str) -> Result<PredicateTerm, PathError> {
    match term {
        "*" => return Ok(PredicateTerm::SelectAll),
        "last" | "last()" => return Ok(PredicateTerm::Last),
        _ => {}
    }
    if term.chars().all(|c| c.is_ascii_digit()) {
        return term
            .parse::<usize>()
            .map(PredicateTerm::Index)
            .map_err(|_| PathError::InvalidLiteral {
                literal: term.to_owned(),
            });
    }
    let Some(op_start) = term.find(OPERATOR_CHARS) else {
        return Ok(PredicateTerm::Exists(parse_property(term, term)?));
    };
    let op_len = term[op_start..]
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(term.len() - op_start);
    let symbol = &term[op_start..op_start + op_len];
    let op = CompareOp::from_symbol(symbol).ok_or_else(|| PathError::UnsupportedOperator {
        op: symbol.to_owned(),
        term: term.to_owned(),
    })?;
    let property = parse_property(&term[..op_start], term)?;
    let value = parse_literal(&term[op_start + op_len..])?;
    Ok(PredicateTerm::Compare {
        property,
        op,
        value,
    })
}

fn parse_property(name: &str, term: &str) -> Result<PropertyPath, PathError> {
    let malformed = || PathError::MalformedPredicate {
        term: term.to_owned(),
    };
    let valid_head = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '#' || c == '@');
    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '\\' | '@' | '#' | '_' | '-' | ':');
    if !valid_head || !name.chars().all(valid) {
        return Err(malformed());
    }
    split_property_path(name)
        .map(PropertyPath)
        .ok_or_else(malformed)
}

fn parse_literal(text: &str) -> Result<Literal, PathError> {
    let invalid = || PathError::InvalidLiteral {
        literal: text.to_owned(),
    };
    if text.is_empty() {
        return Err(invalid());
    }
    if let Some(q) = text.chars().next().filter(|c| *c == '\'' || *c == '"') {
        return unquote(&text[1..], q).map(Literal::String).ok_or_else(invalid);
    }
    match text {
        "true" => return Ok(Literal::Bool(true)),
        "false" => return Ok(Literal::Bool(false)),
        "null" => return Ok(Literal::Null),
        _ => {}
    }
    if looks_numeric(text) {
        if let Ok(number) = text.parse::<f64>() {
            return if number.is_finite() {
                Ok(Literal::Number(number))
            } else {
                Err(invalid())
            };
        }
    }
    if text.contains(['\'', '"', '[', ']', '\\']) {
        return Err(invalid());
    }
    Ok(Literal::String(text.to_owned()))
}

fn looks_numeric(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    let body = body.strip_prefix('.').unwrap_or(body);
    body.starts_with(|c: char| c.is_ascii_digit())
}

/// Reads a quoted body (opening quote already stripped). The closing quote
/// must be the final character.
fn unquote(body: &str, quote: char) -> Option<String> {
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next()?);
        } else if ch == quote {
            return chars.next().is_none().then_some(out);
        } else {
            out.push(ch);
        }
    }
    None
}

//! Tokenizer for condition formulas.

use crate::error::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    None,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,  // ==
    Ne,  // !=
    Gt,  // >
    Lt,  // <
    Ge,  // >=
    Le,  // <=
    And, // and, &&
    Or,  // or, ||
    Not, // not, !
    In,  // in
    Is,  // is
}

impl Token {
    /// Human-readable description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("name `{name}`"),
            Token::Int(n) => format!("number `{n}`"),
            Token::Float(f) => format!("number `{f}`"),
            Token::Str(s) => format!("string {s:?}"),
            Token::True => "`True`".to_string(),
            Token::False => "`False`".to_string(),
            Token::None => "`None`".to_string(),
            Token::Dot => "`.`".to_string(),
            Token::Comma => "`,`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
            Token::LBracket => "`[`".to_string(),
            Token::RBracket => "`]`".to_string(),
            Token::Eq => "`==`".to_string(),
            Token::Ne => "`!=`".to_string(),
            Token::Gt => "`>`".to_string(),
            Token::Lt => "`<`".to_string(),
            Token::Ge => "`>=`".to_string(),
            Token::Le => "`<=`".to_string(),
            Token::And => "`and`".to_string(),
            Token::Or => "`or`".to_string(),
            Token::Not => "`not`".to_string(),
            Token::In => "`in`".to_string(),
            Token::Is => "`is`".to_string(),
        }
    }
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            quote @ ('"' | '\'') => {
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(FormulaError::UnterminatedString { offset: start }),
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&c) => s.push(c),
                                None => {
                                    return Err(FormulaError::UnterminatedString {
                                        offset: start,
                                    });
                                }
                            }
                            i += 2;
                        }
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(&c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                if num_str.contains('.') {
                    let f: f64 = num_str
                        .parse()
                        .map_err(|_| FormulaError::InvalidNumber(num_str.clone()))?;
                    tokens.push(Token::Float(f));
                } else {
                    let n: i64 = num_str
                        .parse()
                        .map_err(|_| FormulaError::InvalidNumber(num_str.clone()))?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "True" | "true" => Token::True,
                    "False" | "false" => Token::False,
                    "None" | "null" => Token::None,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "is" => Token::Is,
                    _ => Token::Ident(word),
                });
            }
            c => return Err(FormulaError::UnexpectedChar { ch: c, offset: i }),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_comparison_with_attribute_path() {
        let tokens = tokenize("user.Access != OWNER").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("user".into()),
                Token::Dot,
                Token::Ident("Access".into()),
                Token::Ne,
                Token::Ident("OWNER".into()),
            ]
        );
    }

    #[test]
    fn python_and_c_style_operators_are_equivalent() {
        assert_eq!(
            tokenize("a and not b or c").unwrap(),
            tokenize("a && !b || c").unwrap()
        );
    }

    #[test]
    fn string_literals_accept_both_quotes_and_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\"b""#).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Str("it's".into()), Token::Str("a\"b".into())]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert_eq!(
            tokenize("rec.Name == 'abc"),
            Err(FormulaError::UnterminatedString { offset: 12 })
        );
    }

    #[test]
    fn unexpected_character_reports_offset() {
        assert_eq!(
            tokenize("rec.A $ 1"),
            Err(FormulaError::UnexpectedChar { ch: '$', offset: 6 })
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokenize("12 3.5").unwrap(),
            vec![Token::Int(12), Token::Float(3.5)]
        );
        assert!(matches!(
            tokenize("1.2.3"),
            Err(FormulaError::InvalidNumber(_))
        ));
    }
}

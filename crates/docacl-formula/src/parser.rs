//! Recursive-descent parser for condition formulas.
//!
//! ```text
//! expr       = or
//! or         = and ("or" and)*
//! and        = not ("and" not)*
//! not        = "not" not | comparison
//! comparison = primary (compare_op primary)?
//! compare_op = "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not" "in" | "is" | "is" "not"
//! primary    = literal | name ("." ident)* | "(" expr ")" | "[" (expr ("," expr)* ","?)? "]"
//! ```

use docacl_types::Access;

use crate::ast::{Binding, CompareOp, Expr, Literal};
use crate::error::FormulaError;
use crate::lexer::{Token, tokenize};

/// Nesting limit; rule conditions are short and this keeps recursion bounded.
const MAX_DEPTH: usize = 64;

/// Limit on `and`/`or` connectives per formula. Chains build left-nested
/// trees, so this bounds the depth of everything that walks the tree.
const MAX_CONNECTIVES: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    connectives: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            connectives: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, wanted: &Token, expected: &'static str) -> Result<(), FormulaError> {
        match self.advance() {
            Some(ref tok) if tok == wanted => Ok(()),
            Some(tok) => Err(FormulaError::UnexpectedToken {
                found: tok.describe(),
                expected,
            }),
            None => Err(FormulaError::UnexpectedEnd { expected }),
        }
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn connective(&mut self) -> Result<(), FormulaError> {
        self.advance();
        self.connectives += 1;
        if self.connectives > MAX_CONNECTIVES {
            return Err(FormulaError::TooManyConnectives {
                limit: MAX_CONNECTIVES,
            });
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        self.descend()?;
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.connective()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.connective()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.descend()?;
            let inner = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::In) => CompareOp::In,
            Some(Token::Not) if self.peek_second() == Some(&Token::In) => {
                self.advance();
                CompareOp::NotIn
            }
            Some(Token::Is) if self.peek_second() == Some(&Token::Not) => {
                self.advance();
                CompareOp::IsNot
            }
            Some(Token::Is) => CompareOp::Is,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let expected = "a value, name, `(` or `[`";
        let expr = match self.advance() {
            Some(Token::Int(n)) => Expr::Literal(Literal::Int(n)),
            Some(Token::Float(f)) => Expr::Literal(Literal::Float(f)),
            Some(Token::Str(s)) => Expr::Literal(Literal::Text(s)),
            Some(Token::True) => Expr::Literal(Literal::Bool(true)),
            Some(Token::False) => Expr::Literal(Literal::Bool(false)),
            Some(Token::None) => Expr::Literal(Literal::None),
            Some(Token::Ident(name)) => resolve_name(&name)?,
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "`)`")?;
                inner
            }
            Some(Token::LBracket) => self.parse_list()?,
            Some(tok) => {
                return Err(FormulaError::UnexpectedToken {
                    found: tok.describe(),
                    expected,
                });
            }
            None => return Err(FormulaError::UnexpectedEnd { expected }),
        };
        self.parse_attributes(expr)
    }

    fn parse_attributes(&mut self, mut expr: Expr) -> Result<Expr, FormulaError> {
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(name)) => {
                    expr = Expr::Attribute {
                        base: Box::new(expr),
                        name,
                    };
                }
                _ => return Err(FormulaError::ExpectedAttribute),
            }
        }
        Ok(expr)
    }

    fn parse_list(&mut self) -> Result<Expr, FormulaError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBracket) {
                self.advance();
                break;
            }
            items.push(self.parse_expr()?);
            match self.advance() {
                Some(Token::Comma) => {}
                Some(Token::RBracket) => break,
                Some(tok) => {
                    return Err(FormulaError::UnexpectedToken {
                        found: tok.describe(),
                        expected: "`,` or `]`",
                    });
                }
                None => return Err(FormulaError::UnexpectedEnd { expected: "`]`" }),
            }
        }
        Ok(Expr::List(items))
    }
}

fn resolve_name(name: &str) -> Result<Expr, FormulaError> {
    let role = |access: Access| Expr::Literal(Literal::Text(access.as_str().to_string()));
    match name {
        "user" => Ok(Expr::Binding(Binding::User)),
        "rec" => Ok(Expr::Binding(Binding::Rec)),
        "newRec" => Ok(Expr::Binding(Binding::NewRec)),
        "OWNER" => Ok(role(Access::Owner)),
        "EDITOR" => Ok(role(Access::Editor)),
        "VIEWER" => Ok(role(Access::Viewer)),
        other => Err(FormulaError::UnknownName(other.to_string())),
    }
}

/// Parses formula text. Returns `None` for a blank formula, which matches
/// everyone.
pub(crate) fn parse(input: &str) -> Result<Option<Expr>, FormulaError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(FormulaError::UnexpectedToken {
            found: tok.describe(),
            expected: "end of formula",
        });
    }
    Ok(Some(expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parse_some(input: &str) -> Expr {
        parse(input).unwrap().unwrap()
    }

    #[test]
    fn blank_formula_parses_to_none() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn role_constants_become_text() {
        let expr = parse_some("user.Access != OWNER");
        assert_eq!(
            expr,
            Expr::Compare {
                op: CompareOp::Ne,
                left: Box::new(Expr::Attribute {
                    base: Box::new(Expr::Binding(Binding::User)),
                    name: "Access".into(),
                }),
                right: Box::new(Expr::Literal(Literal::Text("owners".into()))),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse_some("True or False and False");
        assert!(matches!(expr, Expr::Or(_, _)));
    }

    #[test]
    fn not_in_and_is_not() {
        assert!(matches!(
            parse_some("user.Email not in ['a', 'b']"),
            Expr::Compare {
                op: CompareOp::NotIn,
                ..
            }
        ));
        assert!(matches!(
            parse_some("rec.Manager is not None"),
            Expr::Compare {
                op: CompareOp::IsNot,
                ..
            }
        ));
    }

    #[test]
    fn nested_attributes() {
        assert_eq!(parse_some("user.Team.Name").to_string(), "user.Team.Name");
    }

    #[test]
    fn list_allows_trailing_comma() {
        assert_eq!(parse_some("[EDITOR, OWNER,]").to_string(), r#"["editors", "owners"]"#);
    }

    #[test_case("record.Owner == 1" => FormulaError::UnknownName("record".into()); "unknown binding")]
    #[test_case("rec.[R0] == 1" => FormulaError::ExpectedAttribute; "unresolved token")]
    #[test_case("rec.A ==" => FormulaError::UnexpectedEnd { expected: "a value, name, `(` or `[`" }; "dangling operator")]
    #[test_case("(True" => FormulaError::UnexpectedEnd { expected: "`)`" }; "missing paren")]
    #[test_case("True True" => FormulaError::UnexpectedToken { found: "`True`".into(), expected: "end of formula" }; "trailing token")]
    fn parse_errors(input: &str) -> FormulaError {
        parse(input).unwrap_err()
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let input = format!("{}True{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&input), Err(FormulaError::TooDeep { limit: MAX_DEPTH }));
    }

    #[test]
    fn long_connective_chains_are_rejected() {
        let chain = vec!["False"; 200_000].join(" or ");
        assert_eq!(
            parse(&chain),
            Err(FormulaError::TooManyConnectives {
                limit: MAX_CONNECTIVES
            })
        );

        let mixed = vec!["True and False"; 1_000].join(" or ");
        assert!(matches!(
            parse(&mixed),
            Err(FormulaError::TooManyConnectives { .. })
        ));
    }

    #[test]
    fn chains_within_the_limit_parse() {
        let chain = vec!["False"; MAX_CONNECTIVES + 1].join(" or ");
        assert!(parse(&chain).is_ok());
    }
}

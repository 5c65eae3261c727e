//! Reader for TL-B schema text
//!
//! The reader accepts the declaration forms found in the block and contract
//! schemas: `//` and `/* */` comments, `{...}` implicit blocks, `^` cell
//! references, the `#`, `## n`, `#< n`, `#<= n` numeric built-ins, TL-B
//! application `(HashmapE 32 X)` as well as angle application
//! `HashmapE<32, X>`. Arithmetic and negated (`~n`) expressions are kept as
//! raw text and rejected later by the compiler.

use std::fmt::{Display, Formatter};

use tracing::trace;

use super::ast::{CombinatorDeclaration, FieldDefinition, TypeExpression};
use super::error::{SchemaError, SchemaResult};
use crate::tag::Tag;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    TagLit(String),
    Hash,
    DoubleHash,
    HashLess,
    HashLessEq,
    Implicit(String),
    Colon,
    Equals,
    Semi,
    LParen,
    RParen,
    LAngle,
    RAngle,
    LBracket,
    RBracket,
    Comma,
    Caret,
    Tilde,
    Question,
    Bang,
    Op(char),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) | Token::TagLit(s) => write!(f, "{}", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Hash => write!(f, "#"),
            Token::DoubleHash => write!(f, "##"),
            Token::HashLess => write!(f, "#<"),
            Token::HashLessEq => write!(f, "#<="),
            Token::Implicit(s) => write!(f, "{{{}}}", s),
            Token::Colon => write!(f, ":"),
            Token::Equals => write!(f, "="),
            Token::Semi => write!(f, ";"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LAngle => write!(f, "<"),
            Token::RAngle => write!(f, ">"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::Question => write!(f, "?"),
            Token::Bang => write!(f, "!"),
            Token::Op(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Pos {
    line: usize,
    column: usize,
}

fn syntax(pos: Pos, message: impl Into<String>) -> SchemaError {
    SchemaError::Syntax {
        line: pos.line,
        column: pos.column,
        message: message.into(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    pos: Pos,
    /// Whether the previous character ended an identifier
    after_ident: bool,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            pos: Pos { line: 1, column: 1 },
            after_ident: false,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, first: char, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn tokens(mut self) -> SchemaResult<Vec<(Token, Pos)>> {
        let mut out = Vec::new();
        loop {
            let start = self.pos;
            let Some(c) = self.bump() else { break };
            let glued = std::mem::replace(&mut self.after_ident, false);
            let token = match c {
                c if c.is_whitespace() => continue,
                '/' if self.chars.peek() == Some(&'/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '/' if self.chars.peek() == Some(&'*') => {
                    self.bump();
                    let mut prev = '\0';
                    loop {
                        match self.bump() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => return Err(syntax(start, "unterminated block comment")),
                        }
                    }
                    continue;
                }
                '{' => {
                    let mut depth = 1;
                    let mut text = String::new();
                    loop {
                        match self.bump() {
                            Some('{') => depth += 1,
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(c) => text.push(c),
                            None => return Err(syntax(start, "unterminated implicit block")),
                        }
                    }
                    Token::Implicit(text.trim().to_owned())
                }
                '#' | '$' if glued || c == '$' => {
                    Token::TagLit(self.take_while(c, |c| c.is_ascii_hexdigit() || c == '_'))
                }
                '#' => match self.chars.peek() {
                    Some('#') => {
                        self.bump();
                        Token::DoubleHash
                    }
                    Some('<') => {
                        self.bump();
                        if self.chars.peek() == Some(&'=') {
                            self.bump();
                            Token::HashLessEq
                        } else {
                            Token::HashLess
                        }
                    }
                    _ => Token::Hash,
                },
                c if c.is_ascii_digit() => {
                    let digits = self.take_while(c, |c| c.is_ascii_digit());
                    let n = digits
                        .parse()
                        .map_err(|_| syntax(start, format!("number `{}` out of range", digits)))?;
                    Token::Number(n)
                }
                c if is_ident_char(c) => {
                    self.after_ident = true;
                    Token::Ident(self.take_while(c, is_ident_char))
                }
                ':' => Token::Colon,
                '=' => Token::Equals,
                ';' => Token::Semi,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '<' => Token::LAngle,
                '>' => Token::RAngle,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                '^' => Token::Caret,
                '~' => Token::Tilde,
                '?' => Token::Question,
                '!' => Token::Bang,
                '+' | '*' | '-' | '.' => Token::Op(c),
                other => return Err(syntax(start, format!("unexpected character `{}`", other))),
            };
            out.push((token, start));
        }
        Ok(out)
    }
}

struct Parser {
    tokens: Vec<(Token, Pos)>,
    ix: usize,
    end: Pos,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.ix).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.ix + offset).map(|(t, _)| t)
    }

    fn pos(&self) -> Pos {
        self.tokens.get(self.ix).map_or(self.end, |(_, p)| *p)
    }

    fn next(&mut self) -> SchemaResult<Token> {
        match self.tokens.get(self.ix) {
            Some((t, _)) => {
                self.ix += 1;
                Ok(t.clone())
            }
            None => Err(syntax(self.end, "unexpected end of schema")),
        }
    }

    fn expect(&mut self, want: Token) -> SchemaResult<()> {
        let pos = self.pos();
        let got = self.next()?;
        if got == want {
            Ok(())
        } else {
            Err(syntax(pos, format!("expected `{}`, found `{}`", want, got)))
        }
    }

    fn ident(&mut self) -> SchemaResult<String> {
        let pos = self.pos();
        match self.next()? {
            Token::Ident(name) => Ok(name),
            other => Err(syntax(pos, format!("expected identifier, found `{}`", other))),
        }
    }

    fn declaration(&mut self) -> SchemaResult<CombinatorDeclaration> {
        let constructor = self.ident()?;
        let tag = match self.peek().cloned() {
            Some(Token::TagLit(lit)) => {
                self.ix += 1;
                Tag::parse_optional(&lit).map_err(|err| SchemaError::InvalidTag {
                    constructor: constructor.clone(),
                    err,
                })?
            }
            _ => None,
        };
        let fields = self.fields(&Token::Equals)?;
        self.expect(Token::Equals)?;
        let result = self.ident()?;
        let mut result_params = Vec::new();
        while self.peek() != Some(&Token::Semi) {
            result_params.push(self.unary()?);
        }
        self.expect(Token::Semi)?;
        trace!(%constructor, %result, "read declaration");
        Ok(CombinatorDeclaration {
            constructor,
            tag,
            fields,
            result,
            result_params,
        })
    }

    /// Field definitions up to (not including) `end`
    fn fields(&mut self, end: &Token) -> SchemaResult<Vec<FieldDefinition>> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(t) if t == end => return Ok(out),
                None => return Err(syntax(self.end, format!("missing `{}`", end))),
                Some(Token::Implicit(text)) => {
                    out.push(FieldDefinition::Implicit(text.clone()));
                    self.ix += 1;
                }
                Some(Token::Bang) => {
                    self.ix += 1;
                }
                Some(Token::Caret) => {
                    self.ix += 1;
                    out.push(FieldDefinition::CellRef(self.unary()?));
                }
                Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::Colon) => {
                    let name = self.ident()?;
                    self.expect(Token::Colon)?;
                    let expr = self.field_type()?;
                    out.push(FieldDefinition::Named { name, expr });
                }
                Some(_) => {
                    let expr = self.field_type()?;
                    out.push(FieldDefinition::Named {
                        name: "_".to_owned(),
                        expr,
                    });
                }
            }
        }
    }

    fn field_type(&mut self) -> SchemaResult<TypeExpression> {
        if let Some(Token::Ident(flag)) = self.peek() {
            let flag = flag.clone();
            match (self.peek_at(1), self.peek_at(2), self.peek_at(3)) {
                (Some(Token::Question), _, _) => {
                    self.ix += 2;
                    let then = Box::new(self.unary()?);
                    return Ok(TypeExpression::Conditional { flag, then });
                }
                (Some(Token::Op('.')), Some(Token::Number(bit)), Some(Token::Question)) => {
                    let flag = format!("{}.{}", flag, bit);
                    self.ix += 4;
                    let then = Box::new(self.unary()?);
                    return Ok(TypeExpression::Conditional { flag, then });
                }
                _ => {}
            }
        }
        self.unary()
    }

    fn unary(&mut self) -> SchemaResult<TypeExpression> {
        match self.peek() {
            Some(Token::Caret) => {
                self.ix += 1;
                Ok(TypeExpression::CellRef(Box::new(self.unary()?)))
            }
            Some(Token::Tilde) => {
                self.ix += 1;
                let inner = self.atom()?;
                Ok(TypeExpression::Arithmetic(format!("~{}", inner)))
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> SchemaResult<TypeExpression> {
        let pos = self.pos();
        match self.next()? {
            Token::LParen => self.paren(),
            Token::LBracket => {
                let fields = self.fields(&Token::RBracket)?;
                self.expect(Token::RBracket)?;
                Ok(TypeExpression::Anonymous(fields))
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LAngle) {
                    self.ix += 1;
                    let mut args = vec![self.unary()?];
                    while self.peek() == Some(&Token::Comma) {
                        self.ix += 1;
                        args.push(self.unary()?);
                    }
                    self.expect(Token::RAngle)?;
                    Ok(TypeExpression::Apply { name, args })
                } else {
                    Ok(TypeExpression::Named(name))
                }
            }
            Token::Number(n) => Ok(TypeExpression::Number(n)),
            Token::Hash => Ok(TypeExpression::Named("#".to_owned())),
            t @ (Token::DoubleHash | Token::HashLess | Token::HashLessEq) => {
                let args = vec![self.atom()?];
                Ok(TypeExpression::Apply {
                    name: t.to_string(),
                    args,
                })
            }
            other => Err(syntax(pos, format!("unexpected `{}` in type expression", other))),
        }
    }

    /// Body of a parenthesized expression, after the opening parenthesis
    fn paren(&mut self) -> SchemaResult<TypeExpression> {
        let start = self.ix;
        if let Some(t @ (Token::DoubleHash | Token::HashLess | Token::HashLessEq)) = self.peek() {
            let name = t.to_string();
            self.ix += 1;
            let mut args = Vec::new();
            while self.peek() != Some(&Token::RParen) {
                if matches!(self.peek(), Some(Token::Op(_))) {
                    return self.arithmetic(start);
                }
                args.push(self.unary()?);
            }
            self.ix += 1;
            return Ok(TypeExpression::Apply { name, args });
        }
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RParen) => break,
                Some(Token::Op(_)) => return self.arithmetic(start),
                None => return Err(syntax(self.end, "missing `)`")),
                _ => items.push(self.unary()?),
            }
        }
        let close = self.pos();
        self.ix += 1;
        let mut items = items.into_iter();
        match (items.next(), items.len()) {
            (Some(only), 0) => Ok(only),
            (Some(TypeExpression::Named(name)), _) => Ok(TypeExpression::Apply {
                name,
                args: items.collect(),
            }),
            (Some(head), _) => Err(syntax(
                close,
                format!("cannot apply `{}` to arguments", head),
            )),
            (None, _) => Err(syntax(close, "empty parentheses")),
        }
    }

    /// Re-reads the tokens from `start` up to the matching `)` as raw text
    fn arithmetic(&mut self, start: usize) -> SchemaResult<TypeExpression> {
        self.ix = start;
        let mut depth = 0usize;
        let mut parts = Vec::new();
        loop {
            let token = self.next()?;
            match token {
                Token::LParen => depth += 1,
                Token::RParen if depth == 0 => break,
                Token::RParen => depth -= 1,
                _ => {}
            }
            parts.push(token.to_string());
        }
        Ok(TypeExpression::Arithmetic(format!("({})", parts.join(" "))))
    }
}

/// Reads every declaration in `text`
pub fn parse_schema(text: &str) -> SchemaResult<Vec<CombinatorDeclaration>> {
    let lexer = Lexer::new(text);
    let end = {
        let mut pos = Pos { line: 1, column: 1 };
        for c in text.chars() {
            if c == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
        }
        pos
    };
    let mut parser = Parser {
        tokens: lexer.tokens()?,
        ix: 0,
        end,
    };
    let mut out = Vec::new();
    while parser.peek().is_some() {
        out.push(parser.declaration()?);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn named(name: &str) -> TypeExpression {
        TypeExpression::Named(name.to_owned())
    }

    #[test]
    fn reads_tagged_record() {
        let decls = parse_schema(
            "// comment\n\
             shard_ident$00 shard_pfx_bits:(#<= 60) workchain_id:int32\n  \
             shard_prefix:uint64 = ShardIdent;",
        )
        .unwrap();
        assert_eq!(decls.len(), 1);
        let d = &decls[0];
        assert_eq!(d.constructor, "shard_ident");
        assert_eq!(d.tag, Some(Tag::new(0, 2)));
        assert_eq!(d.result, "ShardIdent");
        assert_eq!(
            d.fields[0],
            FieldDefinition::Named {
                name: "shard_pfx_bits".into(),
                expr: TypeExpression::Apply {
                    name: "#<=".into(),
                    args: vec![TypeExpression::Number(60)]
                }
            }
        );
        assert_eq!(
            d.fields[1],
            FieldDefinition::Named {
                name: "workchain_id".into(),
                expr: named("int32")
            }
        );
    }

    #[test]
    fn reads_refs_implicits_and_generics() {
        let decls = parse_schema(
            "/* block\n signatures */\n\
             block_signatures#11 validator_info:ValidatorBaseInfo sig_count:uint32 \
             { sig_weight <= 100 } ^Cell \
             signatures:(HashmapE 16 CryptoSignaturePair) \
             maybe:Maybe<^Msg> = BlockSignatures;",
        )
        .unwrap();
        let d = &decls[0];
        assert_eq!(d.tag, Some(Tag::new(0x11, 8)));
        assert_eq!(d.fields[2], FieldDefinition::Implicit("sig_weight <= 100".into()));
        assert_eq!(d.fields[3], FieldDefinition::CellRef(named("Cell")));
        assert_eq!(
            d.fields[4],
            FieldDefinition::Named {
                name: "signatures".into(),
                expr: TypeExpression::Apply {
                    name: "HashmapE".into(),
                    args: vec![TypeExpression::Number(16), named("CryptoSignaturePair")]
                }
            }
        );
        assert_eq!(
            d.fields[5],
            FieldDefinition::Named {
                name: "maybe".into(),
                expr: TypeExpression::Apply {
                    name: "Maybe".into(),
                    args: vec![TypeExpression::CellRef(Box::new(named("Msg")))]
                }
            }
        );
    }

    #[test]
    fn keeps_parameters_and_arithmetic() {
        let decls = parse_schema(
            "hm_edge#_ {n:#} {X:Type} {l:#} {m:#} label:(HmLabel ~l n) \
             {n = (~m) + l} node:(HashmapNode m X) = Hashmap n X;\n\
             unary_succ$1 {n:#} x:(Unary ~n) = Unary ~(n + 1);",
        )
        .unwrap();
        assert_eq!(decls[0].tag, None);
        assert_eq!(decls[0].result_params, vec![named("n"), named("X")]);
        assert_eq!(
            decls[0].fields[4],
            FieldDefinition::Named {
                name: "label".into(),
                expr: TypeExpression::Apply {
                    name: "HmLabel".into(),
                    args: vec![TypeExpression::Arithmetic("~l".into()), named("n")]
                }
            }
        );
        assert_eq!(decls[1].result_params.len(), 1);
    }

    #[test]
    fn conditional_fields() {
        let decls =
            parse_schema("foo$1 flags:(## 8) x:flags.0?uint32 y:f?^Cell = Foo;").unwrap();
        assert_eq!(
            decls[0].fields[1],
            FieldDefinition::Named {
                name: "x".into(),
                expr: TypeExpression::Conditional {
                    flag: "flags.0".into(),
                    then: Box::new(named("uint32"))
                }
            }
        );
        assert!(matches!(
            decls[0].fields[2],
            FieldDefinition::Named {
                expr: TypeExpression::Conditional { .. },
                ..
            }
        ));
    }

    #[test]
    fn reports_position() {
        let err = parse_schema("a$0 x:uint8 = A;\nb$1 x:@ = B;").unwrap_err();
        assert_eq!(
            err,
            SchemaError::Syntax {
                line: 2,
                column: 7,
                message: "unexpected character `@`".into()
            }
        );
        assert!(matches!(
            parse_schema("a$0 x:uint8 = A"),
            Err(SchemaError::Syntax { .. })
        ));
    }
}

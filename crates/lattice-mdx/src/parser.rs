//! Parser for the supported MDX subset.
//!
//! Statements have the shape
//!
//! ```text
//! SELECT <set> ON COLUMNS [, <set> ON ROWS]
//! FROM [Cube]
//! [WHERE (<member>, ...)]
//! ```
//!
//! Sets are braces-enclosed lists, member or level references, or calls to
//! `CrossJoin`, `Hierarchize`, and `DrilldownMember`. `DIMENSION PROPERTIES`
//! and `CELL PROPERTIES` clauses are accepted and ignored, since the result
//! document always carries the full member and cell property set.

use std::fmt;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, thiserror::Error)]
#[error("{message} (found {found} at offset {position})")]
pub struct ParseError {
    pub message: String,
    pub found: String,
    pub position: usize,
}

/// A parsed statement, still in name form. Nothing here has been checked
/// against a cube; that is the resolver's job.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub cube: String,
    /// Axis 0 first, then axis 1 if present.
    pub axes: Vec<AxisSpec>,
    pub slicer: Option<Vec<SegRef>>,
    /// Measure names referenced anywhere in the statement, in first-appearance
    /// order. Empty means the query never names a measure.
    pub measures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AxisSpec {
    pub set: SetExpr,
    pub non_empty: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SetExpr {
    Seg(SegRef),
    /// `{ a, b, ... }`, concatenation.
    Set(Vec<SetExpr>),
    CrossJoin(Box<SetExpr>, Box<SetExpr>),
    Hierarchize(Box<SetExpr>),
    DrilldownMember(Box<SetExpr>, Box<SetExpr>),
}

/// A dotted reference, e.g. `[Time].[Time].[Day].Members`. The path holds the
/// bracketed segments in order; the suffix records a trailing `.Members` or
/// `.Children`.
#[derive(Clone, Debug, PartialEq)]
pub struct SegRef {
    pub path: Vec<String>,
    pub suffix: Suffix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suffix {
    None,
    Members,
    Children,
}

impl SegRef {
    pub fn is_measure(&self) -> bool {
        self.path
            .first()
            .is_some_and(|head| head.eq_ignore_ascii_case("Measures"))
    }
}

pub fn parse(statement: &str) -> ParseResult<QueryPlan> {
    Parser::new(statement)?.statement()
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Select,
    From,
    Where,
    On,
    Non,
    Empty,
    Ident(String),
    Bracket(String),
    Number(u64),
    Comma,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Select => write!(f, "SELECT"),
            Token::From => write!(f, "FROM"),
            Token::Where => write!(f, "WHERE"),
            Token::On => write!(f, "ON"),
            Token::Non => write!(f, "NON"),
            Token::Empty => write!(f, "EMPTY"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Bracket(name) => write!(f, "[{name}]"),
            Token::Number(value) => write!(f, "{value}"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Eof => write!(f, "end of statement"),
        }
    }
}

struct Lexer<'a> {
    chars: std::str::CharIndices<'a>,
    len: usize,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices(),
            len: input.len(),
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.peeked.take().or_else(|| self.chars.next())
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn pos(&mut self) -> usize {
        self.peek().map_or(self.len, |(i, _)| i)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.bump();
        }
    }

    fn next_token(&mut self) -> ParseResult<(usize, Token)> {
        self.skip_whitespace();
        let start = self.pos();
        let Some((_, c)) = self.bump() else {
            return Ok((start, Token::Eof));
        };
        let token = match c {
            ',' => Token::Comma,
            '.' => Token::Dot,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::Bracket(self.bracket_name(start)?),
            c if c.is_ascii_digit() => {
                let mut text = String::from(c);
                while let Some((_, d)) = self.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    text.push(d);
                    self.bump();
                }
                let value = text.parse().map_err(|_| ParseError {
                    message: "number out of range".into(),
                    found: text.clone(),
                    position: start,
                })?;
                Token::Number(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some((_, d)) = self.peek() {
                    if !d.is_alphanumeric() && d != '_' {
                        break;
                    }
                    word.push(d);
                    self.bump();
                }
                match word.to_ascii_uppercase().as_str() {
                    "SELECT" => Token::Select,
                    "FROM" => Token::From,
                    "WHERE" => Token::Where,
                    "ON" => Token::On,
                    "NON" => Token::Non,
                    "EMPTY" => Token::Empty,
                    _ => Token::Ident(word),
                }
            }
            other => {
                return Err(ParseError {
                    message: "unexpected character".into(),
                    found: other.to_string(),
                    position: start,
                })
            }
        };
        Ok((start, token))
    }

    /// Reads the body of a bracketed name. A doubled `]]` is a literal `]`.
    fn bracket_name(&mut self, start: usize) -> ParseResult<String> {
        let mut name = String::new();
        loop {
            match self.bump() {
                Some((_, ']')) => {
                    if matches!(self.peek(), Some((_, ']'))) {
                        self.bump();
                        name.push(']');
                    } else {
                        return Ok(name);
                    }
                }
                Some((_, c)) => name.push(c),
                None => {
                    return Err(ParseError {
                        message: "unterminated bracketed name".into(),
                        found: "end of statement".into(),
                        position: start,
                    })
                }
            }
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: (usize, Token),
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let lookahead = lexer.next_token()?;
        Ok(Self { lexer, lookahead })
    }

    fn peek(&self) -> &Token {
        &self.lookahead.1
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name.eq_ignore_ascii_case(word))
    }

    fn bump(&mut self) -> ParseResult<(usize, Token)> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.lookahead, next))
    }

    fn eat(&mut self, token: &Token) -> ParseResult<bool> {
        if self.peek() == token {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.peek() == &token {
            self.bump()?;
            Ok(())
        } else {
            Err(self.error(format!("expected {token}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            found: self.lookahead.1.to_string(),
            position: self.lookahead.0,
        }
    }

    fn statement(mut self) -> ParseResult<QueryPlan> {
        self.expect(Token::Select)?;

        let mut clauses: Vec<(u64, AxisSpec)> = Vec::new();
        if !matches!(self.peek(), Token::From) {
            loop {
                let (ordinal, spec) = self.axis_clause()?;
                if clauses.iter().any(|(seen, _)| *seen == ordinal) {
                    return Err(self.error(format!("axis {ordinal} listed twice")));
                }
                clauses.push((ordinal, spec));
                if !self.eat(&Token::Comma)? {
                    break;
                }
            }
        }
        clauses.sort_by_key(|(ordinal, _)| *ordinal);
        for (want, (ordinal, _)) in clauses.iter().enumerate() {
            if *ordinal != want as u64 {
                return Err(self.error(format!("axis {want} is missing")));
            }
        }

        self.expect(Token::From)?;
        let cube = self.name_token("a cube name after FROM")?;

        let slicer = if matches!(self.peek(), Token::Where) {
            self.bump()?;
            Some(self.slicer_tuple()?)
        } else {
            None
        };

        // Trailing CELL PROPERTIES list, ignored.
        if self.peek_ident("CELL") {
            while !matches!(self.peek(), Token::Eof) {
                self.bump()?;
            }
        }
        self.expect(Token::Eof)?;

        let axes: Vec<AxisSpec> = clauses.into_iter().map(|(_, spec)| spec).collect();
        let measures = collect_measures(&axes, slicer.as_deref());
        Ok(QueryPlan {
            cube,
            axes,
            slicer,
            measures,
        })
    }

    fn axis_clause(&mut self) -> ParseResult<(u64, AxisSpec)> {
        let non_empty = if matches!(self.peek(), Token::Non) {
            self.bump()?;
            self.expect(Token::Empty)?;
            true
        } else {
            false
        };
        let set = self.set()?;
        if self.peek_ident("DIMENSION") {
            self.bump()?;
            if !self.peek_ident("PROPERTIES") {
                return Err(self.error("expected PROPERTIES after DIMENSION"));
            }
            while !matches!(self.peek(), Token::On | Token::Eof) {
                self.bump()?;
            }
        }
        self.expect(Token::On)?;
        let ordinal = self.axis_name()?;
        Ok((ordinal, AxisSpec { set, non_empty }))
    }

    fn axis_name(&mut self) -> ParseResult<u64> {
        if self.peek_ident("COLUMNS") {
            self.bump()?;
            return Ok(0);
        }
        if self.peek_ident("ROWS") {
            self.bump()?;
            return Ok(1);
        }
        if self.peek_ident("AXIS") {
            self.bump()?;
            self.expect(Token::LParen)?;
            let ordinal = self.axis_ordinal()?;
            self.expect(Token::RParen)?;
            return Ok(ordinal);
        }
        if matches!(self.peek(), Token::Number(_)) {
            return self.axis_ordinal();
        }
        Err(self.error("expected COLUMNS, ROWS, or AXIS(n)"))
    }

    fn axis_ordinal(&mut self) -> ParseResult<u64> {
        let Token::Number(ordinal) = self.peek() else {
            return Err(self.error("expected an axis ordinal"));
        };
        let ordinal = *ordinal;
        if ordinal > 1 {
            return Err(self.error(format!("axis {ordinal} is out of range, only 0 and 1 exist")));
        }
        self.bump()?;
        Ok(ordinal)
    }

    fn set(&mut self) -> ParseResult<SetExpr> {
        match self.peek() {
            Token::LBrace => {
                self.bump()?;
                let mut items = Vec::new();
                if !self.eat(&Token::RBrace)? {
                    loop {
                        items.push(self.set()?);
                        if !self.eat(&Token::Comma)? {
                            break;
                        }
                    }
                    self.expect(Token::RBrace)?;
                }
                Ok(SetExpr::Set(items))
            }
            // A parenthesized member tuple is a cross join of its entries.
            Token::LParen => {
                self.bump()?;
                let mut expr = SetExpr::Seg(self.seg()?);
                while self.eat(&Token::Comma)? {
                    let next = SetExpr::Seg(self.seg()?);
                    expr = SetExpr::CrossJoin(Box::new(expr), Box::new(next));
                }
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Bracket(_) => Ok(SetExpr::Seg(self.seg()?)),
            Token::Ident(_) => self.function(),
            _ => Err(self.error("expected a set expression")),
        }
    }

    fn function(&mut self) -> ParseResult<SetExpr> {
        let name = self.name_token("a function name")?;
        if name.eq_ignore_ascii_case("CROSSJOIN") {
            self.expect(Token::LParen)?;
            let mut expr = self.set()?;
            while self.eat(&Token::Comma)? {
                expr = SetExpr::CrossJoin(Box::new(expr), Box::new(self.set()?));
            }
            self.expect(Token::RParen)?;
            Ok(expr)
        } else if name.eq_ignore_ascii_case("HIERARCHIZE") {
            self.expect(Token::LParen)?;
            let inner = self.set()?;
            self.expect(Token::RParen)?;
            Ok(SetExpr::Hierarchize(Box::new(inner)))
        } else if name.eq_ignore_ascii_case("DRILLDOWNMEMBER") {
            self.expect(Token::LParen)?;
            let base = self.set()?;
            self.expect(Token::Comma)?;
            let targets = self.set()?;
            self.expect(Token::RParen)?;
            Ok(SetExpr::DrilldownMember(Box::new(base), Box::new(targets)))
        } else if name.eq_ignore_ascii_case("ADDCALCULATEDMEMBERS") {
            // No calculated members exist here, so the call is the identity.
            self.expect(Token::LParen)?;
            let inner = self.set()?;
            self.expect(Token::RParen)?;
            Ok(inner)
        } else {
            Err(self.error(format!("unsupported function {name}")))
        }
    }

    fn seg(&mut self) -> ParseResult<SegRef> {
        if !matches!(self.peek(), Token::Bracket(_)) {
            return Err(self.error("expected a bracketed name"));
        }
        let mut path = vec![self.name_token("a bracketed name")?];
        let mut suffix = Suffix::None;
        while self.eat(&Token::Dot)? {
            match self.peek() {
                Token::Bracket(_) => path.push(self.name_token("a member segment")?),
                Token::Ident(word) if word.eq_ignore_ascii_case("MEMBERS") => {
                    self.bump()?;
                    suffix = Suffix::Members;
                    break;
                }
                Token::Ident(word) if word.eq_ignore_ascii_case("CHILDREN") => {
                    self.bump()?;
                    suffix = Suffix::Children;
                    break;
                }
                _ => return Err(self.error("expected a segment, MEMBERS, or CHILDREN")),
            }
        }
        Ok(SegRef { path, suffix })
    }

    fn slicer_tuple(&mut self) -> ParseResult<Vec<SegRef>> {
        if self.eat(&Token::LParen)? {
            let mut segs = vec![self.seg()?];
            while self.eat(&Token::Comma)? {
                segs.push(self.seg()?);
            }
            self.expect(Token::RParen)?;
            Ok(segs)
        } else {
            Ok(vec![self.seg()?])
        }
    }

    fn name_token(&mut self, what: &str) -> ParseResult<String> {
        match self.peek() {
            Token::Bracket(_) | Token::Ident(_) => {}
            _ => return Err(self.error(format!("expected {what}"))),
        }
        match self.bump()?.1 {
            Token::Bracket(name) | Token::Ident(name) => Ok(name),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }
}

fn collect_measures(axes: &[AxisSpec], slicer: Option<&[SegRef]>) -> Vec<String> {
    let mut segs = Vec::new();
    for axis in axes {
        collect_segs(&axis.set, &mut segs);
    }
    let mut measures: Vec<String> = Vec::new();
    for seg in segs.iter().copied().chain(slicer.unwrap_or_default()) {
        if !seg.is_measure() {
            continue;
        }
        let Some(name) = seg.path.get(1) else {
            continue;
        };
        if !measures.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
            measures.push(name.clone());
        }
    }
    measures
}

fn collect_segs<'p>(set: &'p SetExpr, out: &mut Vec<&'p SegRef>) {
    match set {
        SetExpr::Seg(seg) => out.push(seg),
        SetExpr::Set(items) => {
            for item in items {
                collect_segs(item, out);
            }
        }
        SetExpr::CrossJoin(a, b) | SetExpr::DrilldownMember(a, b) => {
            collect_segs(a, out);
            collect_segs(b, out);
        }
        SetExpr::Hierarchize(inner) => collect_segs(inner, out),
    }
}

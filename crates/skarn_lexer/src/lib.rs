use logos::Logos;

/// Process escape sequences in a string literal
fn process_escape_sequences(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('0') => result.push('\0'),
                Some(other) => {
                    // Unknown escape - keep as-is
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// An integer literal together with its optional type suffix (`3USize`)
#[derive(Debug, Clone, PartialEq)]
pub struct IntLit {
    pub value: i64,
    pub suffix: Option<String>,
}

fn parse_int_lit(slice: &str) -> Option<IntLit> {
    let split = slice
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(slice.len());
    let digits = slice[..split].replace('_', "");
    let value = digits.parse::<i64>().ok()?;
    let suffix = if split < slice.len() {
        Some(slice[split..].to_string())
    } else {
        None
    };
    Some(IntLit { value, suffix })
}

fn parse_char_lit(slice: &str) -> Option<char> {
    let inner = &slice[1..slice.len() - 1];
    let mut chars = inner.chars();
    match chars.next()? {
        '\\' => match chars.next()? {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '0' => Some('\0'),
            other => Some(other),
        },
        c => Some(c),
    }
}

/// Span in source code (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip line comments
#[logos(skip r"/\*([^*]|\*[^/])*\*/")] // Skip block and doc comments
pub enum Token {
    // === Keywords ===
    #[token("fn")]
    Fn,
    #[token("let")]
    Let,
    #[token("mut")]
    Mut,
    #[token("move")]
    Move,
    #[token("copy")]
    Copy,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("loop")]
    Loop,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("type")]
    Type,
    #[token("then")]
    Then,
    #[token("match")]
    Match,
    #[token("case")]
    Case,
    #[token("is")]
    Is,
    #[token("contract")]
    Contract,
    #[token("object")]
    Object,
    #[token("into")]
    Into,
    #[token("extern")]
    Extern,
    #[token("expect")]
    Expect,
    #[token("actual")]
    Actual,
    #[token("lifetime")]
    Lifetime,
    #[token("out")]
    Out,
    #[token("module")]
    Module,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // === Literals ===
    #[regex(r"[0-9][0-9_]*([A-Za-z_][A-Za-z0-9_]*)?", |lex| parse_int_lit(lex.slice()))]
    IntLiteral(IntLit),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*", |lex| lex.slice().replace('_', "").parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        let inner = &s[1..s.len()-1];
        Some(process_escape_sequences(inner))
    })]
    StringLiteral(String),

    #[regex(r"'([^'\\]|\\.)'", |lex| parse_char_lit(lex.slice()))]
    CharLiteral(char),

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Not,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("|>")]
    PipeGt,
    #[token("?")]
    Question,
    #[token("=>")]
    FatArrow,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // === Punctuation ===
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,

    // === Special ===
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Fn => write!(f, "fn"),
            Token::Let => write!(f, "let"),
            Token::Mut => write!(f, "mut"),
            Token::Move => write!(f, "move"),
            Token::Copy => write!(f, "copy"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::For => write!(f, "for"),
            Token::Loop => write!(f, "loop"),
            Token::In => write!(f, "in"),
            Token::Return => write!(f, "return"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Struct => write!(f, "struct"),
            Token::Enum => write!(f, "enum"),
            Token::Type => write!(f, "type"),
            Token::Then => write!(f, "then"),
            Token::Match => write!(f, "match"),
            Token::Case => write!(f, "case"),
            Token::Is => write!(f, "is"),
            Token::Contract => write!(f, "contract"),
            Token::Object => write!(f, "object"),
            Token::Into => write!(f, "into"),
            Token::Extern => write!(f, "extern"),
            Token::Expect => write!(f, "expect"),
            Token::Actual => write!(f, "actual"),
            Token::Lifetime => write!(f, "lifetime"),
            Token::Out => write!(f, "out"),
            Token::Module => write!(f, "module"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::IntLiteral(n) => match &n.suffix {
                Some(suffix) => write!(f, "{}{}", n.value, suffix),
                None => write!(f, "{}", n.value),
            },
            Token::FloatLiteral(n) => write!(f, "{}", n),
            Token::StringLiteral(s) => write!(f, "\"{}\"", s),
            Token::CharLiteral(c) => write!(f, "'{}'", c),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::PipeGt => write!(f, "|>"),
            Token::Question => write!(f, "?"),
            Token::FatArrow => write!(f, "=>"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::ColonColon => write!(f, "::"),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer wrapper that produces SpannedTokens
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Token>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: Token::lexer(source),
            finished: false,
        }
    }

    /// Tokenize the entire source into a Vec
    pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let spanned = lexer.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        if self.finished {
            return Ok(SpannedToken {
                token: Token::Eof,
                span: Span::new(0, 0),
            });
        }

        match self.inner.next() {
            Some(Ok(token)) => {
                let span = self.inner.span();
                Ok(SpannedToken {
                    token,
                    span: Span::new(span.start, span.end),
                })
            }
            Some(Err(())) => {
                let span = self.inner.span();
                Err(LexError {
                    message: format!("unexpected character: '{}'", self.inner.slice()),
                    span: Span::new(span.start, span.end),
                })
            }
            None => {
                self.finished = true;
                let len = self.inner.source().len();
                Ok(SpannedToken {
                    token: Token::Eof,
                    span: Span::new(len, len),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for LexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let source = "fn main() : I32 => { let x = 5; }";
        let tokens = Lexer::tokenize(source).unwrap();

        assert!(matches!(tokens[0].token, Token::Fn));
        assert!(matches!(tokens[1].token, Token::Ident(ref s) if s == "main"));
        assert!(matches!(tokens[2].token, Token::LParen));
        assert!(matches!(tokens[3].token, Token::RParen));
        assert!(matches!(tokens[4].token, Token::Colon));
        assert!(matches!(tokens[5].token, Token::Ident(ref s) if s == "I32"));
        assert!(matches!(tokens[6].token, Token::FatArrow));
        assert!(matches!(tokens[7].token, Token::LBrace));
        assert!(matches!(tokens[8].token, Token::Let));
        assert!(matches!(tokens[9].token, Token::Ident(ref s) if s == "x"));
        assert!(matches!(tokens[10].token, Token::Eq));
        assert!(
            matches!(tokens[11].token, Token::IntLiteral(ref n) if n.value == 5 && n.suffix.is_none())
        );
        assert!(matches!(tokens[12].token, Token::Semi));
        assert!(matches!(tokens[13].token, Token::RBrace));
        assert!(matches!(tokens[14].token, Token::Eof));
    }

    #[test]
    fn test_suffixed_int_literal() {
        let tokens = Lexer::tokenize("0USize 3USize 1_000").unwrap();

        assert!(
            matches!(tokens[0].token, Token::IntLiteral(ref n) if n.value == 0 && n.suffix.as_deref() == Some("USize"))
        );
        assert!(
            matches!(tokens[1].token, Token::IntLiteral(ref n) if n.value == 3 && n.suffix.as_deref() == Some("USize"))
        );
        assert!(
            matches!(tokens[2].token, Token::IntLiteral(ref n) if n.value == 1000 && n.suffix.is_none())
        );
    }

    #[test]
    fn test_union_and_range_operators() {
        let tokens = Lexer::tokenize("A | B |> C .. => != 0USize").unwrap();

        assert!(matches!(tokens[1].token, Token::Pipe));
        assert!(matches!(tokens[3].token, Token::PipeGt));
        assert!(matches!(tokens[5].token, Token::DotDot));
        assert!(matches!(tokens[6].token, Token::FatArrow));
        assert!(matches!(tokens[7].token, Token::NotEq));
    }

    #[test]
    fn test_reserved_words_never_lex_as_identifiers() {
        let tokens = Lexer::tokenize("module expect actual lifetime out").unwrap();

        assert!(matches!(tokens[0].token, Token::Module));
        assert!(matches!(tokens[1].token, Token::Expect));
        assert!(matches!(tokens[2].token, Token::Actual));
        assert!(matches!(tokens[3].token, Token::Lifetime));
        assert!(matches!(tokens[4].token, Token::Out));
    }

    #[test]
    fn test_comments_are_skipped() {
        let source = "// line\n/* block */\n/** doc */\nfn";
        let tokens = Lexer::tokenize(source).unwrap();

        assert!(matches!(tokens[0].token, Token::Fn));
        assert!(matches!(tokens[1].token, Token::Eof));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::tokenize(r#""a\nb" '\t'"#).unwrap();

        assert!(matches!(tokens[0].token, Token::StringLiteral(ref s) if s == "a\nb"));
        assert!(matches!(tokens[1].token, Token::CharLiteral('\t')));
    }
}

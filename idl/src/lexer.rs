use logos::{Lexer, Logos};

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"([ \t\r\n\f]+|//[^\n]*)")]
pub(crate) enum Token {
    #[token("struct")]
    Struct,
    #[token("interface")]
    Interface,
    #[token("fn")]
    Fn,
    #[token("in")]
    In,
    #[token("out")]
    Out,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("@")]
    At,

    // Inner dashes are allowed so that decorations like `no-wait` are a single word.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z0-9_]+)*", |lex| lex.slice().to_owned())]
    Word(String),

    #[regex(r#""([^"\\\n]|\\[^\n])*""#, unescape)]
    Str(String),
}

impl Token {
    /// Human readable description for diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Struct => "`struct`".into(),
            Self::Interface => "`interface`".into(),
            Self::Fn => "`fn`".into(),
            Self::In => "`in`".into(),
            Self::Out => "`out`".into(),
            Self::LBrace => "`{`".into(),
            Self::RBrace => "`}`".into(),
            Self::LParen => "`(`".into(),
            Self::RParen => "`)`".into(),
            Self::LBracket => "`[`".into(),
            Self::RBracket => "`]`".into(),
            Self::Colon => "`:`".into(),
            Self::Semicolon => "`;`".into(),
            Self::Comma => "`,`".into(),
            Self::At => "`@`".into(),
            Self::Word(word) => format!("`{word}`"),
            Self::Str(string) => format!("{string:?}"),
        }
    }
}

fn unescape(lex: &mut Lexer<Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            '"' => result.push('"'),
            '\\' => result.push('\\'),
            'n' => result.push('\n'),
            't' => result.push('\t'),
            _ => return None,
        }
    }
    Some(result)
}

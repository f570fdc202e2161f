//! Concrete syntax tree for the interface definition language, and the parser producing it.
//!
//! The tree keeps the input's spelling and source locations; name resolution and type interning
//! happen later in [`crate::builder`].

use std::fmt;
use std::ops::Range;

use logos::Logos;

use crate::error::IdlError;
use crate::lexer::Token;
use crate::types::Direction;

/// One-based line and column of a token in the input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub text: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Directive(Directive),
    Structure(StructureNode),
    Interface(InterfaceNode),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Names the root interface
    Interface,
    ServerName,
    ServerRealm,
}

impl DirectiveKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::ServerName => "server_name",
            Self::ServerRealm => "server_realm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// For `server_name` this is the unescaped string literal.
    pub argument: Ident,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureNode {
    pub name: Ident,
    pub members: Vec<MemberNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberNode {
    pub name: Ident,
    pub type_name: Ident,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceNode {
    pub name: Ident,
    pub functions: Vec<FunctionNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionNode {
    pub decorations: Vec<Ident>,
    pub name: Ident,
    pub parameters: Vec<ParameterNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    pub name: Ident,
    pub direction: Direction,
    pub type_: TypeNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Named(Ident),
    Function {
        decorations: Vec<Ident>,
        parameters: Vec<ParameterNode>,
        location: Location,
    },
}

/// Parses a whole compilation unit.
pub fn parse(source: &str) -> Result<SyntaxTree, IdlError> {
    Parser::new(source)?.parse_unit()
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Token, Range<usize>)>,
    position: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Result<Self, IdlError> {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(source);
        while let Some(token) = lexer.next() {
            match token {
                Ok(token) => tokens.push((token, lexer.span())),
                Err(()) => {
                    return Err(IdlError::Syntax {
                        location: locate(source, lexer.span().start),
                        message: format!("unrecognized input {:?}", lexer.slice()),
                    })
                }
            }
        }
        Ok(Self {
            source,
            tokens,
            position: 0,
        })
    }

    fn location(&self) -> Location {
        let offset = match self.tokens.get(self.position) {
            Some((_, span)) => span.start,
            None => self.source.len(),
        };
        locate(self.source, offset)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn error<T>(&self, expected: &str) -> Result<T, IdlError> {
        let found = match self.peek() {
            Some(token) => token.describe(),
            None => "end of input".into(),
        };
        Err(IdlError::Syntax {
            location: self.location(),
            message: format!("expected {expected}, found {found}"),
        })
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), IdlError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            self.error(&expected.describe())
        }
    }

    fn expect_word(&mut self, what: &str) -> Result<Ident, IdlError> {
        let location = self.location();
        match self.peek() {
            Some(Token::Word(word)) => {
                let text = word.clone();
                self.position += 1;
                Ok(Ident { text, location })
            }
            _ => self.error(what),
        }
    }

    fn parse_unit(&mut self) -> Result<SyntaxTree, IdlError> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            let item = match token {
                Token::At => Item::Directive(self.parse_directive()?),
                Token::Struct => Item::Structure(self.parse_structure()?),
                Token::Interface => Item::Interface(self.parse_interface()?),
                _ => return self.error("a directive, structure or interface"),
            };
            items.push(item);
        }
        Ok(SyntaxTree { items })
    }

    fn parse_directive(&mut self) -> Result<Directive, IdlError> {
        let location = self.location();
        self.expect(Token::At)?;

        let directive = if self.eat(&Token::Interface) {
            Directive {
                kind: DirectiveKind::Interface,
                argument: self.expect_word("an interface name")?,
                location,
            }
        } else {
            let keyword = self.expect_word("a directive name")?;
            match keyword.text.as_str() {
                "server_name" => {
                    let argument_location = self.location();
                    let text = match self.peek() {
                        Some(Token::Str(string)) => string.clone(),
                        _ => return self.error("a string literal"),
                    };
                    self.position += 1;
                    Directive {
                        kind: DirectiveKind::ServerName,
                        argument: Ident {
                            text,
                            location: argument_location,
                        },
                        location,
                    }
                }
                "server_realm" => Directive {
                    kind: DirectiveKind::ServerRealm,
                    argument: self.expect_word("a realm")?,
                    location,
                },
                other => {
                    return Err(IdlError::Syntax {
                        location: keyword.location,
                        message: format!("unknown directive `{other}`"),
                    })
                }
            }
        };

        self.expect(Token::Semicolon)?;
        Ok(directive)
    }

    fn parse_structure(&mut self) -> Result<StructureNode, IdlError> {
        self.expect(Token::Struct)?;
        let name = self.expect_word("a structure name")?;
        self.expect(Token::LBrace)?;

        let mut members = Vec::new();
        loop {
            let member_name = self.expect_word("a member name")?;
            self.expect(Token::Colon)?;
            let type_name = self.expect_word("a type name")?;
            members.push(MemberNode {
                name: member_name,
                type_name,
            });

            if !self.eat(&Token::Comma) || self.peek() == Some(&Token::RBrace) {
                break;
            }
        }

        self.expect(Token::RBrace)?;
        self.eat(&Token::Semicolon);
        Ok(StructureNode { name, members })
    }

    fn parse_interface(&mut self) -> Result<InterfaceNode, IdlError> {
        self.expect(Token::Interface)?;
        let name = self.expect_word("an interface name")?;
        self.expect(Token::LBrace)?;

        let mut functions = Vec::new();
        while !self.eat(&Token::RBrace) {
            functions.push(self.parse_function()?);
        }

        self.eat(&Token::Semicolon);
        Ok(InterfaceNode { name, functions })
    }

    fn parse_decorations(&mut self) -> Result<Vec<Ident>, IdlError> {
        let mut decorations = Vec::new();
        if !self.eat(&Token::LBracket) {
            return Ok(decorations);
        }
        loop {
            decorations.push(self.expect_word("a decoration")?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket)?;
        Ok(decorations)
    }

    fn parse_function(&mut self) -> Result<FunctionNode, IdlError> {
        let decorations = self.parse_decorations()?;
        let name = self.expect_word("a function name")?;
        let parameters = self.parse_parameters()?;
        self.expect(Token::Semicolon)?;
        Ok(FunctionNode {
            decorations,
            name,
            parameters,
        })
    }

    fn parse_parameters(&mut self) -> Result<Vec<ParameterNode>, IdlError> {
        self.expect(Token::LParen)?;
        let mut parameters = Vec::new();
        while !self.eat(&Token::RParen) {
            parameters.push(self.parse_parameter()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(parameters)
    }

    fn parse_parameter(&mut self) -> Result<ParameterNode, IdlError> {
        let name = self.expect_word("a parameter name")?;
        self.expect(Token::Colon)?;
        let direction = if self.eat(&Token::In) {
            Direction::In
        } else if self.eat(&Token::Out) {
            Direction::Out
        } else {
            return self.error("`in` or `out`");
        };
        let type_ = self.parse_type()?;
        Ok(ParameterNode {
            name,
            direction,
            type_,
        })
    }

    fn parse_type(&mut self) -> Result<TypeNode, IdlError> {
        if let Some(Token::Word(_)) = self.peek() {
            return Ok(TypeNode::Named(self.expect_word("a type name")?));
        }

        let location = self.location();
        let decorations = self.parse_decorations()?;
        if !self.eat(&Token::Fn) {
            return self.error("a type name or a function type");
        }
        let parameters = self.parse_parameters()?;
        Ok(TypeNode::Function {
            decorations,
            parameters,
            location,
        })
    }
}

fn locate(source: &str, offset: usize) -> Location {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |index| index + 1);
    let column = before[line_start..].chars().count() + 1;
    Location { line, column }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn words(idents: &[Ident]) -> Vec<&str> {
        idents.iter().map(|ident| ident.text.as_str()).collect()
    }

    #[test]
    fn parses_directives() {
        let tree = parse(
            r#"
            @interface Echo;
            @server_name "echo\tserver";
            @server_realm children;
            "#,
        )
        .unwrap();

        let directives: Vec<_> = tree
            .items
            .iter()
            .map(|item| match item {
                Item::Directive(directive) => (directive.kind, directive.argument.text.as_str()),
                _ => panic!("unexpected item {item:?}"),
            })
            .collect();
        assert_eq!(
            directives,
            vec![
                (DirectiveKind::Interface, "Echo"),
                (DirectiveKind::ServerName, "echo\tserver"),
                (DirectiveKind::ServerRealm, "children"),
            ]
        );
    }

    #[test]
    fn parses_structure_with_trailing_comma() {
        let tree = parse("struct Point { x: i32, y: i32, }").unwrap();
        let Item::Structure(structure) = &tree.items[0] else {
            panic!("expected a structure");
        };
        assert_eq!(structure.name.text, "Point");
        let members: Vec<_> = structure
            .members
            .iter()
            .map(|m| (m.name.text.as_str(), m.type_name.text.as_str()))
            .collect();
        assert_eq!(members, vec![("x", "i32"), ("y", "i32")]);
    }

    #[test]
    fn parses_nested_function_types() {
        let tree = parse(
            "interface Jobs {
                [nowait] start(on_done: in [no-wait] fn(code: in i32, retry: out fn()));
            }",
        )
        .unwrap();
        let Item::Interface(interface) = &tree.items[0] else {
            panic!("expected an interface");
        };
        let function = &interface.functions[0];
        assert_eq!(words(&function.decorations), vec!["nowait"]);
        assert_eq!(function.name.text, "start");

        let parameter = &function.parameters[0];
        assert_eq!(parameter.direction, Direction::In);
        let TypeNode::Function {
            decorations,
            parameters,
            ..
        } = &parameter.type_
        else {
            panic!("expected a function type");
        };
        assert_eq!(words(decorations), vec!["no-wait"]);
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[1].direction, Direction::Out);
        assert!(matches!(
            &parameters[1].type_,
            TypeNode::Function { parameters, .. } if parameters.is_empty()
        ));
    }

    #[test]
    fn reports_location_of_unexpected_token() {
        let error = parse("interface Foo {\n  bar(x: sideways i32);\n}").unwrap_err();
        match error {
            IdlError::Syntax { location, message } => {
                assert_eq!(location, Location { line: 2, column: 10 });
                assert!(message.contains("`in` or `out`"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_structures() {
        assert!(matches!(
            parse("struct Nothing {}"),
            Err(IdlError::Syntax { .. })
        ));
    }

    #[test]
    fn rejects_unknown_directives() {
        assert!(matches!(
            parse("@server_port 80;"),
            Err(IdlError::Syntax { .. })
        ));
    }
}
